pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod presets;
pub mod proxy;
pub mod server;
pub mod translate;

pub use config::ProxyConfig;
pub use error::{ProxyError, Result};
pub use logging::SharedLogger;
pub use models::ModelRegistry;
pub use server::{build_router, AppState};
