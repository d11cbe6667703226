//! API translation between `OpenAI` and Bito chat formats.
//!
//! The core of the proxy: flattens chat requests into Bito's prompt/context
//! shape, translates Bito's event stream into `OpenAI` chunks, and aggregates
//! those chunks into a non-streaming response. All translation here is pure
//! (no I/O).

pub mod bito_types;
pub mod openai_types;
pub mod request;
pub mod response;
pub mod streaming;
