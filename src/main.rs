use bito_proxy::config::config_search_paths;
use bito_proxy::{build_router, AppState, ProxyConfig, SharedLogger};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "bito-proxy",
    about = "OpenAI-compatible chat completions proxy for the Bito chat API",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Bito chat endpoint (overrides config)
    #[arg(long)]
    upstream_url: Option<String>,

    /// Request log file path
    #[arg(long, default_value = "bito-proxy.log")]
    log_file: PathBuf,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,

    /// Print the models that would be served and exit
    #[arg(long)]
    list_models: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bito_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        println!("  (built-in defaults if none exist)");
        return Ok(());
    }

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(url) = cli.upstream_url {
        config.upstream.url = url;
    }

    let logger = SharedLogger::new(&cli.log_file, config.log.max_entries)?;
    if logger.compact_if_needed()? {
        info!("Compacted request log {}", cli.log_file.display());
    }

    let client = reqwest::Client::new();
    let state = Arc::new(AppState::new(config.clone(), client, logger.clone()));

    if cli.list_models {
        for model in state.registry.list().data {
            println!("{}", model.id);
        }
        return Ok(());
    }

    info!("bito-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("  Upstream:  {}", config.upstream.url);
    info!("  Port:      {}", config.port);
    info!("  Models:    {}", state.registry.len());
    info!("  Log file:  {}", cli.log_file.display());

    logger.info(
        "startup",
        format!(
            "Starting bito-proxy upstream={} port={} models={}",
            config.upstream.url,
            config.port,
            state.registry.len()
        ),
    );

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("  OpenAI base URL: http://localhost:{}/v1", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
