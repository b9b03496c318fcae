use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use depot::config::{Config, RegistryConfig};
use depot::registry::fs::FilesystemRegistry;

/// HTTP server for a feed of versioned .nupkg packages
#[derive(Parser, Debug)]
#[command(name = "depot")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Archive root directory (filesystem backend)
    #[arg(long, value_name = "PATH")]
    registry_path: Option<PathBuf>,

    /// Bind address
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Port number
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Public base URL of the feed, used in links
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hyper=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration
    let config = Config::load(
        args.config.as_ref(),
        args.bind.as_deref(),
        args.port,
        args.registry_path.as_ref(),
        args.base_url.as_deref(),
    )?;

    info!(
        "Configuration loaded: bind={}:{} base_url={}",
        config.bind, config.port, config.base_url
    );

    // Create registry
    let registry = match &config.registry {
        RegistryConfig::Filesystem { path } => {
            info!("Using filesystem registry at: {}", path.display());
            FilesystemRegistry::from_config(&config)
        }
    };
    registry.init().await?;
    let registry: Arc<dyn depot::Registry> = Arc::new(registry);

    // Start server
    depot::api::run(config, registry).await
}
