use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use hublink_github::oauth::GitHubOAuth;
use hublink_github::HttpConnector;
use hublink_server::config::{ConfigArgs, ConfigService, Configuration, SharedConfig};
use hublink_server::platform::LoggingPlatform;
use hublink_server::routes::InnerAppState;
use hublink_store::MemoryStore;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "hublink-server", about = "GitHub bridge for a chat platform")]
struct Cli {
    /// Address to bind
    #[arg(long, env = "HUBLINK_BIND", default_value = "0.0.0.0")]
    bind: String,

    /// Port to listen on
    #[arg(long, env = "HUBLINK_PORT", default_value_t = 3720)]
    port: u16,

    #[command(flatten)]
    config: ConfigArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("hublink_server=info,tower_http=info")
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = Arc::new(SharedConfig::new(Configuration::from(cli.config)));
    if let Err(e) = config.get_configuration().is_valid() {
        // API routes answer 501 until the configuration is fixed.
        warn!("configuration incomplete: {e}");
    }

    let platform = Arc::new(LoggingPlatform);
    let state = Arc::new(InnerAppState::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(HttpConnector),
        Arc::new(GitHubOAuth::new()),
        platform.clone(),
        platform,
    ));

    let addr = SocketAddr::new(cli.bind.parse()?, cli.port);
    let listener = TcpListener::bind(addr).await?;
    info!("hublink-server listening on http://{addr}");

    hublink_server::serve(listener, state).await
}
