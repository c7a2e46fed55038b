pub mod codec;
pub mod config;
pub mod crypto;
pub mod identity;
pub mod oauth;
pub mod pipeline;
pub mod platform;
pub mod routes;
pub mod todo;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;

use routes::AppState;

pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let app = routes::build_router(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    // Pending connect waiters see a closed channel and stop quietly.
    state.broker.close();
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
