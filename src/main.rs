use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use docchat_backend::core::logging;
use docchat_backend::server;
use docchat_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let state = AppState::initialize().await?;
    logging::init(&state.paths);

    if let Some(reason) = &state.init_error {
        tracing::warn!("Starting degraded: {}", reason);
    }

    let bind_addr = format!("127.0.0.1:{}", state.config.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    let app: Router = server::router::router(state);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
