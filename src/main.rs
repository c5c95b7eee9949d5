use std::env;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use aria_backend::config::AppPaths;
use aria_backend::logging;
use aria_backend::server::router::router;
use aria_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = Arc::new(AppPaths::new());
    logging::init(&paths);

    let state = AppState::initialize(paths).await?;

    let port = env::var("PORT")
        .ok()
        .and_then(|val| val.parse::<u16>().ok())
        .unwrap_or(state.config.server.port);
    let bind_addr = format!("127.0.0.1:{}", port);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    tracing::info!("Listening on {}", addr);

    let app: Router = router(state);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
