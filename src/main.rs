use anyhow::Result;
use gcs_gateway::{AppState, GatewayConfig, GcsBackend, app, logging};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Parse config ---
    let cfg = GatewayConfig::from_env_and_args()?;

    // --- Logging setup ---
    logging::init_tracing();
    tracing::debug!("Starting gcs-gateway with config: {:?}", cfg);

    // Malformed rules still fail per request; surface them early too.
    if let Err(err) = cfg.block_rule() {
        tracing::warn!("{}; every object request will fail with 500", err);
    }

    // --- Initialize backend ---
    let backend = GcsBackend::from_config(
        cfg.endpoint.as_deref(),
        cfg.credentials.clone(),
        cfg.backend_timeout,
    )?;
    let bind = cfg.bind.clone();
    let app = app(AppState::new(Arc::new(backend), cfg));

    // --- Start server ---
    let listener = TcpListener::bind(&bind).await?;
    tracing::info!("[service] listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
