use anyhow::{Context, Result};
use axum::Router;

pub fn init_tracing() {
    tracing_subscriber::fmt().init();
}

pub fn init_env() {
    // Missing .env is fine in containerized deployments.
    dotenvy::dotenv().ok();
}

pub async fn serve(service_name: &str, app: Router, port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    tracing::info!("{} listening on {}", service_name, listener.local_addr()?);
    axum::serve(listener, app)
        .await
        .context("Server terminated unexpectedly")?;
    Ok(())
}
