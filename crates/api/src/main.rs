use anyhow::Result;
use viaje_api::{build_app, ApiConfig};
use viaje_observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("viaje_api");

    let config = ApiConfig::from_env();
    let bind = config.bind.clone();

    let app = build_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(bind = %bind, "viaje api started");

    axum::serve(listener, app).await?;
    Ok(())
}
