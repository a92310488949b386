use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use courier_relay::{Endpoints, EnvSecrets, FcmSecrets, RelayState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_relay=debug,tower_http=debug".into()),
        )
        .init();

    let host = std::env::var("COURIER_RELAY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("COURIER_RELAY_PORT")
        .unwrap_or_else(|_| "8787".into())
        .parse()?;

    // Secrets are read per request, so a missing one is only a warning here.
    if let Err(e) = FcmSecrets::load(&EnvSecrets) {
        warn!("{}; notifications will fail until it is set", e);
    }

    let endpoints = Endpoints::from_env();
    info!(token_uri = %endpoints.token_uri, fcm = %endpoints.fcm_api_base, "Upstream endpoints");

    let app = courier_relay::router(RelayState::new(Arc::new(EnvSecrets), endpoints))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Courier relay listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
