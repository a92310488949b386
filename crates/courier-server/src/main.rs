use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use courier_api::auth::{AppState, AppStateInner};
use courier_api::trigger::Trigger;

/// Clients refresh up to a minute before expiry, so shorter lifetimes would
/// keep them refreshing constantly.
const MIN_ACCESS_TOKEN_TTL_SECS: i64 = 120;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier=debug,courier_api=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret = std::env::var("COURIER_JWT_SECRET").unwrap_or_default();
    if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
        anyhow::bail!("COURIER_JWT_SECRET is unset or still a placeholder");
    }
    let anon_key = std::env::var("COURIER_ANON_KEY")
        .map_err(|_| anyhow::anyhow!("COURIER_ANON_KEY is not set"))?;

    let db_path = std::env::var("COURIER_DB_PATH").unwrap_or_else(|_| "courier.db".into());
    let host = std::env::var("COURIER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("COURIER_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let ttl_secs = access_token_ttl_secs(std::env::var("COURIER_ACCESS_TOKEN_TTL_SECS").ok())?;
    let require_email_confirmation = std::env::var("COURIER_REQUIRE_EMAIL_CONFIRMATION")
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);
    let webhook_url = std::env::var("COURIER_PROFILE_WEBHOOK_URL")
        .ok()
        .filter(|v| !v.is_empty());

    if webhook_url.is_none() {
        warn!("COURIER_PROFILE_WEBHOOK_URL not set; profile changes will not reach the relay");
    }

    // Init database
    let db = Arc::new(courier_db::Database::open(&PathBuf::from(&db_path))?);

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret,
        anon_key,
        access_token_ttl: chrono::Duration::seconds(ttl_secs),
        require_email_confirmation,
        trigger: Trigger::new(webhook_url),
    });

    let app = courier_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Courier backend listening on {}", addr);
    info!(require_email_confirmation, "Access tokens live {}s", ttl_secs);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn access_token_ttl_secs(raw: Option<String>) -> anyhow::Result<i64> {
    let ttl: i64 = raw.as_deref().unwrap_or("3600").parse()?;
    if ttl < MIN_ACCESS_TOKEN_TTL_SECS {
        anyhow::bail!(
            "COURIER_ACCESS_TOKEN_TTL_SECS must be at least {} (got {})",
            MIN_ACCESS_TOKEN_TTL_SECS,
            ttl
        );
    }
    Ok(ttl)
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl+C, shutting down...");
    }
}
