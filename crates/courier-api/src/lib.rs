//! Development backend: the auth, profile and row-change trigger contracts
//! the app and relay are written against, served from a local SQLite file.

pub mod auth;
pub mod error;
pub mod middleware;
pub mod profiles;
pub mod trigger;

use axum::{
    Router,
    middleware as axum_middleware,
    routing::{get, post},
};

use crate::auth::AppState;
use crate::middleware::{require_api_key, require_auth};

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/v1/signup", post(auth::signup))
        .route("/auth/v1/token", post(auth::token));

    let protected_routes = Router::new()
        .route("/auth/v1/user", get(auth::user))
        .route("/auth/v1/logout", post(auth::logout))
        .route("/rest/v1/profiles", post(profiles::upsert_profile))
        .route("/rest/v1/profiles/{id}", get(profiles::get_profile))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    let api = public_routes
        .merge(protected_routes)
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state);

    Router::new().route("/health", get(health)).merge(api)
}

async fn health() -> &'static str {
    "ok"
}
