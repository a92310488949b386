use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use courier_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;

/// Header carrying the project's public key on every backend call.
pub const API_KEY_HEADER: &str = "apikey";

/// Reject requests that do not present the project's public key.
pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("No API key found in request".into()))?;

    if presented != state.anon_key {
        return Err(ApiError::Unauthorized("Invalid API key".into()));
    }
    Ok(next.run(req).await)
}

/// Extract and validate the access token from the Authorization header.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.ok_or_else(|| ApiError::Unauthorized("Missing access token".into()))?;

    let claims = decode_access_token(&state.jwt_secret, bearer.token())
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired access token".into()))?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub fn decode_access_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}
