use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use jsonwebtoken::{EncodingKey, Header, encode};
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use courier_db::Database;
use courier_db::models::UserRow;
use courier_types::api::{Claims, Credentials, GrantQuery, RefreshRequest, SignUpResponse};
use courier_types::models::{AuthUser, Session};

use crate::error::{ApiError, blocking};
use crate::trigger::Trigger;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub anon_key: String,
    pub access_token_ttl: chrono::Duration,
    pub require_email_confirmation: bool,
    pub trigger: Trigger,
}

const MIN_PASSWORD_LEN: usize = 6;

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::Unprocessable("Unable to validate email address: invalid format".into()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Unprocessable(format!(
            "Password should be at least {} characters.",
            MIN_PASSWORD_LEN
        )));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();

    let user_id = Uuid::new_v4();
    let confirmed = !state.require_email_confirmation;

    let db = state.db.clone();
    let (id, stored_email) = (user_id.to_string(), email.clone());
    // The UNIQUE email constraint decides concurrent sign-ups for one address.
    if !blocking(move || db.create_user(&id, &stored_email, &password_hash, confirmed)).await? {
        return Err(ApiError::Unprocessable("User already registered".into()));
    }

    info!(%user_id, confirmed, "User registered");

    let user = AuthUser { id: user_id, email };
    let session = if confirmed {
        Some(issue_session(&state, user.clone()).await?)
    } else {
        None
    };

    Ok((StatusCode::OK, Json(SignUpResponse { user, session })))
}

/// `POST /auth/v1/token?grant_type=...` — password sign-in or refresh.
pub async fn token(
    State(state): State<AppState>,
    Query(query): Query<GrantQuery>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<Session>, ApiError> {
    match query.grant_type.as_str() {
        "password" => {
            let creds: Credentials = serde_json::from_value(body)
                .map_err(|_| ApiError::BadRequest("Missing email or password".into()))?;
            password_grant(&state, creds).await.map(Json)
        }
        "refresh_token" => {
            let req: RefreshRequest = serde_json::from_value(body)
                .map_err(|_| ApiError::BadRequest("Missing refresh token".into()))?;
            refresh_grant(&state, req).await.map(Json)
        }
        other => Err(ApiError::BadRequest(format!("Unsupported grant type: {}", other))),
    }
}

pub async fn user(Extension(claims): Extension<Claims>) -> Json<AuthUser> {
    Json(AuthUser {
        id: claims.sub,
        email: claims.email,
    })
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    let db = state.db.clone();
    let user_id = claims.sub.to_string();
    let revoked = blocking(move || db.revoke_refresh_tokens(&user_id)).await?;
    info!(user_id = %claims.sub, revoked, "User signed out");
    Ok(StatusCode::NO_CONTENT)
}

async fn password_grant(state: &AppState, creds: Credentials) -> Result<Session, ApiError> {
    let invalid = || ApiError::BadRequest("Invalid login credentials".into());

    let db = state.db.clone();
    let email = creds.email.trim().to_lowercase();
    let user = blocking(move || db.get_user_by_email(&email)).await?.ok_or_else(invalid)?;

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("corrupt password hash for {}: {}", user.id, e))?;
    Argon2::default()
        .verify_password(creds.password.as_bytes(), &parsed_hash)
        .map_err(|_| invalid())?;

    if !user.email_confirmed {
        return Err(ApiError::BadRequest("Email not confirmed".into()));
    }

    issue_session(state, auth_user(&user)?).await
}

async fn refresh_grant(state: &AppState, req: RefreshRequest) -> Result<Session, ApiError> {
    let digest = hash_refresh_token(&req.refresh_token);

    let db = state.db.clone();
    let user = blocking(move || {
        let Some(user_id) = db.consume_refresh_token(&digest)? else {
            return Ok(None);
        };
        db.get_user_by_id(&user_id)
    })
    .await?
    .ok_or_else(|| {
        warn!("Rejected unknown or reused refresh token");
        ApiError::BadRequest("Invalid Refresh Token".into())
    })?;

    issue_session(state, auth_user(&user)?).await
}

fn auth_user(row: &UserRow) -> Result<AuthUser, ApiError> {
    let id = row
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {}", row.id, e))?;
    Ok(AuthUser {
        id,
        email: row.email.clone(),
    })
}

/// Mint an access token and a fresh single-use refresh token.
pub async fn issue_session(state: &AppState, user: AuthUser) -> Result<Session, ApiError> {
    let expires_at = chrono::Utc::now() + state.access_token_ttl;
    let access_token = create_token(&state.jwt_secret, &user, expires_at)?;

    let mut raw = [0u8; 32];
    rand::rng().fill(&mut raw);
    let refresh_token = B64.encode(raw);

    let db = state.db.clone();
    let digest = hash_refresh_token(&refresh_token);
    let user_id = user.id.to_string();
    blocking(move || db.insert_refresh_token(&digest, &user_id)).await?;

    Ok(Session {
        access_token,
        refresh_token,
        expires_at,
        user,
    })
}

fn create_token(
    secret: &str,
    user: &AuthUser,
    expires_at: chrono::DateTime<chrono::Utc>,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        exp: expires_at.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

fn hash_refresh_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
