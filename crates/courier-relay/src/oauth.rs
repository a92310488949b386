//! Service account token exchange (OAuth 2.0 JWT bearer grant).

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::FcmSecrets;
use crate::error::RelayError;

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Claims of the signed assertion presented to the token endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Sign an RS256 assertion for the service account.
pub fn sign_assertion(
    secrets: &FcmSecrets,
    token_uri: &str,
    now: DateTime<Utc>,
) -> Result<String, RelayError> {
    let key = EncodingKey::from_rsa_pem(secrets.private_key.as_bytes())
        .map_err(|e| RelayError::Credentials(format!("invalid private key: {e}")))?;

    let iat = now.timestamp();
    let claims = AssertionClaims {
        iss: secrets.client_email.clone(),
        scope: CLOUD_PLATFORM_SCOPE.to_string(),
        aud: token_uri.to_string(),
        iat,
        exp: iat + ASSERTION_LIFETIME_SECS,
    };

    encode(&Header::new(Algorithm::RS256), &claims, &key)
        .map_err(|e| RelayError::Credentials(format!("failed to sign assertion: {e}")))
}

/// Exchange a signed assertion for a short-lived bearer token.
///
/// # Errors
///
/// `RelayError::Credentials` if the key cannot sign, `RelayError::TokenExchange`
/// if the endpoint is unreachable or refuses the grant.
pub async fn fetch_access_token(
    http: &reqwest::Client,
    token_uri: &str,
    secrets: &FcmSecrets,
) -> Result<String, RelayError> {
    let assertion = sign_assertion(secrets, token_uri, Utc::now())?;

    let response = http
        .post(token_uri)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await
        .map_err(|e| RelayError::TokenExchange(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        warn!(status = status.as_u16(), body = %body, "Token endpoint refused assertion");
        return Err(RelayError::TokenExchange(format!("status {}: {}", status.as_u16(), body)));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| RelayError::TokenExchange(format!("malformed token response: {e}")))?;

    debug!(expires_in = ?token.expires_in, "Obtained FCM access token");
    Ok(token.access_token)
}
