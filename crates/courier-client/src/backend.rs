//! Backend collaborators: the auth API and the profile table.
//!
//! The app core only talks to the backend through [`AuthBackend`] and
//! [`ProfileBackend`]; [`BackendClient`] is the HTTP implementation.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use courier_types::api::{Credentials, ErrorBody, RefreshRequest, SignUpResponse};
use courier_types::models::{Profile, ProfilePatch, Session};

use crate::config::ClientConfig;
use crate::error::ClientError;

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResponse, ClientError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ClientError>;
    async fn sign_out(&self, access_token: &str) -> Result<(), ClientError>;
    async fn refresh(&self, refresh_token: &str) -> Result<Session, ClientError>;
}

#[async_trait]
pub trait ProfileBackend: Send + Sync {
    /// Field-scoped upsert: only the fields present in `patch` are written.
    async fn upsert_profile(
        &self,
        access_token: &str,
        patch: &ProfilePatch,
    ) -> Result<Profile, ClientError>;

    async fn select_profile(&self, access_token: &str, id: Uuid) -> Result<Option<Profile>, ClientError>;
}

/// HTTP client for the hosted backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl BackendClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_http(reqwest::Client::new(), &config.backend_url, &config.anon_key)
    }

    pub fn with_http(http: reqwest::Client, base_url: &str, anon_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<B, T>(&self, path: &str, bearer: Option<&str>, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let mut req = self
            .http
            .post(self.url(path))
            .header("apikey", &self.anon_key)
            .json(body);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        let response = req.send().await.map_err(|e| ClientError::Network(e.to_string()))?;
        read_json(response).await
    }
}

/// Decode a success body, or turn an error response into
/// `ClientError::Backend` with the backend's own message.
async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| ClientError::Network(format!("malformed response: {e}")));
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|b| b.message)
        .unwrap_or_else(|_| {
            if text.is_empty() {
                status.canonical_reason().unwrap_or("Request failed").to_string()
            } else {
                text
            }
        });

    debug!(status = status.as_u16(), %message, "Backend rejected request");
    Err(ClientError::Backend {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl AuthBackend for BackendClient {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpResponse, ClientError> {
        let body = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.post_json("/auth/v1/signup", None, &body).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        let body = Credentials {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.post_json("/auth/v1/token?grant_type=password", None, &body).await
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.url("/auth/v1/logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        if response.status().is_success() {
            return Ok(());
        }
        read_json::<serde_json::Value>(response).await.map(|_| ())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, ClientError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        self.post_json("/auth/v1/token?grant_type=refresh_token", None, &body).await
    }
}

#[async_trait]
impl ProfileBackend for BackendClient {
    async fn upsert_profile(
        &self,
        access_token: &str,
        patch: &ProfilePatch,
    ) -> Result<Profile, ClientError> {
        self.post_json("/rest/v1/profiles", Some(access_token), patch).await
    }

    async fn select_profile(&self, access_token: &str, id: Uuid) -> Result<Option<Profile>, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/rest/v1/profiles/{}", id)))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        read_json(response).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> BackendClient {
        BackendClient::with_http(reqwest::Client::new(), &server.uri(), "anon")
    }

    #[tokio::test]
    async fn sign_in_error_carries_backend_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .and(query_param("grant_type", "password"))
            .and(header("apikey", "anon"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({ "message": "Invalid login credentials" })),
            )
            .mount(&server)
            .await;

        let err = client(&server).sign_in("ada@example.com", "nope").await.unwrap_err();

        assert_eq!(err.to_string(), "Invalid login credentials");
        assert!(err.is_rejection());
    }

    #[tokio::test]
    async fn upsert_sends_only_patched_fields_with_bearer() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path("/rest/v1/profiles"))
            .and(header("authorization", "Bearer access"))
            .and(body_partial_json(json!({ "id": id, "username": "ada" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": id,
                "username": "ada",
                "fcm_token": "kept",
                "updated_at": Utc::now(),
            })))
            .expect(1)
            .mount(&server)
            .await;

        let profile = client(&server)
            .upsert_profile("access", &ProfilePatch::username(id, "ada", Utc::now()))
            .await
            .unwrap();

        assert_eq!(profile.fcm_token.as_deref(), Some("kept"));
        let sent: serde_json::Value =
            serde_json::from_slice(&server.received_requests().await.unwrap()[0].body).unwrap();
        assert!(sent.get("fcm_token").is_none());
    }

    #[tokio::test]
    async fn missing_profile_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Profile not found" })))
            .mount(&server)
            .await;

        let got = client(&server).select_profile("access", Uuid::new_v4()).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_network_error() {
        let backend = BackendClient::with_http(reqwest::Client::new(), "http://127.0.0.1:9", "anon");
        let err = backend.sign_in("a@b.c", "secret").await.unwrap_err();
        assert!(matches!(err, ClientError::Network(_)));
    }
}
