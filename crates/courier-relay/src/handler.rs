use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use tracing::{error, info};

use courier_types::api::{RelayFailure, RelayMessage, RelayRequest};

use crate::config::{Endpoints, FcmSecrets, SecretSource};
use crate::error::RelayError;
use crate::fcm::{FcmClient, FcmMessage};
use crate::oauth;

pub const NO_TOKEN_MESSAGE: &str = "No FCM token found";

/// Shared, immutable state. Nothing here changes between invocations.
#[derive(Clone)]
pub struct RelayState {
    secrets: Arc<dyn SecretSource>,
    http: reqwest::Client,
    token_uri: String,
    fcm: FcmClient,
}

impl RelayState {
    pub fn new(secrets: Arc<dyn SecretSource>, endpoints: Endpoints) -> Self {
        let http = reqwest::Client::new();
        Self {
            secrets,
            fcm: FcmClient::new(http.clone(), endpoints.fcm_api_base),
            token_uri: endpoints.token_uri,
            http,
        }
    }
}

enum Outcome {
    NoToken,
    Delivered(serde_json::Value),
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/", post(send_notification))
        .route("/send-notification", post(send_notification))
        .with_state(state)
}

/// `POST /` — the row-change webhook target.
pub async fn send_notification(State(state): State<RelayState>, body: Bytes) -> Response {
    match relay(&state, &body).await {
        Ok(Outcome::NoToken) => (
            StatusCode::OK,
            Json(RelayMessage {
                message: NO_TOKEN_MESSAGE.to_string(),
            }),
        )
            .into_response(),
        Ok(Outcome::Delivered(result)) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => {
            error!("Relay failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(RelayFailure {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn relay(state: &RelayState, body: &[u8]) -> Result<Outcome, RelayError> {
    let request: RelayRequest =
        serde_json::from_slice(body).map_err(|e| RelayError::BadPayload(e.to_string()))?;

    let Some(device_token) = request.record.push_token() else {
        return Ok(Outcome::NoToken);
    };

    // Secrets are read per invocation; a missing one fails only this request.
    let secrets = FcmSecrets::load(state.secrets.as_ref())?;

    let access_token = oauth::fetch_access_token(&state.http, &state.token_uri, &secrets).await?;

    let result = state
        .fcm
        .send(
            &secrets.project_id,
            &access_token,
            &FcmMessage::profile_updated(device_token),
        )
        .await?;

    info!(project_id = %secrets.project_id, "FCM result: {}", result);
    Ok(Outcome::Delivered(result))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::{CLIENT_EMAIL_VAR, PRIVATE_KEY_VAR, PROJECT_ID_VAR};

    const PRIVATE_KEY: &str = include_str!("../tests/fixtures/service_account_key.pem");

    fn full_secrets() -> HashMap<String, String> {
        HashMap::from([
            (CLIENT_EMAIL_VAR.to_string(), "relay@proj.iam.gserviceaccount.com".to_string()),
            // Stored the way secret managers hand it over: one line, escaped newlines.
            (PRIVATE_KEY_VAR.to_string(), PRIVATE_KEY.replace('\n', "\\n")),
            (PROJECT_ID_VAR.to_string(), "proj".to_string()),
        ])
    }

    fn app(secrets: HashMap<String, String>, upstream: &MockServer) -> Router {
        let endpoints = Endpoints {
            token_uri: format!("{}/token", upstream.uri()),
            fcm_api_base: upstream.uri(),
        };
        router(RelayState::new(Arc::new(secrets), endpoints))
    }

    async fn mount_upstream(server: &MockServer, times: u64) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.test",
                "expires_in": 3599
            })))
            .expect(times)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/proj/messages:send"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "projects/proj/messages/0:42"
            })))
            .expect(times)
            .mount(server)
            .await;
    }

    async fn post(app: &Router, body: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn record_without_token_is_a_no_op() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&upstream)
            .await;

        let (status, body) = post(&app(full_secrets(), &upstream), r#"{"record":{}}"#).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "message": "No FCM token found" }));
        upstream.verify().await;
    }

    #[tokio::test]
    async fn missing_project_id_fails_only_this_request() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&upstream)
            .await;

        let mut secrets = full_secrets();
        secrets.remove(PROJECT_ID_VAR);
        let (status, body) = post(&app(secrets, &upstream), r#"{"record":{"fcm_token":"tok"}}"#).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("FCM_PROJECT_ID"));
        upstream.verify().await;
    }

    #[tokio::test]
    async fn token_is_forwarded_and_gateway_body_returned() {
        let upstream = MockServer::start().await;
        mount_upstream(&upstream, 1).await;

        let (status, body) = post(
            &app(full_secrets(), &upstream),
            r#"{"record":{"id":"6a1c","username":"ada","fcm_token":"tok"}}"#,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "projects/proj/messages/0:42");
        upstream.verify().await;
    }

    #[tokio::test]
    async fn concurrent_invocations_are_independent() {
        let upstream = MockServer::start().await;
        mount_upstream(&upstream, 2).await;
        let app = app(full_secrets(), &upstream);

        let body = r#"{"record":{"fcm_token":"tok"}}"#;
        let (a, b) = tokio::join!(post(&app, body), post(&app, body));

        assert_eq!(a.0, StatusCode::OK);
        assert_eq!(b.0, StatusCode::OK);
        upstream.verify().await;
    }

    #[tokio::test]
    async fn refused_token_exchange_is_reported() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized_client"))
            .mount(&upstream)
            .await;

        let (status, body) =
            post(&app(full_secrets(), &upstream), r#"{"record":{"fcm_token":"tok"}}"#).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().starts_with("Token exchange failed"));
    }

    #[tokio::test]
    async fn body_without_record_is_an_error() {
        let upstream = MockServer::start().await;
        let (status, body) = post(&app(full_secrets(), &upstream), r#"{"fcm_token":"tok"}"#).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));
    }
}
