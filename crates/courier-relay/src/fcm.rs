//! FCM HTTP v1 API client.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::RelayError;

pub const PROFILE_UPDATED_TITLE: &str = "Profile Updated ✅";
pub const PROFILE_UPDATED_BODY: &str = "Your profile has been updated successfully!";

/// FCM notification message payload.
#[derive(Debug, Serialize)]
pub struct FcmMessage {
    /// The wrapper message object required by the FCM v1 API.
    pub message: FcmMessageBody,
}

/// The inner message body sent to FCM.
#[derive(Debug, Serialize)]
pub struct FcmMessageBody {
    /// The device registration token to send the notification to.
    pub token: String,
    pub notification: FcmNotification,
}

/// FCM notification display payload.
#[derive(Debug, Serialize)]
pub struct FcmNotification {
    pub title: String,
    pub body: String,
}

impl FcmMessage {
    /// The fixed "profile updated" notification for one device.
    pub fn profile_updated(device_token: &str) -> Self {
        Self {
            message: FcmMessageBody {
                token: device_token.to_string(),
                notification: FcmNotification {
                    title: PROFILE_UPDATED_TITLE.to_string(),
                    body: PROFILE_UPDATED_BODY.to_string(),
                },
            },
        }
    }
}

/// Client for the FCM HTTP v1 API.
#[derive(Debug, Clone)]
pub struct FcmClient {
    http: reqwest::Client,
    api_base: String,
}

impl FcmClient {
    pub fn new(http: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// The per-project send endpoint.
    pub fn send_url(&self, project_id: &str) -> String {
        format!("{}/v1/projects/{}/messages:send", self.api_base, project_id)
    }

    /// Send one message and return the gateway's JSON response body.
    ///
    /// A non-2xx status from FCM is not an error here: its body describes
    /// the failure and is handed back to the caller unchanged.
    ///
    /// # Errors
    ///
    /// Returns `RelayError::Request` if the request fails or the response is
    /// not JSON.
    pub async fn send(
        &self,
        project_id: &str,
        access_token: &str,
        message: &FcmMessage,
    ) -> Result<serde_json::Value, RelayError> {
        let response = self
            .http
            .post(self.send_url(project_id))
            .bearer_auth(access_token)
            .json(message)
            .send()
            .await
            .map_err(|e| RelayError::Request(e.to_string()))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RelayError::Request(format!("unreadable FCM response: {e}")))?;

        if status.is_success() {
            debug!("FCM notification sent successfully");
        } else {
            warn!(status = status.as_u16(), body = %body, "FCM API returned error");
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn message_serializes_to_v1_shape() {
        let msg = FcmMessage::profile_updated("tok");
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["message"]["token"], "tok");
        assert_eq!(json["message"]["notification"]["title"], PROFILE_UPDATED_TITLE);
        assert_eq!(json["message"]["notification"]["body"], PROFILE_UPDATED_BODY);
    }

    #[test]
    fn send_url_is_per_project() {
        let client = FcmClient::new(reqwest::Client::new(), "https://fcm.googleapis.com/");
        assert_eq!(
            client.send_url("test-project-123"),
            "https://fcm.googleapis.com/v1/projects/test-project-123/messages:send"
        );
    }

    #[tokio::test]
    async fn send_posts_bearer_authenticated_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/proj/messages:send"))
            .and(header("authorization", "Bearer ya29.test"))
            .and(body_json(serde_json::to_value(FcmMessage::profile_updated("tok")).unwrap()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "projects/proj/messages/0:123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = FcmClient::new(reqwest::Client::new(), server.uri());
        let body = client
            .send("proj", "ya29.test", &FcmMessage::profile_updated("tok"))
            .await
            .unwrap();

        assert_eq!(body["name"], "projects/proj/messages/0:123");
    }

    #[tokio::test]
    async fn gateway_error_body_is_returned_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": { "status": "NOT_FOUND", "message": "Requested entity was not found." }
            })))
            .mount(&server)
            .await;

        let client = FcmClient::new(reqwest::Client::new(), server.uri());
        let body = client
            .send("proj", "ya29.test", &FcmMessage::profile_updated("stale"))
            .await
            .unwrap();

        assert_eq!(body["error"]["status"], "NOT_FOUND");
    }
}
