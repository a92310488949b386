//! The app core against a live development backend, with the backend's
//! profile trigger wired to a live relay and the relay's upstreams mocked.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use courier_api::auth::{AppState, AppStateInner};
use courier_api::trigger::Trigger;
use courier_client::auth_flow::RegisterOutcome;
use courier_client::guard::{Navigator, Route, RouteGroup};
use courier_client::push::{ExecutionEnvironment, PermissionStatus, PushError, PushPlatform};
use courier_client::session::MemorySessionStorage;
use courier_client::{App, BackendClient};
use courier_db::Database;
use courier_relay::config::{CLIENT_EMAIL_VAR, PRIVATE_KEY_VAR, PROJECT_ID_VAR};
use courier_relay::{Endpoints, RelayState};
use courier_types::events::RowChangeKind;

const ANON: &str = "anon-key";
const PRIVATE_KEY: &str = include_str!("../../courier-relay/tests/fixtures/service_account_key.pem");

async fn serve(app: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

async fn start_backend(require_email_confirmation: bool, webhook_url: Option<String>) -> (String, AppState) {
    let state: AppState = Arc::new(AppStateInner {
        db: Arc::new(Database::open_in_memory().unwrap()),
        jwt_secret: "e2e-secret".into(),
        anon_key: ANON.into(),
        access_token_ttl: chrono::Duration::hours(1),
        require_email_confirmation,
        trigger: Trigger::new(webhook_url),
    });
    let addr = serve(courier_api::router(state.clone())).await;
    (format!("http://{}", addr), state)
}

async fn start_relay(upstream: &MockServer) -> String {
    let secrets = HashMap::from([
        (CLIENT_EMAIL_VAR.to_string(), "relay@proj.iam.gserviceaccount.com".to_string()),
        (PRIVATE_KEY_VAR.to_string(), PRIVATE_KEY.replace('\n', "\\n")),
        (PROJECT_ID_VAR.to_string(), "proj".to_string()),
    ]);
    let endpoints = Endpoints {
        token_uri: format!("{}/token", upstream.uri()),
        fcm_api_base: upstream.uri(),
    };
    let addr = serve(courier_relay::router(RelayState::new(Arc::new(secrets), endpoints))).await;
    format!("http://{}/", addr)
}

struct RecordingNavigator {
    current: Mutex<Route>,
    history: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    fn at(route: Route) -> Arc<Self> {
        Arc::new(Self {
            current: Mutex::new(route),
            history: Mutex::new(Vec::new()),
        })
    }

    fn history(&self) -> Vec<Route> {
        self.history.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn current_group(&self) -> RouteGroup {
        self.current.lock().unwrap().group()
    }

    fn replace(&self, route: Route) {
        *self.current.lock().unwrap() = route;
        self.history.lock().unwrap().push(route);
    }
}

/// A physical device with notifications already allowed.
struct Device(&'static str);

#[async_trait]
impl PushPlatform for Device {
    fn execution_environment(&self) -> ExecutionEnvironment {
        ExecutionEnvironment::Standalone
    }

    fn is_physical_device(&self) -> bool {
        true
    }

    async fn permission_status(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    async fn request_permission(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    async fn device_push_token(&self) -> Result<String, PushError> {
        Ok(self.0.to_string())
    }
}

fn app(base_url: &str, nav: Arc<RecordingNavigator>, token: &'static str) -> App {
    let backend = Arc::new(BackendClient::with_http(reqwest_client(), base_url, ANON));
    App::new(
        backend.clone(),
        backend,
        Arc::new(MemorySessionStorage::default()),
        nav,
        Arc::new(Device(token)),
    )
}

fn reqwest_client() -> reqwest::Client {
    reqwest::Client::builder().timeout(Duration::from_secs(5)).build().unwrap()
}

#[tokio::test]
async fn profile_update_reaches_the_push_gateway() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.e2e",
            "expires_in": 3599
        })))
        .mount(&upstream)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/projects/proj/messages:send"))
        .and(header("authorization", "Bearer ya29.e2e"))
        .and(body_partial_json(json!({
            "message": {
                "token": "device-token",
                "notification": { "title": "Profile Updated ✅" }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "projects/proj/messages/1" })))
        .mount(&upstream)
        .await;

    let relay_url = start_relay(&upstream).await;
    let (base_url, _) = start_backend(false, Some(relay_url)).await;
    let nav = RecordingNavigator::at(Route::Register);
    let app = app(&base_url, nav.clone(), "device-token");

    let running = app.launch();
    let outcome = app.auth.register("ada@example.com", "hunter22", "hunter22").await.unwrap();
    let RegisterOutcome::SignedIn(session) = outcome else {
        panic!("expected a session");
    };
    running.push.await.unwrap();

    app.profile.update_profile(session.user_id(), "  ada ").await.unwrap();

    // The trigger and relay run detached from the update; poll for delivery.
    let delivered = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let sent = upstream
                .received_requests()
                .await
                .unwrap()
                .iter()
                .filter(|r| r.url.path() == "/v1/projects/proj/messages:send")
                .count();
            if sent > 0 {
                break sent;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(delivered.is_ok(), "no notification reached the gateway");

    let profile = app.profile.load_profile(session.user_id()).await.unwrap().unwrap();
    assert_eq!(profile.username.as_deref(), Some("ada"));
    assert_eq!(profile.fcm_token.as_deref(), Some("device-token"));
    assert!(nav.history().contains(&Route::Home));

    running.guard.abort();
    running.auto_refresh.abort();
}

#[tokio::test]
async fn concurrent_username_and_token_writes_both_persist() {
    let (base_url, state) = start_backend(false, None).await;
    let nav = RecordingNavigator::at(Route::Login);
    let app = app(&base_url, nav, "device-token");
    let mut changes = state.trigger.subscribe();

    let outcome = app.auth.register("grace@example.com", "hunter22", "hunter22").await.unwrap();
    let RegisterOutcome::SignedIn(session) = outcome else {
        panic!("expected a session");
    };
    let id = session.user_id();

    for round in 0..10 {
        let name = format!("grace-{round}");
        let token = format!("token-{round}");
        let (a, b) = tokio::join!(
            app.profile.update_profile(id, &name),
            app.profile.store_push_token(id, &token),
        );
        a.unwrap();
        b.unwrap();

        let profile = app.profile.load_profile(id).await.unwrap().unwrap();
        assert_eq!(profile.username, Some(name));
        assert_eq!(profile.fcm_token, Some(token));
    }

    let first = changes.recv().await.unwrap();
    assert_eq!(first.kind, RowChangeKind::Insert);
    assert_eq!(first.table, "profiles");
}

#[tokio::test]
async fn sign_up_awaiting_confirmation_routes_to_login() {
    let (base_url, _) = start_backend(true, None).await;
    let nav = RecordingNavigator::at(Route::Register);
    let app = app(&base_url, nav.clone(), "device-token");

    let outcome = app.auth.register("alan@example.com", "hunter22", "hunter22").await.unwrap();

    match outcome {
        RegisterOutcome::ConfirmEmail(alert) => assert_eq!(alert.title, "Check Your Email!"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(nav.history(), vec![Route::Login]);
    assert!(app.store.current().is_none());

    let err = app.auth.login("alan@example.com", "hunter22").await.unwrap_err();
    assert_eq!(err.alert().title, "Login Failed");
    assert_eq!(err.to_string(), "Email not confirmed");
}

#[tokio::test]
async fn relay_ignores_rows_without_a_token() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;
    let relay_url = start_relay(&upstream).await;

    let response = reqwest_client()
        .post(&relay_url)
        .json(&json!({ "record": { "id": "x", "username": "ada" } }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "message": "No FCM token found" }));
    upstream.verify().await;
}
