//! Device push token registration.
//!
//! The OS side (permissions, device identity, token issuance) lives behind
//! [`PushPlatform`]; this module only sequences it.

use async_trait::async_trait;
use tracing::{debug, info, warn};

/// How the app binary is being run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionEnvironment {
    /// Installed as a standalone release build.
    Standalone,
    /// Hosted inside a shared sandbox client, which cannot receive remote
    /// pushes.
    StoreClient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("Push platform error: {0}")]
pub struct PushError(pub String);

/// How a notification arriving while the app is in the foreground is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForegroundPresentation {
    pub show_alert: bool,
    pub play_sound: bool,
    pub set_badge: bool,
    pub show_banner: bool,
    pub show_in_list: bool,
}

impl Default for ForegroundPresentation {
    fn default() -> Self {
        Self {
            show_alert: true,
            play_sound: true,
            set_badge: false,
            show_banner: true,
            show_in_list: true,
        }
    }
}

#[async_trait]
pub trait PushPlatform: Send + Sync {
    fn execution_environment(&self) -> ExecutionEnvironment;
    fn is_physical_device(&self) -> bool;
    async fn permission_status(&self) -> PermissionStatus;
    /// Prompt the user. Returns the status they left it in.
    async fn request_permission(&self) -> PermissionStatus;
    /// The native (FCM) device token.
    async fn device_push_token(&self) -> Result<String, PushError>;

    fn set_foreground_presentation(&self, _presentation: ForegroundPresentation) {}
}

/// Why no token was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skipped {
    SandboxClient,
    NotPhysicalDevice,
    PermissionDenied,
    Token(String),
}

pub async fn try_register_for_push(platform: &dyn PushPlatform) -> Result<String, Skipped> {
    if platform.execution_environment() == ExecutionEnvironment::StoreClient {
        return Err(Skipped::SandboxClient);
    }
    if !platform.is_physical_device() {
        return Err(Skipped::NotPhysicalDevice);
    }

    let mut status = platform.permission_status().await;
    if status != PermissionStatus::Granted {
        status = platform.request_permission().await;
    }
    if status != PermissionStatus::Granted {
        return Err(Skipped::PermissionDenied);
    }

    platform
        .device_push_token()
        .await
        .map_err(|e| Skipped::Token(e.0))
}

/// Obtain this device's push token, or `None` when it cannot have one.
/// Never fails; every skip is logged.
pub async fn register_for_push(platform: &dyn PushPlatform) -> Option<String> {
    match try_register_for_push(platform).await {
        Ok(token) => {
            info!("Obtained native device push token");
            debug!(%token, "Device token");
            Some(token)
        }
        Err(Skipped::SandboxClient) => {
            warn!("Push notifications are not supported in the sandbox client; use a development build");
            None
        }
        Err(Skipped::NotPhysicalDevice) => {
            info!("Must use a physical device for push notifications");
            None
        }
        Err(Skipped::PermissionDenied) => {
            info!("Permission not granted for push notifications");
            None
        }
        Err(Skipped::Token(e)) => {
            warn!("Error getting device token: {}", e);
            None
        }
    }
}
