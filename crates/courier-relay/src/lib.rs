//! Notification relay.
//!
//! Receives the row-change payload for a profile write, and when the row
//! carries a device token, exchanges the service account credentials for an
//! access token and sends one notification through the FCM HTTP v1 API.
//!
//! Every invocation is independent: no retries, no deduplication, no state
//! shared between requests beyond the HTTP client.

pub mod config;
pub mod error;
pub mod fcm;
pub mod handler;
pub mod oauth;

pub use config::{Endpoints, EnvSecrets, FcmSecrets, SecretSource};
pub use error::RelayError;
pub use handler::{RelayState, router};
