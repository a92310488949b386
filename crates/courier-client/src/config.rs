use std::path::PathBuf;

use crate::error::ClientError;

/// Connection settings for the hosted backend.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub backend_url: String,
    /// The project's public key, sent as `apikey` on every request.
    pub anon_key: String,
    /// Where the session is persisted between launches. In-memory when unset.
    pub session_path: Option<PathBuf>,
}

impl ClientConfig {
    /// Read settings from the environment, loading `.env` if present.
    /// Missing values are an error, never silently defaulted.
    pub fn from_env() -> Result<Self, ClientError> {
        let _ = dotenvy::dotenv();

        let required = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ClientError::Config(format!("{} is not set", name)))
        };

        Ok(Self {
            backend_url: required("COURIER_BACKEND_URL")?,
            anon_key: required("COURIER_BACKEND_ANON_KEY")?,
            session_path: std::env::var_os("COURIER_SESSION_PATH").map(PathBuf::from),
        })
    }
}
