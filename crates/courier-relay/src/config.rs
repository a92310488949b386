use std::collections::HashMap;

use crate::error::RelayError;

pub const CLIENT_EMAIL_VAR: &str = "FCM_CLIENT_EMAIL";
pub const PRIVATE_KEY_VAR: &str = "FCM_PRIVATE_KEY";
pub const PROJECT_ID_VAR: &str = "FCM_PROJECT_ID";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_FCM_API_BASE: &str = "https://fcm.googleapis.com";

/// Where secrets come from. Read on every invocation, never cached.
pub trait SecretSource: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

/// Secrets from the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvSecrets;

impl SecretSource for EnvSecrets {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl SecretSource for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}

/// Service account credentials for one invocation.
#[derive(Debug, Clone)]
pub struct FcmSecrets {
    pub client_email: String,
    /// PEM, with escaped `\n` sequences already turned into newlines.
    pub private_key: String,
    pub project_id: String,
}

impl FcmSecrets {
    /// Read all three secrets. Empty values count as missing, and the error
    /// names every missing one.
    pub fn load(source: &dyn SecretSource) -> Result<Self, RelayError> {
        let read = |name: &str| source.get(name).filter(|v| !v.trim().is_empty());

        let client_email = read(CLIENT_EMAIL_VAR);
        let private_key = read(PRIVATE_KEY_VAR);
        let project_id = read(PROJECT_ID_VAR);

        match (client_email, private_key, project_id) {
            (Some(client_email), Some(private_key), Some(project_id)) => Ok(Self {
                client_email,
                private_key: private_key.replace("\\n", "\n"),
                project_id,
            }),
            (client_email, private_key, project_id) => {
                let missing = [
                    (CLIENT_EMAIL_VAR, client_email.is_none()),
                    (PRIVATE_KEY_VAR, private_key.is_none()),
                    (PROJECT_ID_VAR, project_id.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, missing)| missing.then_some(name))
                .collect();
                Err(RelayError::MissingConfig(missing))
            }
        }
    }
}

/// Upstream endpoints. Overridable so a staging relay can point at fakes.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub token_uri: String,
    pub fcm_api_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            fcm_api_base: DEFAULT_FCM_API_BASE.to_string(),
        }
    }
}

impl Endpoints {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            token_uri: std::env::var("FCM_TOKEN_URI").unwrap_or(defaults.token_uri),
            fcm_api_base: std::env::var("FCM_API_BASE").unwrap_or(defaults.fcm_api_base),
        }
    }
}
