/// Failure talking to the backend or to local session storage.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// The backend answered and refused. `message` is shown to the user as-is.
    #[error("{message}")]
    Backend { status: u16, message: String },

    /// The request never got an answer.
    #[error("Network request failed: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session storage error: {0}")]
    Storage(String),
}

impl ClientError {
    /// True when the backend explicitly rejected the request (4xx), as
    /// opposed to being unreachable or failing internally.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Backend { status, .. } if (400..500).contains(status))
    }
}

/// Failure of the profile update flow.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpdateError {
    /// Rejected locally; no request was made.
    #[error("{0}")]
    Validation(&'static str),

    #[error("You must be signed in to update your profile")]
    NotAuthenticated,

    /// Backend or network failure, surfaced verbatim.
    #[error(transparent)]
    Backend(#[from] ClientError),
}

/// A user-facing alert: title plus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Failure of the login or register flow.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FlowError {
    /// Rejected locally; no request was made.
    #[error("{0}")]
    Validation(&'static str),

    #[error("{0}")]
    LoginFailed(ClientError),

    #[error("{0}")]
    RegistrationFailed(ClientError),
}

impl FlowError {
    /// The alert the form shows for this failure.
    pub fn alert(&self) -> Alert {
        let title = match self {
            Self::Validation(_) => "Error",
            Self::LoginFailed(_) => "Login Failed",
            Self::RegistrationFailed(_) => "Registration Failed",
        };
        Alert::new(title, self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_message_is_shown_verbatim() {
        let err = FlowError::LoginFailed(ClientError::Backend {
            status: 400,
            message: "Invalid login credentials".into(),
        });
        assert_eq!(err.alert(), Alert::new("Login Failed", "Invalid login credentials"));
    }

    #[test]
    fn only_4xx_is_a_rejection() {
        let rejected = ClientError::Backend { status: 400, message: String::new() };
        let broken = ClientError::Backend { status: 502, message: String::new() };

        assert!(rejected.is_rejection());
        assert!(!broken.is_rejection());
        assert!(!ClientError::Network("timeout".into()).is_rejection());
    }
}
