/// Errors that end a single relay invocation with a 500 response.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The request body was not `{ "record": { ... } }`.
    #[error("Invalid request body: {0}")]
    BadPayload(String),

    /// One or more push credential secrets are unset.
    #[error("Missing FCM configuration secrets: {}", .0.join(", "))]
    MissingConfig(Vec<&'static str>),

    /// The private key could not be used to sign the assertion.
    #[error("FCM credentials error: {0}")]
    Credentials(String),

    /// The identity provider refused or failed the token exchange.
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// HTTP request to the FCM API failed.
    #[error("FCM request error: {0}")]
    Request(String),
}
