//! Login, register and logout as the forms drive them.

use std::sync::Arc;

use tracing::info;

use courier_types::models::Session;

use crate::error::{Alert, FlowError};
use crate::guard::{Navigator, Route};
use crate::session::SessionStore;

pub const MIN_PASSWORD_LEN: usize = 6;

const FILL_ALL_FIELDS: &str = "Please fill in all fields";
const PASSWORD_TOO_SHORT: &str = "Password must be at least 6 characters";
const PASSWORDS_DIFFER: &str = "Passwords do not match";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    SignedIn(Session),
    /// The account exists but the email address must be confirmed before a
    /// session is issued.
    ConfirmEmail(Alert),
}

pub fn validate_login(email: &str, password: &str) -> Result<(), FlowError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(FlowError::Validation(FILL_ALL_FIELDS));
    }
    Ok(())
}

pub fn validate_register(email: &str, password: &str, confirm: &str) -> Result<(), FlowError> {
    if email.trim().is_empty() || password.is_empty() || confirm.is_empty() {
        return Err(FlowError::Validation(FILL_ALL_FIELDS));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(FlowError::Validation(PASSWORD_TOO_SHORT));
    }
    if password != confirm {
        return Err(FlowError::Validation(PASSWORDS_DIFFER));
    }
    Ok(())
}

pub struct AuthFlows {
    store: SessionStore,
    navigator: Arc<dyn Navigator>,
}

impl AuthFlows {
    pub fn new(store: SessionStore, navigator: Arc<dyn Navigator>) -> Self {
        Self { store, navigator }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, FlowError> {
        validate_login(email, password)?;

        let session = self
            .store
            .sign_in(email.trim(), password)
            .await
            .map_err(FlowError::LoginFailed)?;

        self.navigator.replace(Route::Home);
        Ok(session)
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        confirm: &str,
    ) -> Result<RegisterOutcome, FlowError> {
        validate_register(email, password, confirm)?;

        let session = self
            .store
            .sign_up(email.trim(), password)
            .await
            .map_err(FlowError::RegistrationFailed)?;

        match session {
            Some(session) => {
                self.navigator.replace(Route::Home);
                Ok(RegisterOutcome::SignedIn(session))
            }
            None => {
                info!("Registration pending email confirmation");
                self.navigator.replace(Route::Login);
                Ok(RegisterOutcome::ConfirmEmail(Alert::new(
                    "Check Your Email!",
                    "We sent a confirmation link to your email. Please verify to continue.",
                )))
            }
        }
    }

    pub async fn logout(&self) {
        self.store.sign_out().await;
        self.navigator.replace(Route::Login);
    }
}
