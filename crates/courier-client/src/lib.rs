//! App core for the courier mobile client.
//!
//! Everything the screens need apart from rendering: the backend client,
//! the session store, the navigation guard, the auth and profile flows, and
//! push token registration. Platform services come in through the
//! [`guard::Navigator`] and [`push::PushPlatform`] traits.

pub mod app;
pub mod auth_flow;
pub mod backend;
pub mod config;
pub mod error;
pub mod guard;
pub mod profile;
pub mod push;
pub mod session;

pub use app::App;
pub use backend::{AuthBackend, BackendClient, ProfileBackend};
pub use config::ClientConfig;
pub use error::{Alert, ClientError, FlowError, UpdateError};
pub use session::SessionStore;
