//! Types shared by the courier backend, relay and app core.

pub mod api;
pub mod events;
pub mod models;
