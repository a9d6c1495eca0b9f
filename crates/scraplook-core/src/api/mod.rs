//! REST API client module for the scraplook backend.
//!
//! Every request built by `ApiClient` passes through the `Authenticator`,
//! which attaches the session's current access token as a bearer credential.
//! The token check and refresh calls used by the refresh watcher carry their
//! token explicitly instead.

pub mod authenticator;
pub mod client;
pub mod error;

pub use authenticator::Authenticator;
pub use client::ApiClient;
pub use error::ApiError;
