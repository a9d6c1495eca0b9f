//! Core library for the scraplook client.
//!
//! This crate holds everything a scraplook frontend needs to talk to the
//! backend on behalf of a signed-in user:
//! - `auth`: the shared `SessionStore`, its durable storage backends, and the
//!   `TokenRefreshWatcher` that keeps the access token fresh
//! - `api`: the `ApiClient`, whose every request passes through the
//!   `Authenticator`
//! - `guard`: the route guard deciding whether a destination needs a login
//! - `config`: backend URL, polling interval and storage selection
//! - `models`: wire types returned by the backend

pub mod api;
pub mod auth;
pub mod config;
pub mod guard;
pub mod models;

pub use api::{ApiClient, ApiError, Authenticator};
pub use auth::{SessionStore, TokenRefreshWatcher};
pub use config::Config;
pub use guard::{Decision, RouteGuard};
