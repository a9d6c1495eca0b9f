//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionStore`: the shared access/refresh token pair and user name,
//!   mirrored into durable storage
//! - `DurableStorage` backends: memory, JSON file, OS keychain
//! - `TokenRefreshWatcher`: periodic check-and-refresh of the access token
//!
//! The session is created once at startup (usually via
//! `SessionStore::rehydrate`) and shared by `Arc`.

pub mod session;
pub mod storage;
pub mod watcher;

pub use session::{SessionData, SessionStore};
pub use storage::{DurableStorage, FileStorage, KeyringStorage, MemoryStorage};
pub use watcher::{refresh_if_needed, TickOutcome, TokenBackend, TokenRefreshWatcher};
