use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};

use super::storage::DurableStorage;

/// Storage key holding the access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Storage key holding the refresh token
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Storage key holding the display name of the signed-in user
pub const USER_NAME_KEY: &str = "user_name";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionData {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user_name: String,
}

impl SessionData {
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }
}

/// The single source of truth for authentication state.
///
/// One instance is built at startup and shared by `Arc` with the request
/// authenticator, the refresh watcher and any UI code. Every mutation is
/// written through to durable storage before it returns. Storage failures are
/// logged and never surface: the in-memory state stays authoritative.
pub struct SessionStore {
    data: RwLock<SessionData>,
    storage: Box<dyn DurableStorage>,
}

impl SessionStore {
    /// Create an empty session over the given storage, ignoring whatever the
    /// storage already holds.
    pub fn new(storage: Box<dyn DurableStorage>) -> Self {
        Self {
            data: RwLock::new(SessionData::default()),
            storage,
        }
    }

    /// Create a session populated from the storage's current contents.
    pub fn rehydrate(storage: Box<dyn DurableStorage>) -> Self {
        let data = SessionData {
            access_token: storage.get(ACCESS_TOKEN_KEY),
            refresh_token: storage.get(REFRESH_TOKEN_KEY),
            user_name: storage.get(USER_NAME_KEY).unwrap_or_default(),
        };
        debug!(
            authenticated = data.is_authenticated(),
            has_refresh_token = data.refresh_token.is_some(),
            "Session rehydrated from storage"
        );
        Self {
            data: RwLock::new(data),
            storage,
        }
    }

    /// Replace the whole session with a freshly issued token pair.
    pub fn login(&self, access_token: &str, refresh_token: &str, user_name: &str) {
        {
            let mut data = self.write();
            data.access_token = Some(access_token.to_string());
            data.refresh_token = Some(refresh_token.to_string());
            data.user_name = user_name.to_string();
        }
        self.persist(ACCESS_TOKEN_KEY, access_token);
        self.persist(REFRESH_TOKEN_KEY, refresh_token);
        self.persist(USER_NAME_KEY, user_name);
        info!(user = user_name, "Logged in");
    }

    /// Clear the session and its storage entries. Safe to call when already
    /// logged out.
    pub fn logout(&self) {
        *self.write() = SessionData::default();
        self.erase(ACCESS_TOKEN_KEY);
        self.erase(REFRESH_TOKEN_KEY);
        self.erase(USER_NAME_KEY);
        info!("Logged out");
    }

    /// Replace the access token only, leaving refresh token and user name as
    /// they were.
    pub fn save_access_token(&self, access_token: &str) {
        self.write().access_token = Some(access_token.to_string());
        // Remove first so a failed set never leaves the previous token behind
        self.erase(ACCESS_TOKEN_KEY);
        self.persist(ACCESS_TOKEN_KEY, access_token);
        debug!("Access token replaced");
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_authenticated()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token.clone()
    }

    pub fn user_name(&self) -> String {
        self.read().user_name.clone()
    }

    pub fn snapshot(&self) -> SessionData {
        self.read().clone()
    }

    fn persist(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set(key, value) {
            warn!(key, error = %e, "Failed to persist session value");
        }
    }

    fn erase(&self, key: &str) {
        if let Err(e) = self.storage.remove(key) {
            warn!(key, error = %e, "Failed to remove session value");
        }
    }

    // A poisoned lock still holds a consistent value: every write is a plain
    // field assignment.
    fn read(&self) -> RwLockReadGuard<'_, SessionData> {
        self.data.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionData> {
        self.data.write().unwrap_or_else(|e| e.into_inner())
    }
}
