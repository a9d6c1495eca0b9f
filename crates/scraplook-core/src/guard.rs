//! Route guard deciding whether a destination may be entered.
//!
//! Every destination outside the public set requires an authenticated
//! session; anything else is redirected to the login path.

use crate::auth::SessionStore;

/// Default path of the login view
pub const LOGIN_PATH: &str = "/login";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    RedirectTo(String),
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    login_path: String,
    public_paths: Vec<String>,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new(LOGIN_PATH)
    }
}

impl RouteGuard {
    /// A guard whose only public destination is `login_path`.
    pub fn new(login_path: &str) -> Self {
        Self {
            login_path: login_path.to_string(),
            public_paths: vec![login_path.to_string()],
        }
    }

    /// Mark another destination as reachable without a session.
    pub fn with_public_path(mut self, path: &str) -> Self {
        self.public_paths.push(path.to_string());
        self
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn is_public(&self, destination: &str) -> bool {
        let path = Self::strip_query(destination);
        self.public_paths
            .iter()
            .any(|p| Self::normalize(p) == Self::normalize(path))
    }

    pub fn guard(&self, destination: &str, authenticated: bool) -> Decision {
        if authenticated || self.is_public(destination) {
            Decision::Allow
        } else {
            Decision::RedirectTo(self.login_path.clone())
        }
    }

    /// `guard` against the session's current status.
    pub fn guard_session(&self, destination: &str, session: &SessionStore) -> Decision {
        self.guard(destination, session.is_authenticated())
    }

    fn strip_query(destination: &str) -> &str {
        destination
            .split(['?', '#'])
            .next()
            .unwrap_or(destination)
    }

    fn normalize(path: &str) -> &str {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            "/"
        } else {
            trimmed
        }
    }
}
