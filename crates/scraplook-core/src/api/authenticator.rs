use std::sync::Arc;

use reqwest::header::{self, HeaderValue};
use reqwest::Request;

use super::ApiError;
use crate::auth::SessionStore;

/// Outbound-request interceptor attaching the session's bearer credential.
///
/// The token is read from the session when `apply` runs, so a request built
/// before a refresh still goes out with the refreshed token.
#[derive(Clone)]
pub struct Authenticator {
    session: Arc<SessionStore>,
}

impl Authenticator {
    pub fn new(session: Arc<SessionStore>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Attach `Authorization: Bearer <access token>` when the session is
    /// authenticated. Unauthenticated requests are left untouched.
    pub fn apply(&self, request: &mut Request) -> Result<(), ApiError> {
        match self.session.access_token() {
            Some(token) => Self::set_bearer(request, &token),
            None => Ok(()),
        }
    }

    pub fn set_bearer(request: &mut Request, token: &str) -> Result<(), ApiError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token))?;
        value.set_sensitive(true);
        request.headers_mut().insert(header::AUTHORIZATION, value);
        Ok(())
    }
}
