//! Background refresh of the access token.
//!
//! The watcher asks the backend, at a fixed interval, whether the current
//! access token should be renewed and exchanges the refresh token for a new
//! one when it should. A failed tick is logged and the next one runs on
//! schedule.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::SessionStore;
use crate::api::ApiError;

/// Shortest polling interval accepted; `tokio::time::interval` rejects zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// The two backend calls a tick needs.
#[async_trait]
pub trait TokenBackend: Send + Sync + 'static {
    /// Whether `access_token` should be renewed now.
    async fn check_refresh_access_token(&self, access_token: &str) -> Result<bool, ApiError>;

    /// A new access token issued against `refresh_token`.
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No access token in the session
    Skipped,
    /// The backend reported the token does not need renewal yet
    Fresh,
    /// A new access token was saved
    Refreshed,
}

/// Run one check-and-maybe-refresh against the session's current tokens.
pub async fn refresh_if_needed<B>(session: &SessionStore, backend: &B) -> Result<TickOutcome, ApiError>
where
    B: TokenBackend + ?Sized,
{
    let Some(access_token) = session.access_token() else {
        return Ok(TickOutcome::Skipped);
    };

    if !backend.check_refresh_access_token(&access_token).await? {
        return Ok(TickOutcome::Fresh);
    }

    let refresh_token = session
        .refresh_token()
        .ok_or(ApiError::MissingRefreshToken)?;
    let new_access_token = backend.refresh_access_token(&refresh_token).await?;
    session.save_access_token(&new_access_token);
    info!(user = %session.user_name(), "Access token refreshed");
    Ok(TickOutcome::Refreshed)
}

/// Owns the polling timer. At most one timer task exists per watcher; it is
/// aborted on `stop()` and when the watcher is dropped.
///
/// Stopping also cancels a tick that is waiting on the backend. Nothing is
/// lost by that: the refresh endpoint does not rotate the refresh token.
pub struct TokenRefreshWatcher<B: TokenBackend> {
    session: Arc<SessionStore>,
    backend: Arc<B>,
    interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl<B: TokenBackend> TokenRefreshWatcher<B> {
    pub fn new(session: Arc<SessionStore>, backend: Arc<B>, interval: Duration) -> Self {
        Self {
            session,
            backend,
            interval: interval.max(MIN_INTERVAL),
            handle: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Arm the timer. The first tick fires one interval from now. Does
    /// nothing if the timer is already armed.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self) {
        if self.is_running() {
            debug!("Token refresh watcher already running");
            return;
        }

        let session = Arc::clone(&self.session);
        let backend = Arc::clone(&self.backend);
        let period = self.interval;
        let first_tick = Instant::now() + period;

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                match refresh_if_needed(&session, backend.as_ref()).await {
                    Ok(outcome) => debug!(?outcome, "Token check complete"),
                    Err(e) => warn!(error = %e, "Token check failed"),
                }
            }
        }));
        info!(interval_ms = period.as_millis() as u64, "Token refresh watcher started");
    }

    /// Disarm the timer. Does nothing if it is not armed.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            info!("Token refresh watcher stopped");
        }
    }
}

impl<B: TokenBackend> Drop for TokenRefreshWatcher<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
