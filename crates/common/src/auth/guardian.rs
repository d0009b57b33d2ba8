//! Session guardian with proactive refresh
//!
//! Manages the session lifecycle:
//! - Session retrieval from the session store at startup
//! - Refresh before use when the session is within the threshold of expiry
//! - Forced refresh after the backend rejects a credential
//! - Logout (clears stored and in-memory state)
//!
//! Every path that ends without a usable session broadcasts
//! [`SessionEvent::Expired`], which the presentation layer turns into a
//! re-authentication prompt.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use super::traits::{SessionRefresher, SessionStore};
use super::types::{ExpiryReason, Session, SessionEvent, DEFAULT_REFRESH_THRESHOLD_SECS};
use crate::storage::StorageResult;
use crate::time::{Clock, SystemClock};

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Guardian configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionGuardianConfig {
    /// Refresh sessions with fewer than this many seconds remaining
    pub refresh_threshold_secs: i64,
}

impl Default for SessionGuardianConfig {
    fn default() -> Self {
        Self { refresh_threshold_secs: DEFAULT_REFRESH_THRESHOLD_SECS }
    }
}

/// Keeps the current session valid for outbound calls
pub struct SessionGuardian {
    store: Arc<dyn SessionStore>,
    refresher: Arc<dyn SessionRefresher>,
    clock: Arc<dyn Clock>,
    config: SessionGuardianConfig,
    current: RwLock<Option<Session>>,
    // Serializes refreshes so concurrent callers share one refresh
    refresh_lock: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
    refresh_attempts: AtomicU64,
}

impl std::fmt::Debug for SessionGuardian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuardian")
            .field("config", &self.config)
            .field("refresh_attempts", &self.refresh_attempts.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SessionGuardian {
    /// Create a guardian on the system clock
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        refresher: Arc<dyn SessionRefresher>,
        config: SessionGuardianConfig,
    ) -> Self {
        Self::with_clock(store, refresher, config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(
        store: Arc<dyn SessionStore>,
        refresher: Arc<dyn SessionRefresher>,
        config: SessionGuardianConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            refresher,
            clock,
            config,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            events,
            refresh_attempts: AtomicU64::new(0),
        }
    }

    /// Load the persisted session into memory
    ///
    /// Returns whether a session was found. A missing session is not an
    /// error.
    pub async fn initialize(&self) -> StorageResult<bool> {
        match self.store.load().await? {
            Some(session) => {
                info!(user_id = %session.user_id, "Session guardian initialized with stored session");
                *self.current.write().await = Some(session);
                Ok(true)
            }
            None => {
                debug!("No stored session found");
                Ok(false)
            }
        }
    }

    /// Subscribe to session lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current session without any refresh
    pub async fn current_session(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    /// Number of refresh attempts made so far
    pub fn refresh_attempts(&self) -> u64 {
        self.refresh_attempts.load(Ordering::Relaxed)
    }

    /// Persist and adopt a session (after sign-in)
    pub async fn store_session(&self, session: Session) -> StorageResult<()> {
        self.store.save(&session).await?;
        info!(user_id = %session.user_id, expires_at = session.expires_at, "Session stored");
        *self.current.write().await = Some(session);
        Ok(())
    }

    /// Return a session that is valid for at least the refresh threshold
    ///
    /// Refreshes first when the session is near expiry. Returns `None` (and
    /// broadcasts [`SessionEvent::Expired`]) when there is no session or the
    /// refresh fails.
    #[instrument(skip(self))]
    pub async fn get_valid_session(&self) -> Option<Session> {
        let Some(session) = self.current_session().await else {
            self.signal_expired(ExpiryReason::NoSession);
            return None;
        };

        if !self.needs_refresh(&session) {
            return Some(session);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        let Some(session) = self.current_session().await else {
            self.signal_expired(ExpiryReason::NoSession);
            return None;
        };
        if !self.needs_refresh(&session) {
            return Some(session);
        }

        debug!(
            seconds_left = session.seconds_until_expiry(self.clock.unix_seconds()),
            "Session near expiry, refreshing"
        );
        self.refresh_locked(&session).await
    }

    /// Refresh after the backend rejected `rejected_token`, whatever the
    /// remaining lifetime
    ///
    /// When the held session already carries a different access token,
    /// another caller refreshed while this one waited, and that session is
    /// returned as is.
    #[instrument(skip_all)]
    pub async fn force_refresh(&self, rejected_token: &str) -> Option<Session> {
        let _guard = self.refresh_lock.lock().await;
        let Some(session) = self.current_session().await else {
            self.signal_expired(ExpiryReason::NoSession);
            return None;
        };
        if session.access_token != rejected_token {
            debug!("Credential already rotated by a concurrent refresh");
            return Some(session);
        }
        self.refresh_locked(&session).await
    }

    /// Clear the session from storage and memory
    pub async fn logout(&self) -> StorageResult<()> {
        self.store.clear().await?;
        *self.current.write().await = None;
        let _ = self.events.send(SessionEvent::LoggedOut);
        info!("Session cleared (logged out)");
        Ok(())
    }

    fn needs_refresh(&self, session: &Session) -> bool {
        session.is_near_expiry(self.clock.unix_seconds(), self.config.refresh_threshold_secs)
    }

    async fn refresh_locked(&self, session: &Session) -> Option<Session> {
        if session.refresh_token.is_none() {
            warn!(user_id = %session.user_id, "Session has no refresh token");
            self.signal_expired(ExpiryReason::NoRefreshToken);
            return None;
        }

        self.refresh_attempts.fetch_add(1, Ordering::Relaxed);
        match self.refresher.refresh(session).await {
            Ok(refreshed) => {
                if let Err(e) = self.store.save(&refreshed).await {
                    warn!(error = %e, "Refreshed session could not be persisted");
                }
                *self.current.write().await = Some(refreshed.clone());
                info!(
                    user_id = %refreshed.user_id,
                    expires_at = refreshed.expires_at,
                    "Session refreshed"
                );
                let _ = self.events.send(SessionEvent::Refreshed {
                    user_id: refreshed.user_id.clone(),
                    expires_at: refreshed.expires_at,
                });
                Some(refreshed)
            }
            Err(e) => {
                warn!(error = %e, "Session refresh failed");
                self.signal_expired(ExpiryReason::RefreshFailed);
                None
            }
        }
    }

    fn signal_expired(&self, reason: ExpiryReason) {
        debug!(%reason, "Signalling session expiry");
        let _ = self.events.send(SessionEvent::Expired { reason });
    }
}
