//! Session and session event types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default seconds-before-expiry at which a session is refreshed
pub const DEFAULT_REFRESH_THRESHOLD_SECS: i64 = 300;

/// Authenticated session issued by the backend's auth service
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer credential
    pub access_token: String,

    /// Credential used to obtain a new access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Expiry as seconds since the UNIX epoch
    pub expires_at: i64,

    pub user_id: String,
}

impl Session {
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: i64,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at,
            user_id: user_id.into(),
        }
    }

    /// Remaining lifetime in seconds (negative once expired)
    #[must_use]
    pub fn seconds_until_expiry(&self, now_unix: i64) -> i64 {
        self.expires_at - now_unix
    }

    /// Whether the remaining lifetime is below `threshold_secs`
    #[must_use]
    pub fn is_near_expiry(&self, now_unix: i64, threshold_secs: i64) -> bool {
        self.seconds_until_expiry(now_unix) < threshold_secs
    }

    #[must_use]
    pub fn is_expired(&self, now_unix: i64) -> bool {
        self.seconds_until_expiry(now_unix) <= 0
    }
}

// Tokens stay out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Session lifecycle notifications for the presentation layer
///
/// `Expired` is the re-authentication prompt: the user has to sign in
/// again before authenticated calls can proceed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Refreshed { user_id: String, expires_at: i64 },
    Expired { reason: ExpiryReason },
    LoggedOut,
}

/// Why the guardian could not produce a valid session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryReason {
    /// No session was stored
    NoSession,
    /// The session carries no refresh token
    NoRefreshToken,
    /// The auth service rejected or failed the refresh
    RefreshFailed,
}

impl fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSession => write!(f, "no session"),
            Self::NoRefreshToken => write!(f, "no refresh token"),
            Self::RefreshFailed => write!(f, "refresh failed"),
        }
    }
}
