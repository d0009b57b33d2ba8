//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for SuperApp
///
/// Serializable so it can be handed to the presentation layer as-is; each
/// variant maps to one user-visible consequence (badge, toast or redirect).
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum SuperAppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(String),

    /// The backend rejected the credential after the allowed retries
    #[error("Authentication error: {0}")]
    Auth(String),

    /// No valid session, re-authentication required
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Calls are short-circuited until the cooldown passes or a manual reset
    #[error("Service unavailable: {0}")]
    CircuitOpen(String),

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SuperAppError {
    /// Whether the user must sign in again
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::SessionExpired(_) | Self::Auth(_))
    }
}

/// Result type alias for SuperApp operations
pub type Result<T> = std::result::Result<T, SuperAppError>;
