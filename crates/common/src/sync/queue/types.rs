use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CommonError, CommonResult};

/// Storage key of the persisted mutation log
pub const DEFAULT_QUEUE_KEY: &str = "superapp:offline_queue";

/// Default age after which a never-replayed mutation is discarded
pub const DEFAULT_ENTRY_TTL: Duration = Duration::from_secs(24 * 3600);

/// Current on-disk format of [`QueueLog`]
pub const QUEUE_LOG_VERSION: u32 = 1;

/// Mutation status in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    Pending,
    Syncing,
    Done,
    Failed,
}

impl fmt::Display for MutationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Syncing => write!(f, "syncing"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A mutation captured while offline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedMutation {
    /// Sequence number; replay order is ascending id
    pub id: u64,
    /// Sent with every replay so the backend can drop duplicates
    pub idempotency_key: String,
    /// Backend function to invoke
    pub operation: String,
    pub payload: serde_json::Value,
    pub status: MutationStatus,
    /// Partition the mutation belongs to (for example the current
    /// restaurant of a cart); `None` means valid in every context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_key: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl QueuedMutation {
    pub fn new(
        id: u64,
        operation: impl Into<String>,
        payload: serde_json::Value,
        context_key: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            idempotency_key: Uuid::new_v4().to_string(),
            operation: operation.into(),
            payload,
            status: MutationStatus::Pending,
            context_key,
            created_at,
            attempts: 0,
            last_error: None,
            last_attempt_at: None,
        }
    }

    /// Whether the mutation is older than `ttl` at `now`
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now.signed_duration_since(self.created_at) >= ttl,
            Err(_) => false,
        }
    }

    /// Whether a sync pass should attempt this mutation
    pub fn is_replayable(&self) -> bool {
        matches!(self.status, MutationStatus::Pending | MutationStatus::Failed)
    }

    pub(crate) fn mark_syncing(&mut self, now: DateTime<Utc>) {
        self.status = MutationStatus::Syncing;
        self.attempts = self.attempts.saturating_add(1);
        self.last_attempt_at = Some(now);
    }

    pub(crate) fn mark_failed(&mut self, error: String) {
        self.status = MutationStatus::Failed;
        self.last_error = Some(error);
    }
}

/// Append-only mutation log persisted under one storage key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueLog {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Next sequence id to assign; never decreases
    pub next_sequence: u64,
    pub entries: Vec<QueuedMutation>,
}

fn default_version() -> u32 {
    QUEUE_LOG_VERSION
}

impl Default for QueueLog {
    fn default() -> Self {
        Self { version: QUEUE_LOG_VERSION, next_sequence: 1, entries: Vec::new() }
    }
}

impl QueueLog {
    pub fn count(&self, status: MutationStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    pub(crate) fn get_mut(&mut self, id: u64) -> Option<&mut QueuedMutation> {
        self.entries.iter_mut().find(|e| e.id == id)
    }
}

/// Queue configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Storage key of the mutation log
    pub storage_key: String,
    /// Mutations older than this are purged without replay
    pub entry_ttl: Duration,
    /// Maximum number of queued mutations
    pub max_entries: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_QUEUE_KEY.to_string(),
            entry_ttl: DEFAULT_ENTRY_TTL,
            max_entries: 1_000,
        }
    }
}

impl QueueConfig {
    /// Validate configuration
    pub fn validate(&self) -> CommonResult<()> {
        if self.storage_key.is_empty() {
            return Err(CommonError::config_field("storage_key", "must not be empty"));
        }
        if self.entry_ttl.is_zero() {
            return Err(CommonError::config_field("entry_ttl", "must be greater than 0"));
        }
        if self.max_entries == 0 {
            return Err(CommonError::config_field("max_entries", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Position within the current sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncProgress {
    pub current: usize,
    pub total: usize,
}

/// Polled snapshot for the online/offline badge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    pub pending_count: usize,
    pub failed_count: usize,
    pub sync_progress: Option<SyncProgress>,
}

/// Outcome of one sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub succeeded: usize,
    pub failed: usize,
    /// Mutations left untouched because connectivity dropped mid-pass
    pub skipped: usize,
    pub succeeded_ids: Vec<u64>,
    pub failed_ids: Vec<u64>,
}

impl SyncReport {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates TTL expiry at the 24 hour boundary.
    #[test]
    fn test_mutation_expiry() {
        let created = Utc::now();
        let mutation = QueuedMutation::new(1, "op", serde_json::json!({}), None, created);
        assert!(!mutation.is_expired(created + chrono::Duration::hours(23), DEFAULT_ENTRY_TTL));
        assert!(mutation.is_expired(created + chrono::Duration::hours(24), DEFAULT_ENTRY_TTL));
    }

    /// Validates status transitions used by a sync pass.
    ///
    /// Assertions:
    /// - Confirms attempts increment on `mark_syncing`.
    /// - Confirms failed mutations stay replayable.
    #[test]
    fn test_status_transitions() {
        let now = Utc::now();
        let mut mutation = QueuedMutation::new(1, "op", serde_json::json!(null), None, now);
        assert!(mutation.is_replayable());

        mutation.mark_syncing(now);
        assert_eq!(mutation.status, MutationStatus::Syncing);
        assert_eq!(mutation.attempts, 1);
        assert!(!mutation.is_replayable());

        mutation.mark_failed("503".into());
        assert!(mutation.is_replayable());
        assert_eq!(mutation.last_error.as_deref(), Some("503"));
    }

    /// Validates configuration validation.
    #[test]
    fn test_config_validation() {
        assert!(QueueConfig::default().validate().is_ok());
        let config = QueueConfig { max_entries: 0, ..QueueConfig::default() };
        assert!(config.validate().is_err());
    }

    /// Validates that older logs without a version field still load.
    #[test]
    fn test_log_version_default() {
        let log: QueueLog =
            serde_json::from_str(r#"{"next_sequence":4,"entries":[]}"#).unwrap();
        assert_eq!(log.version, QUEUE_LOG_VERSION);
        assert_eq!(log.next_sequence, 4);
    }
}
