use async_trait::async_trait;

use super::types::QueuedMutation;

/// Replays one queued mutation against the backend
///
/// Returning `Ok` is the server acknowledgment that lets the queue drop
/// the mutation.
#[async_trait]
pub trait MutationExecutor: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn execute(&self, mutation: &QueuedMutation) -> Result<(), Self::Error>;
}
