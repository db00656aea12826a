use async_trait::async_trait;
use strand_contract::AgentStateSnapshot;
use thiserror::Error;

/// Failure talking to the persistence backend.
///
/// A missing snapshot is not an error; `load` reports it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("state store backend error: {message}")]
    Backend { message: String },
}

impl StateStoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Persistence seam for agent state snapshots.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the snapshot for an agent on a thread, if one exists.
    async fn load(
        &self,
        thread_id: &str,
        agent_name: &str,
    ) -> Result<Option<AgentStateSnapshot>, StateStoreError>;

    /// Save a snapshot, replacing any previous one for the same key.
    async fn save(&self, snapshot: AgentStateSnapshot) -> Result<(), StateStoreError>;

    /// Delete the snapshot for an agent on a thread. Deleting a missing
    /// snapshot is a no-op.
    async fn delete(&self, thread_id: &str, agent_name: &str) -> Result<(), StateStoreError>;

    /// Names of agents that have a snapshot on the thread.
    async fn list_thread_agents(&self, thread_id: &str) -> Result<Vec<String>, StateStoreError>;
}
