use crate::contract::{StateStore, StateStoreError};
use async_trait::async_trait;
use std::collections::HashMap;
use strand_contract::AgentStateSnapshot;
use tokio::sync::RwLock;

/// In-memory [`StateStore`] backed by a `HashMap`.
#[derive(Default)]
pub struct MemoryStateStore {
    snapshots: RwLock<HashMap<(String, String), AgentStateSnapshot>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots, across all threads.
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(
        &self,
        thread_id: &str,
        agent_name: &str,
    ) -> Result<Option<AgentStateSnapshot>, StateStoreError> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots
            .get(&(thread_id.to_string(), agent_name.to_string()))
            .cloned())
    }

    async fn save(&self, snapshot: AgentStateSnapshot) -> Result<(), StateStoreError> {
        let key = (snapshot.thread_id.clone(), snapshot.agent_name.clone());
        self.snapshots.write().await.insert(key, snapshot);
        Ok(())
    }

    async fn delete(&self, thread_id: &str, agent_name: &str) -> Result<(), StateStoreError> {
        self.snapshots
            .write()
            .await
            .remove(&(thread_id.to_string(), agent_name.to_string()));
        Ok(())
    }

    async fn list_thread_agents(&self, thread_id: &str) -> Result<Vec<String>, StateStoreError> {
        let snapshots = self.snapshots.read().await;
        let mut agents: Vec<String> = snapshots
            .keys()
            .filter(|(thread, _)| thread == thread_id)
            .map(|(_, agent)| agent.clone())
            .collect();
        agents.sort();
        Ok(agents)
    }
}
