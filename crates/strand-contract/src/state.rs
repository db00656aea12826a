use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Persisted snapshot of an agent's state for one thread.
///
/// Keyed by `(thread_id, agent_name)`; the latest write wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentStateSnapshot {
    pub thread_id: String,
    pub agent_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Whether the agent session is still active on the thread.
    pub active: bool,
    /// Whether the agent was mid-run when the snapshot was taken.
    pub running: bool,
    pub state: Value,
    /// Milliseconds since the Unix epoch.
    pub updated_at: u64,
}
