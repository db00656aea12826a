use crate::error::{RuntimeError, RuntimeResult};
use crate::event::RuntimeEvent;
use crate::message::Message;
use crate::request::ActionDescriptor;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Boxed stream of runtime events, as produced by an adapter.
///
/// An `Err` item means generation failed mid-stream; no further items
/// follow it.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<RuntimeEvent, RuntimeError>> + Send>>;

/// An agent an adapter can route runs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentDescriptor {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The slice of a run an adapter needs to execute it.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub messages: Vec<Message>,
    pub available_actions: Vec<ActionDescriptor>,
    /// Persisted agent state to resume from, if any.
    pub state: Option<Value>,
    pub node_name: Option<String>,
    pub forwarded_parameters: Option<Value>,
    pub context_properties: Option<Value>,
}

/// Identity and cancellation scope of the run driving an execution.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub thread_id: String,
    pub run_id: String,
    pub agent_name: Option<String>,
    pub cancellation: CancellationToken,
}

/// Pluggable execution backend.
///
/// Adapters translate an [`ExecutionRequest`] into a stream of
/// [`RuntimeEvent`]s; the orchestrator owns everything around that
/// (guardrails, bus fan-out, assembly, persistence).
#[async_trait]
pub trait ExecutionAdapter: Send + Sync {
    /// Short adapter name, for logging.
    fn name(&self) -> &str;

    /// Agents this adapter can serve. Empty for adapters that only
    /// handle the default completion path.
    async fn agents(&self) -> RuntimeResult<Vec<AgentDescriptor>> {
        Ok(Vec::new())
    }

    /// Run the request and return the event stream.
    async fn execute(
        &self,
        request: ExecutionRequest,
        ctx: &ExecutionContext,
    ) -> RuntimeResult<EventStream>;
}
