use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use strand_contract::{
    AgentDescriptor, EventStream, ExecutionAdapter, ExecutionContext, ExecutionRequest,
    RuntimeError, RuntimeResult,
};
use strand_remote::{RemoteAgentRequest, RemoteEndpointClient};
use tracing::debug;

/// Routes agent runs to a remote endpoint over the line-delimited JSON
/// bridge.
pub struct RemoteAgentAdapter {
    name: String,
    client: Arc<RemoteEndpointClient>,
}

impl RemoteAgentAdapter {
    pub fn new(name: impl Into<String>, client: Arc<RemoteEndpointClient>) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }
}

#[async_trait]
impl ExecutionAdapter for RemoteAgentAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn agents(&self) -> RuntimeResult<Vec<AgentDescriptor>> {
        Ok(self.client.info().await?.agents)
    }

    async fn execute(
        &self,
        request: ExecutionRequest,
        ctx: &ExecutionContext,
    ) -> RuntimeResult<EventStream> {
        let agent_name = ctx
            .agent_name
            .clone()
            .ok_or_else(|| RuntimeError::validation("remote execution requires an agent session"))?;
        debug!(
            agent_name = %agent_name,
            thread_id = %ctx.thread_id,
            endpoint = %self.client.base_url(),
            "dispatching run to remote endpoint"
        );
        let remote = RemoteAgentRequest {
            name: agent_name,
            thread_id: ctx.thread_id.clone(),
            run_id: Some(ctx.run_id.clone()),
            node_name: request.node_name,
            messages: request.messages,
            state: request.state.unwrap_or_else(|| json!({})),
            properties: request.context_properties,
            actions: request.available_actions,
        };
        self.client
            .execute_agent(remote, ctx.cancellation.clone())
            .await
    }
}
