use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use strand_contract::{
    AgentDescriptor, EventStream, ExecutionAdapter, ExecutionContext, ExecutionRequest,
    RuntimeError, RuntimeResult,
};

/// An agent implemented inside the host process.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    fn descriptor(&self) -> AgentDescriptor;

    async fn run(
        &self,
        request: ExecutionRequest,
        ctx: &ExecutionContext,
    ) -> RuntimeResult<EventStream>;
}

/// Dispatches agent runs to [`AgentRunner`]s registered by name.
#[derive(Default)]
pub struct InProcessAgentAdapter {
    runners: HashMap<String, Arc<dyn AgentRunner>>,
}

impl InProcessAgentAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, runner: Arc<dyn AgentRunner>) -> Self {
        self.runners.insert(runner.descriptor().name, runner);
        self
    }
}

#[async_trait]
impl ExecutionAdapter for InProcessAgentAdapter {
    fn name(&self) -> &str {
        "in-process"
    }

    async fn agents(&self) -> RuntimeResult<Vec<AgentDescriptor>> {
        let mut agents: Vec<AgentDescriptor> =
            self.runners.values().map(|r| r.descriptor()).collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(agents)
    }

    async fn execute(
        &self,
        request: ExecutionRequest,
        ctx: &ExecutionContext,
    ) -> RuntimeResult<EventStream> {
        let agent_name = ctx
            .agent_name
            .as_deref()
            .ok_or_else(|| RuntimeError::validation("agent execution requires an agent session"))?;
        let runner = self
            .runners
            .get(agent_name)
            .ok_or_else(|| RuntimeError::agent_not_found(agent_name))?;
        runner.run(request, ctx).await
    }
}
