use crate::error::{RuntimeError, RuntimeResult};
use crate::guardrails::GuardrailsConfig;
use crate::message::{Message, Role};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An action (tool) the frontend makes available for a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the action's parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl ActionDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: None,
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = Some(parameters);
        self
    }
}

/// Names the agent a run should be handed to instead of the default
/// completion path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentSession {
    pub agent_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
}

impl AgentSession {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            thread_id: None,
            node_name: None,
        }
    }
}

/// Inbound request to process one conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_actions: Vec<ActionDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_session: Option<AgentSession>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guardrails: Option<GuardrailsConfig>,
    /// Provider-specific knobs forwarded opaquely to the adapter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forwarded_parameters: Option<Value>,
    /// Caller-supplied context forwarded opaquely to the adapter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_properties: Option<Value>,
}

impl RunRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_agent_session(mut self, session: AgentSession) -> Self {
        self.agent_session = Some(session);
        self
    }

    pub fn with_actions(mut self, actions: Vec<ActionDescriptor>) -> Self {
        self.available_actions = actions;
        self
    }

    pub fn with_guardrails(mut self, guardrails: GuardrailsConfig) -> Self {
        self.guardrails = Some(guardrails);
        self
    }

    /// Structural validation, applied before any run state exists.
    pub fn validate(&self) -> RuntimeResult<()> {
        if self.messages.is_empty() {
            return Err(RuntimeError::validation("messages must not be empty"));
        }
        if matches!(self.thread_id.as_deref(), Some("")) {
            return Err(RuntimeError::validation("threadId must not be empty"));
        }
        if matches!(self.run_id.as_deref(), Some("")) {
            return Err(RuntimeError::validation("runId must not be empty"));
        }
        for message in &self.messages {
            if message.id().is_empty() {
                return Err(RuntimeError::validation("message id must not be empty"));
            }
        }
        if let Some(session) = &self.agent_session {
            if session.agent_name.is_empty() {
                return Err(RuntimeError::validation("agentName must not be empty"));
            }
        }
        for action in &self.available_actions {
            if action.name.is_empty() {
                return Err(RuntimeError::validation("action name must not be empty"));
            }
        }
        Ok(())
    }

    /// Content of the most recent user text message, if any.
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role() == Some(Role::User))
            .and_then(|m| m.text_content())
    }
}
