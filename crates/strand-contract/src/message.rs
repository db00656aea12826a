use crate::{gen_message_id, now_millis};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a message author.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Developer,
    System,
    #[default]
    Assistant,
    User,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Developer => "developer",
            Self::System => "system",
            Self::Assistant => "assistant",
            Self::User => "user",
            Self::Tool => "tool",
        }
    }
}

/// Lifecycle status of a message.
///
/// Transitions are monotonic: once a message reaches `Success` or
/// `Failed` it never goes back to `Pending`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "code", rename_all = "camelCase")]
pub enum MessageStatus {
    #[default]
    Pending,
    Success,
    Failed {
        reason: String,
    },
}

impl MessageStatus {
    /// Create a failed status.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Whether this status is terminal (`Success` or `Failed`).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Advance to `next`, keeping transitions monotonic.
    ///
    /// Returns `false` (and leaves the status unchanged) when the current
    /// status is already terminal.
    pub fn advance(&mut self, next: MessageStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        *self = next;
        true
    }
}

/// A finalized, typed unit of conversation output.
///
/// Variants mirror the message kinds a transport layer renders: streamed
/// text, images, action (tool) invocations, action results, and agent
/// state transitions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    /// A text message, possibly assembled from streamed chunks.
    Text {
        id: String,
        #[serde(rename = "createdAt")]
        created_at: u64,
        status: MessageStatus,
        #[serde(rename = "parentMessageId", skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
        role: Role,
        content: String,
    },

    /// An image message carried as an encoded payload.
    Image {
        id: String,
        #[serde(rename = "createdAt")]
        created_at: u64,
        status: MessageStatus,
        #[serde(rename = "parentMessageId", skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
        role: Role,
        format: String,
        bytes: String,
    },

    /// An action (tool) invocation with streamed arguments.
    ActionExecution {
        id: String,
        #[serde(rename = "createdAt")]
        created_at: u64,
        status: MessageStatus,
        #[serde(rename = "parentMessageId", skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
        name: String,
        arguments: String,
    },

    /// The result produced by an action execution.
    Result {
        id: String,
        #[serde(rename = "createdAt")]
        created_at: u64,
        status: MessageStatus,
        #[serde(rename = "actionExecutionId")]
        action_execution_id: String,
        #[serde(rename = "actionName")]
        action_name: String,
        result: String,
    },

    /// A serialized agent state transition.
    AgentState {
        id: String,
        #[serde(rename = "createdAt")]
        created_at: u64,
        status: MessageStatus,
        #[serde(rename = "threadId")]
        thread_id: String,
        #[serde(rename = "agentName")]
        agent_name: String,
        #[serde(rename = "nodeName", skip_serializing_if = "Option::is_none")]
        node_name: Option<String>,
        #[serde(rename = "runId", skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
        active: bool,
        running: bool,
        state: Value,
    },
}

impl Message {
    /// Create a completed user text message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::Text {
            id: gen_message_id(),
            created_at: now_millis(),
            status: MessageStatus::Success,
            parent_message_id: None,
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a completed assistant text message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Text {
            id: gen_message_id(),
            created_at: now_millis(),
            status: MessageStatus::Success,
            parent_message_id: None,
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Create a completed system text message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::Text {
            id: gen_message_id(),
            created_at: now_millis(),
            status: MessageStatus::Success,
            parent_message_id: None,
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a completed action result message.
    pub fn action_result(
        id: impl Into<String>,
        action_execution_id: impl Into<String>,
        action_name: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self::Result {
            id: id.into(),
            created_at: now_millis(),
            status: MessageStatus::Success,
            action_execution_id: action_execution_id.into(),
            action_name: action_name.into(),
            result: result.into(),
        }
    }

    /// Message ID.
    pub fn id(&self) -> &str {
        match self {
            Self::Text { id, .. }
            | Self::Image { id, .. }
            | Self::ActionExecution { id, .. }
            | Self::Result { id, .. }
            | Self::AgentState { id, .. } => id,
        }
    }

    /// Current status.
    pub fn status(&self) -> &MessageStatus {
        match self {
            Self::Text { status, .. }
            | Self::Image { status, .. }
            | Self::ActionExecution { status, .. }
            | Self::Result { status, .. }
            | Self::AgentState { status, .. } => status,
        }
    }

    /// Advance the status, preserving monotonicity.
    pub fn advance_status(&mut self, next: MessageStatus) -> bool {
        match self {
            Self::Text { status, .. }
            | Self::Image { status, .. }
            | Self::ActionExecution { status, .. }
            | Self::Result { status, .. }
            | Self::AgentState { status, .. } => status.advance(next),
        }
    }

    /// Role of the author, where the variant carries one.
    pub fn role(&self) -> Option<Role> {
        match self {
            Self::Text { role, .. } | Self::Image { role, .. } => Some(*role),
            _ => None,
        }
    }

    /// Text content for text messages.
    pub fn text_content(&self) -> Option<&str> {
        match self {
            Self::Text { content, .. } => Some(content),
            _ => None,
        }
    }
}
