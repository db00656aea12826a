use crate::message::Role;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Low-level runtime events produced by execution adapters.
///
/// These are the granular signals a backend emits while generating:
/// text chunk phases, action (tool) call phases, agent state snapshots,
/// and out-of-band meta events. The message assembler reduces this
/// sequence into [`crate::Message`] records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum RuntimeEvent {
    /// Beginning of a streamed text message.
    #[serde(rename = "TEXT_MESSAGE_START")]
    TextMessageStart {
        #[serde(rename = "messageId")]
        message_id: String,
        role: Role,
        #[serde(rename = "parentMessageId", skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
    },

    /// Incremental text content.
    #[serde(rename = "TEXT_MESSAGE_CONTENT")]
    TextMessageContent {
        #[serde(rename = "messageId")]
        message_id: String,
        content: String,
    },

    /// End of a streamed text message.
    #[serde(rename = "TEXT_MESSAGE_END")]
    TextMessageEnd {
        #[serde(rename = "messageId")]
        message_id: String,
    },

    /// Beginning of an action execution.
    #[serde(rename = "ACTION_EXECUTION_START")]
    ActionExecutionStart {
        #[serde(rename = "actionExecutionId")]
        action_execution_id: String,
        #[serde(rename = "actionName")]
        action_name: String,
        #[serde(rename = "parentMessageId", skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
    },

    /// Incremental action arguments.
    #[serde(rename = "ACTION_EXECUTION_ARGS")]
    ActionExecutionArgs {
        #[serde(rename = "actionExecutionId")]
        action_execution_id: String,
        args: String,
    },

    /// End of action argument streaming.
    #[serde(rename = "ACTION_EXECUTION_END")]
    ActionExecutionEnd {
        #[serde(rename = "actionExecutionId")]
        action_execution_id: String,
    },

    /// Result of an executed action. Single-shot: no start/end phases.
    #[serde(rename = "ACTION_EXECUTION_RESULT")]
    ActionExecutionResult {
        #[serde(rename = "actionExecutionId")]
        action_execution_id: String,
        #[serde(rename = "actionName")]
        action_name: String,
        result: String,
    },

    /// Agent state transition. Single-shot: no start/end phases.
    #[serde(rename = "AGENT_STATE_MESSAGE")]
    AgentStateMessage {
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

    /// Out-of-band signal (e.g. an execution interrupt). Does not affect
    /// message assembly.
    #[serde(rename = "META_EVENT")]
    MetaEvent { name: String, value: Value },
}

impl RuntimeEvent {
    /// Create a text-message-start event with the assistant role.
    pub fn text_start(message_id: impl Into<String>) -> Self {
        Self::TextMessageStart {
            message_id: message_id.into(),
            role: Role::Assistant,
            parent_message_id: None,
        }
    }

    /// Create a text-message-content event.
    pub fn text_content(message_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::TextMessageContent {
            message_id: message_id.into(),
            content: content.into(),
        }
    }

    /// Create a text-message-end event.
    pub fn text_end(message_id: impl Into<String>) -> Self {
        Self::TextMessageEnd {
            message_id: message_id.into(),
        }
    }

    /// Create an action-execution-start event.
    pub fn action_start(
        action_execution_id: impl Into<String>,
        action_name: impl Into<String>,
    ) -> Self {
        Self::ActionExecutionStart {
            action_execution_id: action_execution_id.into(),
            action_name: action_name.into(),
            parent_message_id: None,
        }
    }

    /// Create an action-execution-args event.
    pub fn action_args(action_execution_id: impl Into<String>, args: impl Into<String>) -> Self {
        Self::ActionExecutionArgs {
            action_execution_id: action_execution_id.into(),
            args: args.into(),
        }
    }

    /// Create an action-execution-end event.
    pub fn action_end(action_execution_id: impl Into<String>) -> Self {
        Self::ActionExecutionEnd {
            action_execution_id: action_execution_id.into(),
        }
    }

    /// Create an action-execution-result event.
    pub fn action_result(
        action_execution_id: impl Into<String>,
        action_name: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self::ActionExecutionResult {
            action_execution_id: action_execution_id.into(),
            action_name: action_name.into(),
            result: result.into(),
        }
    }

    /// Create a meta event.
    pub fn meta(name: impl Into<String>, value: Value) -> Self {
        Self::MetaEvent {
            name: name.into(),
            value,
        }
    }

    /// Stable lowercase name of the event kind, for logging.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TextMessageStart { .. } => "text_message_start",
            Self::TextMessageContent { .. } => "text_message_content",
            Self::TextMessageEnd { .. } => "text_message_end",
            Self::ActionExecutionStart { .. } => "action_execution_start",
            Self::ActionExecutionArgs { .. } => "action_execution_args",
            Self::ActionExecutionEnd { .. } => "action_execution_end",
            Self::ActionExecutionResult { .. } => "action_execution_result",
            Self::AgentStateMessage { .. } => "agent_state_message",
            Self::MetaEvent { .. } => "meta_event",
        }
    }

    /// The message/action-execution ID this event belongs to, if any.
    pub fn message_id(&self) -> Option<&str> {
        match self {
            Self::TextMessageStart { message_id, .. }
            | Self::TextMessageContent { message_id, .. }
            | Self::TextMessageEnd { message_id } => Some(message_id),
            Self::ActionExecutionStart {
                action_execution_id,
                ..
            }
            | Self::ActionExecutionArgs {
                action_execution_id,
                ..
            }
            | Self::ActionExecutionEnd {
                action_execution_id,
            }
            | Self::ActionExecutionResult {
                action_execution_id,
                ..
            } => Some(action_execution_id),
            Self::AgentStateMessage { .. } | Self::MetaEvent { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_tags_are_screaming_snake() {
        let ev = RuntimeEvent::text_content("m1", "hello");
        let value = serde_json::to_value(&ev).unwrap();
        assert_eq!(value["type"], "TEXT_MESSAGE_CONTENT");
        assert_eq!(value["messageId"], "m1");
        assert_eq!(value["content"], "hello");
    }

    #[test]
    fn round_trips_agent_state() {
        let ev = RuntimeEvent::AgentStateMessage {
            thread_id: "t1".into(),
            agent_name: "chef".into(),
            node_name: Some("plan".into()),
            run_id: Some("r1".into()),
            active: true,
            running: true,
            state: json!({"step": 2}),
        };
        let text = serde_json::to_string(&ev).unwrap();
        let back: RuntimeEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn message_id_covers_action_phases() {
        assert_eq!(
            RuntimeEvent::action_args("a1", "{}").message_id(),
            Some("a1")
        );
        assert_eq!(RuntimeEvent::meta("interrupt", json!({})).message_id(), None);
    }
}
