use crate::message::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal outcome of a run. Exactly one is emitted per admitted run,
/// always as the last item of the outbound stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "code", rename_all = "camelCase")]
pub enum ResponseStatus {
    Success,
    Failed {
        /// Machine-readable error code, see `RuntimeError::code`.
        #[serde(rename = "errorCode")]
        error_code: String,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
}

impl ResponseStatus {
    pub fn failed(error_code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            error_code: error_code.into(),
            reason: reason.into(),
            details: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// What kind of content a chunk carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ChunkKind {
    TextContent,
    ActionArgs,
}

/// An incremental delta for a message still being streamed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageChunk {
    pub message_id: String,
    pub kind: ChunkKind,
    pub delta: String,
}

/// One item of the outbound run stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamItem {
    /// A finalized message.
    Message(Message),
    /// An incremental delta for an in-flight message.
    Chunk(MessageChunk),
    /// An out-of-band signal forwarded from the adapter.
    MetaEvent { name: String, value: Value },
    /// The terminal status. Always last; emitted exactly once.
    Terminal {
        #[serde(rename = "threadId")]
        thread_id: String,
        #[serde(rename = "runId")]
        run_id: String,
        status: ResponseStatus,
    },
}

impl StreamItem {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal { .. })
    }

    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(message) => Some(message),
            _ => None,
        }
    }

    pub fn as_chunk(&self) -> Option<&MessageChunk> {
        match self {
            Self::Chunk(chunk) => Some(chunk),
            _ => None,
        }
    }
}
