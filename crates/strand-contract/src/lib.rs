//! Shared contract types for the strand runtime.
//!
//! This crate holds the data model every other strand crate speaks:
//! the [`Message`] union, the low-level [`RuntimeEvent`] union, inbound
//! request and outbound stream shapes, the [`RuntimeError`] taxonomy,
//! and the trait seams ([`ExecutionAdapter`], [`GuardrailValidator`])
//! that the orchestrator drives.

pub mod adapter;
pub mod error;
pub mod event;
pub mod guardrails;
pub mod message;
pub mod request;
pub mod response;
pub mod state;

pub use adapter::{
    AgentDescriptor, EventStream, ExecutionAdapter, ExecutionContext, ExecutionRequest,
};
pub use error::{RuntimeError, RuntimeResult};
pub use event::RuntimeEvent;
pub use guardrails::{
    GuardrailDecision, GuardrailInput, GuardrailMessage, GuardrailValidator, GuardrailsConfig,
};
pub use message::{Message, MessageStatus, Role};
pub use request::{ActionDescriptor, AgentSession, RunRequest};
pub use response::{ChunkKind, MessageChunk, ResponseStatus, StreamItem};
pub use state::AgentStateSnapshot;

/// Generate a message ID with the `msg_` prefix.
pub fn gen_message_id() -> String {
    format!("msg_{}", uuid::Uuid::new_v4().simple())
}

/// Generate a run ID with the `run_` prefix.
pub fn gen_run_id() -> String {
    format!("run_{}", uuid::Uuid::new_v4().simple())
}

/// Generate a thread ID with the `thread_` prefix.
pub fn gen_thread_id() -> String {
    format!("thread_{}", uuid::Uuid::new_v4().simple())
}

/// Current timestamp in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
