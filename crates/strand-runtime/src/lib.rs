//! Request orchestration for strand.
//!
//! The [`RequestOrchestrator`] is the engine's front door: it validates a
//! [`RunRequest`](strand_contract::RunRequest), reserves the thread,
//! consults guardrails, routes the run to an execution adapter, fans the
//! resulting events out through a per-run bus, assembles them into typed
//! messages, persists agent state, and resolves exactly one terminal
//! status per run.

pub mod adapters;
mod assembler;
mod config;
mod orchestrator;

pub use adapters::{
    AgentRunner, CompletionAdapter, CompletionChunk, CompletionDriver, CompletionStream,
    InProcessAgentAdapter, RemoteAgentAdapter,
};
pub use assembler::MessageAssembler;
pub use config::RuntimeConfig;
pub use orchestrator::{RequestOrchestrator, RunHandle};
pub use strand_bus::Subscription;
