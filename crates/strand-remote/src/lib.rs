//! HTTP bridge to remote agent endpoints.
//!
//! A remote endpoint exposes three operations: capability discovery
//! (`POST /info`), single-shot action execution (`POST /actions/execute`),
//! and agent execution (`POST /agents/execute`) whose response body is a
//! line-delimited JSON stream of runtime events. [`RemoteEndpointClient`]
//! wraps all three; [`LineDecoder`] handles event framing across arbitrary
//! read boundaries; [`RetryPolicy`] retries transient failures on the
//! non-streaming calls. [`HttpGuardrailValidator`] speaks the same shape
//! to a guardrail service.

mod client;
mod decoder;
mod guardrails;
mod retry;

pub use client::{
    RemoteActionDef, RemoteAgentRequest, RemoteEndpointClient, RemoteEndpointConfig,
    RemoteEndpointInfo,
};
pub use decoder::LineDecoder;
pub use guardrails::HttpGuardrailValidator;
pub use retry::RetryPolicy;
