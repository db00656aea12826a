//! Execution adapter implementations.
//!
//! Three backends ship with the runtime: [`CompletionAdapter`] for direct
//! completion providers, [`RemoteAgentAdapter`] for agents behind an HTTP
//! endpoint, and [`InProcessAgentAdapter`] for agents compiled into the
//! host process.

mod completion;
mod in_process;
mod remote;

pub use completion::{CompletionAdapter, CompletionChunk, CompletionDriver, CompletionStream};
pub use in_process::{AgentRunner, InProcessAgentAdapter};
pub use remote::RemoteAgentAdapter;
