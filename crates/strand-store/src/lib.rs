//! Agent state persistence for the strand runtime.
//!
//! Snapshots are keyed by `(thread_id, agent_name)` with last-writer-wins
//! semantics. The [`StateStore`] trait is the seam for real backends; the
//! bundled [`MemoryStateStore`] is the default, suitable for tests and
//! single-process deployments.

mod contract;
mod memory;

pub use contract::{StateStore, StateStoreError};
pub use memory::MemoryStateStore;
