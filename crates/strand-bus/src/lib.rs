//! In-memory multicast event bus for strand runs.
//!
//! One [`EventBus`] exists per run. The run driver publishes
//! [`RuntimeEvent`](strand_contract::RuntimeEvent)s into it; any number of
//! subscribers consume independent copies through bounded per-subscriber
//! queues. A bounded history buffer lets late subscribers replay events
//! published before they attached, with no duplicates or gaps at the
//! replay/live boundary.

mod bus;
mod queue;

pub use bus::{EventBus, Subscription};
pub use queue::OverflowPolicy;

use std::time::Duration;

/// Tunables for one bus instance.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Maximum events retained for replay; older events are discarded.
    pub history_cap: usize,
    /// Bounded capacity of each subscriber queue.
    pub subscriber_capacity: usize,
    /// What happens when a subscriber queue is full.
    pub overflow: OverflowPolicy,
    /// With [`OverflowPolicy::Backpressure`], how long a publish waits on
    /// a full queue before the subscriber is evicted.
    pub publish_timeout: Duration,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            history_cap: 1000,
            subscriber_capacity: 64,
            overflow: OverflowPolicy::Backpressure,
            publish_timeout: Duration::from_secs(5),
        }
    }
}
