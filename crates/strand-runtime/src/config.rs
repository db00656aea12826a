use std::time::Duration;
use strand_bus::{EventBusConfig, OverflowPolicy};

/// Orchestrator-wide tunables.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Replay history kept per run, in events.
    pub history_cap: usize,
    /// Bounded capacity of each bus subscriber queue.
    pub subscriber_capacity: usize,
    /// What publishing does when a subscriber queue is full.
    pub overflow: OverflowPolicy,
    /// With the backpressure policy, how long a publish waits on a full
    /// queue before evicting the subscriber.
    pub publish_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let bus = EventBusConfig::default();
        Self {
            history_cap: bus.history_cap,
            subscriber_capacity: bus.subscriber_capacity,
            overflow: bus.overflow,
            publish_timeout: bus.publish_timeout,
        }
    }
}

impl RuntimeConfig {
    pub(crate) fn bus_config(&self) -> EventBusConfig {
        EventBusConfig {
            history_cap: self.history_cap,
            subscriber_capacity: self.subscriber_capacity,
            overflow: self.overflow,
            publish_timeout: self.publish_timeout,
        }
    }
}
