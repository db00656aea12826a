use crate::queue::{PushOutcome, SubscriberQueue};
use crate::EventBusConfig;
use async_stream::stream;
use futures::Stream;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use strand_contract::RuntimeEvent;
use tracing::{trace, warn};

/// Per-run multicast event bus.
///
/// Publishing is sequential per run (the driver task owns it), so event
/// order is the publish order for every subscriber. Each subscriber gets
/// an independent bounded queue; a consumed event is gone from that
/// queue only, never from a sibling's.
pub struct EventBus {
    config: EventBusConfig,
    state: Mutex<BusState>,
}

struct BusState {
    history: VecDeque<RuntimeEvent>,
    subscribers: Vec<Arc<SubscriberQueue>>,
    completed: bool,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BusState {
                history: VecDeque::new(),
                subscribers: Vec::new(),
                completed: false,
            }),
        }
    }

    /// Publish one event to the history buffer and every live subscriber.
    ///
    /// With the backpressure policy this waits for full queues, up to the
    /// publish timeout; a subscriber that stays full is evicted so one
    /// stalled consumer cannot wedge the run.
    pub async fn publish(&self, event: RuntimeEvent) {
        let targets = {
            let mut state = self.lock_state();
            if state.completed {
                warn!(
                    event_type = event.event_type(),
                    "publish after completion dropped"
                );
                return;
            }
            state.subscribers.retain(|queue| !queue.is_closed());
            state.history.push_back(event.clone());
            while state.history.len() > self.config.history_cap {
                state.history.pop_front();
            }
            state.subscribers.clone()
        };
        trace!(
            event_type = event.event_type(),
            subscribers = targets.len(),
            "publish"
        );
        for queue in targets {
            match queue.push(event.clone(), self.config.publish_timeout).await {
                PushOutcome::Delivered | PushOutcome::Closed => {}
                PushOutcome::TimedOut => {
                    warn!(
                        timeout_ms = self.config.publish_timeout.as_millis() as u64,
                        "evicting subscriber stalled past the publish timeout"
                    );
                    queue.close();
                }
            }
        }
    }

    /// Attach a subscriber. With `replay`, events already in the history
    /// buffer are delivered first, then live events, with no duplicate or
    /// gap at the boundary.
    pub fn subscribe(&self, replay: bool) -> Subscription {
        let mut state = self.lock_state();
        let queue = Arc::new(SubscriberQueue::new(
            self.config.subscriber_capacity,
            self.config.overflow,
        ));
        if state.completed {
            queue.close();
        } else {
            state.subscribers.push(Arc::clone(&queue));
        }
        let snapshot = if replay {
            state.history.iter().cloned().collect()
        } else {
            VecDeque::new()
        };
        Subscription { snapshot, queue }
    }

    /// Mark the run's event sequence finished. Subscribers drain their
    /// queues and then see end-of-stream; later publishes are dropped.
    pub fn complete(&self) {
        let mut state = self.lock_state();
        state.completed = true;
        for queue in state.subscribers.drain(..) {
            queue.close();
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A subscriber's handle on the bus. Dropping it detaches the subscriber.
pub struct Subscription {
    snapshot: VecDeque<RuntimeEvent>,
    queue: Arc<SubscriberQueue>,
}

impl Subscription {
    /// Next event, or `None` once the bus has completed and this
    /// subscriber's queue is drained.
    pub async fn next(&mut self) -> Option<RuntimeEvent> {
        if let Some(event) = self.snapshot.pop_front() {
            return Some(event);
        }
        self.queue.pop().await
    }

    /// Events this subscriber lost to the drop-oldest policy.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped_count()
    }

    /// Consume the subscription as a stream.
    pub fn into_stream(mut self) -> impl Stream<Item = RuntimeEvent> {
        stream! {
            while let Some(event) = self.next().await {
                yield event;
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.queue.close();
    }
}
