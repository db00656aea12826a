use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use strand_contract::RuntimeEvent;
use tokio::sync::{Notify, Semaphore};

/// Behavior when a subscriber queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// The publisher waits for space, up to the publish timeout; a
    /// subscriber that stays full past the timeout is evicted.
    Backpressure,
    /// The oldest queued event is discarded to make room.
    DropOldest,
}

pub(crate) enum PushOutcome {
    Delivered,
    /// The queue was closed before or while pushing.
    Closed,
    /// Backpressure wait exceeded the publish timeout.
    TimedOut,
}

/// Bounded per-subscriber event queue.
///
/// The deque lock is a std mutex held only for push/pop bookkeeping,
/// never across an await. Waiting happens on the semaphore (publisher
/// side, backpressure) and the notify (consumer side).
pub(crate) struct SubscriberQueue {
    events: Mutex<VecDeque<RuntimeEvent>>,
    capacity: usize,
    policy: OverflowPolicy,
    /// Free slots, used only under `OverflowPolicy::Backpressure`.
    slots: Semaphore,
    wake: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl SubscriberQueue {
    pub(crate) fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            policy,
            slots: Semaphore::new(capacity),
            wake: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Events discarded under `DropOldest`.
    pub(crate) fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Close the queue. Already-queued events remain consumable.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.slots.close();
        self.wake.notify_waiters();
    }

    pub(crate) async fn push(&self, event: RuntimeEvent, timeout: Duration) -> PushOutcome {
        if self.is_closed() {
            return PushOutcome::Closed;
        }
        match self.policy {
            OverflowPolicy::Backpressure => {
                match tokio::time::timeout(timeout, self.slots.acquire()).await {
                    Ok(Ok(permit)) => {
                        // The slot is returned by the consumer on pop.
                        permit.forget();
                        self.enqueue(event);
                        PushOutcome::Delivered
                    }
                    Ok(Err(_)) => PushOutcome::Closed,
                    Err(_) => PushOutcome::TimedOut,
                }
            }
            OverflowPolicy::DropOldest => {
                {
                    let mut events = self.lock_events();
                    if events.len() == self.capacity {
                        events.pop_front();
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    events.push_back(event);
                }
                self.wake.notify_one();
                PushOutcome::Delivered
            }
        }
    }

    /// Wait for the next event. `None` once the queue is closed and drained.
    pub(crate) async fn pop(&self) -> Option<RuntimeEvent> {
        loop {
            let notified = self.wake.notified();
            if let Some(event) = self.try_pop() {
                return Some(event);
            }
            if self.is_closed() {
                // An event may have raced in between the empty check and
                // the closed check.
                return self.try_pop();
            }
            notified.await;
        }
    }

    fn try_pop(&self) -> Option<RuntimeEvent> {
        let event = self.lock_events().pop_front();
        if event.is_some() && self.policy == OverflowPolicy::Backpressure {
            self.slots.add_permits(1);
        }
        event
    }

    fn enqueue(&self, event: RuntimeEvent) {
        self.lock_events().push_back(event);
        self.wake.notify_one();
    }

    fn lock_events(&self) -> std::sync::MutexGuard<'_, VecDeque<RuntimeEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
