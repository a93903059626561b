//! Session state-change notifications
//!
//! Hosts either register a [`StateObserver`] (called synchronously, usually
//! on the task that caused the transition) or take a broadcast receiver and
//! consume [`StateChange`]s asynchronously. Both see every transition of a
//! provider in the order the session went through them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use socialauth_domain::{AuthError, ProviderId, SessionPhase};
use tokio::sync::broadcast;

/// One phase transition of one provider's session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub provider: ProviderId,
    pub from: SessionPhase,
    pub to: SessionPhase,
    /// The failure that caused the transition, if any.
    pub error: Option<AuthError>,
    pub at: DateTime<Utc>,
}

impl StateChange {
    pub(crate) fn new(
        provider: ProviderId,
        from: SessionPhase,
        to: SessionPhase,
        error: Option<AuthError>,
    ) -> Self {
        Self { provider, from, to, error, at: Utc::now() }
    }
}

/// Callback interface for state changes
///
/// Called after the session lock is released, so implementations may query
/// or drive the manager. Changes triggered from inside a callback are
/// delivered after it returns. Implementations must not block.
pub trait StateObserver: Send + Sync {
    fn on_state_change(&self, change: &StateChange);
}

impl<F> StateObserver for F
where
    F: Fn(&StateChange) + Send + Sync,
{
    fn on_state_change(&self, change: &StateChange) {
        self(change);
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Fan-out of state changes to observers and broadcast receivers
pub(crate) struct EventHub {
    sender: broadcast::Sender<StateChange>,
    observers: RwLock<Vec<(SubscriptionId, Arc<dyn StateObserver>)>>,
    next_id: AtomicU64,
}

impl EventHub {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, observers: RwLock::new(Vec::new()), next_id: AtomicU64::new(1) }
    }

    pub(crate) fn subscribe(&self, observer: Arc<dyn StateObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    pub(crate) fn receiver(&self) -> broadcast::Receiver<StateChange> {
        self.sender.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    pub(crate) fn publish(&self, change: StateChange) {
        // Snapshot so observers may (un)subscribe from inside the callback
        let observers: Vec<Arc<dyn StateObserver>> =
            self.observers.read().iter().map(|(_, observer)| Arc::clone(observer)).collect();

        for observer in &observers {
            observer.on_state_change(&change);
        }

        if self.sender.send(change).is_err() {
            tracing::trace!("No broadcast receivers for state change");
        }
    }
}

/// Per-provider delivery queue
///
/// Changes are pushed while the session lock is held, so queue order is
/// transition order. The first caller of [`deliver`](Self::deliver) that finds
/// the queue idle drains it; concurrent and re-entrant callers return at once
/// and leave their changes to that caller.
#[derive(Default)]
pub(crate) struct EventQueue {
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<StateChange>,
    delivering: bool,
}

impl EventQueue {
    pub(crate) fn push(&self, change: StateChange) {
        self.state.lock().pending.push_back(change);
    }

    pub(crate) fn deliver(&self, hub: &EventHub) {
        {
            let mut state = self.state.lock();
            if state.delivering {
                return;
            }
            state.delivering = true;
        }

        let _reset = UnwindReset(self);
        loop {
            let next = {
                let mut state = self.state.lock();
                let next = state.pending.pop_front();
                // Cleared under the same lock as the empty check, so a racing
                // push is always picked up by its own deliver call
                state.delivering = next.is_some();
                next
            };
            match next {
                Some(change) => hub.publish(change),
                None => break,
            }
        }
    }
}

/// Hands delivery back if an observer panics mid-drain.
struct UnwindReset<'a>(&'a EventQueue);

impl Drop for UnwindReset<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.state.lock().delivering = false;
        }
    }
}
