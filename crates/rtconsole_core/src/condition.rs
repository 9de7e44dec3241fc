//! Capability conditions: published markers that dependents observe.
//!
//! # Responsibility
//! - Track which condition ids are currently published.
//! - Notify subscribed listeners when an id appears or disappears.
//!
//! # Invariants
//! - Notifications are queued under the bus lock and delivered in queue
//!   order by one dispatching thread at a time, without the lock held.
//! - Each listener sees the edges of an id alternate, starting from the
//!   replay it was handed on subscribe.
//! - A listener may call back into the bus; what it publishes or retracts
//!   is delivered after its callback returns.
//! - `published` fires on the first registration of an id, `retracted` when
//!   its last registration closes.

use log::{debug, info};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

/// Observer of condition publication.
pub trait ConditionListener: Send + Sync {
    fn condition_published(&self, condition_id: &str);
    fn condition_retracted(&self, condition_id: &str);
}

/// Opaque subscription handle returned by [`ConditionBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Published,
    Retracted,
}

struct Notice {
    subscription: SubscriptionId,
    listener: Arc<dyn ConditionListener>,
    condition_id: String,
    edge: Edge,
}

impl Notice {
    fn deliver(&self) {
        match self.edge {
            Edge::Published => self.listener.condition_published(&self.condition_id),
            Edge::Retracted => self.listener.condition_retracted(&self.condition_id),
        }
    }
}

#[derive(Default)]
struct BusState {
    published: BTreeMap<String, usize>,
    listeners: Vec<(SubscriptionId, Arc<dyn ConditionListener>)>,
    next_subscription: u64,
    pending: VecDeque<Notice>,
    queued: u64,
    delivered: u64,
    dispatcher: Option<ThreadId>,
}

impl BusState {
    fn enqueue(&mut self, notice: Notice) {
        self.pending.push_back(notice);
        self.queued += 1;
    }

    fn enqueue_for_all(&mut self, condition_id: &str, edge: Edge) {
        let notices: Vec<Notice> = self
            .listeners
            .iter()
            .map(|(subscription, listener)| Notice {
                subscription: *subscription,
                listener: Arc::clone(listener),
                condition_id: condition_id.to_string(),
                edge,
            })
            .collect();
        for notice in notices {
            self.enqueue(notice);
        }
    }

    fn is_subscribed(&self, subscription: SubscriptionId) -> bool {
        self.listeners.iter().any(|(id, _)| *id == subscription)
    }
}

#[derive(Default)]
struct BusInner {
    state: Mutex<BusState>,
    progress: Condvar,
}

impl BusInner {
    fn publish_deferred(&self, condition_id: &str) {
        let mut state = self.state.lock();
        let count = state.published.entry(condition_id.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            state.enqueue_for_all(condition_id, Edge::Published);
            info!("event=condition_publish module=condition status=ok condition_id={condition_id}");
        } else {
            debug!("event=condition_publish module=condition status=noop condition_id={condition_id}");
        }
    }

    fn retract_deferred(&self, condition_id: &str) {
        let mut state = self.state.lock();
        let Some(count) = state.published.get_mut(condition_id) else {
            return;
        };
        *count -= 1;
        if *count > 0 {
            return;
        }
        state.published.remove(condition_id);
        state.enqueue_for_all(condition_id, Edge::Retracted);
        info!("event=condition_retract module=condition status=ok condition_id={condition_id}");
    }

    /// Returns once everything queued before the call has been delivered.
    ///
    /// Called from inside a callback it returns at once; the running
    /// dispatch loop picks up the new notices.
    fn dispatch(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        let target = state.queued;
        loop {
            let dispatcher = state.dispatcher;
            match dispatcher {
                Some(owner) if owner == me => return,
                Some(_) if state.delivered >= target => return,
                Some(_) => self.progress.wait(&mut state),
                None => break,
            }
        }
        if state.pending.is_empty() {
            return;
        }

        state.dispatcher = Some(me);
        while let Some(notice) = state.pending.pop_front() {
            if state.is_subscribed(notice.subscription) {
                MutexGuard::unlocked(&mut state, || notice.deliver());
            }
            state.delivered += 1;
            self.progress.notify_all();
        }
        state.dispatcher = None;
        self.progress.notify_all();
    }
}

/// Process-wide publication point for capability conditions.
///
/// Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct ConditionBus {
    inner: Arc<BusInner>,
}

impl ConditionBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `condition_id` and returns the registration that owns it.
    ///
    /// Listeners have observed the publication when this returns, unless
    /// the caller is itself running inside a listener callback.
    pub fn publish(&self, condition_id: &str) -> ConditionRegistration {
        let registration = self.publish_deferred(condition_id);
        self.inner.dispatch();
        registration
    }

    /// Queues the publication without delivering it; see [`Self::dispatch_pending`].
    pub(crate) fn publish_deferred(&self, condition_id: &str) -> ConditionRegistration {
        self.inner.publish_deferred(condition_id);
        ConditionRegistration {
            condition_id: condition_id.to_string(),
            bus: Arc::downgrade(&self.inner),
            closed: false,
        }
    }

    /// Delivers every notice queued so far.
    pub(crate) fn dispatch_pending(&self) {
        self.inner.dispatch();
    }

    /// Whether at least one registration for `condition_id` is open.
    pub fn is_published(&self, condition_id: &str) -> bool {
        self.inner.state.lock().published.contains_key(condition_id)
    }

    /// Currently published ids, sorted.
    pub fn published(&self) -> Vec<String> {
        self.inner.state.lock().published.keys().cloned().collect()
    }

    /// Adds `listener` and replays every currently published id to it.
    ///
    /// The replay is queued together with the subscription, so an id
    /// retracted concurrently reaches the listener as `published` then
    /// `retracted`, never the other way round.
    pub fn subscribe(&self, listener: Arc<dyn ConditionListener>) -> SubscriptionId {
        let id = {
            let mut state = self.inner.state.lock();
            let id = SubscriptionId(state.next_subscription);
            state.next_subscription += 1;
            state.listeners.push((id, Arc::clone(&listener)));
            let published: Vec<String> = state.published.keys().cloned().collect();
            for condition_id in published {
                state.enqueue(Notice {
                    subscription: id,
                    listener: Arc::clone(&listener),
                    condition_id,
                    edge: Edge::Published,
                });
            }
            id
        };
        self.inner.dispatch();
        id
    }

    /// Removes a listener; returns `false` when it was not subscribed.
    ///
    /// Notices still queued for the listener are dropped.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.inner.state.lock();
        let before = state.listeners.len();
        state.listeners.retain(|(candidate, _)| *candidate != id);
        state.listeners.len() != before
    }
}

/// Live publication of one condition id.
///
/// Closing (or dropping) the registration retracts the publication.
pub struct ConditionRegistration {
    condition_id: String,
    bus: Weak<BusInner>,
    closed: bool,
}

impl ConditionRegistration {
    pub fn condition_id(&self) -> &str {
        &self.condition_id
    }

    /// Retracts the publication; dependents observe it before this returns
    /// unless called from inside a listener callback.
    pub fn close(mut self) {
        if let Some(bus) = self.retract_once() {
            bus.dispatch();
        }
    }

    /// Queues the retraction without delivering it.
    pub(crate) fn close_deferred(mut self) {
        self.retract_once();
    }

    fn retract_once(&mut self) -> Option<Arc<BusInner>> {
        if self.closed {
            return None;
        }
        self.closed = true;
        let bus = self.bus.upgrade()?;
        bus.retract_deferred(&self.condition_id);
        Some(bus)
    }
}

impl Drop for ConditionRegistration {
    fn drop(&mut self) {
        if let Some(bus) = self.retract_once() {
            bus.dispatch();
        }
    }
}

impl std::fmt::Debug for ConditionRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionRegistration")
            .field("condition_id", &self.condition_id)
            .field("closed", &self.closed)
            .finish()
    }
}
