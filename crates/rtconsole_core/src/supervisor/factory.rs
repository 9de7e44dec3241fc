//! Supervisor category activation.
//!
//! # Responsibility
//! - Own at most one condition registration per supervisor category.
//! - Expose idempotent activate/deactivate and a make-before-break switch.
//!
//! # Invariants
//! - Every decision is taken under the slot lock and queued on the bus
//!   before the lock is released, so dependents observe decisions in the
//!   order they were taken.
//! - The slot lock is never held while listeners run; a listener may query
//!   or drive the factory.
//! - `switch` commits both edges at once: concurrent switches leave
//!   exactly one category active.

use crate::condition::{ConditionBus, ConditionRegistration};
use crate::supervisor::SupervisorCategory;
use log::{debug, info};
use parking_lot::Mutex;

type Slots = [Option<ConditionRegistration>; 2];

/// Selects which supervisor categories are active.
pub struct SupervisorFactory {
    bus: ConditionBus,
    slots: Mutex<Slots>,
}

impl SupervisorFactory {
    pub fn new(bus: ConditionBus) -> Self {
        Self {
            bus,
            slots: Mutex::new([None, None]),
        }
    }

    pub fn bus(&self) -> &ConditionBus {
        &self.bus
    }

    fn open_slot(&self, slots: &mut Slots, category: SupervisorCategory) -> bool {
        let slot = &mut slots[category.slot_index()];
        if slot.is_some() {
            return false;
        }
        *slot = Some(self.bus.publish_deferred(category.condition_id()));
        true
    }

    fn close_slot(slots: &mut Slots, category: SupervisorCategory) -> bool {
        match slots[category.slot_index()].take() {
            Some(registration) => {
                registration.close_deferred();
                true
            }
            None => false,
        }
    }

    /// Publishes the category condition unless it is already active.
    ///
    /// Returns `true` when this call performed the transition.
    pub fn activate(&self, category: SupervisorCategory) -> bool {
        let activated = self.open_slot(&mut self.slots.lock(), category);
        self.bus.dispatch_pending();
        if activated {
            info!("event=supervisor_activate module=factory status=ok category={category}");
        } else {
            debug!("event=supervisor_activate module=factory status=noop category={category}");
        }
        activated
    }

    /// Retracts the category condition when active.
    ///
    /// Returns `true` when this call performed the transition.
    pub fn deactivate(&self, category: SupervisorCategory) -> bool {
        let deactivated = Self::close_slot(&mut self.slots.lock(), category);
        self.bus.dispatch_pending();
        if deactivated {
            info!("event=supervisor_deactivate module=factory status=ok category={category}");
        } else {
            debug!("event=supervisor_deactivate module=factory status=noop category={category}");
        }
        deactivated
    }

    /// Moves from `from` to `to`. The new category is published before the
    /// old one is retracted, and both happen under one slot lock, so no
    /// observer of the factory sees neither active.
    pub fn switch(&self, from: SupervisorCategory, to: SupervisorCategory) {
        {
            let mut slots = self.slots.lock();
            self.open_slot(&mut slots, to);
            if from != to {
                Self::close_slot(&mut slots, from);
            }
        }
        self.bus.dispatch_pending();
        info!("event=supervisor_switch module=factory status=ok from={from} to={to}");
    }

    /// Whether the category is active as of the last committed decision.
    pub fn is_active(&self, category: SupervisorCategory) -> bool {
        self.slots.lock()[category.slot_index()].is_some()
    }

    /// Active categories in declaration order.
    pub fn active_categories(&self) -> Vec<SupervisorCategory> {
        let slots = self.slots.lock();
        SupervisorCategory::ALL
            .into_iter()
            .filter(|category| slots[category.slot_index()].is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::SupervisorFactory;
    use crate::condition::{ConditionBus, ConditionListener};
    use crate::supervisor::SupervisorCategory;
    use parking_lot::Mutex;
    use std::sync::{Arc, Weak};

    /// Queries the factory from inside its own notifications.
    struct Inspector {
        factory: Weak<SupervisorFactory>,
        seen: Mutex<Vec<(String, Vec<SupervisorCategory>)>>,
        retract_on_publish: bool,
    }

    impl Inspector {
        fn attach(factory: &Arc<SupervisorFactory>, retract_on_publish: bool) -> Arc<Self> {
            let inspector = Arc::new(Self {
                factory: Arc::downgrade(factory),
                seen: Mutex::new(Vec::new()),
                retract_on_publish,
            });
            factory.bus().subscribe(inspector.clone());
            inspector
        }

        fn record(&self, event: String) {
            if let Some(factory) = self.factory.upgrade() {
                self.seen.lock().push((event, factory.active_categories()));
            }
        }
    }

    impl ConditionListener for Inspector {
        fn condition_published(&self, condition_id: &str) {
            self.record(format!("+{condition_id}"));
            if self.retract_on_publish {
                if let Some(factory) = self.factory.upgrade() {
                    factory.deactivate(SupervisorCategory::LiveRpc);
                }
            }
        }

        fn condition_retracted(&self, condition_id: &str) {
            self.record(format!("-{condition_id}"));
        }
    }

    #[test]
    fn activate_is_idempotent() {
        let factory = SupervisorFactory::new(ConditionBus::new());
        assert!(factory.activate(SupervisorCategory::LiveRpc));
        assert!(!factory.activate(SupervisorCategory::LiveRpc));
        assert_eq!(factory.bus().published(), vec!["rpc-agent"]);
    }

    #[test]
    fn deactivate_is_idempotent() {
        let factory = SupervisorFactory::new(ConditionBus::new());
        assert!(!factory.deactivate(SupervisorCategory::Snapshot));
        factory.activate(SupervisorCategory::Snapshot);
        assert!(factory.deactivate(SupervisorCategory::Snapshot));
        assert!(!factory.deactivate(SupervisorCategory::Snapshot));
        assert!(factory.bus().published().is_empty());
    }

    #[test]
    fn categories_are_independent() {
        let factory = SupervisorFactory::new(ConditionBus::new());
        factory.activate(SupervisorCategory::LiveRpc);
        factory.activate(SupervisorCategory::Snapshot);
        assert_eq!(
            factory.active_categories(),
            vec![SupervisorCategory::LiveRpc, SupervisorCategory::Snapshot]
        );

        factory.deactivate(SupervisorCategory::LiveRpc);
        assert_eq!(factory.active_categories(), vec![SupervisorCategory::Snapshot]);
    }

    #[test]
    fn dropping_factory_retracts_conditions() {
        let bus = ConditionBus::new();
        {
            let factory = SupervisorFactory::new(bus.clone());
            factory.activate(SupervisorCategory::LiveRpc);
            assert!(bus.is_published("rpc-agent"));
        }
        assert!(!bus.is_published("rpc-agent"));
    }

    #[test]
    fn listener_can_query_factory_during_notification() {
        let factory = Arc::new(SupervisorFactory::new(ConditionBus::new()));
        let inspector = Inspector::attach(&factory, false);

        factory.activate(SupervisorCategory::LiveRpc);
        factory.switch(SupervisorCategory::LiveRpc, SupervisorCategory::Snapshot);

        let snapshot = vec![SupervisorCategory::Snapshot];
        assert_eq!(
            *inspector.seen.lock(),
            vec![
                ("+rpc-agent".to_string(), vec![SupervisorCategory::LiveRpc]),
                ("+snapshot-agent".to_string(), snapshot.clone()),
                ("-rpc-agent".to_string(), snapshot),
            ]
        );
    }

    #[test]
    fn listener_can_deactivate_during_notification() {
        let factory = Arc::new(SupervisorFactory::new(ConditionBus::new()));
        let inspector = Inspector::attach(&factory, true);

        assert!(factory.activate(SupervisorCategory::LiveRpc));

        assert!(!factory.is_active(SupervisorCategory::LiveRpc));
        assert!(factory.bus().published().is_empty());
        let events: Vec<String> = inspector
            .seen
            .lock()
            .iter()
            .map(|(event, _)| event.clone())
            .collect();
        assert_eq!(events, vec!["+rpc-agent", "-rpc-agent"]);
    }
}
