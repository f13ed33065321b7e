//! Event bus - synchronous, single-writer, multi-reader fan-out.
//!
//! # Delivery semantics
//!
//! - **Snapshot iteration**: `publish` works on a copy of the subscription
//!   list, so handlers may subscribe or unsubscribe (themselves or others)
//!   while being dispatched to. A subscription removed mid-dispatch is not
//!   called for the rest of that publish; one added mid-dispatch first
//!   hears the next event.
//! - **Latest value, not queued**: there is no log and no replay. Each
//!   subscription keeps only its last delivered event.
//! - **Isolation**: a handler that errors, panics, or is re-entered is
//!   reported in the [`DispatchReport`] and logged; every other matching
//!   subscriber still receives the event.
//!
//! Handlers that need to reach the bus from inside a callback should
//! capture a `Weak<EventBus>` to avoid a reference cycle.

use crate::error::EngineError;
use crate::event::{DomainEvent, EventFilter};
use crate::registry::{Handler, SubscriptionInfo, SubscriptionRegistry};
use pulse_env::{EventId, SubscriptionId};
use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

/// Outcome of one `publish` call.
#[derive(Debug)]
pub struct DispatchReport {
    /// Event that was published
    pub event: EventId,

    /// Subscriptions whose filter matched at publish time
    pub matched: usize,

    /// Handlers that ran and returned Ok
    pub delivered: usize,

    /// Isolated per-subscriber failures
    pub failures: Vec<EngineError>,
}

impl DispatchReport {
    /// True if no subscriber failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fan-out point between the generator and every consumer.
pub struct EventBus {
    registry: RefCell<SubscriptionRegistry>,

    /// Events published over the bus lifetime
    published: Cell<u64>,
}

impl EventBus {
    /// Creates a bus with no subscribers.
    pub fn new() -> Self {
        Self {
            registry: RefCell::new(SubscriptionRegistry::new()),
            published: Cell::new(0),
        }
    }

    /// Registers a handler for events passing `filter`.
    ///
    /// The subscription only sees events published after this call.
    pub fn subscribe<F>(&self, filter: impl Into<EventFilter>, handler: F) -> SubscriptionId
    where
        F: FnMut(&DomainEvent) -> anyhow::Result<()> + 'static,
    {
        let filter = filter.into();
        let boxed: Handler = Box::new(handler);
        let id = self.registry.borrow_mut().register(filter, boxed);
        debug!(%id, ?filter, "Subscribed");
        id
    }

    /// Removes a subscription. Unknown or already removed ids are a no-op.
    ///
    /// Returns true if a subscription was actually removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.registry.borrow_mut().remove(id);
        if removed {
            debug!(%id, "Unsubscribed");
        }
        removed
    }

    /// Delivers `event` to every matching subscription.
    pub fn publish(&self, event: &DomainEvent) -> DispatchReport {
        self.published.set(self.published.get() + 1);

        let targets = self.registry.borrow().snapshot();
        let mut report = DispatchReport {
            event: event.id,
            matched: 0,
            delivered: 0,
            failures: Vec::new(),
        };

        for target in targets.into_iter().filter(|t| t.filter.matches(event)) {
            report.matched += 1;

            // Unsubscribed by an earlier handler in this same dispatch
            if !self.registry.borrow().contains(target.id) {
                continue;
            }

            let Ok(mut handler) = target.handler.try_borrow_mut() else {
                report.failures.push(EngineError::ReentrantDispatch {
                    subscription: target.id,
                    event: event.id,
                });
                continue;
            };
            let outcome = catch_unwind(AssertUnwindSafe(|| (&mut **handler)(event)));
            drop(handler);

            self.registry.borrow_mut().record_delivery(target.id, event);

            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(err)) => report
                    .failures
                    .push(EngineError::handler(target.id, event.id, format!("{:#}", err))),
                Err(_) => report.failures.push(EngineError::HandlerPanicked {
                    subscription: target.id,
                    event: event.id,
                }),
            }
        }

        for failure in &report.failures {
            warn!(error = %failure, "Delivery failed; continuing with remaining subscribers");
        }
        report
    }

    /// Latest event delivered to a subscription, if any.
    pub fn last_delivered(&self, id: SubscriptionId) -> Option<DomainEvent> {
        self.registry.borrow().info(id).and_then(|info| info.last_delivered)
    }

    /// Whether a subscription is live.
    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.registry.borrow().contains(id)
    }

    /// Read-only view of all live subscriptions.
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.registry.borrow().infos()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.registry.borrow().len()
    }

    /// Events published over the bus lifetime.
    pub fn published_count(&self) -> u64 {
        self.published.get()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CallDirection, EventKind, EventPayload, MetricUpdate, NewCall};
    use std::rc::Rc;
    use std::time::Duration;

    fn metric(id: u64) -> DomainEvent {
        DomainEvent::new(
            EventId(id),
            Duration::from_millis(id * 1000),
            EventPayload::MetricUpdate(MetricUpdate {
                metric: "total_calls".to_string(),
                value: 10,
                change_pct: 1.0,
            }),
        )
    }

    fn new_call(id: u64) -> DomainEvent {
        DomainEvent::new(
            EventId(id),
            Duration::from_millis(id * 1000),
            EventPayload::NewCall(NewCall {
                call_id: format!("CALL-{:04}", id),
                patient_name: "Sarah Brown".to_string(),
                direction: CallDirection::Inbound,
                reason: "Refill Request".to_string(),
            }),
        )
    }

    fn recorder(
        bus: &EventBus,
        filter: EventFilter,
    ) -> (SubscriptionId, Rc<RefCell<Vec<EventId>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let id = bus.subscribe(filter, move |event: &DomainEvent| {
            sink.borrow_mut().push(event.id);
            Ok(())
        });
        (id, seen)
    }

    #[test]
    fn test_fan_out_to_all_matching() {
        let bus = EventBus::new();
        let (_, all_a) = recorder(&bus, EventFilter::All);
        let (_, all_b) = recorder(&bus, EventFilter::All);
        let (_, calls) = recorder(&bus, EventKind::NewCall.into());

        let report = bus.publish(&metric(1));
        assert_eq!(report.matched, 2);
        assert_eq!(report.delivered, 2);
        bus.publish(&new_call(2));

        assert_eq!(*all_a.borrow(), vec![EventId(1), EventId(2)]);
        assert_eq!(*all_b.borrow(), vec![EventId(1), EventId(2)]);
        assert_eq!(*calls.borrow(), vec![EventId(2)]);
    }

    #[test]
    fn test_late_subscriber_gets_no_history() {
        let bus = EventBus::new();
        for id in 1..=3 {
            bus.publish(&metric(id));
        }
        let (sub, seen) = recorder(&bus, EventFilter::All);
        assert_eq!(bus.last_delivered(sub), None);

        bus.publish(&metric(4));
        assert_eq!(*seen.borrow(), vec![EventId(4)]);
        assert_eq!(bus.last_delivered(sub).map(|e| e.id), Some(EventId(4)));
    }

    #[test]
    fn test_failing_handler_is_isolated() {
        let bus = EventBus::new();
        let bad = bus.subscribe(EventFilter::All, |_: &DomainEvent| {
            Err(anyhow::anyhow!("render failed"))
        });
        let (_, seen) = recorder(&bus, EventFilter::All);

        let report = bus.publish(&metric(1));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0],
            EngineError::HandlerFailed { subscription, .. } if subscription == bad
        ));
        assert_eq!(*seen.borrow(), vec![EventId(1)]);
        // Failing subscribers stay attached
        assert!(bus.is_subscribed(bad));
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let bus = EventBus::new();
        bus.subscribe(EventFilter::All, |_: &DomainEvent| -> anyhow::Result<()> {
            panic!("handler bug")
        });
        let (_, seen) = recorder(&bus, EventFilter::All);

        let report = bus.publish(&metric(1));
        assert!(matches!(report.failures[0], EngineError::HandlerPanicked { .. }));
        bus.publish(&metric(2));
        assert_eq!(*seen.borrow(), vec![EventId(1), EventId(2)]);
    }

    #[test]
    fn test_unsubscribe_self_during_dispatch() {
        let bus = Rc::new(EventBus::new());
        let weak = Rc::downgrade(&bus);
        let own_id: Rc<Cell<Option<SubscriptionId>>> = Rc::new(Cell::new(None));
        let own = Rc::clone(&own_id);
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);

        let id = bus.subscribe(EventFilter::All, move |_: &DomainEvent| {
            counter.set(counter.get() + 1);
            if let (Some(bus), Some(id)) = (weak.upgrade(), own.get()) {
                bus.unsubscribe(id);
            }
            Ok(())
        });
        own_id.set(Some(id));
        let (_, seen) = recorder(&bus, EventFilter::All);

        bus.publish(&metric(1));
        bus.publish(&metric(2));

        assert_eq!(calls.get(), 1);
        assert_eq!(*seen.borrow(), vec![EventId(1), EventId(2)]);
        assert!(!bus.is_subscribed(id));
    }

    #[test]
    fn test_unsubscribe_other_during_dispatch_skips_it() {
        let bus = Rc::new(EventBus::new());
        let weak = Rc::downgrade(&bus);
        let victim: Rc<Cell<Option<SubscriptionId>>> = Rc::new(Cell::new(None));
        let target = Rc::clone(&victim);

        bus.subscribe(EventFilter::All, move |_: &DomainEvent| {
            if let (Some(bus), Some(id)) = (weak.upgrade(), target.get()) {
                bus.unsubscribe(id);
            }
            Ok(())
        });
        let (victim_id, seen) = recorder(&bus, EventFilter::All);
        victim.set(Some(victim_id));

        bus.publish(&metric(1));
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_reentrant_publish_is_reported() {
        let bus = Rc::new(EventBus::new());
        let weak = Rc::downgrade(&bus);
        let nested_failures = Rc::new(Cell::new(0usize));
        let sink = Rc::clone(&nested_failures);

        bus.subscribe(EventFilter::Kind(EventKind::NewCall), move |event: &DomainEvent| {
            if let Some(bus) = weak.upgrade() {
                let echo =
                    DomainEvent::new(EventId(100), event.virtual_timestamp, event.payload.clone());
                sink.set(bus.publish(&echo).failures.len());
            }
            Ok(())
        });

        let report = bus.publish(&new_call(1));
        assert!(report.is_clean());
        assert_eq!(nested_failures.get(), 1);
    }

    #[test]
    fn test_unknown_unsubscribe_is_noop() {
        let bus = EventBus::new();
        assert!(!bus.unsubscribe(SubscriptionId(42)));
        let (id, _) = recorder(&bus, EventFilter::All);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
