//! Bundled bus consumers: a recent-events feed and live KPI counters.
//!
//! Both attach like any external consumer would, through
//! [`EventBus::subscribe`], and keep their state private behind a handle.

use crate::bus::EventBus;
use crate::event::{DomainEvent, EventFilter, EventPayload, Resolution, Severity};
use pulse_env::SubscriptionId;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

/// Bounded newest-first feed of delivered events.
#[derive(Clone)]
pub struct RecentEvents {
    events: Rc<RefCell<VecDeque<DomainEvent>>>,
    subscription: SubscriptionId,
}

impl RecentEvents {
    /// Subscribes a feed keeping at most `capacity` events.
    pub fn attach(bus: &EventBus, filter: EventFilter, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let events = Rc::new(RefCell::new(VecDeque::with_capacity(capacity)));
        let sink = Rc::clone(&events);
        let subscription = bus.subscribe(filter, move |event: &DomainEvent| {
            let mut feed = sink.borrow_mut();
            feed.push_front(event.clone());
            feed.truncate(capacity);
            Ok(())
        });
        Self {
            events,
            subscription,
        }
    }

    /// Events newest first.
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.borrow().iter().cloned().collect()
    }

    /// Most recent event.
    pub fn latest(&self) -> Option<DomainEvent> {
        self.events.borrow().front().cloned()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    /// Forgets everything seen so far.
    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }
}

/// Latest reading of one metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricReading {
    pub value: u32,
    pub change_pct: f64,
}

/// Snapshot of the live KPI counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KpiSnapshot {
    /// Calls started and not yet completed
    pub active_calls: u64,
    pub calls_started: u64,
    pub calls_resolved: u64,
    pub calls_escalated: u64,
    pub patient_updates: u64,
    pub frictions: BTreeMap<Severity, u64>,
    pub metrics: BTreeMap<String, MetricReading>,
}

impl KpiSnapshot {
    fn apply(&mut self, event: &DomainEvent) {
        match &event.payload {
            EventPayload::NewCall(_) => {
                self.calls_started += 1;
                self.active_calls += 1;
            }
            EventPayload::CallCompleted(done) => {
                self.active_calls = self.active_calls.saturating_sub(1);
                match done.resolution {
                    Resolution::Resolved => self.calls_resolved += 1,
                    Resolution::Escalated => self.calls_escalated += 1,
                }
            }
            EventPayload::PatientUpdated(_) => self.patient_updates += 1,
            EventPayload::FrictionDetected(friction) => {
                *self.frictions.entry(friction.severity).or_insert(0) += 1;
            }
            EventPayload::MetricUpdate(metric) => {
                self.metrics.insert(
                    metric.metric.clone(),
                    MetricReading {
                        value: metric.value,
                        change_pct: metric.change_pct,
                    },
                );
            }
        }
    }

    /// Total frictions across severities.
    pub fn friction_total(&self) -> u64 {
        self.frictions.values().sum()
    }
}

/// Live KPI counters fed by every event.
#[derive(Clone)]
pub struct LiveCounters {
    snapshot: Rc<RefCell<KpiSnapshot>>,
    subscription: SubscriptionId,
}

impl LiveCounters {
    pub fn attach(bus: &EventBus) -> Self {
        let snapshot = Rc::new(RefCell::new(KpiSnapshot::default()));
        let sink = Rc::clone(&snapshot);
        let subscription = bus.subscribe(EventFilter::All, move |event: &DomainEvent| {
            sink.borrow_mut().apply(event);
            Ok(())
        });
        Self {
            snapshot,
            subscription,
        }
    }

    pub fn snapshot(&self) -> KpiSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        *self.snapshot.borrow_mut() = KpiSnapshot::default();
    }

    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }
}
