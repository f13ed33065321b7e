//! Subscription registry - who is listening, with what filter, and what
//! they last received.
//!
//! Owned exclusively by the [`EventBus`](crate::bus::EventBus); consumers
//! only ever see [`SubscriptionInfo`] copies.

use crate::event::{DomainEvent, EventFilter};
use pulse_env::SubscriptionId;
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;

/// Subscriber callback. Errors are isolated by the bus.
pub type Handler = Box<dyn FnMut(&DomainEvent) -> anyhow::Result<()>>;

/// Shared handle to a handler, so dispatch can run it without holding the
/// registry borrowed.
pub(crate) type SharedHandler = Rc<RefCell<Handler>>;

struct SubscriptionEntry {
    id: SubscriptionId,
    filter: EventFilter,
    handler: SharedHandler,
    last_delivered: Option<DomainEvent>,
}

/// Read-only view of a live subscription.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub filter: EventFilter,
    pub last_delivered: Option<DomainEvent>,
}

/// One dispatch target captured at the start of `publish`.
pub(crate) struct DispatchTarget {
    pub id: SubscriptionId,
    pub filter: EventFilter,
    pub handler: SharedHandler,
}

/// The list of active subscriptions.
#[derive(Default)]
pub(crate) struct SubscriptionRegistry {
    /// Entries in subscription order
    entries: Vec<SubscriptionEntry>,

    /// Next id to hand out; ids are never reused
    next_id: u64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscription and returns its fresh id.
    pub fn register(&mut self, filter: EventFilter, handler: Handler) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.push(SubscriptionEntry {
            id,
            filter,
            handler: Rc::new(RefCell::new(handler)),
            last_delivered: None,
        });
        id
    }

    /// Removes a subscription. Returns false if it was already gone.
    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }

    /// Copies the current targets; later registry changes do not affect it.
    pub fn snapshot(&self) -> Vec<DispatchTarget> {
        self.entries
            .iter()
            .map(|entry| DispatchTarget {
                id: entry.id,
                filter: entry.filter,
                handler: Rc::clone(&entry.handler),
            })
            .collect()
    }

    /// Stores `event` as the subscription's latest value, if it still exists.
    pub fn record_delivery(&mut self, id: SubscriptionId, event: &DomainEvent) {
        if let Some(entry) = self.entries.iter_mut().find(|entry| entry.id == id) {
            entry.last_delivered = Some(event.clone());
        }
    }

    pub fn info(&self, id: SubscriptionId) -> Option<SubscriptionInfo> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(SubscriptionEntry::info)
    }

    pub fn infos(&self) -> Vec<SubscriptionInfo> {
        self.entries.iter().map(SubscriptionEntry::info).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl SubscriptionEntry {
    fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            id: self.id,
            filter: self.filter,
            last_delivered: self.last_delivered.clone(),
        }
    }
}
