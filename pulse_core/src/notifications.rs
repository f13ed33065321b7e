//! Notification lifecycle manager.
//!
//! Turns bus deliveries into a capped, newest-first, auto-expiring toast
//! queue:
//!
//! ```text
//!   deliver ──► Visible ──(ttl)──► Fading ──(fade)──► Removed
//!                  │                  ▲
//!                  └──(dismiss)───────┘
//!   insert beyond capacity: oldest ──► Removed (no fade)
//! ```
//!
//! Expiry runs on **wall-clock** time from the [`DemoContext`], never on
//! virtual time, so a toast stays readable for its full lifetime at any
//! acceleration. Timers are explicit [`TimerQueue`] handles owned here, so
//! `clear()` cancels all of them synchronously.

use crate::bus::EventBus;
use crate::config::EngineConfig;
use crate::event::{millis, DomainEvent, EventFilter, EventKind};
use crate::timers::{TimerHandle, TimerQueue};
use pulse_env::{DemoContext, EventId, NotificationId, SubscriptionId};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Transitions kept for `take_transitions` before the oldest are dropped.
const TRANSITION_LOG_CAPACITY: usize = 256;

/// Lifecycle state of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationState {
    Visible,
    Fading,
    Removed,
}

/// UI-facing projection of a delivered event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub source_event_id: EventId,
    pub source_kind: EventKind,
    /// Toast text
    pub headline: String,
    pub state: NotificationState,
    #[serde(with = "millis")]
    pub created_at: Duration,
    #[serde(with = "millis")]
    pub expires_at: Duration,
}

/// Why a notification changed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCause {
    Delivered,
    Expired,
    Dismissed,
    FadeFinished,
    Evicted,
    Cleared,
}

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationTransition {
    pub id: NotificationId,
    pub state: NotificationState,
    pub cause: TransitionCause,
    #[serde(with = "millis")]
    pub at: Duration,
}

/// Lifetime counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationStats {
    pub created: u64,
    pub expired: u64,
    pub dismissed: u64,
    pub evicted: u64,
    pub cleared: u64,
    /// Highest Visible + Fading count ever observed
    pub peak_active: usize,
}

#[derive(Debug, Clone, Copy)]
enum TimerAction {
    BeginFade(NotificationId),
    Remove(NotificationId),
}

#[derive(Debug)]
struct Slot {
    record: NotificationRecord,
    timer: Option<TimerHandle>,
}

/// Timing and capacity knobs, taken from [`EngineConfig`].
#[derive(Debug, Clone, Copy)]
struct Policy {
    ttl: Duration,
    fade: Duration,
    capacity: usize,
}

/// The notification list and its timers.
#[derive(Debug)]
struct NotificationQueue {
    policy: Policy,

    /// Visible and Fading records, newest first
    slots: VecDeque<Slot>,

    timers: TimerQueue<TimerAction>,
    next_id: u64,
    stats: NotificationStats,
    transitions: VecDeque<NotificationTransition>,
}

impl NotificationQueue {
    fn new(policy: Policy) -> Self {
        Self {
            policy,
            slots: VecDeque::new(),
            timers: TimerQueue::new(),
            next_id: 0,
            stats: NotificationStats::default(),
            transitions: VecDeque::new(),
        }
    }

    fn push(&mut self, event: &DomainEvent, now: Duration) -> NotificationId {
        self.fire_due(now);

        self.next_id += 1;
        let id = NotificationId(self.next_id);
        let expires_at = now.saturating_add(self.policy.ttl);
        let timer = self.timers.schedule(expires_at, TimerAction::BeginFade(id));

        self.slots.push_front(Slot {
            record: NotificationRecord {
                id,
                source_event_id: event.id,
                source_kind: event.kind,
                headline: event.headline(),
                state: NotificationState::Visible,
                created_at: now,
                expires_at,
            },
            timer: Some(timer),
        });
        self.stats.created += 1;
        self.log(id, NotificationState::Visible, TransitionCause::Delivered, now);

        while self.slots.len() > self.policy.capacity {
            if let Some(oldest) = self.slots.pop_back() {
                if let Some(timer) = oldest.timer {
                    self.timers.cancel(timer);
                }
                self.stats.evicted += 1;
                self.log(
                    oldest.record.id,
                    NotificationState::Removed,
                    TransitionCause::Evicted,
                    now,
                );
            }
        }
        self.stats.peak_active = self.stats.peak_active.max(self.slots.len());
        id
    }

    fn dismiss(&mut self, id: NotificationId, now: Duration) -> bool {
        self.fire_due(now);

        let fade = self.policy.fade;
        let Some(slot) = self.slots.iter_mut().find(|slot| slot.record.id == id) else {
            return false;
        };
        if slot.record.state != NotificationState::Visible {
            return false;
        }
        if let Some(timer) = slot.timer.take() {
            self.timers.cancel(timer);
        }
        slot.record.state = NotificationState::Fading;
        slot.timer = Some(self.timers.schedule(now.saturating_add(fade), TimerAction::Remove(id)));

        self.stats.dismissed += 1;
        self.log(id, NotificationState::Fading, TransitionCause::Dismissed, now);
        true
    }

    /// Runs every timer due at `now`, including ones scheduled by earlier
    /// timers in the same pass.
    fn fire_due(&mut self, now: Duration) -> usize {
        let mut fired = 0;
        while let Some((_, deadline, action)) = self.timers.pop_due(now) {
            fired += 1;
            match action {
                TimerAction::BeginFade(id) => {
                    let fade = self.policy.fade;
                    let remove_at = deadline.saturating_add(fade);
                    if let Some(slot) = self.slots.iter_mut().find(|slot| slot.record.id == id) {
                        slot.record.state = NotificationState::Fading;
                        slot.timer = Some(self.timers.schedule(remove_at, TimerAction::Remove(id)));
                        self.stats.expired += 1;
                        self.log(id, NotificationState::Fading, TransitionCause::Expired, deadline);
                    }
                }
                TimerAction::Remove(id) => {
                    if let Some(index) = self.slots.iter().position(|slot| slot.record.id == id) {
                        self.slots.remove(index);
                        self.log(
                            id,
                            NotificationState::Removed,
                            TransitionCause::FadeFinished,
                            deadline,
                        );
                    }
                }
            }
        }
        fired
    }

    fn clear(&mut self, now: Duration) -> usize {
        let cancelled = self.timers.cancel_all();
        let ids: Vec<NotificationId> = self.slots.drain(..).map(|slot| slot.record.id).collect();
        for id in &ids {
            self.log(*id, NotificationState::Removed, TransitionCause::Cleared, now);
        }
        self.stats.cleared += ids.len() as u64;
        debug!(cleared = ids.len(), cancelled, "Cleared notifications");
        ids.len()
    }

    fn state_of(&self, id: NotificationId) -> Option<NotificationState> {
        if let Some(slot) = self.slots.iter().find(|slot| slot.record.id == id) {
            return Some(slot.record.state);
        }
        (id.0 >= 1 && id.0 <= self.next_id).then_some(NotificationState::Removed)
    }

    fn log(
        &mut self,
        id: NotificationId,
        state: NotificationState,
        cause: TransitionCause,
        at: Duration,
    ) {
        debug!(%id, ?state, ?cause, at_ms = at.as_millis() as u64, "Notification transition");
        if self.transitions.len() == TRANSITION_LOG_CAPACITY {
            self.transitions.pop_front();
        }
        self.transitions.push_back(NotificationTransition { id, state, cause, at });
    }
}

/// Bus consumer that owns the toast queue.
///
/// Cloning yields another handle to the same queue.
pub struct NotificationCenter<Ctx: DemoContext> {
    queue: Rc<RefCell<NotificationQueue>>,
    context: Arc<Ctx>,
    subscription: SubscriptionId,
}

impl<Ctx: DemoContext> NotificationCenter<Ctx> {
    /// Subscribes a new notification queue to every event on `bus`.
    pub fn attach(bus: &EventBus, context: Arc<Ctx>, config: &EngineConfig) -> Self {
        let queue = Rc::new(RefCell::new(NotificationQueue::new(Policy {
            ttl: config.notification_ttl,
            fade: config.notification_fade,
            capacity: config.notification_capacity.max(1),
        })));

        let sink = Rc::clone(&queue);
        let clock = Arc::clone(&context);
        let subscription = bus.subscribe(EventFilter::All, move |event: &DomainEvent| {
            sink.borrow_mut().push(event, clock.now());
            Ok(())
        });

        Self {
            queue,
            context,
            subscription,
        }
    }

    /// Advances timers to the context's current time. Returns timers fired.
    pub fn poll(&self) -> usize {
        self.queue.borrow_mut().fire_due(self.context.now())
    }

    /// Starts the exit window for a visible notification.
    ///
    /// Unknown, fading and removed ids are a no-op returning false.
    pub fn dismiss(&self, id: NotificationId) -> bool {
        self.queue.borrow_mut().dismiss(id, self.context.now())
    }

    /// Cancels all timers and drops every notification immediately.
    pub fn clear(&self) -> usize {
        self.queue.borrow_mut().clear(self.context.now())
    }

    /// Visible and Fading records, newest first.
    pub fn records(&self) -> Vec<NotificationRecord> {
        self.queue
            .borrow()
            .slots
            .iter()
            .map(|slot| slot.record.clone())
            .collect()
    }

    /// Count of Visible + Fading records.
    pub fn active_count(&self) -> usize {
        self.queue.borrow().slots.len()
    }

    /// State of a notification; `None` if the id was never issued.
    pub fn state_of(&self, id: NotificationId) -> Option<NotificationState> {
        self.queue.borrow().state_of(id)
    }

    /// Pending expiry/removal timers.
    pub fn pending_timers(&self) -> usize {
        self.queue.borrow().timers.pending()
    }

    /// Next wall-clock instant a timer is due.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.queue.borrow().timers.next_deadline()
    }

    pub fn stats(&self) -> NotificationStats {
        self.queue.borrow().stats.clone()
    }

    /// Drains the recorded transitions, oldest first.
    pub fn take_transitions(&self) -> Vec<NotificationTransition> {
        self.queue.borrow_mut().transitions.drain(..).collect()
    }

    /// The bus subscription feeding this queue.
    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }
}

impl<Ctx: DemoContext> Clone for NotificationCenter<Ctx> {
    fn clone(&self) -> Self {
        Self {
            queue: Rc::clone(&self.queue),
            context: Arc::clone(&self.context),
            subscription: self.subscription,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventPayload, FrictionDetected, Severity};
    use pulse_env::ManualContext;

    fn friction(id: u64) -> DomainEvent {
        DomainEvent::new(
            EventId(id),
            Duration::from_secs(id),
            EventPayload::FrictionDetected(FrictionDetected {
                topic: "Shipping Delays".to_string(),
                severity: Severity::Medium,
                patient_id: "PAT-001".to_string(),
            }),
        )
    }

    fn setup() -> (EventBus, Arc<ManualContext>, NotificationCenter<ManualContext>) {
        let bus = EventBus::new();
        let ctx = ManualContext::shared();
        let center = NotificationCenter::attach(&bus, Arc::clone(&ctx), &EngineConfig::default());
        (bus, ctx, center)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_delivery_creates_visible_record() {
        let (bus, ctx, center) = setup();
        ctx.advance(ms(1_000));
        bus.publish(&friction(1));

        let records = center.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state, NotificationState::Visible);
        assert_eq!(records[0].source_event_id, EventId(1));
        assert_eq!(records[0].created_at, ms(1_000));
        assert_eq!(records[0].expires_at, ms(6_000));
    }

    #[test]
    fn test_expiry_then_fade_then_removed() {
        let (bus, ctx, center) = setup();
        bus.publish(&friction(1));
        let id = center.records()[0].id;

        ctx.set_time(ms(4_999));
        center.poll();
        assert_eq!(center.state_of(id), Some(NotificationState::Visible));

        ctx.set_time(ms(5_000));
        center.poll();
        assert_eq!(center.state_of(id), Some(NotificationState::Fading));

        ctx.set_time(ms(5_299));
        center.poll();
        assert_eq!(center.state_of(id), Some(NotificationState::Fading));

        ctx.set_time(ms(5_300));
        center.poll();
        assert_eq!(center.state_of(id), Some(NotificationState::Removed));
        assert_eq!(center.active_count(), 0);
        assert_eq!(center.pending_timers(), 0);
    }

    #[test]
    fn test_late_poll_runs_both_stages() {
        let (bus, ctx, center) = setup();
        bus.publish(&friction(1));
        ctx.set_time(ms(60_000));
        assert_eq!(center.poll(), 2);
        assert_eq!(center.active_count(), 0);

        let causes: Vec<TransitionCause> =
            center.take_transitions().into_iter().map(|t| t.cause).collect();
        assert_eq!(
            causes,
            vec![
                TransitionCause::Delivered,
                TransitionCause::Expired,
                TransitionCause::FadeFinished
            ]
        );
    }

    #[test]
    fn test_fourth_insert_evicts_oldest_without_fade() {
        let (bus, ctx, center) = setup();
        for id in 1..=4 {
            bus.publish(&friction(id));
            ctx.advance(ms(100));
        }

        let records = center.records();
        let sources: Vec<EventId> = records.iter().map(|r| r.source_event_id).collect();
        assert_eq!(sources, vec![EventId(4), EventId(3), EventId(2)]);
        assert_eq!(center.state_of(NotificationId(1)), Some(NotificationState::Removed));
        assert_eq!(center.stats().evicted, 1);
        assert_eq!(center.stats().peak_active, 3);
        // Evicted record's expiry timer is gone
        assert_eq!(center.pending_timers(), 3);
    }

    #[test]
    fn test_fading_records_count_toward_capacity() {
        let (bus, ctx, center) = setup();
        bus.publish(&friction(1));
        bus.publish(&friction(2));
        bus.publish(&friction(3));
        assert!(center.dismiss(NotificationId(1)));

        ctx.advance(ms(100));
        bus.publish(&friction(4));
        assert_eq!(center.active_count(), 3);
        assert_eq!(center.state_of(NotificationId(1)), Some(NotificationState::Removed));
    }

    #[test]
    fn test_dismiss_cancels_expiry() {
        let (bus, ctx, center) = setup();
        bus.publish(&friction(1));
        let id = center.records()[0].id;

        ctx.set_time(ms(1_000));
        assert!(center.dismiss(id));
        assert_eq!(center.state_of(id), Some(NotificationState::Fading));
        assert!(!center.dismiss(id));
        assert_eq!(center.pending_timers(), 1);
        assert_eq!(center.next_deadline(), Some(ms(1_300)));

        ctx.set_time(ms(1_300));
        center.poll();
        assert_eq!(center.state_of(id), Some(NotificationState::Removed));
        assert_eq!(center.stats().expired, 0);
    }

    #[test]
    fn test_dismiss_unknown_is_noop() {
        let (_bus, _ctx, center) = setup();
        assert!(!center.dismiss(NotificationId(77)));
        assert_eq!(center.state_of(NotificationId(77)), None);
    }

    #[test]
    fn test_clear_cancels_everything() {
        let (bus, _ctx, center) = setup();
        for id in 1..=3 {
            bus.publish(&friction(id));
        }
        center.dismiss(NotificationId(2));

        assert_eq!(center.clear(), 3);
        assert_eq!(center.active_count(), 0);
        assert_eq!(center.pending_timers(), 0);
        assert_eq!(center.stats().cleared, 3);
    }

    #[test]
    fn test_expiry_ignores_virtual_time() {
        let (bus, ctx, center) = setup();
        // Event stamped far in virtual time still lives 5 real seconds
        bus.publish(&friction(10_000));
        ctx.set_time(ms(4_900));
        center.poll();
        assert_eq!(center.active_count(), 1);
        assert_eq!(center.records()[0].state, NotificationState::Visible);
    }
}
