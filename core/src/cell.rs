//! Adaptive time-to-live cache cell.
//!
//! A [`CachedValue`] holds the last good value of one derived attribute and
//! knows how to recompute it. Reads never block on a recomputation: a stale
//! read dispatches one onto the [`Scheduler`] and returns the previous value.
//! Subscribers run with the cell's lock held, so a read from another thread
//! can wait while they execute.
//!
//! ```text
//!            interval elapsed             task runs on privileged thread
//!   FRESH ─────────────────────> STALE ──get/refresh──> IN-FLIGHT ──┐
//!     ^                                                              │
//!     └──────────── stamp last_update (after subscribers ran) ───────┘
//! ```
//!
//! `IN-FLIGHT` brackets exactly one queued recomputation. While it holds,
//! further refreshes and manual updates are no-ops. A cell's guard is
//! consulted before it enters `IN-FLIGHT`.

use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, ReentrantMutex};

use crate::clock::Clock;
use crate::scheduler::Scheduler;

type UpdateFn<T> = Box<dyn Fn() -> T + Send + Sync>;
type GuardFn = Box<dyn Fn() -> bool + Send + Sync>;
type Subscriber<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Where a cell is in its refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    /// Never computed; the first read dispatches.
    Never,
    /// Last computed (or deliberately skipped) at this instant.
    At(Instant),
    /// A recomputation is queued or running.
    InFlight,
}

struct Slot<T> {
    value: T,
    last_update: UpdateState,
    last_change: Instant,
}

pub struct CachedValue<T> {
    name: String,
    scheduler: Weak<Scheduler>,
    clock: Arc<dyn Clock>,
    update_fn: UpdateFn<T>,
    can_update: Option<GuardFn>,
    interval: Mutex<Duration>,
    // Re-entrant: subscribers run with the lock held and may read or
    // manually update this same cell.
    slot: ReentrantMutex<RefCell<Slot<T>>>,
    subscribers: Mutex<Vec<Subscriber<T>>>,
    this: Weak<CachedValue<T>>,
}

/// Collects the optional parts of a cell before it is bound to a scheduler.
pub struct CellBuilder<T> {
    name: String,
    default: T,
    interval: Duration,
    can_update: Option<GuardFn>,
}

impl<T> CellBuilder<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Refreshes are skipped (without calling the update function) while the
    /// guard returns `false`.
    #[must_use]
    pub fn guard(mut self, can_update: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.can_update = Some(Box::new(can_update));
        self
    }

    pub fn build(
        self,
        scheduler: &Arc<Scheduler>,
        clock: Arc<dyn Clock>,
        update_fn: impl Fn() -> T + Send + Sync + 'static,
    ) -> Arc<CachedValue<T>> {
        let now = clock.now();
        Arc::new_cyclic(|this| CachedValue {
            name: self.name,
            scheduler: Arc::downgrade(scheduler),
            clock,
            update_fn: Box::new(update_fn),
            can_update: self.can_update,
            interval: Mutex::new(self.interval),
            slot: ReentrantMutex::new(RefCell::new(Slot {
                value: self.default,
                last_update: UpdateState::Never,
                last_change: now,
            })),
            subscribers: Mutex::new(Vec::new()),
            this: this.clone(),
        })
    }
}

impl<T> CachedValue<T>
where
    T: Clone + PartialEq + Send + 'static,
{
    /// Start describing a cell that reads `default` until first computed.
    pub fn builder(name: impl Into<String>, default: T) -> CellBuilder<T> {
        CellBuilder {
            name: name.into(),
            default,
            interval: Duration::from_secs(1),
            can_update: None,
        }
    }

    /// Current value, dispatching a refresh first if the cell is stale.
    ///
    /// Never waits for the refresh: while one is in flight this returns the
    /// previous value. It does wait for subscribers that are running on the
    /// privileged thread.
    pub fn get(&self) -> T {
        self.dispatch(true);
        let guard = self.slot.lock();
        let value = guard.borrow().value.clone();
        value
    }

    /// Current value without any staleness check.
    pub fn peek(&self) -> T {
        let guard = self.slot.lock();
        let value = guard.borrow().value.clone();
        value
    }

    /// Dispatch a recomputation if the interval has elapsed.
    ///
    /// Returns `true` if a recomputation was queued.
    pub fn refresh(&self) -> bool {
        self.dispatch(true)
    }

    /// Dispatch a recomputation regardless of staleness. Still a no-op while
    /// one is in flight.
    pub fn force_update(&self) -> bool {
        self.dispatch(false)
    }

    /// Store a value computed elsewhere, bypassing the update function.
    ///
    /// No-op (returns `false`) while a recomputation is in flight, so a
    /// queued result is never overtaken by an older one.
    pub fn manual_update(&self, value: T, fire_events: bool) -> bool {
        let now = self.clock.now();
        let guard = self.slot.lock();
        {
            let mut slot = guard.borrow_mut();
            if slot.last_update == UpdateState::InFlight {
                return false;
            }
            if slot.value != value {
                slot.last_change = now;
            }
            slot.value = value.clone();
        }
        if fire_events {
            self.notify(&value);
        }
        guard.borrow_mut().last_update = UpdateState::At(now);
        true
    }

    /// Register a change subscriber. Subscribers run on the privileged thread
    /// in registration order, after the new value is stored and before the
    /// cell leaves the in-flight state.
    pub fn subscribe(&self, subscriber: impl Fn(&T) + Send + Sync + 'static) {
        self.subscribers.lock().push(Arc::new(subscriber));
    }

    /// Takes effect on the next staleness check.
    pub fn set_interval(&self, interval: Duration) {
        *self.interval.lock() = interval;
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        *self.interval.lock()
    }

    #[must_use]
    pub fn last_update(&self) -> UpdateState {
        self.slot.lock().borrow().last_update
    }

    /// When the value last differed from its predecessor.
    #[must_use]
    pub fn last_change(&self) -> Instant {
        self.slot.lock().borrow().last_change
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.last_update() == UpdateState::InFlight
    }

    #[must_use]
    pub fn is_stale(&self) -> bool {
        let last_update = self.last_update();
        self.stale(last_update, self.clock.now())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn downgrade(&self) -> Weak<Self> {
        self.this.clone()
    }

    fn stale(&self, last_update: UpdateState, now: Instant) -> bool {
        match last_update {
            UpdateState::Never => true,
            UpdateState::InFlight => false,
            UpdateState::At(at) => now.saturating_duration_since(at) > self.interval(),
        }
    }

    fn dispatch(&self, only_if_stale: bool) -> bool {
        if !self.claimable(self.last_update(), only_if_stale) {
            return false;
        }

        // The guard may read other cells; it runs with no lock held and
        // before the cell is claimed.
        if let Some(can_update) = &self.can_update
            && !can_update()
        {
            self.stamp_unless_in_flight();
            return false;
        }

        let Some(scheduler) = self.scheduler.upgrade() else {
            tracing::error!(cell = %self.name, "scheduler is gone; refresh abandoned");
            self.stamp_unless_in_flight();
            return false;
        };

        {
            // Another refresh or a manual update may have landed while the
            // guard ran.
            let guard = self.slot.lock();
            let mut slot = guard.borrow_mut();
            if !self.claimable(slot.last_update, only_if_stale) {
                return false;
            }
            slot.last_update = UpdateState::InFlight;
        }

        let this = self.this.clone();
        scheduler.enqueue(move || {
            if let Some(cell) = this.upgrade() {
                cell.recompute();
            }
        });
        tracing::trace!(cell = %self.name, "refresh dispatched");
        true
    }

    fn claimable(&self, last_update: UpdateState, only_if_stale: bool) -> bool {
        match last_update {
            UpdateState::InFlight => false,
            _ if only_if_stale => self.stale(last_update, self.clock.now()),
            _ => true,
        }
    }

    fn recompute(&self) {
        let value = (self.update_fn)();
        let now = self.clock.now();
        let guard = self.slot.lock();
        let changed = {
            let mut slot = guard.borrow_mut();
            if slot.value == value {
                false
            } else {
                slot.value = value.clone();
                slot.last_change = now;
                true
            }
        };
        if changed {
            self.notify(&value);
        }
        guard.borrow_mut().last_update = UpdateState::At(self.clock.now());
    }

    /// A skipped refresh counts as an update, unless another caller has
    /// claimed the cell meanwhile.
    fn stamp_unless_in_flight(&self) {
        let now = self.clock.now();
        let guard = self.slot.lock();
        let mut slot = guard.borrow_mut();
        if slot.last_update != UpdateState::InFlight {
            slot.last_update = UpdateState::At(now);
        }
    }

    fn notify(&self, value: &T) {
        let subscribers = self.subscribers.lock().clone();
        for subscriber in subscribers {
            subscriber(value);
        }
    }
}

impl<T> fmt::Debug for CachedValue<T>
where
    T: Clone + PartialEq + Send + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.slot.lock();
        let slot = guard.borrow();
        f.debug_struct("CachedValue")
            .field("name", &self.name)
            .field("value", &slot.value)
            .field("last_update", &slot.last_update)
            .field("interval", &self.interval())
            .finish_non_exhaustive()
    }
}
