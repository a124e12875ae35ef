//! Cache cell behavior across the privileged/worker split.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use relay_core::{CachedValue, Clock, ManualClock, Scheduler, UpdateState};

fn counter_cell(
    scheduler: &Arc<Scheduler>,
    clock: &Arc<ManualClock>,
    interval: Duration,
) -> (Arc<CachedValue<u32>>, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let cell = CachedValue::builder("counter", 0_u32)
        .interval(interval)
        .build(scheduler, clock.clone(), move || {
            counter.fetch_add(1, Ordering::SeqCst) + 1
        });
    (cell, calls)
}

#[test]
fn worker_reads_are_served_stale_until_the_host_drains() {
    let scheduler = Arc::new(Scheduler::new());
    let clock = Arc::new(ManualClock::new());
    let (cell, calls) = counter_cell(&scheduler, &clock, Duration::from_millis(100));

    let reader = Arc::clone(&cell);
    let seen = thread::spawn(move || (0..50).map(|_| reader.get()).collect::<Vec<_>>())
        .join()
        .unwrap();

    assert!(seen.iter().all(|v| *v == 0));
    assert_eq!(scheduler.pending(), 1, "one refresh in flight at a time");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert_eq!(scheduler.drain(), 1);
    assert_eq!(cell.peek(), 1);
    assert!(matches!(cell.last_update(), UpdateState::At(_)));
}

#[test]
fn fresh_cells_do_not_dispatch() {
    let scheduler = Arc::new(Scheduler::new());
    let clock = Arc::new(ManualClock::new());
    let (cell, calls) = counter_cell(&scheduler, &clock, Duration::from_millis(100));
    cell.force_update();
    scheduler.drain();

    clock.advance(Duration::from_millis(100));
    assert!(!cell.refresh());
    clock.advance(Duration::from_millis(1));
    assert!(cell.refresh());
    scheduler.drain();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn update_functions_run_on_the_draining_thread() {
    let scheduler = Arc::new(Scheduler::new());
    let clock = Arc::new(ManualClock::new());
    let host = thread::current().id();
    let on_host = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&on_host);
    let cell = CachedValue::builder("flag", false).build(&scheduler, clock, move || {
        flag.store(thread::current().id() == host, Ordering::SeqCst);
        true
    });

    let reader = Arc::clone(&cell);
    thread::spawn(move || reader.refresh()).join().unwrap();
    scheduler.drain();

    assert!(on_host.load(Ordering::SeqCst));
    assert!(cell.peek());
}

#[test]
fn subscribers_fire_only_on_change() {
    let scheduler = Arc::new(Scheduler::new());
    let clock = Arc::new(ManualClock::new());
    let source = Arc::new(AtomicU32::new(7));
    let reader = Arc::clone(&source);
    let cell = CachedValue::builder("value", 0_u32)
        .interval(Duration::from_millis(10))
        .build(&scheduler, clock.clone(), move || reader.load(Ordering::SeqCst));

    let fired = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&fired);
    cell.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    cell.force_update();
    scheduler.drain();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    let changed_at = cell.last_change();

    clock.advance(Duration::from_millis(20));
    cell.refresh();
    scheduler.drain();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(cell.last_change(), changed_at);

    source.store(8, Ordering::SeqCst);
    clock.advance(Duration::from_millis(20));
    cell.refresh();
    scheduler.drain();
    assert_eq!(fired.load(Ordering::SeqCst), 2);
    assert_eq!(cell.last_change(), clock.now());
}

#[test]
fn closed_guard_skips_the_update_until_the_next_interval() {
    let scheduler = Arc::new(Scheduler::new());
    let clock = Arc::new(ManualClock::new());
    let open = Arc::new(AtomicBool::new(false));
    let gate = Arc::clone(&open);
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let cell = CachedValue::builder("gated", 0_u32)
        .interval(Duration::from_millis(50))
        .guard(move || gate.load(Ordering::SeqCst))
        .build(&scheduler, clock.clone(), move || {
            counter.fetch_add(1, Ordering::SeqCst) + 1
        });

    assert!(!cell.refresh());
    assert_eq!(scheduler.pending(), 0);
    assert!(!cell.is_stale());

    open.store(true, Ordering::SeqCst);
    assert!(!cell.refresh(), "still within the interval");
    clock.advance(Duration::from_millis(51));
    assert!(cell.refresh());
    scheduler.drain();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cell.peek(), 1);
}

#[test]
fn manual_update_cannot_overtake_a_queued_refresh() {
    let scheduler = Arc::new(Scheduler::new());
    let clock = Arc::new(ManualClock::new());
    let (cell, _) = counter_cell(&scheduler, &clock, Duration::from_secs(1));

    cell.force_update();
    assert!(!cell.manual_update(99, true));
    scheduler.drain();
    assert_eq!(cell.peek(), 1);

    assert!(cell.manual_update(99, false));
    assert_eq!(cell.peek(), 99);
    assert!(!cell.is_stale());
}

#[test]
fn tasks_queued_during_a_drain_wait_for_the_next_one() {
    let scheduler = Arc::new(Scheduler::new());
    let clock = Arc::new(ManualClock::new());
    let (inner, _) = counter_cell(&scheduler, &clock, Duration::from_secs(1));
    let dependency = Arc::clone(&inner);
    let outer = CachedValue::builder("outer", 0_u32).build(&scheduler, clock, move || {
        dependency.get() + 100
    });

    outer.force_update();
    assert_eq!(scheduler.drain(), 1);
    assert_eq!(outer.peek(), 100, "inner was still at its default");
    assert_eq!(scheduler.pending(), 1);
    assert_eq!(scheduler.drain(), 1);
    assert_eq!(inner.peek(), 1);
}
