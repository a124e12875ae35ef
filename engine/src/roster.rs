//! The set of tracked entities and the two loops that drive them.
//!
//! ```text
//! privileged thread            worker thread
//! ─────────────────            ─────────────
//! tick()                       loop {
//!   drain scheduler  <─tasks──   simulate_pass()
//!   reconcile (1 s)                each record: simulate()
//!   detect observed                speakers (throttled)
//!                                sleep(quantum)
//!                              }
//! ```
//!
//! Records are only inserted or removed under the roster lock; the worker
//! iterates a snapshot taken under that lock.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;
use relay_core::CachedValue;
use relay_types::{ObjectHandle, SpeakersRecord};

use crate::capability::{Scope, Transport, deliver};
use crate::context::RelayContext;
use crate::entity::EntityRecord;

const OBSERVED_VARIABLE: &str = "TFAR_currentUnit";
const INTERCEPTION_VARIABLE: &str = "TFAR_objectInterceptionEnabled";

#[derive(Debug, Default)]
struct SpeakersState {
    last_publish: Option<Instant>,
    last_payload: Option<String>,
}

pub struct Roster {
    ctx: Arc<RelayContext>,
    transport: Arc<dyn Transport>,
    records: Mutex<Vec<Arc<EntityRecord>>>,
    observed: Mutex<Option<Arc<EntityRecord>>>,
    last_reconcile: Mutex<Option<Instant>>,
    interception_enabled: Arc<CachedValue<bool>>,
    speakers: Mutex<SpeakersState>,
}

impl Roster {
    pub fn new(ctx: Arc<RelayContext>, transport: Arc<dyn Transport>) -> Arc<Self> {
        let interception_enabled = {
            let weak_ctx = Arc::downgrade(&ctx);
            ctx.cell(
                "roster.object_interception_enabled",
                true,
                ctx.settings().cells.object_interception_enabled,
                move || {
                    weak_ctx.upgrade().is_none_or(|ctx| {
                        ctx.query()
                            .variable(Scope::Namespace, INTERCEPTION_VARIABLE)
                            .as_bool()
                            .unwrap_or(true)
                    })
                },
            )
        };
        Arc::new(Self {
            ctx,
            transport,
            records: Mutex::new(Vec::new()),
            observed: Mutex::new(None),
            last_reconcile: Mutex::new(None),
            interception_enabled,
            speakers: Mutex::new(SpeakersState::default()),
        })
    }

    pub fn context(&self) -> &Arc<RelayContext> {
        &self.ctx
    }

    /// Snapshot of the current records.
    pub fn records(&self) -> Vec<Arc<EntityRecord>> {
        self.records.lock().clone()
    }

    pub fn record(&self, handle: ObjectHandle) -> Option<Arc<EntityRecord>> {
        self.records
            .lock()
            .iter()
            .find(|record| record.handle() == handle)
            .cloned()
    }

    pub fn observed(&self) -> Option<Arc<EntityRecord>> {
        self.observed.lock().clone()
    }

    pub fn interception_enabled(&self) -> &Arc<CachedValue<bool>> {
        &self.interception_enabled
    }

    /// Privileged-thread entry point, once per host frame.
    pub fn tick(&self) {
        self.ctx.scheduler().drain();

        let now = self.ctx.now();
        let interval = self.ctx.settings().roster.reconcile_interval;
        let due = self
            .last_reconcile
            .lock()
            .is_none_or(|last| now.saturating_duration_since(last) > interval);
        if due {
            self.reconcile();
        }

        self.update_observed();
    }

    /// Bring the records in line with the state source's entity list.
    pub fn reconcile(&self) {
        self.ctx.scheduler().affinity().check("Roster::reconcile");
        *self.last_reconcile.lock() = Some(self.ctx.now());

        let reported: Vec<ObjectHandle> = self
            .ctx
            .query()
            .all_entities()
            .into_iter()
            .filter(|handle| !handle.is_null())
            .collect();
        let live: HashSet<ObjectHandle> = reported.iter().copied().collect();

        let missing: Vec<ObjectHandle> = {
            let records = self.records.lock();
            let mut seen = HashSet::new();
            reported
                .into_iter()
                .filter(|handle| {
                    seen.insert(*handle) && !records.iter().any(|r| r.handle() == *handle)
                })
                .collect()
        };

        // Records query the state source on construction; keep that outside
        // the lock the worker snapshots under.
        let created: Vec<Arc<EntityRecord>> = missing
            .into_iter()
            .map(|handle| {
                EntityRecord::new(&self.ctx, handle, Arc::clone(&self.interception_enabled))
            })
            .collect();

        let (added, removed) = {
            let mut records = self.records.lock();
            let before = records.len();
            records.retain(|record| live.contains(&record.handle()));
            let removed = before - records.len();
            let added = created.len();
            for record in created {
                tracing::debug!(entity = %record.name(), handle = %record.handle(), "record added");
                records.push(record);
            }
            (added, removed)
        };
        if added > 0 || removed > 0 {
            tracing::debug!(added, removed, "roster reconciled");
        }

        let mut observed = self.observed.lock();
        if let Some(current) = observed.as_ref()
            && !live.contains(&current.handle())
        {
            current.set_observed(false);
            *observed = None;
        }
    }

    fn update_observed(&self) {
        let Some(handle) = self
            .ctx
            .query()
            .variable(Scope::Namespace, OBSERVED_VARIABLE)
            .as_object()
        else {
            return;
        };
        if self
            .observed
            .lock()
            .as_ref()
            .is_some_and(|current| current.handle() == handle)
        {
            return;
        }

        let found = self.record(handle).or_else(|| {
            // Appeared since the last reconciliation.
            self.reconcile();
            self.record(handle)
        });
        let Some(found) = found else {
            tracing::error!(%handle, "observed entity has no record");
            if cfg!(debug_assertions) {
                panic!("observed entity {handle} has no record");
            }
            return;
        };

        let mut observed = self.observed.lock();
        if let Some(previous) = observed.take() {
            previous.set_observed(false);
        }
        found.set_observed(true);
        tracing::debug!(entity = %found.name(), "observed entity changed");
        *observed = Some(found);
    }

    /// One worker pass over a snapshot of the records. Returns `false` when
    /// there was nothing to simulate.
    pub fn simulate_pass(&self) -> bool {
        let records = self.records();
        if records.is_empty() {
            return false;
        }
        let observer = self.observed();
        for record in &records {
            record.simulate(observer.as_deref(), &*self.transport);
        }
        self.publish_speakers(&records);
        true
    }

    fn publish_speakers(&self, records: &[Arc<EntityRecord>]) {
        let now = self.ctx.now();
        let interval = self.ctx.settings().publish.speakers_interval;
        let mut state = self.speakers.lock();
        if state
            .last_publish
            .is_some_and(|last| now.saturating_duration_since(last) < interval)
        {
            return;
        }
        if !self.transport.can_send() {
            return;
        }

        let channels = records
            .iter()
            .flat_map(|record| record.speaker_descriptors())
            .collect();
        let payload = SpeakersRecord { channels }.encode();
        if state.last_payload.as_deref() != Some(payload.as_str())
            && deliver(
                &*self.transport,
                self.ctx.settings().publish.mode,
                &payload,
            )
        {
            state.last_payload = Some(payload);
        }
        state.last_publish = Some(now);
    }

    /// Start the worker thread.
    pub fn spawn_worker(self: &Arc<Self>) -> std::io::Result<WorkerHandle> {
        let stop = Arc::new(AtomicBool::new(false));
        let roster = Arc::clone(self);
        let flag = Arc::clone(&stop);
        let join = thread::Builder::new()
            .name("relay-worker".to_string())
            .spawn(move || worker_loop(&roster, &flag))?;
        tracing::debug!("worker started");
        Ok(WorkerHandle {
            stop,
            join: Some(join),
        })
    }
}

impl std::fmt::Debug for Roster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Roster")
            .field("records", &self.records.lock().len())
            .field("observed", &self.observed().map(|r| r.handle()))
            .finish_non_exhaustive()
    }
}

fn worker_loop(roster: &Roster, stop: &AtomicBool) {
    let settings = &roster.ctx.settings().roster;
    while !stop.load(Ordering::Acquire) {
        let pause = if roster.simulate_pass() {
            settings.worker_quantum
        } else {
            settings.idle_sleep
        };
        thread::park_timeout(pause);
    }
    tracing::debug!("worker stopped");
}

/// Owns the worker thread. Dropping it stops and joins the thread.
#[derive(Debug)]
pub struct WorkerHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|join| !join.is_finished())
    }

    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            join.thread().unpark();
            if join.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
