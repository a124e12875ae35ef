//! Deterministic collaborators for tests.
//!
//! Built for this crate's unit tests and, behind the `testkit` feature, for
//! the workspace integration suite.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use relay_config::RelaySettings;
use relay_core::ManualClock;
use relay_types::{ObjectHandle, PositionInfo, StateValue, Vec3};

use crate::capability::{Scope, StateQuery, Transport, TransportError};
use crate::context::RelayContext;

type Function = Arc<dyn Fn(&[StateValue]) -> StateValue + Send + Sync>;

#[derive(Default)]
struct World {
    entities: Vec<ObjectHandle>,
    names: HashMap<ObjectHandle, String>,
    positions: HashMap<ObjectHandle, PositionInfo>,
    parents: HashMap<ObjectHandle, ObjectHandle>,
    types: HashMap<ObjectHandle, String>,
    net_ids: HashMap<ObjectHandle, String>,
    velocities: HashMap<ObjectHandle, Vec3>,
    variables: HashMap<(Scope, String), StateValue>,
    config: HashMap<(String, String), StateValue>,
    functions: HashMap<String, Function>,
    camera: PositionInfo,
}

/// In-memory state source. Every setter takes effect on the next query.
#[derive(Default)]
pub struct FakeWorld {
    world: Mutex<World>,
    calls: Mutex<HashMap<String, usize>>,
    config_reads: AtomicUsize,
    threads: Mutex<HashSet<ThreadId>>,
}

impl FakeWorld {
    pub fn spawn(&self, handle: ObjectHandle, name: &str, eye_pos: Vec3) {
        let mut world = self.world.lock();
        world.entities.push(handle);
        world.names.insert(handle, name.to_string());
        world
            .positions
            .insert(handle, PositionInfo::new(eye_pos, Vec3::new(0.0, 1.0, 0.0)));
    }

    pub fn despawn(&self, handle: ObjectHandle) {
        self.world.lock().entities.retain(|h| *h != handle);
    }

    pub fn teleport(&self, handle: ObjectHandle, eye_pos: Vec3) {
        self.world
            .lock()
            .positions
            .insert(handle, PositionInfo::new(eye_pos, Vec3::new(0.0, 1.0, 0.0)));
    }

    pub fn board(&self, entity: ObjectHandle, vehicle: ObjectHandle) {
        self.world.lock().parents.insert(entity, vehicle);
    }

    pub fn dismount(&self, entity: ObjectHandle) {
        self.world.lock().parents.remove(&entity);
    }

    pub fn vehicle(&self, handle: ObjectHandle, class: &str, net_id: &str) {
        let mut world = self.world.lock();
        world.types.insert(handle, class.to_string());
        world.net_ids.insert(handle, net_id.to_string());
    }

    pub fn set_var(&self, scope: Scope, name: &str, value: impl Into<StateValue>) {
        self.world
            .lock()
            .variables
            .insert((scope, name.to_string()), value.into());
    }

    pub fn set_config(&self, class: &str, property: &str, value: impl Into<StateValue>) {
        self.world
            .lock()
            .config
            .insert((class.to_string(), property.to_string()), value.into());
    }

    /// Register a namespace function callable through [`StateQuery::call`].
    pub fn define(
        &self,
        name: &str,
        function: impl Fn(&[StateValue]) -> StateValue + Send + Sync + 'static,
    ) {
        let mut world = self.world.lock();
        world.functions.insert(name.to_string(), Arc::new(function));
        world
            .variables
            .insert((Scope::Namespace, name.to_string()), StateValue::code(name));
    }

    pub fn observe(&self, handle: ObjectHandle) {
        self.set_var(Scope::Namespace, "TFAR_currentUnit", handle);
    }

    pub fn calls_to(&self, name: &str) -> usize {
        self.calls.lock().get(name).copied().unwrap_or(0)
    }

    pub fn config_reads(&self) -> usize {
        self.config_reads.load(Ordering::SeqCst)
    }

    /// Every thread that has queried this world.
    pub fn query_threads(&self) -> HashSet<ThreadId> {
        self.threads.lock().clone()
    }

    fn touch(&self) {
        self.threads.lock().insert(thread::current().id());
    }
}

impl StateQuery for FakeWorld {
    fn variable(&self, scope: Scope, name: &str) -> StateValue {
        self.touch();
        self.world
            .lock()
            .variables
            .get(&(scope, name.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn set_variable(&self, scope: Scope, name: &str, value: StateValue) {
        self.touch();
        self.set_var(scope, name, value);
    }

    fn config_property(&self, class: &str, property: &str) -> StateValue {
        self.touch();
        self.config_reads.fetch_add(1, Ordering::SeqCst);
        self.world
            .lock()
            .config
            .get(&(class.to_string(), property.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn call(&self, code: &StateValue, args: &[StateValue]) -> StateValue {
        self.touch();
        let Some(name) = code.as_code() else {
            return StateValue::Nil;
        };
        *self.calls.lock().entry(name.to_string()).or_default() += 1;
        let function = self.world.lock().functions.get(name).cloned();
        function.map_or(StateValue::Nil, |f| f(args))
    }

    fn all_entities(&self) -> Vec<ObjectHandle> {
        self.touch();
        self.world.lock().entities.clone()
    }

    fn entity_name(&self, entity: ObjectHandle) -> String {
        self.touch();
        self.world
            .lock()
            .names
            .get(&entity)
            .cloned()
            .unwrap_or_default()
    }

    fn object_parent(&self, entity: ObjectHandle) -> ObjectHandle {
        self.touch();
        self.world
            .lock()
            .parents
            .get(&entity)
            .copied()
            .unwrap_or(ObjectHandle::NULL)
    }

    fn type_of(&self, object: ObjectHandle) -> String {
        self.touch();
        self.world
            .lock()
            .types
            .get(&object)
            .cloned()
            .unwrap_or_default()
    }

    fn net_id(&self, object: ObjectHandle) -> String {
        self.touch();
        self.world
            .lock()
            .net_ids
            .get(&object)
            .cloned()
            .unwrap_or_default()
    }

    fn velocity(&self, object: ObjectHandle) -> Vec3 {
        self.touch();
        self.world
            .lock()
            .velocities
            .get(&object)
            .copied()
            .unwrap_or(Vec3::ZERO)
    }

    fn eye_position(&self, entity: ObjectHandle) -> PositionInfo {
        self.touch();
        self.world
            .lock()
            .positions
            .get(&entity)
            .copied()
            .unwrap_or_default()
    }

    fn camera_position(&self) -> PositionInfo {
        self.touch();
        self.world.lock().camera
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Path {
    Async,
    Sync,
}

/// Records every payload in send order; can be told to fail.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(Path, String)>>,
    failure: Mutex<Option<TransportError>>,
    busy: Mutex<bool>,
}

impl RecordingTransport {
    pub fn fail_with(&self, failure: Option<TransportError>) {
        *self.failure.lock() = failure;
    }

    pub fn set_busy(&self, busy: bool) {
        *self.busy.lock() = busy;
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn async_sent(&self) -> Vec<String> {
        self.sent_through(Path::Async)
    }

    pub fn sync_sent(&self) -> Vec<String> {
        self.sent_through(Path::Sync)
    }

    pub fn sync_count(&self) -> usize {
        self.sync_sent().len()
    }

    pub fn sent_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|p| p.starts_with(prefix))
            .collect()
    }

    /// `POS` records for one entity, split into fields.
    pub fn positions_for(&self, name: &str) -> Vec<Vec<String>> {
        self.sent_with_prefix(&format!("POS\t{name}\t"))
            .into_iter()
            .map(|p| p.split('\t').map(str::to_string).collect())
            .collect()
    }

    pub fn speakers(&self) -> Vec<String> {
        self.sent_with_prefix("SPEAKERS\t")
    }

    fn sent_through(&self, path: Path) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(p, _)| *p == path)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    fn record(&self, path: Path, payload: &str) -> Result<(), TransportError> {
        if let Some(err) = self.failure.lock().clone() {
            return Err(err);
        }
        self.sent.lock().push((path, payload.to_string()));
        Ok(())
    }
}

impl Transport for RecordingTransport {
    fn can_send(&self) -> bool {
        !*self.busy.lock()
    }

    fn send_async(&self, payload: &str) -> Result<(), TransportError> {
        self.record(Path::Async, payload)
    }

    fn send_sync(&self, payload: &str) -> Result<String, TransportError> {
        self.record(Path::Sync, payload)?;
        Ok("OK".to_string())
    }
}

/// A context over a [`FakeWorld`] and a [`ManualClock`], with no roster.
pub struct Harness {
    pub world: Arc<FakeWorld>,
    pub clock: Arc<ManualClock>,
    pub ctx: Arc<RelayContext>,
}

impl Default for Harness {
    fn default() -> Self {
        Self::with_settings(RelaySettings::default())
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: RelaySettings) -> Self {
        let world = Arc::new(FakeWorld::default());
        let clock = Arc::new(ManualClock::new());
        let ctx = RelayContext::new(world.clone(), clock.clone(), settings);
        Self { world, clock, ctx }
    }

    /// Drain until no task is left, bounded so a self-requeueing cell cannot
    /// spin forever.
    pub fn settle(&self) {
        for _ in 0..16 {
            if self.ctx.scheduler().drain() == 0 {
                return;
            }
        }
    }
}
