//! One tracked entity: its cache cells, publication and interval adaptation.
//!
//! Cells are recomputed on the privileged thread; [`EntityRecord::simulate`]
//! runs on the worker and only ever reads cells, so it never touches the state
//! source directly.
//!
//! The parent cell is the one eager dependency: when the entity enters or
//! leaves a container, the vehicle identity and isolation cells are rewritten
//! from the subscriber, inside the same drain.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use relay_core::CachedValue;
use relay_types::{
    ChannelDescriptor, ChannelId, Isolation, NO_VEHICLE, ObjectHandle, PositionInfo,
    PositionRecord, StateValue, VehicleIdentity,
};

use crate::capability::{Scope, Transport, deliver};
use crate::context::RelayContext;
use crate::radio::RadioRecord;

/// Vehicles at or below this isolation are treated as open.
const ISOLATION_THRESHOLD: f32 = 0.5;

/// Which radio kinds the entity can currently use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioUsability {
    pub short_range: bool,
    pub long_range: bool,
    pub digital: bool,
}

impl Default for RadioUsability {
    /// Above water everything but the digital (underwater) set works.
    fn default() -> Self {
        Self {
            short_range: true,
            long_range: true,
            digital: false,
        }
    }
}

#[derive(Debug)]
struct PublishState {
    last_publish: Option<Instant>,
    interval: Duration,
    last_payload: Option<String>,
}

pub struct EntityRecord {
    ctx: Arc<RelayContext>,
    handle: ObjectHandle,
    name: String,
    observed: AtomicBool,
    near_observer: AtomicBool,

    position_source: Arc<CachedValue<StateValue>>,
    position: Arc<CachedValue<PositionInfo>>,
    spectating: Arc<CachedValue<bool>>,
    parent: Arc<CachedValue<ObjectHandle>>,
    vehicle_id: Arc<CachedValue<String>>,
    isolated_inside: Arc<CachedValue<bool>>,
    radio_usability: Arc<CachedValue<RadioUsability>>,
    terrain_attenuation: Arc<CachedValue<f32>>,
    object_attenuation: Arc<CachedValue<f32>>,
    voice_volume: Arc<CachedValue<f32>>,
    radio_list: Arc<CachedValue<Vec<ChannelId>>>,

    radios: Mutex<Vec<Arc<RadioRecord>>>,
    publish: Mutex<PublishState>,
}

impl EntityRecord {
    /// Build the record on the privileged thread.
    ///
    /// `interception_enabled` is the roster-wide switch for object
    /// attenuation.
    pub fn new(
        ctx: &Arc<RelayContext>,
        handle: ObjectHandle,
        interception_enabled: Arc<CachedValue<bool>>,
    ) -> Arc<Self> {
        let name = ctx.query().entity_name(handle);
        let cells = &ctx.settings().cells;
        let attenuation_start = ctx.settings().attenuation.age_curve.min_interval;
        let publish_start = ctx.settings().publish.distance_curve.min_interval;

        let record = Arc::new_cyclic(|this: &Weak<Self>| {
            let position_source = {
                let this = this.clone();
                ctx.cell(
                    format!("{name}.position_source"),
                    StateValue::Nil,
                    cells.position_source,
                    move || {
                        this.upgrade()
                            .map(|record| {
                                record
                                    .ctx
                                    .query()
                                    .variable(Scope::Object(record.handle), "TF_fnc_position")
                            })
                            .unwrap_or_default()
                    },
                )
            };

            let position = {
                let this = this.clone();
                ctx.cell(
                    format!("{name}.position"),
                    PositionInfo::default(),
                    cells.position,
                    move || {
                        this.upgrade()
                            .map(|record| record.query_position())
                            .unwrap_or_default()
                    },
                )
            };

            let spectating = {
                let this = this.clone();
                ctx.cell(
                    format!("{name}.spectating"),
                    false,
                    cells.spectating,
                    move || {
                        this.upgrade().is_some_and(|record| {
                            record
                                .ctx
                                .query()
                                .variable(Scope::Object(record.handle), "TFAR_forceSpectator")
                                .as_bool()
                                .unwrap_or(false)
                        })
                    },
                )
            };

            let parent = {
                let this = this.clone();
                ctx.cell(
                    format!("{name}.parent"),
                    ObjectHandle::NULL,
                    cells.parent,
                    move || {
                        this.upgrade()
                            .map_or(ObjectHandle::NULL, |record| {
                                record.ctx.query().object_parent(record.handle)
                            })
                    },
                )
            };

            let in_vehicle = {
                let this = this.clone();
                move || {
                    this.upgrade()
                        .is_some_and(|record| !record.parent.get().is_null())
                }
            };

            let vehicle_id = {
                let this = this.clone();
                ctx.cell_guarded(
                    format!("{name}.vehicle_id"),
                    NO_VEHICLE.to_string(),
                    cells.vehicle_id,
                    in_vehicle.clone(),
                    move || {
                        this.upgrade().map_or_else(
                            || NO_VEHICLE.to_string(),
                            |record| record.query_vehicle_id(record.parent.peek()),
                        )
                    },
                )
            };

            let isolated_inside = {
                let this = this.clone();
                ctx.cell_guarded(
                    format!("{name}.isolated_inside"),
                    false,
                    cells.isolation,
                    in_vehicle,
                    move || {
                        this.upgrade().is_some_and(|record| {
                            record.query_isolated_inside(record.parent.peek())
                        })
                    },
                )
            };

            let radio_usability = {
                let this = this.clone();
                ctx.cell(
                    format!("{name}.radio_usability"),
                    RadioUsability::default(),
                    cells.radio_usability,
                    move || {
                        this.upgrade()
                            .map(|record| record.query_radio_usability())
                            .unwrap_or_default()
                    },
                )
            };

            let terrain_attenuation = {
                let guard = this.clone();
                let this = this.clone();
                ctx.cell_guarded(
                    format!("{name}.terrain_attenuation"),
                    0.0_f32,
                    attenuation_start,
                    move || {
                        guard.upgrade().is_some_and(|record| {
                            !record.is_observed() && !record.is_near_observer()
                        })
                    },
                    move || {
                        this.upgrade().map_or(0.0, |record| {
                            record.call_for_unit("TFAR_fnc_calcTerrainInterception")
                        })
                    },
                )
            };

            let object_attenuation = {
                let guard = this.clone();
                let this = this.clone();
                ctx.cell_guarded(
                    format!("{name}.object_attenuation"),
                    0.0_f32,
                    attenuation_start,
                    move || {
                        guard.upgrade().is_some_and(|record| {
                            !record.is_observed()
                                && record.is_near_observer()
                                && interception_enabled.get()
                        })
                    },
                    move || {
                        this.upgrade().map_or(0.0, |record| {
                            record.call_for_unit("TFAR_fnc_objectInterception")
                        })
                    },
                )
            };

            let voice_volume = {
                let this = this.clone();
                ctx.cell(
                    format!("{name}.voice_volume"),
                    1.0_f32,
                    cells.voice_volume,
                    move || {
                        this.upgrade()
                            .and_then(|record| {
                                record
                                    .ctx
                                    .query()
                                    .variable(Scope::Object(record.handle), "tf_voiceVolume")
                                    .as_f32()
                            })
                            .unwrap_or(1.0)
                    },
                )
            };

            let radio_list = {
                let this = this.clone();
                ctx.cell(
                    format!("{name}.radios"),
                    Vec::new(),
                    cells.radio_list,
                    move || {
                        this.upgrade()
                            .map(|record| record.query_radio_list())
                            .unwrap_or_default()
                    },
                )
            };

            Self {
                ctx: Arc::clone(ctx),
                handle,
                name: name.clone(),
                observed: AtomicBool::new(false),
                near_observer: AtomicBool::new(false),
                position_source,
                position,
                spectating,
                parent,
                vehicle_id,
                isolated_inside,
                radio_usability,
                terrain_attenuation,
                object_attenuation,
                voice_volume,
                radio_list,
                radios: Mutex::new(Vec::new()),
                publish: Mutex::new(PublishState {
                    last_publish: None,
                    interval: publish_start,
                    last_payload: None,
                }),
            }
        });
        record.wire();
        record
    }

    fn wire(self: &Arc<Self>) {
        let this = Arc::downgrade(self);
        self.parent.subscribe(move |parent| {
            let Some(record) = this.upgrade() else {
                return;
            };
            tracing::debug!(entity = %record.name, parent = %parent, "container changed");
            record
                .vehicle_id
                .manual_update(record.query_vehicle_id(*parent), false);
            record
                .isolated_inside
                .manual_update(record.query_isolated_inside(*parent), false);
        });

        let this = Arc::downgrade(self);
        self.radio_list.subscribe(move |channels| {
            if let Some(record) = this.upgrade() {
                record.reconcile_radios(channels);
            }
        });
    }

    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_observed(&self) -> bool {
        self.observed.load(Ordering::Acquire)
    }

    /// Flip the observed flag. The observed entity's position is the
    /// reference for everyone's distance, so it is sampled at the fastest
    /// publish rate.
    pub fn set_observed(&self, observed: bool) {
        self.observed.store(observed, Ordering::Release);
        if observed {
            self.position
                .set_interval(self.ctx.settings().publish.distance_curve.min_interval);
        }
    }

    pub fn is_near_observer(&self) -> bool {
        self.near_observer.load(Ordering::Acquire)
    }

    pub fn position(&self) -> &Arc<CachedValue<PositionInfo>> {
        &self.position
    }

    pub fn spectating(&self) -> &Arc<CachedValue<bool>> {
        &self.spectating
    }

    pub fn parent(&self) -> &Arc<CachedValue<ObjectHandle>> {
        &self.parent
    }

    pub fn vehicle_id(&self) -> &Arc<CachedValue<String>> {
        &self.vehicle_id
    }

    pub fn isolated_inside(&self) -> &Arc<CachedValue<bool>> {
        &self.isolated_inside
    }

    pub fn radio_usability(&self) -> &Arc<CachedValue<RadioUsability>> {
        &self.radio_usability
    }

    pub fn terrain_attenuation(&self) -> &Arc<CachedValue<f32>> {
        &self.terrain_attenuation
    }

    pub fn object_attenuation(&self) -> &Arc<CachedValue<f32>> {
        &self.object_attenuation
    }

    pub fn voice_volume(&self) -> &Arc<CachedValue<f32>> {
        &self.voice_volume
    }

    pub fn radio_list(&self) -> &Arc<CachedValue<Vec<ChannelId>>> {
        &self.radio_list
    }

    /// Snapshot of the current radio records.
    pub fn radios(&self) -> Vec<Arc<RadioRecord>> {
        self.radios.lock().clone()
    }

    pub fn publish_interval(&self) -> Duration {
        self.publish.lock().interval
    }

    pub fn last_publish(&self) -> Option<Instant> {
        self.publish.lock().last_publish
    }

    /// One worker step: keep the radio list warm and publish if due.
    pub fn simulate(&self, observer: Option<&EntityRecord>, transport: &dyn Transport) {
        self.radio_list.refresh();

        let due = {
            let publish = self.publish.lock();
            publish.last_publish.is_none_or(|last| {
                self.ctx.now().saturating_duration_since(last) >= publish.interval
            })
        };
        if due {
            self.publish(observer, transport);
        }
    }

    /// Assemble and send the `POS` record, then retune intervals.
    ///
    /// Skipped without an observer or while the transport is saturated; an
    /// unchanged payload is not re-sent but still counts as published.
    pub fn publish(&self, observer: Option<&EntityRecord>, transport: &dyn Transport) {
        let Some(observer) = observer else {
            return;
        };
        if !transport.can_send() {
            return;
        }

        let position = self.position.get();
        let isolated_inside = self.isolated_inside.get();
        let usability = self.radio_usability.get();

        let distance = if std::ptr::eq(observer, self) {
            0.0
        } else {
            observer.position.get().eye_pos.distance(position.eye_pos)
        };
        let near = distance < self.ctx.settings().publish.near_distance;
        self.near_observer.store(near, Ordering::Release);

        let (terrain_attenuation, object_attenuation) = if near {
            (0.0, self.object_attenuation.get())
        } else {
            (self.terrain_attenuation.get(), 0.0)
        };

        let record = PositionRecord {
            name: self.name.clone(),
            position,
            can_speak: position.eye_pos.z > 0.0 || isolated_inside,
            use_short_range: usability.short_range,
            use_digital: usability.digital,
            vehicle_id: self.vehicle_id.get(),
            terrain_attenuation,
            voice_volume: self.voice_volume.get(),
            object_attenuation,
            is_spectating: self.spectating.get(),
            is_enemy: false,
        };
        let payload = record.encode();
        let now = self.ctx.now();

        {
            let mut publish = self.publish.lock();
            if publish.last_payload.as_deref() == Some(payload.as_str()) {
                tracing::trace!(entity = %self.name, "payload unchanged; not re-sent");
            } else if deliver(transport, self.ctx.settings().publish.mode, &payload) {
                publish.last_payload = Some(payload);
            }
            publish.last_publish = Some(now);
        }

        if !self.is_observed() {
            self.adapt_intervals(distance, now);
        }
    }

    /// Retune the publish interval from distance and the attenuation
    /// intervals from how long each value has been unchanged.
    pub fn adapt_intervals(&self, distance: f32, now: Instant) {
        let settings = self.ctx.settings();
        let publish_interval = settings.publish.distance_curve.at(distance);
        self.publish.lock().interval = publish_interval;
        self.position.set_interval(publish_interval);

        let age_curve = settings.attenuation.age_curve;
        for cell in [&self.terrain_attenuation, &self.object_attenuation] {
            let age = now.saturating_duration_since(cell.last_change());
            cell.set_interval(age_curve.at_age(age));
        }
    }

    /// Mark-and-sweep the radio records against `channels`. Existing records
    /// keep their identity and cells.
    pub fn reconcile_radios(&self, channels: &[ChannelId]) {
        let mut radios = self.radios.lock();
        for radio in radios.iter() {
            radio.unconfirm();
        }

        let mut added = 0_usize;
        for id in channels {
            if let Some(existing) = radios.iter().find(|radio| radio.id() == id) {
                existing.confirm();
            } else {
                radios.push(RadioRecord::new(&self.ctx, id.clone()));
                added += 1;
            }
        }

        let before = radios.len();
        radios.retain(|radio| radio.is_confirmed());
        let removed = before - radios.len();
        if added > 0 || removed > 0 {
            tracing::debug!(
                entity = %self.name,
                added,
                removed,
                total = radios.len(),
                "radios reconciled"
            );
        }
    }

    /// Descriptors of every radio currently on loudspeaker.
    pub fn speaker_descriptors(&self) -> Vec<ChannelDescriptor> {
        let radios = self.radios();
        if radios.is_empty() {
            return Vec::new();
        }
        let vehicle_id = self.vehicle_id.get();
        let eye_height = self.position.get().eye_pos.z;
        radios
            .iter()
            .filter_map(|radio| radio.speaker_descriptor(&self.name, &vehicle_id, eye_height))
            .collect()
    }

    // Privileged-thread queries below.

    fn unit(&self) -> StateValue {
        StateValue::Object(self.handle)
    }

    fn call_for_unit(&self, function: &str) -> f32 {
        self.ctx
            .call_function(function, &[self.unit()])
            .as_f32()
            .unwrap_or(0.0)
    }

    /// Custom callback first, then the spectator camera, then the eyes.
    fn query_position(&self) -> PositionInfo {
        let source = self.position_source.get();
        if source.as_code().is_some() {
            return self
                .ctx
                .query()
                .call(&source, &[])
                .as_position()
                .unwrap_or_default();
        }
        if self.spectating.get() {
            return self.ctx.query().camera_position();
        }
        self.ctx.query().eye_position(self.handle)
    }

    /// `(turned out, isolation)` from the turn-out function.
    fn turned_out(&self) -> (bool, f32) {
        let result = self
            .ctx
            .call_function("TFAR_fnc_isTurnedOut", &[self.unit()]);
        match result.as_array() {
            Some([turned_out, isolation, ..]) => (
                turned_out.as_bool().unwrap_or(false),
                isolation.as_f32().unwrap_or(0.0),
            ),
            _ => (false, 0.0),
        }
    }

    fn query_vehicle_id(&self, parent: ObjectHandle) -> String {
        if parent.is_null() {
            return NO_VEHICLE.to_string();
        }
        let query = self.ctx.query();
        let vehicle = Scope::Object(parent);

        let net_id = query
            .variable(vehicle, "TFAR_vehicleIDOverride")
            .as_text()
            .unwrap_or_else(|| query.net_id(parent));
        let class = query.type_of(parent);
        let has_intercom = self
            .ctx
            .cache()
            .config_property(&class, "TFAR_hasIntercom", StateValue::Number(0.0))
            .as_f32()
            .is_some_and(|v| v > 0.0);

        let (turned_out, isolation) = self.turned_out();
        let intercom_slot = has_intercom.then(|| {
            let mut slot = query.variable(vehicle, &format!("TFAR_IntercomSlot_{net_id}"));
            if slot.is_nil() {
                slot = query.variable(vehicle, "TFAR_defaultIntercomSlot");
            }
            if slot.is_nil() {
                slot = query.variable(Scope::Namespace, "TFAR_defaultIntercomSlot");
            }
            slot.as_text().unwrap_or_else(|| "-1".to_string())
        });

        VehicleIdentity {
            net_id,
            isolation: if turned_out {
                Isolation::TurnedOut
            } else {
                Isolation::Amount(isolation)
            },
            intercom_slot,
            velocity: query.velocity(self.handle),
        }
        .encode()
    }

    fn query_isolated_inside(&self, parent: ObjectHandle) -> bool {
        if parent.is_null() || !self.vehicle_isolated(parent) {
            return false;
        }
        !self.turned_out().0
    }

    /// Per-vehicle override first; otherwise the class default, which is
    /// then stored on the vehicle so the next lookup is a variable read.
    fn vehicle_isolated(&self, vehicle: ObjectHandle) -> bool {
        let query = self.ctx.query();
        let scope = Scope::Object(vehicle);
        if let Some(amount) = query.variable(scope, "TFAR_isolatedAmount").as_f32() {
            return amount > ISOLATION_THRESHOLD;
        }
        let class = query.type_of(vehicle);
        let amount = self
            .ctx
            .cache()
            .config_property(&class, "tf_isolatedAmount", StateValue::Number(0.0))
            .as_f32()
            .unwrap_or(0.0);
        query.set_variable(scope, "TFAR_isolatedAmount", StateValue::from(amount));
        amount > ISOLATION_THRESHOLD
    }

    /// Below sea level the usability functions decide; above it the default
    /// applies without a query.
    fn query_radio_usability(&self) -> RadioUsability {
        let position = self.position.get();
        if !position.is_submerged() {
            return RadioUsability::default();
        }
        let isolated = self.isolated_inside.get();
        let can_speak = position.eye_pos.z > 0.0 || isolated;
        let depth = StateValue::from(position.eye_pos.z);
        let unit = self.unit();
        let ask = |function: &str, args: &[StateValue]| {
            self.ctx
                .call_function(function, args)
                .as_bool()
                .unwrap_or(false)
        };
        RadioUsability {
            short_range: ask(
                "TFAR_fnc_canUseSWRadio",
                &[unit.clone(), isolated.into(), can_speak.into(), depth.clone()],
            ),
            long_range: ask(
                "TFAR_fnc_canUseLRRadio",
                &[unit.clone(), isolated.into(), depth],
            ),
            digital: ask("TFAR_fnc_canUseDDRadio", &[unit, isolated.into()]),
        }
    }

    /// Local channels from the personal radio list, relayed channels from
    /// the `[object, variable]` pairs of the long-range list.
    fn query_radio_list(&self) -> Vec<ChannelId> {
        let unit = [self.unit()];
        let mut channels = Vec::new();

        let local = self.ctx.call_function("TFAR_fnc_radiosList", &unit);
        for item in local.as_array().unwrap_or_default() {
            if let Some(variable) = item.as_text() {
                channels.push(ChannelId::local(variable));
            }
        }

        let relayed = self.ctx.call_function("TFAR_fnc_lrRadiosList", &unit);
        for item in relayed.as_array().unwrap_or_default() {
            if let Some([object, variable, ..]) = item.as_array()
                && let (Some(object), Some(variable)) = (object.as_object(), variable.as_text())
                && !object.is_null()
            {
                channels.push(ChannelId::relayed(object, variable));
            }
        }
        channels
    }
}

impl std::fmt::Debug for EntityRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRecord")
            .field("handle", &self.handle)
            .field("name", &self.name)
            .field("observed", &self.is_observed())
            .finish_non_exhaustive()
    }
}
