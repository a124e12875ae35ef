//! A small simulated world to drive the roster without a real host.
//!
//! Entity 1 is the observer. The others circle it at increasing radii; entity
//! 2 rides in an intercom-equipped vehicle with a long-range radio and entity 3
//! dives below sea level every half minute.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use relay_engine::{Scope, StateQuery, Transport, TransportError};
use relay_types::{ObjectHandle, PositionInfo, StateValue, Vec3};

const VEHICLE: ObjectHandle = ObjectHandle::new(1000);
const VEHICLE_CLASS: &str = "B_MRAP_01_F";
const PASSENGER: ObjectHandle = ObjectHandle::new(2);
const DIVER: ObjectHandle = ObjectHandle::new(3);

const FUNCTIONS: &[&str] = &[
    "TFAR_fnc_isTurnedOut",
    "TFAR_fnc_canUseSWRadio",
    "TFAR_fnc_canUseLRRadio",
    "TFAR_fnc_canUseDDRadio",
    "TFAR_fnc_objectInterception",
    "TFAR_fnc_calcTerrainInterception",
    "TFAR_fnc_radiosList",
    "TFAR_fnc_lrRadiosList",
    "TFAR_fnc_getSwSpeakers",
    "TFAR_fnc_getLrSpeakers",
    "TFAR_fnc_getSwRadioCode",
    "TFAR_fnc_getLrRadioCode",
    "TFAR_fnc_getSwFrequency",
    "TFAR_fnc_getLrFrequency",
    "TFAR_fnc_getAdditionalSwChannel",
    "TFAR_fnc_getAdditionalLrChannel",
    "TFAR_fnc_getChannelFrequency",
    "TFAR_fnc_getSwVolume",
    "TFAR_fnc_getLrVolume",
];

pub struct SimWorld {
    started: Instant,
    entities: usize,
    variables: Mutex<HashMap<(Scope, String), StateValue>>,
}

impl SimWorld {
    pub fn new(entities: usize) -> Self {
        let mut variables = HashMap::new();
        for name in FUNCTIONS {
            variables.insert(
                (Scope::Namespace, (*name).to_string()),
                StateValue::code(name),
            );
        }
        variables.insert(
            (Scope::Namespace, "TFAR_currentUnit".to_string()),
            StateValue::Object(ObjectHandle::new(1)),
        );
        variables.insert(
            (Scope::Namespace, "TFAR_objectInterceptionEnabled".to_string()),
            StateValue::Bool(true),
        );
        variables.insert(
            (Scope::Namespace, "TFAR_defaultIntercomSlot".to_string()),
            StateValue::Number(1.0),
        );
        Self {
            started: Instant::now(),
            entities: entities.max(1),
            variables: Mutex::new(variables),
        }
    }

    fn elapsed(&self) -> f32 {
        self.started.elapsed().as_secs_f32()
    }

    fn index(entity: ObjectHandle) -> u64 {
        entity.value()
    }

    fn is_entity(&self, entity: ObjectHandle) -> bool {
        (1..=self.entities as u64).contains(&entity.value())
    }

    fn entity_arg(args: &[StateValue]) -> ObjectHandle {
        args.first()
            .and_then(StateValue::as_object)
            .unwrap_or(ObjectHandle::NULL)
    }

    fn eye(&self, entity: ObjectHandle) -> PositionInfo {
        let i = Self::index(entity) as f32;
        if entity == ObjectHandle::new(1) {
            return PositionInfo::new(Vec3::new(0.0, 0.0, 1.7), Vec3::new(0.0, 1.0, 0.0));
        }
        let t = self.elapsed();
        let angle = t * 0.05 * i;
        let radius = 15.0 * i * i;
        let height = if entity == DIVER && (t / 30.0) as u32 % 2 == 1 {
            -2.5
        } else {
            1.7
        };
        PositionInfo::new(
            Vec3::new(radius * angle.cos(), radius * angle.sin(), height),
            Vec3::new(-angle.sin(), angle.cos(), 0.0),
        )
    }

    fn dispatch(&self, function: &str, args: &[StateValue]) -> StateValue {
        match function {
            "TFAR_fnc_isTurnedOut" => StateValue::Array(vec![false.into(), 0.6.into()]),
            "TFAR_fnc_canUseSWRadio" | "TFAR_fnc_canUseLRRadio" => false.into(),
            "TFAR_fnc_canUseDDRadio" => true.into(),
            "TFAR_fnc_objectInterception" => 0.1.into(),
            "TFAR_fnc_calcTerrainInterception" => {
                let entity = Self::entity_arg(args);
                let distance = self.eye(entity).eye_pos.length();
                StateValue::from((distance / 1000.0).min(1.0))
            }
            "TFAR_fnc_radiosList" => {
                let entity = Self::entity_arg(args);
                StateValue::Array(vec![format!("tf_anprc152_{}", entity.value()).into()])
            }
            "TFAR_fnc_lrRadiosList" => {
                if Self::entity_arg(args) == PASSENGER {
                    StateValue::Array(vec![StateValue::Array(vec![
                        VEHICLE.into(),
                        "driver_radio_settings".into(),
                    ])])
                } else {
                    StateValue::Array(Vec::new())
                }
            }
            // Loudspeakers toggle every ten seconds.
            "TFAR_fnc_getSwSpeakers" | "TFAR_fnc_getLrSpeakers" => {
                ((self.elapsed() / 10.0) as u32 % 2 == 1).into()
            }
            "TFAR_fnc_getSwRadioCode" | "TFAR_fnc_getLrRadioCode" => "_bluefor".into(),
            "TFAR_fnc_getSwFrequency" => "152.5".into(),
            "TFAR_fnc_getLrFrequency" => "50".into(),
            "TFAR_fnc_getAdditionalSwChannel" => (-1.0).into(),
            "TFAR_fnc_getAdditionalLrChannel" => 2.0.into(),
            "TFAR_fnc_getChannelFrequency" => "52.5".into(),
            "TFAR_fnc_getSwVolume" | "TFAR_fnc_getLrVolume" => 7.0.into(),
            _ => StateValue::Nil,
        }
    }

    fn variables(&self) -> std::sync::MutexGuard<'_, HashMap<(Scope, String), StateValue>> {
        self.variables
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl StateQuery for SimWorld {
    fn variable(&self, scope: Scope, name: &str) -> StateValue {
        self.variables()
            .get(&(scope, name.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn set_variable(&self, scope: Scope, name: &str, value: StateValue) {
        self.variables().insert((scope, name.to_string()), value);
    }

    fn config_property(&self, class: &str, property: &str) -> StateValue {
        match (class, property) {
            (VEHICLE_CLASS, "tf_isolatedAmount") => StateValue::Number(0.6),
            (VEHICLE_CLASS, "TFAR_hasIntercom") => StateValue::Number(1.0),
            _ => StateValue::Nil,
        }
    }

    fn call(&self, code: &StateValue, args: &[StateValue]) -> StateValue {
        code.as_code()
            .map_or(StateValue::Nil, |function| self.dispatch(function, args))
    }

    fn all_entities(&self) -> Vec<ObjectHandle> {
        (1..=self.entities as u64).map(ObjectHandle::new).collect()
    }

    fn entity_name(&self, entity: ObjectHandle) -> String {
        if self.is_entity(entity) {
            format!("Unit {}", entity.value())
        } else {
            String::new()
        }
    }

    fn object_parent(&self, entity: ObjectHandle) -> ObjectHandle {
        if entity == PASSENGER && self.is_entity(entity) {
            VEHICLE
        } else {
            ObjectHandle::NULL
        }
    }

    fn type_of(&self, object: ObjectHandle) -> String {
        if object == VEHICLE {
            VEHICLE_CLASS.to_string()
        } else {
            "CAManBase".to_string()
        }
    }

    fn net_id(&self, object: ObjectHandle) -> String {
        if object.is_null() {
            String::new()
        } else {
            format!("2:{}", object.value())
        }
    }

    fn velocity(&self, object: ObjectHandle) -> Vec3 {
        if object == PASSENGER {
            Vec3::new(8.0, 0.0, 0.0)
        } else {
            Vec3::ZERO
        }
    }

    fn eye_position(&self, entity: ObjectHandle) -> PositionInfo {
        if self.is_entity(entity) {
            self.eye(entity)
        } else {
            PositionInfo::default()
        }
    }

    fn camera_position(&self) -> PositionInfo {
        PositionInfo::default()
    }
}

/// Logs every payload at `debug` and keeps counts for the exit summary.
#[derive(Debug, Default)]
pub struct LogTransport {
    positions: AtomicUsize,
    speakers: AtomicUsize,
}

impl LogTransport {
    pub fn counts(&self) -> (usize, usize) {
        (
            self.positions.load(Ordering::Relaxed),
            self.speakers.load(Ordering::Relaxed),
        )
    }

    fn record(&self, payload: &str) {
        if payload.starts_with("SPEAKERS") {
            self.speakers.fetch_add(1, Ordering::Relaxed);
        } else {
            self.positions.fetch_add(1, Ordering::Relaxed);
        }
        tracing::debug!(target: "relay::transport", payload = ?payload, "outbound");
    }
}

impl Transport for LogTransport {
    fn can_send(&self) -> bool {
        true
    }

    fn send_async(&self, payload: &str) -> Result<(), TransportError> {
        self.record(payload);
        Ok(())
    }

    fn send_sync(&self, payload: &str) -> Result<String, TransportError> {
        self.record(payload);
        Ok("OK".to_string())
    }
}
