//! Resolved, invariant-safe settings.
//!
//! Converts the optional, boundary-level [`RelayConfig`] into concrete values
//! with defaults applied, rejecting combinations the engine cannot honor.

use std::time::Duration;

use relay_core::IntervalCurve;

use crate::{
    AttenuationConfig, CellsConfig, ConfigError, HostConfig, PublishConfig, PublishMode,
    RelayConfig, RosterConfig,
};

const DEFAULT_RECONCILE_INTERVAL_MS: u64 = 1000;
const DEFAULT_IDLE_SLEEP_MS: u64 = 1000;
const DEFAULT_WORKER_QUANTUM_MS: u64 = 1;

const DEFAULT_MIN_DISTANCE: f32 = 5.0;
const DEFAULT_MAX_DISTANCE: f32 = 5000.0;
const DEFAULT_MIN_PUBLISH_MS: u64 = 100;
const DEFAULT_MAX_PUBLISH_MS: u64 = 2000;
const DEFAULT_NEAR_DISTANCE: f32 = 40.0;
const DEFAULT_SPEAKERS_INTERVAL_MS: u64 = 500;

const DEFAULT_MIN_AGE_MS: u64 = 0;
const DEFAULT_MAX_AGE_MS: u64 = 60_000;
const DEFAULT_MIN_ATTENUATION_MS: u64 = 200;
const DEFAULT_MAX_ATTENUATION_MS: u64 = 5000;

const DEFAULT_FRAME_MS: u64 = 16;
const DEFAULT_ENTITIES: usize = 4;

fn ms(value: Option<u64>, default: u64) -> Duration {
    Duration::from_millis(value.unwrap_or(default))
}

#[derive(Debug, Clone, Default)]
pub struct RelaySettings {
    pub roster: RosterSettings,
    pub publish: PublishSettings,
    pub attenuation: AttenuationSettings,
    pub cells: CellIntervals,
    pub host: HostSettings,
}

impl RelaySettings {
    /// Resolve settings; `None` yields the defaults.
    pub fn from_config(config: Option<&RelayConfig>) -> Result<Self, ConfigError> {
        let Some(config) = config else {
            return Ok(Self::default());
        };
        Ok(Self {
            roster: RosterSettings::from_config(config.roster.as_ref())?,
            publish: PublishSettings::from_config(config.publish.as_ref())?,
            attenuation: AttenuationSettings::from_config(config.attenuation.as_ref())?,
            cells: CellIntervals::from_config(config.cells.as_ref()),
            host: HostSettings::from_config(config.host.as_ref()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RosterSettings {
    pub reconcile_interval: Duration,
    pub idle_sleep: Duration,
    pub worker_quantum: Duration,
}

impl Default for RosterSettings {
    fn default() -> Self {
        Self {
            reconcile_interval: Duration::from_millis(DEFAULT_RECONCILE_INTERVAL_MS),
            idle_sleep: Duration::from_millis(DEFAULT_IDLE_SLEEP_MS),
            worker_quantum: Duration::from_millis(DEFAULT_WORKER_QUANTUM_MS),
        }
    }
}

impl RosterSettings {
    fn from_config(config: Option<&RosterConfig>) -> Result<Self, ConfigError> {
        let Some(config) = config else {
            return Ok(Self::default());
        };
        let worker_quantum = ms(config.worker_quantum_ms, DEFAULT_WORKER_QUANTUM_MS);
        if worker_quantum.is_zero() {
            return Err(ConfigError::Invalid(
                "roster.worker_quantum_ms must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            reconcile_interval: ms(config.reconcile_interval_ms, DEFAULT_RECONCILE_INTERVAL_MS),
            idle_sleep: ms(config.idle_sleep_ms, DEFAULT_IDLE_SLEEP_MS),
            worker_quantum,
        })
    }
}

#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub mode: PublishMode,
    /// Distance to the observer → publish interval.
    pub distance_curve: IntervalCurve,
    pub near_distance: f32,
    pub speakers_interval: Duration,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            mode: PublishMode::default(),
            distance_curve: IntervalCurve::new(
                DEFAULT_MIN_DISTANCE,
                DEFAULT_MAX_DISTANCE,
                Duration::from_millis(DEFAULT_MIN_PUBLISH_MS),
                Duration::from_millis(DEFAULT_MAX_PUBLISH_MS),
            ),
            near_distance: DEFAULT_NEAR_DISTANCE,
            speakers_interval: Duration::from_millis(DEFAULT_SPEAKERS_INTERVAL_MS),
        }
    }
}

impl PublishSettings {
    fn from_config(config: Option<&PublishConfig>) -> Result<Self, ConfigError> {
        let Some(config) = config else {
            return Ok(Self::default());
        };
        let min_distance = config.min_distance.unwrap_or(DEFAULT_MIN_DISTANCE);
        let max_distance = config.max_distance.unwrap_or(DEFAULT_MAX_DISTANCE);
        if !min_distance.is_finite() || !max_distance.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "publish distances must be finite (min {min_distance}, max {max_distance})"
            )));
        }
        if max_distance <= min_distance {
            return Err(ConfigError::Invalid(format!(
                "publish.max_distance ({max_distance}) must exceed publish.min_distance ({min_distance})"
            )));
        }
        let near_distance = config.near_distance.unwrap_or(DEFAULT_NEAR_DISTANCE);
        if !near_distance.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "publish.near_distance ({near_distance}) must be finite"
            )));
        }
        Ok(Self {
            mode: config.mode,
            distance_curve: IntervalCurve::new(
                min_distance,
                max_distance,
                ms(config.min_interval_ms, DEFAULT_MIN_PUBLISH_MS),
                ms(config.max_interval_ms, DEFAULT_MAX_PUBLISH_MS),
            ),
            near_distance,
            speakers_interval: ms(config.speakers_interval_ms, DEFAULT_SPEAKERS_INTERVAL_MS),
        })
    }
}

#[derive(Debug, Clone)]
pub struct AttenuationSettings {
    /// Time since last change → resample interval.
    pub age_curve: IntervalCurve,
}

impl Default for AttenuationSettings {
    fn default() -> Self {
        Self {
            age_curve: IntervalCurve::new(
                Duration::from_millis(DEFAULT_MIN_AGE_MS).as_secs_f32(),
                Duration::from_millis(DEFAULT_MAX_AGE_MS).as_secs_f32(),
                Duration::from_millis(DEFAULT_MIN_ATTENUATION_MS),
                Duration::from_millis(DEFAULT_MAX_ATTENUATION_MS),
            ),
        }
    }
}

impl AttenuationSettings {
    fn from_config(config: Option<&AttenuationConfig>) -> Result<Self, ConfigError> {
        let Some(config) = config else {
            return Ok(Self::default());
        };
        let min_age = ms(config.min_age_ms, DEFAULT_MIN_AGE_MS);
        let max_age = ms(config.max_age_ms, DEFAULT_MAX_AGE_MS);
        if max_age <= min_age {
            return Err(ConfigError::Invalid(format!(
                "attenuation.max_age_ms ({}) must exceed attenuation.min_age_ms ({})",
                max_age.as_millis(),
                min_age.as_millis()
            )));
        }
        Ok(Self {
            age_curve: IntervalCurve::new(
                min_age.as_secs_f32(),
                max_age.as_secs_f32(),
                ms(config.min_interval_ms, DEFAULT_MIN_ATTENUATION_MS),
                ms(config.max_interval_ms, DEFAULT_MAX_ATTENUATION_MS),
            ),
        })
    }
}

/// Starting interval of every cache cell.
#[derive(Debug, Clone)]
pub struct CellIntervals {
    pub position_source: Duration,
    pub position: Duration,
    pub spectating: Duration,
    pub parent: Duration,
    pub vehicle_id: Duration,
    pub isolation: Duration,
    pub radio_usability: Duration,
    pub voice_volume: Duration,
    pub radio_list: Duration,
    pub object_interception_enabled: Duration,
    pub speaker_enabled: Duration,
    pub radio_code: Duration,
    pub frequencies: Duration,
    pub network_id: Duration,
    pub radio_volume: Duration,
}

impl Default for CellIntervals {
    fn default() -> Self {
        Self::from_config(None)
    }
}

impl CellIntervals {
    fn from_config(config: Option<&CellsConfig>) -> Self {
        let c = config.unwrap_or(&EMPTY_CELLS);
        Self {
            position_source: ms(c.position_source_ms, 200),
            position: ms(c.position_ms, 1000),
            spectating: ms(c.spectating_ms, 200),
            parent: ms(c.parent_ms, 200),
            vehicle_id: ms(c.vehicle_id_ms, 1000),
            isolation: ms(c.isolation_ms, 200),
            radio_usability: ms(c.radio_usability_ms, 500),
            voice_volume: ms(c.voice_volume_ms, 1000),
            radio_list: ms(c.radio_list_ms, 2000),
            object_interception_enabled: ms(c.object_interception_enabled_ms, 2000),
            speaker_enabled: ms(c.speaker_enabled_ms, 100),
            radio_code: ms(c.radio_code_ms, 2000),
            frequencies: ms(c.frequencies_ms, 2000),
            network_id: ms(c.network_id_ms, 20_000),
            radio_volume: ms(c.radio_volume_ms, 500),
        }
    }
}

const EMPTY_CELLS: CellsConfig = CellsConfig {
    position_source_ms: None,
    position_ms: None,
    spectating_ms: None,
    parent_ms: None,
    vehicle_id_ms: None,
    isolation_ms: None,
    radio_usability_ms: None,
    voice_volume_ms: None,
    radio_list_ms: None,
    object_interception_enabled_ms: None,
    speaker_enabled_ms: None,
    radio_code_ms: None,
    frequencies_ms: None,
    network_id_ms: None,
    radio_volume_ms: None,
};

#[derive(Debug, Clone)]
pub struct HostSettings {
    pub frame: Duration,
    pub run_for: Option<Duration>,
    pub entities: usize,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self::from_config(None)
    }
}

impl HostSettings {
    fn from_config(config: Option<&HostConfig>) -> Self {
        let frame_ms = config.and_then(|c| c.frame_ms);
        Self {
            frame: ms(frame_ms, DEFAULT_FRAME_MS).max(Duration::from_millis(1)),
            run_for: config
                .and_then(|c| c.run_seconds)
                .map(Duration::from_secs),
            entities: config.and_then(|c| c.entities).unwrap_or(DEFAULT_ENTITIES),
        }
    }
}
