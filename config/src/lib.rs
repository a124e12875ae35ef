//! Configuration for the relay.
//!
//! The file is TOML, every field optional. [`RelayConfig`] is the boundary
//! shape as parsed; [`RelaySettings`] is the resolved form with defaults
//! applied and durations as [`std::time::Duration`].
//!
//! ```toml
//! [roster]
//! reconcile_interval_ms = 1000
//!
//! [publish]
//! mode = "async"
//! min_distance = 5.0
//! max_distance = 5000.0
//! min_interval_ms = 100
//! max_interval_ms = 2000
//!
//! [attenuation]
//! max_age_ms = 60000
//! max_interval_ms = 5000
//!
//! [cells]
//! position_ms = 1000
//! ```

mod resolved;

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub use resolved::{
    AttenuationSettings, CellIntervals, HostSettings, PublishSettings, RelaySettings,
    RosterSettings,
};

/// Overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "RELAY_CONFIG";

#[derive(Debug, Default, Deserialize)]
pub struct RelayConfig {
    pub roster: Option<RosterConfig>,
    pub publish: Option<PublishConfig>,
    pub attenuation: Option<AttenuationConfig>,
    pub cells: Option<CellsConfig>,
    /// Only read by the bundled host driver.
    pub host: Option<HostConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// How often the roster re-lists entities and how the worker paces itself.
#[derive(Debug, Default, Deserialize)]
pub struct RosterConfig {
    pub reconcile_interval_ms: Option<u64>,
    /// Worker sleep while there is nothing to simulate.
    pub idle_sleep_ms: Option<u64>,
    /// Worker sleep between passes.
    pub worker_quantum_ms: Option<u64>,
}

/// Transport send mode.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PublishMode {
    /// Fire-and-forget; dropped when the transport is busy.
    #[default]
    Async,
    /// Request/reply; blocks the worker until the receiver answers.
    Sync,
}

impl PublishMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Async => "async",
            Self::Sync => "sync",
        }
    }
}

/// Distance-driven publish cadence.
///
/// ```toml
/// [publish]
/// mode = "sync"
/// near_distance = 40.0
/// speakers_interval_ms = 500
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct PublishConfig {
    #[serde(default)]
    pub mode: PublishMode,
    pub min_distance: Option<f32>,
    pub max_distance: Option<f32>,
    pub min_interval_ms: Option<u64>,
    pub max_interval_ms: Option<u64>,
    /// Within this distance of the observer, object attenuation is sent
    /// instead of terrain attenuation.
    pub near_distance: Option<f32>,
    pub speakers_interval_ms: Option<u64>,
}

/// Staleness-driven resample cadence for the attenuation cells.
#[derive(Debug, Default, Deserialize)]
pub struct AttenuationConfig {
    pub min_age_ms: Option<u64>,
    pub max_age_ms: Option<u64>,
    pub min_interval_ms: Option<u64>,
    pub max_interval_ms: Option<u64>,
}

/// Starting intervals for individual cache cells, in milliseconds.
#[derive(Debug, Default, Deserialize)]
pub struct CellsConfig {
    pub position_source_ms: Option<u64>,
    pub position_ms: Option<u64>,
    pub spectating_ms: Option<u64>,
    pub parent_ms: Option<u64>,
    pub vehicle_id_ms: Option<u64>,
    pub isolation_ms: Option<u64>,
    pub radio_usability_ms: Option<u64>,
    pub voice_volume_ms: Option<u64>,
    pub radio_list_ms: Option<u64>,
    pub object_interception_enabled_ms: Option<u64>,
    pub speaker_enabled_ms: Option<u64>,
    pub radio_code_ms: Option<u64>,
    pub frequencies_ms: Option<u64>,
    pub network_id_ms: Option<u64>,
    pub radio_volume_ms: Option<u64>,
}

/// Host-driver settings.
#[derive(Debug, Default, Deserialize)]
pub struct HostConfig {
    pub frame_ms: Option<u64>,
    /// Stop after this many seconds; run until interrupted when absent.
    pub run_seconds: Option<u64>,
    /// Number of simulated entities.
    pub entities: Option<usize>,
}

impl RelayConfig {
    /// Load from [`config_path`]. A missing file is `Ok(None)`.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let Some(path) = config_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }
}

/// `$RELAY_CONFIG` if set, else `~/.relay/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".relay").join("config.toml"))
}
