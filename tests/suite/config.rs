//! Config files resolve into the settings the engine runs with.

use std::fs;
use std::time::Duration;

use relay_config::{ConfigError, PublishMode, RelayConfig, RelaySettings};
use relay_types::{ObjectHandle, Vec3};

use crate::common::Fixture;

fn write_config(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, content).unwrap();
    (dir, path)
}

#[test]
fn file_overrides_reach_the_resolved_settings() {
    let (_dir, path) = write_config(
        r#"
[roster]
reconcile_interval_ms = 250

[publish]
mode = "sync"
min_interval_ms = 50
max_interval_ms = 1000
near_distance = 15.0

[attenuation]
max_interval_ms = 8000

[cells]
radio_list_ms = 750

[host]
frame_ms = 0
run_seconds = 3
"#,
    );
    let config = RelayConfig::load_from(&path).unwrap();
    let settings = RelaySettings::from_config(Some(&config)).unwrap();

    assert_eq!(settings.roster.reconcile_interval, Duration::from_millis(250));
    assert_eq!(settings.publish.mode, PublishMode::Sync);
    assert_eq!(
        settings.publish.distance_curve.min_interval,
        Duration::from_millis(50)
    );
    assert!((settings.publish.near_distance - 15.0).abs() < f32::EPSILON);
    assert_eq!(
        settings.attenuation.age_curve.max_interval,
        Duration::from_secs(8)
    );
    assert_eq!(settings.cells.radio_list, Duration::from_millis(750));
    assert_eq!(settings.cells.position, Duration::from_millis(1000));
    assert_eq!(settings.host.frame, Duration::from_millis(1));
    assert_eq!(settings.host.run_for, Some(Duration::from_secs(3)));
}

#[test]
fn malformed_file_is_a_parse_error() {
    let (_dir, path) = write_config("[publish\nmode = ");
    assert!(matches!(
        RelayConfig::load_from(&path),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn inverted_distance_range_is_rejected() {
    let (_dir, path) = write_config("[publish]\nmin_distance = 100.0\nmax_distance = 10.0\n");
    let config = RelayConfig::load_from(&path).unwrap();
    assert!(matches!(
        RelaySettings::from_config(Some(&config)),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn nan_distance_is_rejected_before_it_reaches_the_curve() {
    let (_dir, path) = write_config("[publish]\nmin_distance = nan\n");
    let config = RelayConfig::load_from(&path).unwrap();
    let err = RelaySettings::from_config(Some(&config)).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
    assert!(err.to_string().contains("finite"));
}

#[test]
fn sync_mode_sends_through_the_blocking_path() {
    let (_dir, path) = write_config("[publish]\nmode = \"sync\"\n");
    let config = RelayConfig::load_from(&path).unwrap();
    let fx = Fixture::with_settings(RelaySettings::from_config(Some(&config)).unwrap());
    let unit = ObjectHandle::new(1);
    fx.world.spawn(unit, "Solo", Vec3::new(0.0, 0.0, 2.0));
    fx.world.observe(unit);
    fx.roster.tick();

    fx.roster.simulate_pass();
    assert_eq!(fx.transport.sync_count(), 2, "one POS and one SPEAKERS");
}

#[test]
fn near_distance_setting_moves_the_attenuation_switch() {
    let mut settings = RelaySettings::default();
    settings.publish.near_distance = 5.0;
    let fx = Fixture::with_settings(settings);
    let observer = ObjectHandle::new(1);
    let other = ObjectHandle::new(2);
    fx.world.spawn(observer, "Observer", Vec3::new(0.0, 0.0, 2.0));
    fx.world.spawn(other, "Other", Vec3::new(10.0, 0.0, 2.0));
    fx.world.observe(observer);
    fx.roster.tick();

    fx.roster.simulate_pass();
    fx.settle();
    fx.clock.advance(Duration::from_millis(200));
    fx.roster.simulate_pass();

    assert!(!fx.roster.record(other).unwrap().is_near_observer());
}
