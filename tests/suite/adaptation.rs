//! Publish and attenuation intervals follow distance and value age.

use std::time::Duration;

use relay_engine::RelaySettings;
use relay_types::{ObjectHandle, StateValue, Vec3};

use crate::common::Fixture;

const OBSERVER: ObjectHandle = ObjectHandle::new(1);
const NEAR: ObjectHandle = ObjectHandle::new(2);
const FAR: ObjectHandle = ObjectHandle::new(3);

fn squad() -> Fixture {
    let fx = Fixture::new();
    fx.world.define("TFAR_fnc_objectInterception", |_| 0.25.into());
    fx.world
        .define("TFAR_fnc_calcTerrainInterception", |_| StateValue::Number(0.3));
    fx.world.spawn(OBSERVER, "Observer", Vec3::new(0.0, 0.0, 2.0));
    fx.world.spawn(NEAR, "Near", Vec3::new(10.0, 0.0, 2.0));
    fx.world.spawn(FAR, "Far", Vec3::new(6000.0, 0.0, 2.0));
    fx.world.observe(OBSERVER);
    fx.roster.tick();
    fx
}

/// One worker pass followed by the host catching up on what it queued.
fn round(fx: &Fixture) {
    fx.roster.simulate_pass();
    fx.settle();
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[test]
fn default_distance_curve_endpoints() {
    let curve = RelaySettings::default().publish.distance_curve;
    assert_eq!(curve.at(5.0), Duration::from_millis(100));
    assert_eq!(curve.at(5000.0), Duration::from_millis(2000));
    assert_eq!(curve.at(1.0), Duration::from_millis(100));
    assert_eq!(curve.at(80_000.0), Duration::from_millis(2000));
    let mid = millis(curve.at(2502.5));
    assert!((mid - 1050.0).abs() < 0.5, "{mid}");
}

#[test]
fn publish_interval_tracks_distance_to_observer() {
    let fx = squad();
    round(&fx);
    fx.clock.advance(Duration::from_millis(2100));
    round(&fx);

    let near = fx.roster.record(NEAR).unwrap();
    let interval = millis(near.publish_interval());
    assert!((interval - 101.9).abs() < 0.1, "{interval}");
    assert_eq!(near.position().interval(), near.publish_interval());

    let far = fx.roster.record(FAR).unwrap();
    assert_eq!(far.publish_interval(), Duration::from_millis(2000));
    assert_eq!(far.position().interval(), Duration::from_millis(2000));
}

#[test]
fn observed_entity_samples_at_the_fastest_rate() {
    let fx = squad();
    round(&fx);
    fx.clock.advance(Duration::from_millis(2100));
    round(&fx);

    let observer = fx.roster.observed().unwrap();
    assert_eq!(observer.publish_interval(), Duration::from_millis(100));
    assert_eq!(observer.position().interval(), Duration::from_millis(100));
}

#[test]
fn stationary_attenuation_backs_off_to_the_slowest_rate() {
    let fx = squad();
    round(&fx);
    fx.clock.advance(Duration::from_millis(2100));
    round(&fx);

    let far = fx.roster.record(FAR).unwrap();
    assert!(!far.is_near_observer());
    assert!((far.terrain_attenuation().peek() - 0.3).abs() < f32::EPSILON);

    fx.clock.advance(Duration::from_secs(30));
    round(&fx);
    let halfway = millis(far.terrain_attenuation().interval());
    assert!((halfway - 2600.0).abs() < 5.0, "{halfway}");

    fx.clock.advance(Duration::from_secs(31));
    round(&fx);
    assert_eq!(
        far.terrain_attenuation().interval(),
        Duration::from_secs(5)
    );
}

#[test]
fn near_entities_use_object_attenuation_only() {
    let fx = squad();
    round(&fx);
    fx.clock.advance(Duration::from_millis(2100));
    round(&fx);

    let near = fx.roster.record(NEAR).unwrap();
    assert!(near.is_near_observer());
    assert!((near.object_attenuation().peek() - 0.25).abs() < f32::EPSILON);
    assert_eq!(fx.world.calls_to("TFAR_fnc_calcTerrainInterception"), 1);
}
