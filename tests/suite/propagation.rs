//! Container changes reach the dependent cells inside one drain.

use relay_engine::{Scope, StateQuery};
use relay_types::{NO_VEHICLE, ObjectHandle, StateValue, Vec3};

use crate::common::Fixture;

const UNIT: ObjectHandle = ObjectHandle::new(1);
const TANK: ObjectHandle = ObjectHandle::new(50);

fn armored(fx: &Fixture) {
    fx.world.vehicle(TANK, "Tank_F", "2:50");
    fx.world.set_config("Tank_F", "tf_isolatedAmount", 0.9);
    fx.world.define("TFAR_fnc_isTurnedOut", |_| {
        StateValue::Array(vec![false.into(), 0.9.into()])
    });
    fx.world.spawn(UNIT, "Driver", Vec3::new(0.0, 0.0, 1.5));
}

#[test]
fn boarding_updates_vehicle_and_isolation_in_the_same_drain() {
    let fx = Fixture::new();
    armored(&fx);
    fx.roster.tick();
    let unit = fx.roster.record(UNIT).unwrap();
    unit.parent().force_update();
    fx.settle();
    assert_eq!(unit.vehicle_id().peek(), NO_VEHICLE);
    assert!(!unit.isolated_inside().peek());

    fx.world.board(UNIT, TANK);
    unit.parent().force_update();
    assert_eq!(fx.roster.context().scheduler().drain(), 1);

    assert_eq!(unit.parent().peek(), TANK);
    assert!(unit.vehicle_id().peek().starts_with("2:50\u{10}0.900000\u{10}"));
    assert!(unit.isolated_inside().peek());
    assert_eq!(fx.roster.context().scheduler().pending(), 0);
}

#[test]
fn isolation_default_is_written_back_to_the_vehicle() {
    let fx = Fixture::new();
    armored(&fx);
    fx.roster.tick();
    let unit = fx.roster.record(UNIT).unwrap();

    fx.world.board(UNIT, TANK);
    unit.parent().force_update();
    fx.settle();

    assert_eq!(
        fx.world
            .variable(Scope::Object(TANK), "TFAR_isolatedAmount")
            .as_f32(),
        Some(0.9)
    );
}

#[test]
fn dismounting_resets_identity() {
    let fx = Fixture::new();
    armored(&fx);
    fx.world.board(UNIT, TANK);
    fx.roster.tick();
    let unit = fx.roster.record(UNIT).unwrap();
    unit.parent().force_update();
    fx.settle();
    assert!(unit.isolated_inside().peek());

    fx.world.dismount(UNIT);
    unit.parent().force_update();
    fx.roster.context().scheduler().drain();

    assert_eq!(unit.vehicle_id().peek(), NO_VEHICLE);
    assert!(!unit.isolated_inside().peek());
}

#[test]
fn turned_out_occupant_is_not_isolated() {
    let fx = Fixture::new();
    fx.world.vehicle(TANK, "Tank_F", "2:50");
    fx.world.set_config("Tank_F", "tf_isolatedAmount", 0.9);
    fx.world.define("TFAR_fnc_isTurnedOut", |_| {
        StateValue::Array(vec![true.into(), 0.9.into()])
    });
    fx.world.spawn(UNIT, "Commander", Vec3::new(0.0, 0.0, 3.0));
    fx.world.board(UNIT, TANK);
    fx.roster.tick();
    let unit = fx.roster.record(UNIT).unwrap();
    unit.parent().force_update();
    fx.settle();

    assert!(!unit.isolated_inside().peek());
    assert!(unit.vehicle_id().peek().contains("\u{10}turnout\u{10}"));
}
