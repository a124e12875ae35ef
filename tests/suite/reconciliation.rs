//! Roster and radio reconciliation keep surviving records intact.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use relay_types::{ChannelId, ObjectHandle, StateValue, Vec3};

use crate::common::Fixture;

const ALPHA: ObjectHandle = ObjectHandle::new(1);
const BRAVO: ObjectHandle = ObjectHandle::new(2);
const CHARLIE: ObjectHandle = ObjectHandle::new(3);

fn with_radio_list(fx: &Fixture) -> Arc<Mutex<Vec<&'static str>>> {
    let radios = Arc::new(Mutex::new(Vec::<&'static str>::new()));
    let listed = Arc::clone(&radios);
    fx.world.define("TFAR_fnc_radiosList", move |_| {
        StateValue::Array(listed.lock().iter().map(|r| (*r).into()).collect())
    });
    radios
}

fn ids(fx: &Fixture, handle: ObjectHandle) -> Vec<ChannelId> {
    fx.roster
        .record(handle)
        .unwrap()
        .radios()
        .iter()
        .map(|radio| radio.id().clone())
        .collect()
}

#[test]
fn radio_records_survive_reconciliation_by_identity() {
    let fx = Fixture::new();
    let radios = with_radio_list(&fx);
    fx.world.spawn(ALPHA, "Alpha", Vec3::new(0.0, 0.0, 2.0));
    *radios.lock() = vec!["radio_a", "radio_b"];
    fx.roster.tick();
    let alpha = fx.roster.record(ALPHA).unwrap();

    alpha.radio_list().force_update();
    fx.settle();
    assert_eq!(
        ids(&fx, ALPHA),
        vec![ChannelId::local("radio_a"), ChannelId::local("radio_b")]
    );
    let bravo_radio = alpha
        .radios()
        .into_iter()
        .find(|r| r.id() == &ChannelId::local("radio_b"))
        .unwrap();

    *radios.lock() = vec!["radio_b", "radio_c"];
    fx.clock.advance(Duration::from_secs(3));
    alpha.radio_list().refresh();
    fx.settle();

    let after = alpha.radios();
    assert_eq!(after.len(), 2);
    assert!(Arc::ptr_eq(&after[0], &bravo_radio));
    assert_eq!(after[1].id(), &ChannelId::local("radio_c"));
}

#[test]
fn unchanged_radio_list_leaves_records_alone() {
    let fx = Fixture::new();
    let radios = with_radio_list(&fx);
    fx.world.spawn(ALPHA, "Alpha", Vec3::ZERO);
    *radios.lock() = vec!["radio_a"];
    fx.roster.tick();
    let alpha = fx.roster.record(ALPHA).unwrap();
    alpha.radio_list().force_update();
    fx.settle();
    let before = alpha.radios();

    fx.clock.advance(Duration::from_secs(3));
    alpha.radio_list().refresh();
    fx.settle();
    assert!(Arc::ptr_eq(&before[0], &alpha.radios()[0]));
}

#[test]
fn roster_follows_the_entity_list() {
    let fx = Fixture::new();
    fx.world.spawn(ALPHA, "Alpha", Vec3::ZERO);
    fx.world.spawn(BRAVO, "Bravo", Vec3::ZERO);
    fx.roster.tick();
    let alpha = fx.roster.record(ALPHA).unwrap();

    fx.world.despawn(BRAVO);
    fx.world.spawn(CHARLIE, "Charlie", Vec3::ZERO);
    fx.clock.advance(Duration::from_millis(1001));
    fx.roster.tick();

    let handles: Vec<_> = fx.roster.records().iter().map(|r| r.handle()).collect();
    assert_eq!(handles, vec![ALPHA, CHARLIE]);
    assert!(Arc::ptr_eq(&alpha, &fx.roster.record(ALPHA).unwrap()));
}

#[test]
fn despawned_observer_is_released() {
    let fx = Fixture::new();
    fx.world.spawn(ALPHA, "Alpha", Vec3::ZERO);
    fx.world.spawn(BRAVO, "Bravo", Vec3::ZERO);
    fx.world.observe(ALPHA);
    fx.roster.tick();
    let alpha = fx.roster.observed().unwrap();

    fx.world.despawn(ALPHA);
    fx.world.observe(BRAVO);
    fx.clock.advance(Duration::from_millis(1001));
    fx.roster.tick();

    assert!(!alpha.is_observed());
    assert_eq!(fx.roster.observed().unwrap().handle(), BRAVO);
}
