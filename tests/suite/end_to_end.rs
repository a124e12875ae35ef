//! Host ticks and worker passes together, checked at the transport.

use std::thread;
use std::time::Duration;

use relay_types::{ObjectHandle, StateValue, Vec3};

use crate::common::Fixture;

const ALPHA: ObjectHandle = ObjectHandle::new(1);
const BRAVO: ObjectHandle = ObjectHandle::new(2);
const TRUCK: ObjectHandle = ObjectHandle::new(60);

fn pair() -> Fixture {
    let fx = Fixture::new();
    fx.world.define("TFAR_fnc_objectInterception", |_| 0.25.into());
    fx.world.spawn(ALPHA, "Alpha", Vec3::new(0.0, 0.0, 2.0));
    fx.world.spawn(BRAVO, "Bravo", Vec3::new(10.0, 0.0, 2.0));
    fx.world.observe(ALPHA);
    fx.roster.tick();
    fx
}

#[test]
fn position_record_fields() {
    let fx = pair();
    fx.roster.simulate_pass();
    fx.settle();
    fx.clock.advance(Duration::from_millis(150));
    fx.roster.simulate_pass();

    let last = fx.transport.positions_for("Bravo").pop().unwrap();
    assert_eq!(
        last,
        vec![
            "POS",
            "Bravo",
            "[10.000000,0.000000,2.000000]",
            "[0.000000,1.000000,0.000000]",
            "1",
            "1",
            "1",
            "0",
            "no",
            "0.000000",
            "1.000000",
            "0.250000",
            "0",
            "0",
        ]
    );
}

#[test]
fn first_publish_uses_defaults_without_blocking() {
    let fx = pair();
    fx.roster.simulate_pass();

    let first = fx.transport.positions_for("Bravo").pop().unwrap();
    assert_eq!(first[2], "[0.000000,0.000000,0.000000]");
    assert!(fx.roster.context().scheduler().pending() > 0);
}

#[test]
fn unchanged_payloads_are_not_resent() {
    let fx = pair();
    fx.roster.simulate_pass();
    fx.settle();
    fx.clock.advance(Duration::from_millis(150));
    fx.roster.simulate_pass();
    fx.settle();
    let sent = fx.transport.positions_for("Bravo").len();

    fx.clock.advance(Duration::from_millis(150));
    fx.roster.simulate_pass();
    assert_eq!(fx.transport.positions_for("Bravo").len(), sent);
    assert_eq!(
        fx.roster.record(BRAVO).unwrap().last_publish(),
        Some(fx.roster.context().now())
    );
}

#[test]
fn busy_transport_skips_the_pass() {
    let fx = pair();
    fx.transport.set_busy(true);
    fx.roster.simulate_pass();

    assert!(fx.transport.sent().is_empty());
    assert!(fx.roster.record(BRAVO).unwrap().last_publish().is_none());
}

#[test]
fn relayed_loudspeaker_is_announced() {
    let fx = Fixture::new();
    fx.world.vehicle(TRUCK, "Truck_F", "2:60");
    fx.world.define("TFAR_fnc_lrRadiosList", |args| {
        if args.first().and_then(StateValue::as_object) == Some(ALPHA) {
            StateValue::Array(vec![StateValue::Array(vec![
                TRUCK.into(),
                "driver_radio_settings".into(),
            ])])
        } else {
            StateValue::Array(Vec::new())
        }
    });
    fx.world.define("TFAR_fnc_getLrSpeakers", |_| true.into());
    fx.world.define("TFAR_fnc_getLrRadioCode", |_| "_opfor".into());
    fx.world.define("TFAR_fnc_getLrFrequency", |_| "50".into());
    fx.world.define("TFAR_fnc_getAdditionalLrChannel", |_| 2.0.into());
    fx.world.define("TFAR_fnc_getChannelFrequency", |args| {
        match args.get(1).and_then(StateValue::as_f32) {
            Some(channel) if (channel - 3.0).abs() < f32::EPSILON => "52.5".into(),
            _ => StateValue::Nil,
        }
    });
    fx.world.define("TFAR_fnc_getLrVolume", |_| 7.0.into());
    fx.world.spawn(ALPHA, "Alpha", Vec3::new(0.0, 0.0, 2.0));
    fx.world.observe(ALPHA);
    fx.roster.tick();

    fx.roster.simulate_pass();
    assert_eq!(fx.transport.speakers(), vec!["SPEAKERS\t~".to_string()]);
    fx.settle();

    fx.clock.advance(Duration::from_millis(600));
    fx.roster.simulate_pass();
    let speakers = fx.transport.speakers();
    assert_eq!(speakers.len(), 2);
    assert_eq!(
        speakers[1],
        "SPEAKERS\t2:60\n50_opfor|52.5_opfor\nAlpha\n[]\n7.000000\nno\n2.000000~"
    );
}

#[test]
fn worker_thread_never_queries_the_state_source() {
    let fx = pair();
    let host = thread::current().id();
    let worker = fx.roster.spawn_worker().unwrap();

    let settled = "[10.000000,0.000000,2.000000]";
    for _ in 0..500 {
        fx.roster.tick();
        fx.clock.advance(Duration::from_millis(50));
        if fx
            .transport
            .positions_for("Bravo")
            .iter()
            .any(|fields| fields[2] == settled)
        {
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }
    worker.shutdown();

    assert!(
        fx.transport
            .positions_for("Bravo")
            .iter()
            .any(|fields| fields[2] == settled)
    );
    let threads = fx.world.query_threads();
    assert_eq!(threads.len(), 1);
    assert!(threads.contains(&host));
}
