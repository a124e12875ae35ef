//! Shared test utilities and fixtures
//!
//! Wires the engine's in-memory state source and recording transport to a
//! roster driven by a manual clock.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use relay_core::ManualClock;
use relay_engine::{RelayContext, RelaySettings, Roster};

pub use relay_engine::testkit::{FakeWorld, RecordingTransport};

pub struct Fixture {
    pub world: Arc<FakeWorld>,
    pub clock: Arc<ManualClock>,
    pub transport: Arc<RecordingTransport>,
    pub roster: Arc<Roster>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_settings(RelaySettings::default())
    }

    pub fn with_settings(settings: RelaySettings) -> Self {
        let world = Arc::new(FakeWorld::default());
        let clock = Arc::new(ManualClock::new());
        let transport = Arc::new(RecordingTransport::default());
        let ctx = RelayContext::new(world.clone(), clock.clone(), settings);
        let roster = Roster::new(ctx, transport.clone());
        Self {
            world,
            clock,
            transport,
            roster,
        }
    }

    /// Tick until the scheduler is empty, without moving the clock.
    pub fn settle(&self) {
        for _ in 0..16 {
            self.roster.tick();
            if self.roster.context().scheduler().pending() == 0 {
                return;
            }
        }
    }

    /// Alternate host frames and worker passes for `duration`.
    pub fn run_for(&self, duration: Duration, frame: Duration) {
        let mut elapsed = Duration::ZERO;
        while elapsed < duration {
            self.roster.tick();
            self.roster.simulate_pass();
            self.clock.advance(frame);
            elapsed += frame;
        }
    }
}
