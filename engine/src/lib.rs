//! Entity tracking and publication for the relay.
//!
//! Wires the [`relay_core`] cells to a concrete state source: one
//! [`EntityRecord`] per tracked entity, one [`RadioRecord`] per channel it
//! carries, and a [`Roster`] that owns them, ticks on the privileged thread
//! and publishes from a worker thread.

mod capability;
mod context;
mod entity;
mod radio;
mod roster;
mod state_cache;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use capability::{Scope, StateQuery, Transport, TransportError};
pub use context::RelayContext;
pub use entity::{EntityRecord, RadioUsability};
pub use radio::RadioRecord;
pub use roster::{Roster, WorkerHandle};
pub use state_cache::StateCache;

pub use relay_config::{PublishMode, RelaySettings};
