//! Core domain types for the relay.
//!
//! This crate contains pure domain types with no IO, no threads and minimal
//! dependencies: geometry, the dynamic values the external state source hands
//! back, channel identities, and the outbound wire records.

mod channel;
mod geometry;
mod value;
pub mod wire;

pub use channel::ChannelId;
pub use geometry::{ObjectHandle, PositionInfo, Vec3};
pub use value::StateValue;
pub use wire::{
    ChannelDescriptor, Isolation, NO_VEHICLE, PositionRecord, SpeakersRecord, VehicleIdentity,
};
