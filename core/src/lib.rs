//! Scheduling and caching engine for the relay.
//!
//! The external state source may only be queried from one privileged thread,
//! while publication runs on a worker thread. This crate bridges the two:
//!
//! - [`Scheduler`]: any thread enqueues, the privileged thread drains once per
//!   tick.
//! - [`CachedValue`]: a per-attribute cache with its own interval, an optional
//!   update guard, change subscribers and at most one recomputation in flight.
//! - [`IntervalCurve`]: the clamp-and-lerp used to retune intervals.
//! - [`Clock`] / [`ThreadAffinity`]: injectable time and thread checks.

mod affinity;
mod cell;
mod clock;
mod curve;
mod scheduler;

pub use affinity::ThreadAffinity;
pub use cell::{CachedValue, CellBuilder, UpdateState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use curve::IntervalCurve;
pub use scheduler::{Scheduler, Task};
