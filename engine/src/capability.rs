//! Collaborators the engine is handed rather than owning.
//!
//! [`StateQuery`] is the external state source and may only be called from
//! the privileged thread. [`Transport`] carries outbound records and is called
//! from the worker thread.

use relay_config::PublishMode;
use relay_types::{ObjectHandle, PositionInfo, StateValue, Vec3};
use thiserror::Error;

/// Where a variable lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// The process-wide namespace.
    Namespace,
    Object(ObjectHandle),
}

/// Read/write access to the external state source.
///
/// Missing data is reported as [`StateValue::Nil`], [`ObjectHandle::NULL`],
/// an empty string or a zero vector. Implementations never fail.
pub trait StateQuery: Send + Sync {
    fn variable(&self, scope: Scope, name: &str) -> StateValue;

    fn set_variable(&self, scope: Scope, name: &str, value: StateValue);

    /// A property of an object class in the static configuration tree.
    fn config_property(&self, class: &str, property: &str) -> StateValue;

    /// Invoke a callable previously read from a variable. Non-code values
    /// return `Nil`.
    fn call(&self, code: &StateValue, args: &[StateValue]) -> StateValue;

    /// Every entity that should have a record.
    fn all_entities(&self) -> Vec<ObjectHandle>;

    fn entity_name(&self, entity: ObjectHandle) -> String;

    /// Container the entity sits in, `NULL` when on foot.
    fn object_parent(&self, entity: ObjectHandle) -> ObjectHandle;

    fn type_of(&self, object: ObjectHandle) -> String;

    fn net_id(&self, object: ObjectHandle) -> String;

    fn velocity(&self, object: ObjectHandle) -> Vec3;

    fn eye_position(&self, entity: ObjectHandle) -> PositionInfo;

    /// Free camera position, used while spectating.
    fn camera_position(&self) -> PositionInfo;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is busy")]
    Busy,
    #[error("transport is closed")]
    Closed,
    #[error("transport I/O failed: {0}")]
    Io(String),
}

/// Outbound channel to the receiver.
pub trait Transport: Send + Sync {
    /// `false` while the transport is saturated; callers skip the cycle.
    fn can_send(&self) -> bool;

    fn send_async(&self, payload: &str) -> Result<(), TransportError>;

    /// Blocks until the receiver replies.
    fn send_sync(&self, payload: &str) -> Result<String, TransportError>;
}

/// Send one payload in the configured mode. Returns whether it was delivered.
pub(crate) fn deliver(transport: &dyn Transport, mode: PublishMode, payload: &str) -> bool {
    let result = match mode {
        PublishMode::Async => transport.send_async(payload),
        PublishMode::Sync => transport.send_sync(payload).map(|reply| {
            tracing::trace!(reply = %reply, "sync reply");
        }),
    };
    match result {
        Ok(()) => {
            tracing::trace!(mode = mode.as_str(), bytes = payload.len(), "sent");
            true
        }
        Err(TransportError::Busy) => {
            tracing::trace!("transport busy; payload dropped");
            false
        }
        Err(err) => {
            tracing::warn!(mode = mode.as_str(), "send failed: {err}");
            false
        }
    }
}
