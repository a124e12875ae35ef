//! Dynamic values returned by the external state source.
//!
//! The host hands back loosely typed values (a variable may hold a number, a
//! string, an array of positions or nothing at all). Coercions here never fail
//! loudly: they return `None` and the caller picks a safe default.

use std::sync::Arc;

use crate::geometry::{ObjectHandle, PositionInfo, Vec3};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum StateValue {
    /// The "no value" sentinel: unset variable, missing config entry,
    /// deleted object.
    #[default]
    Nil,
    Bool(bool),
    Number(f64),
    Text(Arc<str>),
    Array(Vec<StateValue>),
    Object(ObjectHandle),
    /// A callable stored in a variable, identified by its registered name.
    Code(Arc<str>),
}

impl StateValue {
    #[must_use]
    pub fn text(value: impl AsRef<str>) -> Self {
        Self::Text(Arc::from(value.as_ref()))
    }

    #[must_use]
    pub fn code(name: impl AsRef<str>) -> Self {
        Self::Code(Arc::from(name.as_ref()))
    }

    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Numbers are truthy when non-zero, mirroring the host's own coercion.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Number(n) => Some(*n != 0.0),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::Number(n) => Some(*n as f32),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Text form of scalar values. Arrays and objects have no text form.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.to_string()),
            Self::Number(n) => Some(format_number(*n)),
            Self::Bool(b) => Some(if *b { "true" } else { "false" }.to_string()),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<ObjectHandle> {
        match self {
            Self::Object(handle) => Some(*handle),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[StateValue]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_code(&self) -> Option<&str> {
        match self {
            Self::Code(name) => Some(name),
            _ => None,
        }
    }

    /// `[x, y, z]` number triple.
    #[must_use]
    pub fn as_vec3(&self) -> Option<Vec3> {
        match self.as_array()? {
            [x, y, z, ..] => Some(Vec3::new(x.as_f32()?, y.as_f32()?, z.as_f32()?)),
            _ => None,
        }
    }

    /// `[[eye x, y, z], [dir x, y, z]]`, the shape custom position callbacks
    /// return.
    #[must_use]
    pub fn as_position(&self) -> Option<PositionInfo> {
        match self.as_array()? {
            [pos, dir, ..] => Some(PositionInfo::new(pos.as_vec3()?, dir.as_vec3()?)),
            _ => None,
        }
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<f32> for StateValue {
    fn from(value: f32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        Self::Text(Arc::from(value))
    }
}

impl From<ObjectHandle> for StateValue {
    fn from(value: ObjectHandle) -> Self {
        Self::Object(value)
    }
}

impl From<Vec3> for StateValue {
    fn from(value: Vec3) -> Self {
        Self::Array(vec![value.x.into(), value.y.into(), value.z.into()])
    }
}

impl From<Vec<StateValue>> for StateValue {
    fn from(value: Vec<StateValue>) -> Self {
        Self::Array(value)
    }
}

/// Integral numbers print without a fractional part (`"2"`, not `"2.0"`),
/// which is how the host stringifies numeric variables.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
