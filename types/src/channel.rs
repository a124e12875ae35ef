use std::fmt;

use crate::geometry::ObjectHandle;

/// Identity of one communication channel carried by an entity.
///
/// Local channels live in a variable on the carrier itself; relayed channels
/// live in a variable on another object (a backpack or vehicle set) and are
/// only unique as an (object, variable) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelId {
    Local { variable: String },
    Relayed { object: ObjectHandle, variable: String },
}

impl ChannelId {
    #[must_use]
    pub fn local(variable: impl Into<String>) -> Self {
        Self::Local {
            variable: variable.into(),
        }
    }

    #[must_use]
    pub fn relayed(object: ObjectHandle, variable: impl Into<String>) -> Self {
        Self::Relayed {
            object,
            variable: variable.into(),
        }
    }

    #[must_use]
    pub fn variable(&self) -> &str {
        match self {
            Self::Local { variable } | Self::Relayed { variable, .. } => variable,
        }
    }

    #[must_use]
    pub fn object(&self) -> Option<ObjectHandle> {
        match self {
            Self::Local { .. } => None,
            Self::Relayed { object, .. } => Some(*object),
        }
    }

    #[must_use]
    pub fn is_relayed(&self) -> bool {
        matches!(self, Self::Relayed { .. })
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { variable } => f.write_str(variable),
            Self::Relayed { object, variable } => write!(f, "{object}/{variable}"),
        }
    }
}
