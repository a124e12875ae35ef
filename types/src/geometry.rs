use std::fmt;
use std::ops::Sub;

/// Opaque identity of an object owned by the external state source.
///
/// The host recycles nothing: once an object is deleted its handle reads as
/// [`ObjectHandle::NULL`] from every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectHandle(u64);

impl ObjectHandle {
    pub const NULL: Self = Self(0);

    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("<null>")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Euclidean distance between two points.
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }
}

impl Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// `[x,y,z]` with six fractional digits, the form the receiver parses.
impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.6},{:.6},{:.6}]", self.x, self.y, self.z)
    }
}

/// Where an entity hears from and which way it is facing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PositionInfo {
    pub eye_pos: Vec3,
    pub eye_direction: Vec3,
}

impl PositionInfo {
    #[must_use]
    pub const fn new(eye_pos: Vec3, eye_direction: Vec3) -> Self {
        Self {
            eye_pos,
            eye_direction,
        }
    }

    /// Below sea level the radio usability rules kick in.
    #[must_use]
    pub fn is_submerged(&self) -> bool {
        self.eye_pos.z < 0.0
    }
}
