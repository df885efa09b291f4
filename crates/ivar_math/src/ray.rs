use crate::DVec3;

/// A ray in 3D space with an origin and a direction.
///
/// Rays are used for raytracing - they represent a half-line starting at
/// `origin` and traveling in `direction`. Acceleration structures expect a
/// normalized direction.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: DVec3,
    pub direction: DVec3,
}

impl Ray {
    /// Create a new ray.
    #[inline]
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Self { origin, direction }
    }

    /// Get the point along the ray at parameter t.
    ///
    /// Returns: origin + t * direction
    #[inline]
    pub fn at(&self, t: f64) -> DVec3 {
        self.origin + self.direction * t
    }
}

impl Default for Ray {
    fn default() -> Self {
        Self {
            origin: DVec3::ZERO,
            direction: DVec3::Z,
        }
    }
}
