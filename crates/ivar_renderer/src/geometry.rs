//! Geometry capability and intersection records.
//!
//! Everything the KD-tree and the integrator can intersect implements
//! [`Geometry`]: primitives such as spheres and triangle meshes, and the
//! [`KdTree`](crate::KdTree) itself so trees can be nested.

use crate::sampling::orthonormal_basis;
use crate::Material;
use ivar_math::{Aabb, DVec3, Ray};

/// Primitives reject intersections closer than this.
pub const HIT_EPSILON: f64 = 1e-9;

/// Identity of one primitive inside a scene.
///
/// `geometry` indexes the owning tree's geometry list and `primitive` is the
/// geometry-local primitive index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PrimitiveId {
    pub geometry: usize,
    pub primitive: usize,
}

impl PrimitiveId {
    pub fn new(geometry: usize, primitive: usize) -> Self {
        Self { geometry, primitive }
    }
}

/// Record of the closest intersection found by a query.
///
/// Owned by the caller and overwritten by each query. A standalone geometry
/// reports `geometry = 0`; a KD-tree reports the slot of the geometry that
/// produced the hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    /// Ray parameter of the hit
    pub t: f64,
    /// Which primitive was hit
    pub primitive: PrimitiveId,
}

impl Default for Intersection {
    fn default() -> Self {
        Self {
            t: f64::INFINITY,
            primitive: PrimitiveId::default(),
        }
    }
}

impl Intersection {
    /// Returns true if the record holds a hit.
    pub fn is_hit(&self) -> bool {
        self.t.is_finite()
    }

    /// Clear the record back to "no hit".
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Surface data needed to shade a hit.
#[derive(Clone, Copy)]
pub struct ShadingData<'a> {
    /// Point of intersection
    pub point: DVec3,
    /// Unit shading normal, always facing against the incoming ray
    pub normal: DVec3,
    /// Unit tangent perpendicular to `normal`
    pub tangent: DVec3,
    /// Whether the ray hit the front face (outside) of the surface
    pub front_face: bool,
    /// Material at the intersection point
    pub material: &'a dyn Material,
}

impl<'a> ShadingData<'a> {
    /// Build shading data from an outward-facing unit normal.
    ///
    /// The stored normal is flipped to face the ray, and `front_face` records
    /// which side was hit.
    pub fn new(ray: &Ray, point: DVec3, outward_normal: DVec3, material: &'a dyn Material) -> Self {
        let front_face = ray.direction.dot(outward_normal) < 0.0;
        let normal = if front_face {
            outward_normal
        } else {
            -outward_normal
        };
        let (tangent, _) = orthonormal_basis(normal);

        Self {
            point,
            normal,
            tangent,
            front_face,
            material,
        }
    }
}

/// Trait for objects that can be intersected by rays.
///
/// Primitive-level methods are what the KD-tree builder and traversal use;
/// `intersect` and `occluded` default to a linear scan so small geometries
/// work standalone.
pub trait Geometry: Send + Sync {
    /// Number of independently bounded primitives.
    fn primitive_count(&self) -> usize;

    /// Bound of one primitive.
    fn primitive_bounds(&self, primitive: usize) -> Aabb;

    /// Distance to the primitive along the ray, if hit with
    /// `HIT_EPSILON < t < max_distance`.
    fn intersect_primitive(&self, ray: &Ray, max_distance: f64, primitive: usize) -> Option<f64>;

    /// Shading data for a hit previously reported for this geometry.
    fn shading(&self, ray: &Ray, hit: &Intersection) -> ShadingData<'_>;

    /// Bound of the whole geometry.
    fn bounds(&self) -> Aabb {
        let mut bounds = Aabb::EMPTY;
        for primitive in 0..self.primitive_count() {
            bounds.union(&self.primitive_bounds(primitive));
        }
        bounds
    }

    /// Nearest hit closer than `max_distance`. Fills `hit` and returns true
    /// if one was found; leaves `hit` untouched otherwise.
    fn intersect(&self, ray: &Ray, max_distance: f64, hit: &mut Intersection) -> bool {
        let mut closest = max_distance;
        let mut found = false;

        for primitive in 0..self.primitive_count() {
            if let Some(t) = self.intersect_primitive(ray, closest, primitive) {
                closest = t;
                hit.t = t;
                hit.primitive = PrimitiveId::new(0, primitive);
                found = true;
            }
        }

        found
    }

    /// Returns true if anything is hit closer than `max_distance`.
    fn occluded(&self, ray: &Ray, max_distance: f64) -> bool {
        (0..self.primitive_count())
            .any(|primitive| self.intersect_primitive(ray, max_distance, primitive).is_some())
    }
}
