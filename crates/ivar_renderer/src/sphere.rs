//! Sphere primitive for ray tracing.

use crate::geometry::{Geometry, Intersection, ShadingData, HIT_EPSILON};
use crate::Material;
use ivar_math::{Aabb, DVec3, Ray};

/// A sphere primitive.
pub struct Sphere<M: Material> {
    center: DVec3,
    radius: f64,
    material: M,
    bbox: Aabb,
}

impl<M: Material> Sphere<M> {
    /// Create a new sphere.
    pub fn new(center: DVec3, radius: f64, material: M) -> Self {
        let radius = radius.max(0.0);
        let rvec = DVec3::splat(radius);
        let bbox = Aabb::from_points(center - rvec, center + rvec);

        Self {
            center,
            radius,
            material,
            bbox,
        }
    }

    pub fn center(&self) -> DVec3 {
        self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }
}

impl<M: Material> Geometry for Sphere<M> {
    fn primitive_count(&self) -> usize {
        1
    }

    fn primitive_bounds(&self, _primitive: usize) -> Aabb {
        self.bbox
    }

    fn intersect_primitive(&self, ray: &Ray, max_distance: f64, _primitive: usize) -> Option<f64> {
        let oc = self.center - ray.origin;
        let a = ray.direction.length_squared();
        let h = ray.direction.dot(oc);
        let c = oc.length_squared() - self.radius * self.radius;

        let discriminant = h * h - a * c;
        if discriminant < 0.0 {
            return None;
        }

        let sqrtd = discriminant.sqrt();

        // Find the nearest root in the acceptable range
        let mut root = (h - sqrtd) / a;
        if root <= HIT_EPSILON || root >= max_distance {
            root = (h + sqrtd) / a;
            if root <= HIT_EPSILON || root >= max_distance {
                return None;
            }
        }

        Some(root)
    }

    fn shading(&self, ray: &Ray, hit: &Intersection) -> ShadingData<'_> {
        let point = ray.at(hit.t);
        let outward_normal = (point - self.center) / self.radius;
        ShadingData::new(ray, point, outward_normal, &self.material)
    }
}
