//! Light sources for direct illumination.

use crate::sampling::uniform_sphere;
use crate::Color;
use ivar_math::DVec3;
use rand::RngCore;
use std::f64::consts::PI;

/// One sampled connection from a shading point to a light.
#[derive(Debug, Clone, Copy)]
pub struct LightSample {
    /// Unit direction from the shading point towards the light
    pub direction: DVec3,
    /// Distance to the sampled point on the light
    pub distance: f64,
    /// Radiance arriving at the shading point from the sample
    pub radiance: Color,
    /// Solid-angle density of the sample (1 for delta lights)
    pub pdf: f64,
}

/// Trait for lights that can be sampled from a shading point.
pub trait Light: Send + Sync {
    /// Choose a point on the light as seen from `point`.
    ///
    /// Returns `None` if the light cannot contribute to `point`.
    fn sample(&self, point: DVec3, rng: &mut dyn RngCore) -> Option<LightSample>;
}

/// Isotropic point light with inverse-square falloff.
#[derive(Debug, Clone)]
pub struct PointLight {
    position: DVec3,
    intensity: Color,
}

impl PointLight {
    pub fn new(position: DVec3, intensity: Color) -> Self {
        Self {
            position,
            intensity,
        }
    }
}

impl Light for PointLight {
    fn sample(&self, point: DVec3, _rng: &mut dyn RngCore) -> Option<LightSample> {
        let to_light = self.position - point;
        let distance_squared = to_light.length_squared();
        if distance_squared == 0.0 {
            return None;
        }
        let distance = distance_squared.sqrt();

        Some(LightSample {
            direction: to_light / distance,
            distance,
            radiance: self.intensity / distance_squared,
            pdf: 1.0,
        })
    }
}

/// Spherical area light with uniform outgoing radiance.
///
/// Pair it with an emissive [`Sphere`](crate::Sphere) of the same centre and
/// radius so camera and specular paths see the emitter too.
#[derive(Debug, Clone)]
pub struct SphereLight {
    center: DVec3,
    radius: f64,
    radiance: Color,
}

impl SphereLight {
    pub fn new(center: DVec3, radius: f64, radiance: Color) -> Self {
        Self {
            center,
            radius: radius.max(0.0),
            radiance,
        }
    }

    fn area(&self) -> f64 {
        4.0 * PI * self.radius * self.radius
    }
}

impl Light for SphereLight {
    fn sample(&self, point: DVec3, rng: &mut dyn RngCore) -> Option<LightSample> {
        let normal = uniform_sphere(rng);
        let on_light = self.center + normal * self.radius;

        let to_light = on_light - point;
        let distance_squared = to_light.length_squared();
        if distance_squared == 0.0 {
            return None;
        }
        let distance = distance_squared.sqrt();
        let direction = to_light / distance;

        // Points on the far hemisphere face away from the shading point
        let cos_light = -direction.dot(normal);
        if cos_light <= 0.0 {
            return None;
        }

        Some(LightSample {
            direction,
            distance,
            radiance: self.radiance,
            pdf: distance_squared / (cos_light * self.area()),
        })
    }
}
