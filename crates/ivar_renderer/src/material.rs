//! Material trait for surface scattering.

use crate::geometry::ShadingData;
use crate::sampling::{cosine_hemisphere, gen_f64, uniform_sphere};
use ivar_math::DVec3;
use rand::RngCore;
use std::f64::consts::FRAC_1_PI;

/// Color type alias (linear RGB, unbounded)
pub type Color = DVec3;

/// Result of importance-sampling a scatter direction.
#[derive(Debug, Clone, Copy)]
pub struct Scatter {
    /// Unit direction of the scattered ray
    pub direction: DVec3,
    /// Throughput multiplier: BRDF * cos / pdf for the sampled direction
    pub weight: Color,
    /// Density of the sampled direction (1 for delta lobes)
    pub pdf: f64,
    /// True if the direction came from a delta (mirror/glass) lobe
    pub specular: bool,
    /// Extinction of the medium the scattered ray travels through;
    /// `None` keeps the current medium
    pub extinction: Option<Color>,
}

/// Trait for materials that describe how light interacts with surfaces.
pub trait Material: Send + Sync {
    /// True if the material benefits from direct light sampling.
    fn is_diffuse(&self) -> bool {
        false
    }

    /// Radiance emitted towards `-direction`, where `direction` is the
    /// incoming ray direction. Most materials return black.
    fn emission(&self, _direction: DVec3, _shading: &ShadingData<'_>) -> Color {
        Color::ZERO
    }

    /// BRDF value for light arriving from `wi` and leaving towards `wo`.
    /// Both point away from the surface. Delta lobes return black.
    fn brdf(&self, _wo: DVec3, _wi: DVec3, _shading: &ShadingData<'_>) -> Color {
        Color::ZERO
    }

    /// Importance-sample a new direction for a ray arriving along `incoming`.
    ///
    /// Returns `None` if the ray is absorbed.
    fn sample_scatter(
        &self,
        rng: &mut dyn RngCore,
        incoming: DVec3,
        shading: &ShadingData<'_>,
    ) -> Option<Scatter>;
}

/// Lambertian (diffuse) material.
#[derive(Debug, Clone)]
pub struct Lambertian {
    albedo: Color,
}

impl Lambertian {
    /// Create a new Lambertian material with the given albedo color.
    pub fn new(albedo: Color) -> Self {
        Self { albedo }
    }
}

impl Material for Lambertian {
    fn is_diffuse(&self) -> bool {
        true
    }

    fn brdf(&self, _wo: DVec3, _wi: DVec3, _shading: &ShadingData<'_>) -> Color {
        self.albedo * FRAC_1_PI
    }

    fn sample_scatter(
        &self,
        rng: &mut dyn RngCore,
        _incoming: DVec3,
        shading: &ShadingData<'_>,
    ) -> Option<Scatter> {
        let direction = cosine_hemisphere(rng, shading.normal);
        let cos_theta = direction.dot(shading.normal);
        if cos_theta <= 0.0 {
            return None;
        }

        // brdf * cos / pdf collapses to the albedo
        Some(Scatter {
            direction,
            weight: self.albedo,
            pdf: cos_theta * FRAC_1_PI,
            specular: false,
            extinction: None,
        })
    }
}

/// Metal (specular) material.
#[derive(Debug, Clone)]
pub struct Metal {
    albedo: Color,
    fuzz: f64,
}

impl Metal {
    /// Create a new Metal material.
    ///
    /// - `albedo`: The color of the metal
    /// - `fuzz`: Roughness, 0.0 = perfect mirror, 1.0 = very rough
    pub fn new(albedo: Color, fuzz: f64) -> Self {
        Self {
            albedo,
            fuzz: fuzz.clamp(0.0, 1.0),
        }
    }
}

impl Material for Metal {
    fn sample_scatter(
        &self,
        rng: &mut dyn RngCore,
        incoming: DVec3,
        shading: &ShadingData<'_>,
    ) -> Option<Scatter> {
        let reflected = reflect(incoming, shading.normal);
        let direction = (reflected + self.fuzz * uniform_sphere(rng)).normalize_or_zero();

        // Only scatter if the reflected ray leaves the surface
        if direction.dot(shading.normal) <= 0.0 {
            return None;
        }

        Some(Scatter {
            direction,
            weight: self.albedo,
            pdf: 1.0,
            specular: true,
            extinction: None,
        })
    }
}

/// Dielectric (glass) material with optional interior absorption.
#[derive(Debug, Clone)]
pub struct Dielectric {
    /// Index of refraction
    ior: f64,
    /// Beer–Lambert extinction per unit length inside the medium
    absorption: Color,
}

impl Dielectric {
    /// Create a new clear Dielectric material.
    ///
    /// - `ior`: Index of refraction (1.0 = air, 1.5 = glass, 2.4 = diamond)
    pub fn new(ior: f64) -> Self {
        Self {
            ior,
            absorption: Color::ZERO,
        }
    }

    /// Tint the interior with a per-channel extinction coefficient.
    pub fn with_absorption(mut self, absorption: Color) -> Self {
        self.absorption = absorption.max(Color::ZERO);
        self
    }

    /// Schlick's approximation for reflectance
    fn reflectance(cosine: f64, ior: f64) -> f64 {
        let r0 = ((1.0 - ior) / (1.0 + ior)).powi(2);
        r0 + (1.0 - r0) * (1.0 - cosine).powi(5)
    }
}

impl Material for Dielectric {
    fn sample_scatter(
        &self,
        rng: &mut dyn RngCore,
        incoming: DVec3,
        shading: &ShadingData<'_>,
    ) -> Option<Scatter> {
        let refraction_ratio = if shading.front_face {
            1.0 / self.ior
        } else {
            self.ior
        };

        let unit_direction = incoming.normalize();
        let cos_theta = (-unit_direction).dot(shading.normal).min(1.0);
        let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();

        // Check for total internal reflection
        let cannot_refract = refraction_ratio * sin_theta > 1.0;
        let reflects =
            cannot_refract || Self::reflectance(cos_theta, refraction_ratio) > gen_f64(rng);

        let (direction, extinction) = if reflects {
            (reflect(unit_direction, shading.normal), None)
        } else {
            let medium = if shading.front_face {
                self.absorption
            } else {
                Color::ZERO
            };
            (
                refract(unit_direction, shading.normal, refraction_ratio),
                Some(medium),
            )
        };

        Some(Scatter {
            direction: direction.normalize(),
            weight: Color::ONE,
            pdf: 1.0,
            specular: true,
            extinction,
        })
    }
}

/// Diffuse light emitter.
#[derive(Debug, Clone)]
pub struct DiffuseLight {
    emit: Color,
    two_sided: bool,
}

impl DiffuseLight {
    /// Create a new diffuse light emitting from its front face.
    pub fn new(emit: Color) -> Self {
        Self {
            emit,
            two_sided: false,
        }
    }

    /// Emit from both faces.
    pub fn two_sided(mut self) -> Self {
        self.two_sided = true;
        self
    }
}

impl Material for DiffuseLight {
    fn emission(&self, _direction: DVec3, shading: &ShadingData<'_>) -> Color {
        if shading.front_face || self.two_sided {
            self.emit
        } else {
            Color::ZERO
        }
    }

    fn sample_scatter(
        &self,
        _rng: &mut dyn RngCore,
        _incoming: DVec3,
        _shading: &ShadingData<'_>,
    ) -> Option<Scatter> {
        // Lights don't scatter rays
        None
    }
}

/// Reflect a vector about a normal.
#[inline]
pub(crate) fn reflect(v: DVec3, n: DVec3) -> DVec3 {
    v - 2.0 * v.dot(n) * n
}

/// Refract a unit vector through a surface.
#[inline]
fn refract(uv: DVec3, n: DVec3, etai_over_etat: f64) -> DVec3 {
    let cos_theta = (-uv).dot(n).min(1.0);
    let r_out_perp = etai_over_etat * (uv + cos_theta * n);
    let r_out_parallel = -(1.0 - r_out_perp.length_squared()).abs().sqrt() * n;
    r_out_perp + r_out_parallel
}
