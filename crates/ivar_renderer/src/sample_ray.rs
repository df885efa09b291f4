//! Per-sample ray state carried through the integrator.

use crate::geometry::Intersection;
use crate::Color;
use ivar_math::{DVec2, Ray};

/// A camera sample in flight.
///
/// Pooled per worker and mutated in place from one bounce to the next, so it
/// holds no references into the scene.
#[derive(Debug, Clone, Copy)]
pub struct SampleRay {
    pub ray: Ray,
    /// Path weight applied to any radiance gathered along this ray
    pub throughput: Color,
    /// Per-unit-length absorption of the medium the ray travels through
    pub extinction: Color,
    /// Image coordinates of the pixel this sample belongs to
    pub pixel: (u32, u32),
    /// Index of the pixel inside the tile's accumulation buffer
    pub index: usize,
    /// Sample position on the film, in pixels
    pub film: DVec2,
    /// Whether emission seen at the next hit is counted
    pub emissive: bool,
    /// Whether the last bounce was a delta (mirror/glass) lobe
    pub specular: bool,
    /// Nearest hit of the current segment
    pub hit: Intersection,
}

impl Default for SampleRay {
    fn default() -> Self {
        Self {
            ray: Ray::default(),
            throughput: Color::ONE,
            extinction: Color::ZERO,
            pixel: (0, 0),
            index: 0,
            film: DVec2::ZERO,
            emissive: true,
            specular: false,
            hit: Intersection::default(),
        }
    }
}

impl SampleRay {
    /// Fresh primary sample for `pixel` at sub-pixel film position `film`.
    pub fn primary(pixel: (u32, u32), index: usize, film: DVec2, throughput: Color) -> Self {
        Self {
            pixel,
            index,
            film,
            throughput,
            ..Default::default()
        }
    }
}
