//! Camera for ray generation.

use crate::sample_ray::SampleRay;
use crate::sampling::random_in_unit_disk;
use ivar_math::{DVec3, Ray};
use rand::RngCore;

/// Turns film positions into primary rays.
pub trait Camera: Send + Sync {
    /// Set origin and direction of every ray from its preset film position.
    ///
    /// Film positions are in pixels, `(0, 0)` at the top-left corner of an
    /// image `width` by `height` pixels large. Directions are normalized.
    fn generate_rays(&self, rays: &mut [SampleRay], width: u32, height: u32, rng: &mut dyn RngCore);
}

/// Pinhole camera with an optional thin-lens defocus disk.
#[derive(Debug, Clone)]
pub struct PinholeCamera {
    // Camera positioning
    look_from: DVec3,
    look_at: DVec3,
    vup: DVec3,

    // Lens settings
    vfov: f64,          // Vertical field of view in degrees
    defocus_angle: f64, // Variation angle of rays through each pixel
    focus_dist: f64,    // Distance from camera to plane of perfect focus
}

/// Image plane placement for one resolution.
struct Viewport {
    pixel00_loc: DVec3,
    pixel_delta_u: DVec3,
    pixel_delta_v: DVec3,
    defocus_disk_u: DVec3,
    defocus_disk_v: DVec3,
}

impl PinholeCamera {
    /// Camera at the origin looking down -Z with a 90 degree field of view.
    pub fn new() -> Self {
        Self {
            look_from: DVec3::ZERO,
            look_at: DVec3::new(0.0, 0.0, -1.0),
            vup: DVec3::Y,
            vfov: 90.0,
            defocus_angle: 0.0,
            focus_dist: 1.0,
        }
    }

    /// Set camera position.
    pub fn with_position(mut self, look_from: DVec3, look_at: DVec3, vup: DVec3) -> Self {
        self.look_from = look_from;
        self.look_at = look_at;
        self.vup = vup;
        self
    }

    /// Set lens settings.
    pub fn with_lens(mut self, vfov: f64, defocus_angle: f64, focus_dist: f64) -> Self {
        self.vfov = vfov;
        self.defocus_angle = defocus_angle;
        self.focus_dist = focus_dist;
        self
    }

    pub fn position(&self) -> DVec3 {
        self.look_from
    }

    fn viewport(&self, width: u32, height: u32) -> Viewport {
        let width = width.max(1) as f64;
        let height = height.max(1) as f64;

        let theta = self.vfov.to_radians();
        let h = (theta / 2.0).tan();
        let viewport_height = 2.0 * h * self.focus_dist;
        let viewport_width = viewport_height * (width / height);

        // Camera basis
        let w = (self.look_from - self.look_at).normalize();
        let u = self.vup.cross(w).normalize();
        let v = w.cross(u);

        let viewport_u = viewport_width * u;
        let viewport_v = -viewport_height * v;
        let pixel_delta_u = viewport_u / width;
        let pixel_delta_v = viewport_v / height;

        // Film position (0, 0) is the upper-left corner, not a pixel centre
        let pixel00_loc = self.look_from - self.focus_dist * w - viewport_u / 2.0 - viewport_v / 2.0;

        let defocus_radius = self.focus_dist * (self.defocus_angle / 2.0).to_radians().tan();

        Viewport {
            pixel00_loc,
            pixel_delta_u,
            pixel_delta_v,
            defocus_disk_u: u * defocus_radius,
            defocus_disk_v: v * defocus_radius,
        }
    }
}

impl Default for PinholeCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera for PinholeCamera {
    fn generate_rays(&self, rays: &mut [SampleRay], width: u32, height: u32, rng: &mut dyn RngCore) {
        let viewport = self.viewport(width, height);

        for sample in rays {
            let target = viewport.pixel00_loc
                + sample.film.x * viewport.pixel_delta_u
                + sample.film.y * viewport.pixel_delta_v;

            let origin = if self.defocus_angle <= 0.0 {
                self.look_from
            } else {
                let p = random_in_unit_disk(rng);
                self.look_from + p.x * viewport.defocus_disk_u + p.y * viewport.defocus_disk_v
            };

            sample.ray = Ray::new(origin, (target - origin).normalize());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ivar_math::DVec2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample_at(x: f64, y: f64) -> SampleRay {
        SampleRay {
            film: DVec2::new(x, y),
            ..Default::default()
        }
    }

    #[test]
    fn test_centre_ray_looks_forward() {
        let camera = PinholeCamera::new()
            .with_position(DVec3::ZERO, DVec3::new(0.0, 0.0, -1.0), DVec3::Y)
            .with_lens(90.0, 0.0, 1.0);
        let mut rng = StdRng::seed_from_u64(42);

        let mut rays = [sample_at(50.0, 50.0)];
        camera.generate_rays(&mut rays, 100, 100, &mut rng);

        assert_eq!(rays[0].ray.origin, DVec3::ZERO);
        assert!((rays[0].ray.direction - (-DVec3::Z)).length() < 1e-12);
    }

    #[test]
    fn test_corners_span_field_of_view() {
        let camera = PinholeCamera::new().with_lens(90.0, 0.0, 1.0);
        let mut rng = StdRng::seed_from_u64(42);

        // Top-left film corner of a square image is 45 degrees off axis in x and y
        let mut rays = [sample_at(0.0, 0.0), sample_at(100.0, 100.0)];
        camera.generate_rays(&mut rays, 100, 100, &mut rng);

        let expected = DVec3::new(-1.0, 1.0, -1.0).normalize();
        assert!((rays[0].ray.direction - expected).length() < 1e-12);
        let expected = DVec3::new(1.0, -1.0, -1.0).normalize();
        assert!((rays[1].ray.direction - expected).length() < 1e-12);
    }

    #[test]
    fn test_defocus_rays_converge_on_focus_plane() {
        let camera = PinholeCamera::new()
            .with_position(DVec3::ZERO, DVec3::new(0.0, 0.0, -1.0), DVec3::Y)
            .with_lens(40.0, 10.0, 5.0);
        let mut rng = StdRng::seed_from_u64(3);

        let mut rays = vec![sample_at(20.0, 30.0); 16];
        camera.generate_rays(&mut rays, 64, 64, &mut rng);

        let focus = |r: &SampleRay| {
            let t = 5.0 / -r.ray.direction.z;
            r.ray.at(t)
        };
        let first = focus(&rays[0]);
        assert!(rays.iter().any(|r| r.ray.origin != DVec3::ZERO));
        for r in &rays {
            assert!((focus(r) - first).length() < 1e-9);
        }
    }
}
