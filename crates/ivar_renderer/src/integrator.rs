//! Breadth-first Monte Carlo path integrator.
//!
//! A tile is rendered as one batch of sample rays that is advanced one bounce
//! at a time: every live ray is intersected, shaded, and either terminated or
//! replaced in place by its successor before the next depth starts.

use crate::camera::Camera;
use crate::geometry::ShadingData;
use crate::material::Material;
use crate::sample_ray::SampleRay;
use crate::sampling::gen_f64;
use crate::scene::Scene;
use crate::tile::Tile;
use crate::Color;
use ivar_math::{DVec2, DVec3, Ray};
use rand::RngCore;

/// Offset applied along the normal when spawning rays from a surface,
/// scaled by the magnitude of the hit point.
const RAY_OFFSET: f64 = 1e-6;

/// Shadow rays stop this fraction short of the light sample.
const SHADOW_EPSILON: f64 = 1e-4;

/// Russian roulette settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntegratorConfig {
    /// First depth at which paths may be terminated at random
    pub roulette_start_depth: u32,
    /// Probability of a path continuing once roulette applies
    pub survival_probability: f64,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            roulette_start_depth: 3,
            survival_probability: 5.0 / 6.0,
        }
    }
}

impl IntegratorConfig {
    pub fn with_roulette(mut self, start_depth: u32, survival_probability: f64) -> Self {
        self.roulette_start_depth = start_depth;
        self.survival_probability = survival_probability.clamp(f64::MIN_POSITIVE, 1.0);
        self
    }
}

/// Per-frame inputs shared by every tile of a job.
#[derive(Clone, Copy)]
pub struct FrameParams<'a> {
    pub scene: &'a Scene,
    pub camera: &'a dyn Camera,
    /// Full image width in pixels
    pub width: u32,
    /// Full image height in pixels
    pub height: u32,
    /// Samples per pixel along each axis; a pixel gets `sample_rate²` samples
    pub sample_rate: u32,
    /// Number of bounces after the primary hit
    pub max_depth: u32,
}

/// Reusable per-worker buffers.
#[derive(Debug, Default)]
pub struct TileScratch {
    pixels: Vec<Color>,
    rays: Vec<SampleRay>,
    rgb: Vec<f32>,
}

impl TileScratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Radiance of the last rendered tile, row-major.
    pub fn pixels(&self) -> &[Color] {
        &self.pixels
    }

    /// Last rendered tile as row-major RGB triples.
    pub fn rgb(&mut self) -> &[f32] {
        self.rgb.clear();
        self.rgb.extend(
            self.pixels
                .iter()
                .flat_map(|c| [c.x as f32, c.y as f32, c.z as f32]),
        );
        &self.rgb
    }
}

/// Path tracer with direct light sampling and Russian roulette.
#[derive(Debug, Clone, Default)]
pub struct PathIntegrator {
    config: IntegratorConfig,
}

impl PathIntegrator {
    pub fn new(config: IntegratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IntegratorConfig {
        &self.config
    }

    /// Render `tile` into `scratch.pixels()`.
    pub fn render_tile(
        &self,
        tile: &Tile,
        frame: &FrameParams<'_>,
        scratch: &mut TileScratch,
        rng: &mut dyn RngCore,
    ) {
        let TileScratch { pixels, rays, .. } = scratch;
        pixels.clear();
        pixels.resize(tile.pixel_count(), Color::ZERO);

        self.generate_primary(tile, frame, rays, rng);

        let mut active = rays.len();
        let mut depth = 0;
        while active > 0 && depth <= frame.max_depth {
            let mut survivors = 0;

            for i in 0..active {
                let mut sample = rays[i];
                if let Some(next) = self.shade(&mut sample, depth, frame, pixels, rng) {
                    // survivors <= i, so this never overwrites an unread ray
                    rays[survivors] = next;
                    survivors += 1;
                }
            }

            active = survivors;
            depth += 1;
        }
    }

    /// Stratified, jittered camera samples for every pixel of the tile.
    fn generate_primary(
        &self,
        tile: &Tile,
        frame: &FrameParams<'_>,
        rays: &mut Vec<SampleRay>,
        rng: &mut dyn RngCore,
    ) {
        let rate = frame.sample_rate.max(1);
        let samples = rate as usize * rate as usize;
        let weight = Color::splat(1.0 / samples as f64);
        let stratum = 1.0 / rate as f64;

        rays.clear();
        rays.reserve(tile.pixel_count() * samples);

        for local_y in 0..tile.height {
            for local_x in 0..tile.width {
                let pixel = (tile.x + local_x, tile.y + local_y);
                let index = (local_y * tile.width + local_x) as usize;

                for sy in 0..rate {
                    for sx in 0..rate {
                        let film = DVec2::new(
                            pixel.0 as f64 + (sx as f64 + gen_f64(rng)) * stratum,
                            pixel.1 as f64 + (sy as f64 + gen_f64(rng)) * stratum,
                        );
                        rays.push(SampleRay::primary(pixel, index, film, weight));
                    }
                }
            }
        }

        frame.camera.generate_rays(rays, frame.width, frame.height, rng);
    }

    /// Advance one sample by one bounce, returning its successor if any.
    fn shade(
        &self,
        sample: &mut SampleRay,
        depth: u32,
        frame: &FrameParams<'_>,
        pixels: &mut [Color],
        rng: &mut dyn RngCore,
    ) -> Option<SampleRay> {
        let scene = frame.scene;

        sample.hit.reset();
        if !scene.intersect(&sample.ray, f64::INFINITY, &mut sample.hit) {
            pixels[sample.index] += scene.background() * sample.throughput;
            return None;
        }

        let shading = scene.resolve_hit(&sample.ray, &sample.hit);
        let material = shading.material;

        if sample.emissive {
            pixels[sample.index] += material.emission(sample.ray.direction, &shading) * sample.throughput;
        }

        sample.throughput = attenuate(sample.throughput, sample.extinction, sample.hit.t);

        if material.is_diffuse() {
            pixels[sample.index] += self.direct_light(sample, &shading, material, scene, rng);
        }

        if depth >= frame.max_depth {
            return None;
        }
        self.continue_path(sample, depth, &shading, scene, rng)
    }

    /// Next-event estimation over every light in the scene.
    fn direct_light(
        &self,
        sample: &SampleRay,
        shading: &ShadingData<'_>,
        material: &dyn Material,
        scene: &Scene,
        rng: &mut dyn RngCore,
    ) -> Color {
        let wo = -sample.ray.direction;
        let origin = offset_origin(shading.point, shading.normal);
        let mut radiance = Color::ZERO;

        for light in scene.lights() {
            let Some(light_sample) = light.sample(shading.point, rng) else {
                continue;
            };
            let cos_theta = light_sample.direction.dot(shading.normal);
            if cos_theta <= 0.0 || light_sample.pdf <= 0.0 {
                continue;
            }

            let shadow = Ray::new(origin, light_sample.direction);
            if scene.occluded(&shadow, light_sample.distance * (1.0 - SHADOW_EPSILON)) {
                continue;
            }

            let brdf = material.brdf(wo, light_sample.direction, shading);
            radiance += sample.throughput * brdf * cos_theta * light_sample.radiance / light_sample.pdf;
        }

        radiance
    }

    /// Russian roulette and importance-sampled scattering.
    fn continue_path(
        &self,
        sample: &SampleRay,
        depth: u32,
        shading: &ShadingData<'_>,
        scene: &Scene,
        rng: &mut dyn RngCore,
    ) -> Option<SampleRay> {
        let mut throughput = sample.throughput;
        if depth >= self.config.roulette_start_depth {
            let p = self.config.survival_probability;
            if gen_f64(rng) >= p {
                return None;
            }
            throughput /= p;
        }

        let scatter = shading
            .material
            .sample_scatter(rng, sample.ray.direction, shading)?;
        throughput *= scatter.weight;
        if throughput.max_element() <= 0.0 {
            return None;
        }

        // Spawn on the side of the surface the new direction points to
        let normal = if scatter.direction.dot(shading.normal) >= 0.0 {
            shading.normal
        } else {
            -shading.normal
        };

        Some(SampleRay {
            ray: Ray::new(offset_origin(shading.point, normal), scatter.direction),
            throughput,
            extinction: scatter.extinction.unwrap_or(sample.extinction),
            emissive: scatter.specular || !scene.has_lights(),
            specular: scatter.specular,
            ..*sample
        })
    }
}

#[inline]
fn offset_origin(point: DVec3, normal: DVec3) -> DVec3 {
    point + normal * RAY_OFFSET * (1.0 + point.abs().max_element())
}

/// Beer-Lambert attenuation over `distance`; channels with no extinction are
/// left untouched.
#[inline]
fn attenuate(throughput: Color, extinction: Color, distance: f64) -> Color {
    let channel = |t: f64, sigma: f64| {
        if sigma > 0.0 {
            t * (-sigma * distance).exp()
        } else {
            t
        }
    };
    Color::new(
        channel(throughput.x, extinction.x),
        channel(throughput.y, extinction.y),
        channel(throughput.z, extinction.z),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dielectric, Geometry, Lambertian, Light, PointLight, Sphere};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::f64::consts::FRAC_1_PI;
    use std::sync::Arc;

    /// Orthographic camera along -Z through pixel centres, ignoring jitter.
    struct OrthoCamera {
        scale: f64,
    }

    impl Camera for OrthoCamera {
        fn generate_rays(&self, rays: &mut [SampleRay], width: u32, height: u32, _rng: &mut dyn RngCore) {
            for sample in rays {
                let x = (sample.film.x.floor() + 0.5 - width as f64 / 2.0) * self.scale;
                let y = (height as f64 / 2.0 - sample.film.y.floor() - 0.5) * self.scale;
                sample.ray = Ray::new(DVec3::new(x, y, 5.0), -DVec3::Z);
            }
        }
    }

    fn render(scene: &Scene, camera: &dyn Camera, size: u32, sample_rate: u32, max_depth: u32) -> Vec<Color> {
        let frame = FrameParams {
            scene,
            camera,
            width: size,
            height: size,
            sample_rate,
            max_depth,
        };
        let tile = Tile::new(0, 0, size, size, 0);
        let mut scratch = TileScratch::new();
        let mut rng = StdRng::seed_from_u64(17);

        PathIntegrator::default().render_tile(&tile, &frame, &mut scratch, &mut rng);
        scratch.pixels().to_vec()
    }

    #[test]
    fn test_direct_light_closed_form() {
        let albedo = Color::new(0.8, 0.6, 0.4);
        let intensity = Color::splat(10.0);
        let light_pos = DVec3::new(2.0, 2.0, 4.0);

        let sphere: Arc<dyn Geometry> = Arc::new(Sphere::new(DVec3::ZERO, 1.0, Lambertian::new(albedo)));
        let light: Arc<dyn Light> = Arc::new(PointLight::new(light_pos, intensity));
        let scene = Scene::new(vec![sphere], vec![light], Color::ZERO).unwrap();
        let camera = OrthoCamera { scale: 0.5 };

        let pixels = render(&scene, &camera, 2, 1, 0);

        for (index, pixel) in pixels.iter().enumerate() {
            let px = (index % 2) as f64;
            let py = (index / 2) as f64;
            let x = (px + 0.5 - 1.0) * 0.5;
            let y = (1.0 - py - 0.5) * 0.5;
            let p = DVec3::new(x, y, (1.0 - x * x - y * y).sqrt());

            let to_light = light_pos - p;
            let d2 = to_light.length_squared();
            let cos = p.dot(to_light.normalize());
            let expected = albedo * FRAC_1_PI * cos * intensity / d2;

            assert!(
                (*pixel - expected).length() < 1e-9,
                "pixel {index}: {pixel:?} vs {expected:?}"
            );
        }
    }

    /// Single ray from `origin` towards `target` for every sample.
    struct FixedCamera {
        origin: DVec3,
        target: DVec3,
    }

    impl Camera for FixedCamera {
        fn generate_rays(&self, rays: &mut [SampleRay], _: u32, _: u32, _: &mut dyn RngCore) {
            for sample in rays {
                sample.ray = Ray::new(self.origin, (self.target - self.origin).normalize());
            }
        }
    }

    #[test]
    fn test_shadow_ray_blocks_light() {
        let normal = DVec3::new(0.0, 0.6, 0.8);
        let light_pos = normal * 4.0;
        let camera = FixedCamera {
            origin: DVec3::new(0.0, 2.6, 0.8),
            target: normal,
        };

        let ball = || -> Arc<dyn Geometry> { Arc::new(Sphere::new(DVec3::ZERO, 1.0, Lambertian::new(Color::ONE))) };
        let blocker: Arc<dyn Geometry> = Arc::new(Sphere::new(normal * 2.5, 0.3, Lambertian::new(Color::ONE)));
        let light = || -> Arc<dyn Light> { Arc::new(PointLight::new(light_pos, Color::ONE)) };

        let open = Scene::new(vec![ball()], vec![light()], Color::ZERO).unwrap();
        let pixels = render(&open, &camera, 1, 1, 0);
        let expected = FRAC_1_PI / 9.0;
        assert!((pixels[0] - Color::splat(expected)).length() < 1e-9, "{:?}", pixels[0]);

        let shadowed = Scene::new(vec![ball(), blocker], vec![light()], Color::ZERO).unwrap();
        let pixels = render(&shadowed, &camera, 1, 1, 0);
        assert_eq!(pixels[0], Color::ZERO);
    }

    #[test]
    fn test_background_on_miss() {
        let behind: Arc<dyn Geometry> = Arc::new(Sphere::new(
            DVec3::new(0.0, 0.0, 10.0),
            1.0,
            Lambertian::new(Color::ONE),
        ));
        let background = Color::new(0.2, 0.4, 0.6);
        let scene = Scene::new(vec![behind], Vec::new(), background).unwrap();

        for pixel in render(&scene, &OrthoCamera { scale: 1.0 }, 3, 2, 4) {
            assert!((pixel - background).length() < 1e-12);
        }
    }

    #[test]
    fn test_beer_lambert_through_absorbing_sphere() {
        let sigma = Color::new(0.5, 0.0, 1.0);
        let glass: Arc<dyn Geometry> = Arc::new(Sphere::new(
            DVec3::ZERO,
            1.0,
            Dielectric::new(1.0).with_absorption(sigma),
        ));
        let scene = Scene::new(vec![glass], Vec::new(), Color::ONE).unwrap();

        // Head-on through the centre: two unit-radius segments inside the medium
        let pixels = render(&scene, &OrthoCamera { scale: 1.0 }, 1, 1, 4);
        let expected = Color::new((-1.0f64).exp(), 1.0, (-2.0f64).exp());
        assert!((pixels[0] - expected).length() < 1e-5, "{:?}", pixels[0]);
    }

    #[test]
    fn test_attenuate_skips_clear_channels() {
        let t = attenuate(Color::ONE, Color::new(0.0, 1.0, 0.0), f64::INFINITY);
        assert_eq!(t, Color::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn test_depth_zero_has_no_indirect_light() {
        // Without lights, a diffuse surface only returns what it emits
        let sphere: Arc<dyn Geometry> = Arc::new(Sphere::new(DVec3::ZERO, 1.0, Lambertian::new(Color::ONE)));
        let scene = Scene::new(vec![sphere], Vec::new(), Color::ONE).unwrap();

        let pixels = render(&scene, &OrthoCamera { scale: 0.5 }, 2, 1, 0);
        assert!(pixels.iter().all(|p| *p == Color::ZERO));

        let pixels = render(&scene, &OrthoCamera { scale: 0.5 }, 2, 1, 1);
        assert!(pixels.iter().all(|p| p.max_element() > 0.0));
    }

    #[test]
    fn test_rgb_conversion() {
        let mut scratch = TileScratch::new();
        scratch.pixels = vec![Color::new(1.0, 2.0, 3.0), Color::new(0.5, 0.25, 0.0)];
        assert_eq!(scratch.rgb(), &[1.0, 2.0, 3.0, 0.5, 0.25, 0.0]);
    }
}
