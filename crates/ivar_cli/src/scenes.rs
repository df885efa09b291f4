//! Built-in demo scenes.

use anyhow::Result;
use clap::ValueEnum;
use ivar_math::DVec3;
use ivar_renderer::{
    Camera, Color, Dielectric, DiffuseLight, Geometry, KdTree, Lambertian, Light, Metal,
    PinholeCamera, Scene, Sphere, SphereLight, TriangleMesh,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SceneKind {
    /// Closed box with coloured walls, two blocks and a glass ball
    Cornell,
    /// Large spheres on a ground plane surrounded by small random ones
    Spheres,
}

pub fn build(kind: SceneKind) -> Result<(Arc<Scene>, Arc<dyn Camera>)> {
    match kind {
        SceneKind::Cornell => cornell_box(),
        SceneKind::Spheres => spheres(),
    }
}

fn quad<M: ivar_renderer::Material + 'static>(
    a: DVec3,
    b: DVec3,
    c: DVec3,
    d: DVec3,
    material: M,
) -> Arc<dyn Geometry> {
    Arc::new(TriangleMesh::quad(a, b, c, d, material))
}

fn cornell_box() -> Result<(Arc<Scene>, Arc<dyn Camera>)> {
    let red = Color::new(0.65, 0.05, 0.05);
    let white = Color::splat(0.73);
    let green = Color::new(0.12, 0.45, 0.15);
    let s = 555.0;

    let mut geometries = vec![
        // Left, right, floor, ceiling, back
        quad(
            DVec3::new(s, 0.0, 0.0),
            DVec3::new(s, s, 0.0),
            DVec3::new(s, s, s),
            DVec3::new(s, 0.0, s),
            Lambertian::new(green),
        ),
        quad(
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(0.0, 0.0, s),
            DVec3::new(0.0, s, s),
            DVec3::new(0.0, s, 0.0),
            Lambertian::new(red),
        ),
        quad(
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(s, 0.0, 0.0),
            DVec3::new(s, 0.0, s),
            DVec3::new(0.0, 0.0, s),
            Lambertian::new(white),
        ),
        quad(
            DVec3::new(0.0, s, 0.0),
            DVec3::new(0.0, s, s),
            DVec3::new(s, s, s),
            DVec3::new(s, s, 0.0),
            Lambertian::new(white),
        ),
        quad(
            DVec3::new(0.0, 0.0, s),
            DVec3::new(s, 0.0, s),
            DVec3::new(s, s, s),
            DVec3::new(0.0, s, s),
            Lambertian::new(white),
        ),
    ];

    geometries.push(Arc::new(TriangleMesh::axis_box(
        DVec3::new(265.0, 0.0, 295.0),
        DVec3::new(430.0, 330.0, 460.0),
        Lambertian::new(white),
    )));
    geometries.push(Arc::new(TriangleMesh::axis_box(
        DVec3::new(130.0, 0.0, 65.0),
        DVec3::new(295.0, 165.0, 230.0),
        Lambertian::new(white),
    )));
    geometries.push(Arc::new(Sphere::new(
        DVec3::new(212.0, 255.0, 147.0),
        90.0,
        Dielectric::new(1.5).with_absorption(Color::new(0.004, 0.001, 0.004)),
    )));

    // Emitter seen by camera paths, sampled through the matching light
    let light_center = DVec3::new(278.0, 480.0, 278.0);
    let light_radius = 40.0;
    let radiance = Color::splat(12.0);
    geometries.push(Arc::new(Sphere::new(
        light_center,
        light_radius,
        DiffuseLight::new(radiance),
    )));
    let lights: Vec<Arc<dyn Light>> =
        vec![Arc::new(SphereLight::new(light_center, light_radius, radiance))];

    let scene = Scene::new(geometries, lights, Color::ZERO)?;
    let camera = PinholeCamera::new()
        .with_position(
            DVec3::new(278.0, 278.0, -800.0),
            DVec3::new(278.0, 278.0, 0.0),
            DVec3::Y,
        )
        .with_lens(40.0, 0.0, 10.0);

    Ok((Arc::new(scene), Arc::new(camera)))
}

fn spheres() -> Result<(Arc<Scene>, Arc<dyn Camera>)> {
    let mut geometries: Vec<Arc<dyn Geometry>> = vec![
        // Ground
        Arc::new(Sphere::new(
            DVec3::new(0.0, -1000.0, 0.0),
            1000.0,
            Lambertian::new(Color::new(0.5, 0.5, 0.5)),
        )),
        // Three main spheres
        Arc::new(Sphere::new(DVec3::new(0.0, 1.0, 0.0), 1.0, Dielectric::new(1.5))),
        Arc::new(Sphere::new(
            DVec3::new(-4.0, 1.0, 0.0),
            1.0,
            Lambertian::new(Color::new(0.4, 0.2, 0.1)),
        )),
        Arc::new(Sphere::new(
            DVec3::new(4.0, 1.0, 0.0),
            1.0,
            Metal::new(Color::new(0.7, 0.6, 0.5), 0.0),
        )),
    ];

    // Small spheres get a tree of their own, nested in the scene tree
    let mut rng = StdRng::seed_from_u64(42);
    let mut small: Vec<Arc<dyn Geometry>> = Vec::new();
    for a in -11..11 {
        for b in -11..11 {
            let center = DVec3::new(
                a as f64 + 0.9 * rng.gen::<f64>(),
                0.2,
                b as f64 + 0.9 * rng.gen::<f64>(),
            );
            if (center - DVec3::new(4.0, 0.2, 0.0)).length() <= 0.9 {
                continue;
            }

            let choose_mat: f64 = rng.gen();
            let sphere: Arc<dyn Geometry> = if choose_mat < 0.8 {
                let albedo = Color::new(
                    rng.gen::<f64>() * rng.gen::<f64>(),
                    rng.gen::<f64>() * rng.gen::<f64>(),
                    rng.gen::<f64>() * rng.gen::<f64>(),
                );
                Arc::new(Sphere::new(center, 0.2, Lambertian::new(albedo)))
            } else if choose_mat < 0.95 {
                let albedo = Color::new(
                    0.5 + 0.5 * rng.gen::<f64>(),
                    0.5 + 0.5 * rng.gen::<f64>(),
                    0.5 + 0.5 * rng.gen::<f64>(),
                );
                let fuzz = 0.5 * rng.gen::<f64>();
                Arc::new(Sphere::new(center, 0.2, Metal::new(albedo, fuzz)))
            } else {
                Arc::new(Sphere::new(center, 0.2, Dielectric::new(1.5)))
            };
            small.push(sphere);
        }
    }
    log::info!("Created {} small spheres", small.len());
    geometries.push(Arc::new(KdTree::new(small)?));

    // Lit by the sky only
    let scene = Scene::new(geometries, Vec::new(), Color::new(0.5, 0.7, 1.0))?;
    let camera = PinholeCamera::new()
        .with_position(
            DVec3::new(13.0, 2.0, 3.0),
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
        )
        .with_lens(20.0, 0.6, 10.0);

    Ok((Arc::new(scene), Arc::new(camera)))
}
