//! Random sampling helpers shared by materials, lights and cameras.

use ivar_math::DVec3;
use rand::{Rng, RngCore};
use std::f64::consts::PI;

/// Uniform random number in [0, 1).
#[inline]
pub fn gen_f64(rng: &mut dyn RngCore) -> f64 {
    rng.gen::<f64>()
}

/// Two unit vectors completing `n` to a right-handed orthonormal basis.
///
/// Branchless construction from Duff et al. 2017; `n` must be unit length.
pub fn orthonormal_basis(n: DVec3) -> (DVec3, DVec3) {
    let sign = 1.0f64.copysign(n.z);
    let a = -1.0 / (sign + n.z);
    let b = n.x * n.y * a;
    let tangent = DVec3::new(1.0 + sign * n.x * n.x * a, sign * b, -sign * n.x);
    let bitangent = DVec3::new(b, sign + n.y * n.y * a, -n.y);
    (tangent, bitangent)
}

/// Uniformly distributed direction on the unit sphere.
pub fn uniform_sphere(rng: &mut dyn RngCore) -> DVec3 {
    let z = 1.0 - 2.0 * gen_f64(rng);
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * PI * gen_f64(rng);
    DVec3::new(r * phi.cos(), r * phi.sin(), z)
}

/// Cosine-weighted direction in the hemisphere around unit normal `n`.
///
/// The density is `cos(theta) / PI`.
pub fn cosine_hemisphere(rng: &mut dyn RngCore, n: DVec3) -> DVec3 {
    let u1 = gen_f64(rng);
    let u2 = gen_f64(rng);
    let r = u1.sqrt();
    let phi = 2.0 * PI * u2;
    let (t, b) = orthonormal_basis(n);
    let local_z = (1.0 - u1).max(0.0).sqrt();
    (t * (r * phi.cos()) + b * (r * phi.sin()) + n * local_z).normalize()
}

/// Random point in the unit disk (z = 0).
pub fn random_in_unit_disk(rng: &mut dyn RngCore) -> DVec3 {
    loop {
        let p = DVec3::new(gen_f64(rng) * 2.0 - 1.0, gen_f64(rng) * 2.0 - 1.0, 0.0);
        if p.length_squared() < 1.0 {
            return p;
        }
    }
}
