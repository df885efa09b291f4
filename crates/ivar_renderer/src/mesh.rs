//! Triangle mesh geometry for ray tracing.
//!
//! Each triangle is one primitive. Uses the Möller-Trumbore algorithm for
//! ray-triangle intersection.

use crate::geometry::{Geometry, Intersection, ShadingData, HIT_EPSILON};
use crate::Material;
use ivar_math::{Aabb, DVec3, Ray};

/// An indexed triangle mesh sharing one material.
pub struct TriangleMesh<M: Material> {
    positions: Vec<DVec3>,
    triangles: Vec<[u32; 3]>,
    /// Optional per-vertex normals for smooth shading
    normals: Option<Vec<DVec3>>,
    material: M,
}

impl<M: Material> TriangleMesh<M> {
    /// Create a mesh from vertex positions and triangle indices.
    pub fn new(positions: Vec<DVec3>, triangles: Vec<[u32; 3]>, material: M) -> Self {
        Self {
            positions,
            triangles,
            normals: None,
            material,
        }
    }

    /// Use per-vertex normals for smooth shading.
    pub fn with_normals(mut self, normals: Vec<DVec3>) -> Self {
        debug_assert_eq!(normals.len(), self.positions.len());
        self.normals = Some(normals);
        self
    }

    /// Two-triangle quad with corners given in winding order.
    pub fn quad(a: DVec3, b: DVec3, c: DVec3, d: DVec3, material: M) -> Self {
        Self::new(vec![a, b, c, d], vec![[0, 1, 2], [0, 2, 3]], material)
    }

    /// Closed axis-aligned box made of twelve triangles.
    pub fn axis_box(min: DVec3, max: DVec3, material: M) -> Self {
        let positions = (0..8)
            .map(|i| {
                DVec3::new(
                    if i & 1 == 0 { min.x } else { max.x },
                    if i & 2 == 0 { min.y } else { max.y },
                    if i & 4 == 0 { min.z } else { max.z },
                )
            })
            .collect();

        let faces: [[u32; 4]; 6] = [
            [0, 2, 6, 4], // -X
            [1, 5, 7, 3], // +X
            [0, 4, 5, 1], // -Y
            [2, 3, 7, 6], // +Y
            [0, 1, 3, 2], // -Z
            [4, 6, 7, 5], // +Z
        ];
        let triangles = faces
            .iter()
            .flat_map(|&[a, b, c, d]| [[a, b, c], [a, c, d]])
            .collect();

        Self::new(positions, triangles, material)
    }

    fn vertices(&self, primitive: usize) -> (DVec3, DVec3, DVec3) {
        let [i0, i1, i2] = self.triangles[primitive];
        (
            self.positions[i0 as usize],
            self.positions[i1 as usize],
            self.positions[i2 as usize],
        )
    }

    /// Möller-Trumbore ray-triangle intersection, returning (t, u, v).
    fn intersect_triangle(&self, ray: &Ray, primitive: usize) -> Option<(f64, f64, f64)> {
        let (v0, v1, v2) = self.vertices(primitive);
        let edge1 = v1 - v0;
        let edge2 = v2 - v0;

        let h = ray.direction.cross(edge2);
        let a = edge1.dot(h);

        // Ray is parallel to triangle
        if a.abs() < 1e-12 {
            return None;
        }

        let f = 1.0 / a;
        let s = ray.origin - v0;
        let u = f * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(edge1);
        let v = f * ray.direction.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        Some((f * edge2.dot(q), u, v))
    }
}

impl<M: Material> Geometry for TriangleMesh<M> {
    fn primitive_count(&self) -> usize {
        self.triangles.len()
    }

    fn primitive_bounds(&self, primitive: usize) -> Aabb {
        let (v0, v1, v2) = self.vertices(primitive);
        let mut bounds = Aabb::from_points(v0, v1);
        bounds.union_point(v2);
        bounds
    }

    fn intersect_primitive(&self, ray: &Ray, max_distance: f64, primitive: usize) -> Option<f64> {
        let (t, _, _) = self.intersect_triangle(ray, primitive)?;
        (t > HIT_EPSILON && t < max_distance).then_some(t)
    }

    fn shading(&self, ray: &Ray, hit: &Intersection) -> ShadingData<'_> {
        let primitive = hit.primitive.primitive;
        let (v0, v1, v2) = self.vertices(primitive);
        let face_normal = (v1 - v0).cross(v2 - v0).normalize();

        let normal = match (&self.normals, self.intersect_triangle(ray, primitive)) {
            (Some(normals), Some((_, u, v))) => {
                let [i0, i1, i2] = self.triangles[primitive];
                let smooth = normals[i0 as usize] * (1.0 - u - v)
                    + normals[i1 as usize] * u
                    + normals[i2 as usize] * v;
                smooth.try_normalize().unwrap_or(face_normal)
            }
            _ => face_normal,
        };

        ShadingData::new(ray, ray.at(hit.t), normal, &self.material)
    }
}
