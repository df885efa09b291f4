//! Renderable scene: acceleration structure, lights and background.

use crate::error::BuildError;
use crate::geometry::{Geometry, Intersection, ShadingData};
use crate::kdtree::KdTree;
use crate::light::Light;
use crate::Color;
use ivar_math::{Aabb, Ray};
use std::sync::Arc;

/// Everything the integrator needs to shade a frame.
///
/// Emissive geometry that should be sampled directly must also be added as a
/// [`Light`]; otherwise it is only found by paths that hit it.
pub struct Scene {
    tree: KdTree,
    lights: Vec<Arc<dyn Light>>,
    background: Color,
}

impl Scene {
    /// Build the KD-tree over `geometries` with default settings.
    pub fn new(
        geometries: Vec<Arc<dyn Geometry>>,
        lights: Vec<Arc<dyn Light>>,
        background: Color,
    ) -> Result<Self, BuildError> {
        Ok(Self::with_tree(KdTree::new(geometries)?, lights, background))
    }

    /// Use a tree built elsewhere, e.g. with a custom split strategy.
    pub fn with_tree(tree: KdTree, lights: Vec<Arc<dyn Light>>, background: Color) -> Self {
        Self {
            tree,
            lights,
            background,
        }
    }

    pub fn tree(&self) -> &KdTree {
        &self.tree
    }

    pub fn lights(&self) -> &[Arc<dyn Light>] {
        &self.lights
    }

    pub fn has_lights(&self) -> bool {
        !self.lights.is_empty()
    }

    /// Radiance for rays leaving the scene.
    pub fn background(&self) -> Color {
        self.background
    }

    pub fn bounds(&self) -> Aabb {
        self.tree.scene_bounds()
    }

    #[inline]
    pub fn intersect(&self, ray: &Ray, max_distance: f64, hit: &mut Intersection) -> bool {
        Geometry::intersect(&self.tree, ray, max_distance, hit)
    }

    #[inline]
    pub fn occluded(&self, ray: &Ray, max_distance: f64) -> bool {
        self.tree.occluded(ray, max_distance)
    }

    #[inline]
    pub fn resolve_hit(&self, ray: &Ray, hit: &Intersection) -> ShadingData<'_> {
        self.tree.resolve_hit(ray, hit)
    }
}
