//! KD-tree acceleration structure.
//!
//! Built top-down over the primitives of a list of geometries using a
//! pluggable [`SplitStrategy`] (SAH by default). The finished tree is
//! immutable and can be shared across any number of render threads.
//!
//! Primitives straddling a splitting plane are referenced from both children,
//! so leaves may reference more primitives than the scene contains.

use crate::error::BuildError;
use crate::geometry::{Geometry, Intersection, PrimitiveId, ShadingData};
use crate::split::{SplitStrategy, SurfaceAreaHeuristic};
use ivar_math::{Aabb, Axis, Ray};
use std::sync::Arc;
use std::time::Instant;

/// Subtrees with at least this many candidates build their children in parallel.
const PARALLEL_BUILD_THRESHOLD: usize = 4096;

/// Geometry slot and local primitive index packed into one word.
///
/// High 32 bits hold the geometry index, low 32 bits the primitive index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackedPrimitive(u64);

impl PackedPrimitive {
    fn pack(id: PrimitiveId) -> Self {
        Self(((id.geometry as u64) << 32) | (id.primitive as u64 & 0xFFFF_FFFF))
    }

    #[inline]
    pub fn geometry(self) -> usize {
        (self.0 >> 32) as usize
    }

    #[inline]
    pub fn primitive(self) -> usize {
        (self.0 & 0xFFFF_FFFF) as usize
    }

    /// Unpacked two-field identity.
    #[inline]
    pub fn id(self) -> PrimitiveId {
        PrimitiveId::new(self.geometry(), self.primitive())
    }
}

/// Bound of one primitive, used only while building.
#[derive(Debug, Clone, Copy)]
pub struct PrimitiveBound {
    pub bounds: Aabb,
    primitive: PackedPrimitive,
}

impl PrimitiveBound {
    pub(crate) fn new(bounds: Aabb, id: PrimitiveId) -> Self {
        Self {
            bounds,
            primitive: PackedPrimitive::pack(id),
        }
    }

    pub fn primitive(&self) -> PrimitiveId {
        self.primitive.id()
    }
}

/// KD-tree node - either a leaf with primitive references or an interior
/// node with a splitting plane. A missing child is an empty subtree.
#[derive(Debug)]
enum KdNode {
    Leaf(Vec<PackedPrimitive>),
    Interior {
        axis: Axis,
        split: f64,
        less: Option<Box<KdNode>>,
        greater: Option<Box<KdNode>>,
    },
}

/// Shape of a built tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KdTreeStats {
    /// Interior and leaf nodes
    pub nodes: usize,
    pub leaves: usize,
    /// Missing children (empty subtrees)
    pub empty_leaves: usize,
    /// Deepest leaf (root = 0)
    pub max_depth: usize,
    /// Primitives in the scene
    pub primitives: usize,
    /// Primitive references summed over all leaves
    pub references: usize,
}

/// Configures and runs KD-tree construction.
pub struct KdTreeBuilder {
    max_depth: Option<usize>,
    strategy: Box<dyn SplitStrategy>,
}

impl Default for KdTreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KdTreeBuilder {
    /// Builder with the default SAH strategy and automatic depth limit.
    pub fn new() -> Self {
        Self {
            max_depth: None,
            strategy: Box::new(SurfaceAreaHeuristic::default()),
        }
    }

    /// Limit the tree depth. Nodes at this depth become leaves.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Replace the split strategy.
    pub fn with_strategy(mut self, strategy: impl SplitStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Build a tree over every primitive of every geometry.
    pub fn build(&self, geometries: Vec<Arc<dyn Geometry>>) -> Result<KdTree, BuildError> {
        if geometries.is_empty() {
            return Err(BuildError::EmptyScene);
        }
        if geometries.len() > u32::MAX as usize {
            return Err(BuildError::TooManyPrimitives(geometries.len()));
        }

        let start = Instant::now();
        let mut candidates = Vec::new();
        let mut bounds = Aabb::EMPTY;

        for (geometry_index, geometry) in geometries.iter().enumerate() {
            let count = geometry.primitive_count();
            if count > u32::MAX as usize {
                return Err(BuildError::TooManyPrimitives(count));
            }

            for primitive in 0..count {
                let primitive_bounds = geometry.primitive_bounds(primitive);
                let finite = primitive_bounds.min().is_finite() && primitive_bounds.max().is_finite();
                if !finite || primitive_bounds.is_empty() {
                    return Err(BuildError::InvalidBounds {
                        geometry: geometry_index,
                        primitive,
                    });
                }

                bounds.union(&primitive_bounds);
                candidates.push(PrimitiveBound::new(
                    primitive_bounds,
                    PrimitiveId::new(geometry_index, primitive),
                ));
            }
        }

        if candidates.is_empty() {
            return Err(BuildError::EmptyScene);
        }

        let primitives = candidates.len();
        let max_depth = self
            .max_depth
            .unwrap_or_else(|| default_max_depth(primitives));
        let root = self.build_node(candidates, bounds, 0, max_depth);

        let mut stats = KdTreeStats {
            primitives,
            ..Default::default()
        };
        collect_stats(&root, 0, &mut stats);

        log::info!(
            "Built KD-tree in {:.2?}: {} primitives, {} references, {} nodes, {} leaves, depth {}",
            start.elapsed(),
            stats.primitives,
            stats.references,
            stats.nodes,
            stats.leaves,
            stats.max_depth
        );

        Ok(KdTree {
            geometries,
            root,
            bounds,
            stats,
        })
    }

    /// Recursive top-down construction over a non-empty candidate set.
    fn build_node(
        &self,
        candidates: Vec<PrimitiveBound>,
        node_bounds: Aabb,
        depth: usize,
        max_depth: usize,
    ) -> KdNode {
        if depth >= max_depth {
            return make_leaf(&candidates);
        }

        let Some(split) = self.strategy.find_split(&candidates, &node_bounds) else {
            return make_leaf(&candidates);
        };

        let (less_bounds, greater_bounds) = node_bounds.split(split.axis, split.position);
        let mut less = Vec::new();
        let mut greater = Vec::new();
        for candidate in &candidates {
            let extent = candidate.bounds.axis_interval(split.axis);
            // Touching the plane leans to the less side
            if extent.min <= split.position {
                less.push(*candidate);
            }
            if extent.max > split.position {
                greater.push(*candidate);
            }
        }

        let build_less = || self.build_child(less, less_bounds, depth + 1, max_depth);
        let build_greater = || self.build_child(greater, greater_bounds, depth + 1, max_depth);
        let (less, greater) = if candidates.len() >= PARALLEL_BUILD_THRESHOLD {
            rayon::join(build_less, build_greater)
        } else {
            (build_less(), build_greater())
        };

        KdNode::Interior {
            axis: split.axis,
            split: split.position,
            less,
            greater,
        }
    }

    fn build_child(
        &self,
        candidates: Vec<PrimitiveBound>,
        node_bounds: Aabb,
        depth: usize,
        max_depth: usize,
    ) -> Option<Box<KdNode>> {
        if candidates.is_empty() {
            return None;
        }
        Some(Box::new(self.build_node(candidates, node_bounds, depth, max_depth)))
    }
}

fn make_leaf(candidates: &[PrimitiveBound]) -> KdNode {
    KdNode::Leaf(candidates.iter().map(|c| c.primitive).collect())
}

/// Depth limit used when none is configured: `8 + 1.3 * log2(n)`.
pub fn default_max_depth(primitives: usize) -> usize {
    (8.0 + 1.3 * (primitives.max(1) as f64).log2()).round() as usize
}

fn collect_stats(node: &KdNode, depth: usize, stats: &mut KdTreeStats) {
    stats.nodes += 1;
    stats.max_depth = stats.max_depth.max(depth);

    match node {
        KdNode::Leaf(primitives) => {
            stats.leaves += 1;
            stats.references += primitives.len();
        }
        KdNode::Interior { less, greater, .. } => {
            for child in [less, greater] {
                match child {
                    Some(child) => collect_stats(child, depth + 1, stats),
                    None => stats.empty_leaves += 1,
                }
            }
        }
    }
}

/// Immutable KD-tree over a list of geometries.
pub struct KdTree {
    geometries: Vec<Arc<dyn Geometry>>,
    root: KdNode,
    bounds: Aabb,
    stats: KdTreeStats,
}

impl KdTree {
    /// Build with the default SAH strategy and depth limit.
    pub fn new(geometries: Vec<Arc<dyn Geometry>>) -> Result<Self, BuildError> {
        KdTreeBuilder::new().build(geometries)
    }

    pub fn builder() -> KdTreeBuilder {
        KdTreeBuilder::new()
    }

    /// Overall scene bound.
    pub fn scene_bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn stats(&self) -> KdTreeStats {
        self.stats
    }

    pub fn geometries(&self) -> &[Arc<dyn Geometry>] {
        &self.geometries
    }

    /// Shading data for a hit reported by this tree.
    pub fn resolve_hit(&self, ray: &Ray, hit: &Intersection) -> ShadingData<'_> {
        self.geometries[hit.primitive.geometry].shading(ray, hit)
    }

    /// Visit every non-empty leaf together with its node bound.
    pub fn for_each_leaf<F>(&self, mut visit: F)
    where
        F: FnMut(&Aabb, &[PackedPrimitive]),
    {
        fn walk<F: FnMut(&Aabb, &[PackedPrimitive])>(node: &KdNode, bounds: Aabb, visit: &mut F) {
            match node {
                KdNode::Leaf(primitives) => visit(&bounds, primitives),
                KdNode::Interior {
                    axis,
                    split,
                    less,
                    greater,
                } => {
                    let (less_bounds, greater_bounds) = bounds.split(*axis, *split);
                    if let Some(less) = less {
                        walk(less, less_bounds, visit);
                    }
                    if let Some(greater) = greater {
                        walk(greater, greater_bounds, visit);
                    }
                }
            }
        }

        walk(&self.root, self.bounds, &mut visit);
    }

    /// Clip the ray against the scene bound, limited to `[0, max_distance]`.
    #[inline]
    fn clip(&self, ray: &Ray, max_distance: f64) -> Option<(f64, f64)> {
        let (t_min, t_max) = self.bounds.ray_intersects_parametric(ray)?;
        let t_min = t_min.max(0.0);
        if t_min > max_distance {
            return None;
        }
        Some((t_min, t_max.min(max_distance)))
    }

    fn nearest(
        &self,
        node: &KdNode,
        ray: &Ray,
        t_min: f64,
        t_max: f64,
        closest: &mut f64,
        hit: &mut Intersection,
    ) -> bool {
        match node {
            KdNode::Leaf(primitives) => {
                let mut found = false;
                for packed in primitives {
                    let geometry = &self.geometries[packed.geometry()];
                    if let Some(t) = geometry.intersect_primitive(ray, *closest, packed.primitive()) {
                        *closest = t;
                        hit.t = t;
                        hit.primitive = packed.id();
                        found = true;
                    }
                }
                found
            }
            KdNode::Interior {
                axis,
                split,
                less,
                greater,
            } => {
                let origin = ray.origin[axis.index()];
                let direction = ray.direction[axis.index()];
                let enter = origin + direction * t_min;
                let exit = origin + direction * t_max;

                // A ray lying in the split plane touches both children
                if enter == *split && exit == *split {
                    let found_less = self.nearest_child(less, ray, t_min, t_max, closest, hit);
                    let found_greater = self.nearest_child(greater, ray, t_min, t_max, closest, hit);
                    return found_less || found_greater;
                }
                if enter < *split && exit < *split {
                    return self.nearest_child(less, ray, t_min, t_max, closest, hit);
                }
                if enter >= *split && exit >= *split {
                    return self.nearest_child(greater, ray, t_min, t_max, closest, hit);
                }

                let t_split = (*split - origin) / direction;
                let (near, far) = if enter < *split {
                    (less, greater)
                } else {
                    (greater, less)
                };

                let mut found = self.nearest_child(near, ray, t_min, t_split, closest, hit);
                // Anything in the far child lies beyond t_split
                if *closest <= t_split {
                    return found;
                }
                found |= self.nearest_child(far, ray, t_split, t_max, closest, hit);
                found
            }
        }
    }

    #[inline]
    fn nearest_child(
        &self,
        child: &Option<Box<KdNode>>,
        ray: &Ray,
        t_min: f64,
        t_max: f64,
        closest: &mut f64,
        hit: &mut Intersection,
    ) -> bool {
        match child {
            Some(node) => self.nearest(node, ray, t_min, t_max, closest, hit),
            None => false,
        }
    }

    fn any(&self, node: &KdNode, ray: &Ray, t_min: f64, t_max: f64, max_distance: f64) -> bool {
        match node {
            KdNode::Leaf(primitives) => primitives.iter().any(|packed| {
                self.geometries[packed.geometry()]
                    .intersect_primitive(ray, max_distance, packed.primitive())
                    .is_some()
            }),
            KdNode::Interior {
                axis,
                split,
                less,
                greater,
            } => {
                let origin = ray.origin[axis.index()];
                let direction = ray.direction[axis.index()];
                let enter = origin + direction * t_min;
                let exit = origin + direction * t_max;

                if enter == *split && exit == *split {
                    return self.any_child(less, ray, t_min, t_max, max_distance)
                        || self.any_child(greater, ray, t_min, t_max, max_distance);
                }
                if enter < *split && exit < *split {
                    return self.any_child(less, ray, t_min, t_max, max_distance);
                }
                if enter >= *split && exit >= *split {
                    return self.any_child(greater, ray, t_min, t_max, max_distance);
                }

                let t_split = (*split - origin) / direction;
                let (near, far) = if enter < *split {
                    (less, greater)
                } else {
                    (greater, less)
                };

                self.any_child(near, ray, t_min, t_split, max_distance)
                    || (t_split < max_distance
                        && self.any_child(far, ray, t_split, t_max, max_distance))
            }
        }
    }

    #[inline]
    fn any_child(
        &self,
        child: &Option<Box<KdNode>>,
        ray: &Ray,
        t_min: f64,
        t_max: f64,
        max_distance: f64,
    ) -> bool {
        match child {
            Some(node) => self.any(node, ray, t_min, t_max, max_distance),
            None => false,
        }
    }
}

/// A tree is itself a geometry with a single primitive covering the whole
/// tree, which lets trees be nested inside other trees.
impl Geometry for KdTree {
    fn primitive_count(&self) -> usize {
        1
    }

    fn primitive_bounds(&self, _primitive: usize) -> Aabb {
        self.bounds
    }

    fn bounds(&self) -> Aabb {
        self.bounds
    }

    fn intersect_primitive(&self, ray: &Ray, max_distance: f64, _primitive: usize) -> Option<f64> {
        let mut hit = Intersection::default();
        Geometry::intersect(self, ray, max_distance, &mut hit).then_some(hit.t)
    }

    /// Nearest hit closer than `max_distance`; `direction` must be normalized.
    fn intersect(&self, ray: &Ray, max_distance: f64, hit: &mut Intersection) -> bool {
        let Some((t_min, t_max)) = self.clip(ray, max_distance) else {
            return false;
        };
        let mut closest = max_distance;
        self.nearest(&self.root, ray, t_min, t_max, &mut closest, hit)
    }

    /// Any hit closer than `max_distance`; `direction` must be normalized.
    fn occluded(&self, ray: &Ray, max_distance: f64) -> bool {
        let Some((t_min, t_max)) = self.clip(ray, max_distance) else {
            return false;
        };
        self.any(&self.root, ray, t_min, t_max, max_distance)
    }

    /// Shading for a hit reported through the single-primitive view, as seen
    /// by an enclosing tree. The inner hit is found again and resolved.
    fn shading(&self, ray: &Ray, hit: &Intersection) -> ShadingData<'_> {
        let cutoff = hit.t + 1e-9 * hit.t.max(1.0);
        let mut inner = Intersection::default();
        if !Geometry::intersect(self, ray, cutoff, &mut inner) {
            Geometry::intersect(self, ray, f64::INFINITY, &mut inner);
        }
        self.resolve_hit(ray, &inner)
    }
}
