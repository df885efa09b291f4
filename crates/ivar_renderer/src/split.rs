//! Split strategies for KD-tree construction.
//!
//! A strategy looks at the primitive bounds that reach a node and decides
//! whether to split it and where. [`SurfaceAreaHeuristic`] is the default;
//! [`MidpointSplit`] is a cheap spatial-median alternative.

use crate::kdtree::PrimitiveBound;
use ivar_math::{Aabb, Axis};

/// An axis-aligned splitting plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Split {
    pub axis: Axis,
    pub position: f64,
}

/// Decides how a KD-tree node is partitioned.
///
/// Primitives with `bounds.min <= position` go to the less child and those
/// with `bounds.max > position` to the greater-or-equal child, so a primitive
/// touching the plane leans to the less side. Strategies should only return
/// positions strictly inside `node_bounds`.
pub trait SplitStrategy: Send + Sync {
    /// Returns `None` to make the node a leaf.
    fn find_split(&self, candidates: &[PrimitiveBound], node_bounds: &Aabb) -> Option<Split>;
}

/// Surface Area Heuristic split selection.
///
/// Evaluates every primitive extent along an axis as a candidate plane and
/// keeps the cheapest one, provided it beats the cost of a leaf.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceAreaHeuristic {
    /// Cost of visiting an interior node
    pub traversal_cost: f64,
    /// Cost of one primitive intersection test
    pub intersection_cost: f64,
    /// Multiplier (< 1) applied when one child would be empty
    pub empty_bias: f64,
}

impl Default for SurfaceAreaHeuristic {
    fn default() -> Self {
        Self {
            traversal_cost: 1.0,
            intersection_cost: 80.0,
            empty_bias: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EdgeKind {
    // Declaration order: minima sort before maxima at equal positions
    Min,
    Max,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    position: f64,
    kind: EdgeKind,
}

impl SurfaceAreaHeuristic {
    pub fn new(traversal_cost: f64, intersection_cost: f64, empty_bias: f64) -> Self {
        Self {
            traversal_cost,
            intersection_cost,
            empty_bias,
        }
    }

    /// Cost of splitting `node_bounds` at `position` with the given counts.
    fn split_cost(
        &self,
        node_bounds: &Aabb,
        axis: Axis,
        position: f64,
        below: usize,
        above: usize,
    ) -> f64 {
        let (less, greater) = node_bounds.split(axis, position);
        let inv_area = 1.0 / node_bounds.surface_area();
        let p_below = less.surface_area() * inv_area;
        let p_above = greater.surface_area() * inv_area;
        let bias = if below == 0 || above == 0 {
            self.empty_bias
        } else {
            1.0
        };

        self.traversal_cost
            + self.intersection_cost
                * (p_below * below as f64 + p_above * above as f64)
                * bias
    }

    /// Cheapest `(cost, position)` along one axis.
    fn best_on_axis(
        &self,
        candidates: &[PrimitiveBound],
        node_bounds: &Aabb,
        axis: Axis,
    ) -> Option<(f64, f64)> {
        let mut edges: Vec<Edge> = Vec::with_capacity(candidates.len() * 2);
        for candidate in candidates {
            let extent = candidate.bounds.axis_interval(axis);
            edges.push(Edge {
                position: extent.min,
                kind: EdgeKind::Min,
            });
            edges.push(Edge {
                position: extent.max,
                kind: EdgeKind::Max,
            });
        }
        edges.sort_by(|a, b| {
            a.position
                .total_cmp(&b.position)
                .then(a.kind.cmp(&b.kind))
        });

        let node_extent = node_bounds.axis_interval(axis);
        let mut below = 0;
        let mut above = candidates.len();
        let mut best: Option<(f64, f64)> = None;

        let mut i = 0;
        while i < edges.len() {
            let position = edges[i].position;

            // Consume every edge at this position so the counts match the
            // placement rule: below = #{min <= p}, above = #{max > p}
            while i < edges.len() && edges[i].position == position {
                match edges[i].kind {
                    EdgeKind::Min => below += 1,
                    EdgeKind::Max => above -= 1,
                }
                i += 1;
            }

            if !node_extent.surrounds(position) {
                continue;
            }

            let cost = self.split_cost(node_bounds, axis, position, below, above);
            if best.map_or(true, |(best_cost, _)| cost < best_cost) {
                best = Some((cost, position));
            }
        }

        best
    }
}

impl SplitStrategy for SurfaceAreaHeuristic {
    fn find_split(&self, candidates: &[PrimitiveBound], node_bounds: &Aabb) -> Option<Split> {
        if candidates.is_empty() || node_bounds.surface_area() <= 0.0 {
            return None;
        }

        let leaf_cost = self.intersection_cost * candidates.len() as f64;
        let longest = node_bounds.longest_axis();

        let mut best = self
            .best_on_axis(candidates, node_bounds, longest)
            .map(|(cost, position)| (cost, Split { axis: longest, position }));

        // Retry the other axes if the longest one does not pay off
        if best.map_or(true, |(cost, _)| cost >= leaf_cost) {
            for axis in longest.others() {
                if let Some((cost, position)) = self.best_on_axis(candidates, node_bounds, axis) {
                    if best.map_or(true, |(best_cost, _)| cost < best_cost) {
                        best = Some((cost, Split { axis, position }));
                    }
                }
            }
        }

        best.filter(|(cost, _)| *cost < leaf_cost).map(|(_, split)| split)
    }
}

/// Spatial median split: halve the longest axis of the node while it holds
/// more than `leaf_size` primitives.
#[derive(Debug, Clone, Copy)]
pub struct MidpointSplit {
    pub leaf_size: usize,
}

impl Default for MidpointSplit {
    fn default() -> Self {
        Self { leaf_size: 4 }
    }
}

impl SplitStrategy for MidpointSplit {
    fn find_split(&self, candidates: &[PrimitiveBound], node_bounds: &Aabb) -> Option<Split> {
        if candidates.len() <= self.leaf_size {
            return None;
        }

        let axis = node_bounds.longest_axis();
        let extent = node_bounds.axis_interval(axis);
        if extent.size() <= 0.0 {
            return None;
        }

        Some(Split {
            axis,
            position: (extent.min + extent.max) * 0.5,
        })
    }
}
