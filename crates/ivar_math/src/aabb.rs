use crate::{DVec3, Interval, Ray};

/// One of the three coordinate axes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All axes in index order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Component index of this axis (0=X, 1=Y, 2=Z).
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// The two axes other than this one.
    pub fn others(self) -> [Axis; 2] {
        match self {
            Axis::X => [Axis::Y, Axis::Z],
            Axis::Y => [Axis::Z, Axis::X],
            Axis::Z => [Axis::X, Axis::Y],
        }
    }
}

/// Axis-Aligned Bounding Box for spatial acceleration structures.
///
/// An AABB is defined by three intervals (one per axis) that bound a 3D volume.
/// Every box built from points or by union of valid boxes keeps `min <= max`
/// on each axis; [`Aabb::EMPTY`] is the only inverted box and acts as the
/// identity for [`Aabb::union`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub x: Interval,
    pub y: Interval,
    pub z: Interval,
}

impl Aabb {
    /// Create a new AABB from three intervals.
    pub fn new(x: Interval, y: Interval, z: Interval) -> Self {
        Self { x, y, z }
    }

    /// Create an AABB from two corner points.
    pub fn from_points(a: DVec3, b: DVec3) -> Self {
        let lo = a.min(b);
        let hi = a.max(b);
        Self {
            x: Interval::new(lo.x, hi.x),
            y: Interval::new(lo.y, hi.y),
            z: Interval::new(lo.z, hi.z),
        }
    }

    /// Create an AABB that surrounds two other AABBs.
    pub fn surrounding(box0: &Aabb, box1: &Aabb) -> Self {
        Self {
            x: Interval::surrounding(&box0.x, &box1.x),
            y: Interval::surrounding(&box0.y, &box1.y),
            z: Interval::surrounding(&box0.z, &box1.z),
        }
    }

    /// Expand this box in place so it also covers `other`.
    pub fn union(&mut self, other: &Aabb) {
        *self = Aabb::surrounding(self, other);
    }

    /// Expand this box in place so it also covers point `p`.
    pub fn union_point(&mut self, p: DVec3) {
        self.union(&Aabb::from_points(p, p));
    }

    /// Minimum corner.
    pub fn min(&self) -> DVec3 {
        DVec3::new(self.x.min, self.y.min, self.z.min)
    }

    /// Maximum corner.
    pub fn max(&self) -> DVec3 {
        DVec3::new(self.x.max, self.y.max, self.z.max)
    }

    /// Returns true for the inverted box that contains nothing.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty() || self.y.is_empty() || self.z.is_empty()
    }

    /// Get the interval for a specific axis.
    #[inline]
    pub fn axis_interval(&self, axis: Axis) -> Interval {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    fn axis_interval_mut(&mut self, axis: Axis) -> &mut Interval {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
        }
    }

    /// Extent of the box along `axis`.
    pub fn extent(&self, axis: Axis) -> f64 {
        self.axis_interval(axis).size()
    }

    /// Total area of the six faces. Zero for an empty box.
    pub fn surface_area(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let d = self.max() - self.min();
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// Enclosed volume. Zero for an empty box.
    pub fn volume(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let d = self.max() - self.min();
        d.x * d.y * d.z
    }

    /// Returns true if the two closed boxes share at least one point.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.x.overlaps(&other.x) && self.y.overlaps(&other.y) && self.z.overlaps(&other.z)
    }

    /// Returns true if `p` lies inside or on the boundary of the box.
    pub fn contains_point(&self, p: DVec3) -> bool {
        self.x.contains(p.x) && self.y.contains(p.y) && self.z.contains(p.z)
    }

    /// Clip the box at the plane `axis = position`, returning the part below
    /// and the part above the plane.
    pub fn split(&self, axis: Axis, position: f64) -> (Aabb, Aabb) {
        let mut less = *self;
        let mut greater = *self;
        less.axis_interval_mut(axis).max = position;
        greater.axis_interval_mut(axis).min = position;
        (less, greater)
    }

    /// Parametric range `(tmin, tmax)` over which the ray is inside the box.
    ///
    /// Uses the slab method. A zero direction component reduces that axis to
    /// a point-inclusion test of the origin. Returns `None` when the slabs do
    /// not overlap or the box lies entirely behind the origin; `tmin` is
    /// negative when the origin is inside the box.
    pub fn ray_intersects_parametric(&self, ray: &Ray) -> Option<(f64, f64)> {
        let mut t_min = f64::NEG_INFINITY;
        let mut t_max = f64::INFINITY;

        for axis in Axis::ALL {
            let slab = self.axis_interval(axis);
            let origin = ray.origin[axis.index()];
            let direction = ray.direction[axis.index()];

            if direction == 0.0 {
                if !slab.contains(origin) {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / direction;
            let mut t0 = (slab.min - origin) * inv;
            let mut t1 = (slab.max - origin) * inv;
            if inv < 0.0 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }

        if t_max < 0.0 {
            return None;
        }
        Some((t_min, t_max))
    }

    /// Returns the axis with the longest extent.
    pub fn longest_axis(&self) -> Axis {
        let x_size = self.x.size();
        let y_size = self.y.size();
        let z_size = self.z.size();

        if x_size > y_size && x_size > z_size {
            Axis::X
        } else if y_size > z_size {
            Axis::Y
        } else {
            Axis::Z
        }
    }

    /// Returns the center point of the bounding box.
    pub fn centroid(&self) -> DVec3 {
        (self.min() + self.max()) * 0.5
    }

    /// Empty box: identity for union.
    pub const EMPTY: Aabb = Aabb {
        x: Interval::EMPTY,
        y: Interval::EMPTY,
        z: Interval::EMPTY,
    };
}
