//! Ivar - CPU Path Tracing
//!
//! An offline Monte Carlo path tracer built around two pieces:
//! - a SAH KD-tree answering nearest-hit and any-hit ray queries
//! - a tile-based worker engine running a breadth-first path integrator
//!   with direct light sampling and Russian roulette

mod camera;
mod engine;
mod error;
mod geometry;
mod integrator;
mod kdtree;
mod light;
mod material;
mod mesh;
mod sample_ray;
mod sampling;
mod scene;
mod sink;
mod sphere;
mod split;
mod tile;

pub use camera::{Camera, PinholeCamera};
pub use engine::{Engine, EngineConfig, JobState, RenderHandle, RenderSummary};
pub use error::{BuildError, EngineError};
pub use geometry::{Geometry, Intersection, PrimitiveId, ShadingData, HIT_EPSILON};
pub use integrator::{FrameParams, IntegratorConfig, PathIntegrator, TileScratch};
pub use kdtree::{default_max_depth, KdTree, KdTreeBuilder, KdTreeStats, PackedPrimitive, PrimitiveBound};
pub use light::{Light, LightSample, PointLight, SphereLight};
pub use material::{Color, Dielectric, DiffuseLight, Lambertian, Material, Metal, Scatter};
pub use mesh::TriangleMesh;
pub use sample_ray::SampleRay;
pub use scene::Scene;
pub use sink::{color_to_rgba, linear_to_gamma, FrameBuffer, ImageBuffer, ImageSink};
pub use sphere::Sphere;
pub use split::{MidpointSplit, Split, SplitStrategy, SurfaceAreaHeuristic};
pub use tile::{generate_tiles, Tile, DEFAULT_TILE_SIZE};

/// Re-export common math types from ivar_math
pub use ivar_math::{Aabb, Axis, Interval, Ray};
