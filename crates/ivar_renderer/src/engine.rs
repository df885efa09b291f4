//! Tile-based render engine.
//!
//! The engine owns a fixed pool of worker threads fed from a shared FIFO
//! queue of tiles. Each submitted job splits its image into tiles, and each
//! tile is rendered by exactly one worker with that worker's scratch buffers
//! and RNG. Jobs can be cancelled at tile granularity: tiles that have not
//! started are dropped from the queue, tiles already rendering finish.
//!
//! Every job reports `imaging_done` to its sink exactly once, whether it
//! completes, is cancelled, or loses tiles to a panic.

use crate::camera::Camera;
use crate::error::EngineError;
use crate::integrator::{FrameParams, IntegratorConfig, PathIntegrator, TileScratch};
use crate::scene::Scene;
use crate::sink::ImageSink;
use crate::tile::{generate_tiles, Tile, DEFAULT_TILE_SIZE};
use parking_lot::{Condvar, Mutex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Engine configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Worker count; `None` uses the available parallelism
    pub threads: Option<usize>,
    /// Tile edge length in pixels
    pub tile_size: u32,
    /// Base seed for the per-worker RNGs; `None` seeds from entropy
    pub seed: Option<u64>,
    pub integrator: IntegratorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: None,
            tile_size: DEFAULT_TILE_SIZE,
            seed: None,
            integrator: IntegratorConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_integrator(mut self, integrator: IntegratorConfig) -> Self {
        self.integrator = integrator;
        self
    }

    fn worker_count(&self) -> usize {
        self.threads
            .unwrap_or_else(|| thread::available_parallelism().map_or(1, |n| n.get()))
            .max(1)
    }
}

/// Lifecycle of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Submitted, no tile started yet
    Queued,
    /// At least one tile has been picked up
    InFlight,
    /// Every tile finished
    Completed,
    /// Some tiles were removed before they started
    Cancelled,
}

impl JobState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => JobState::Queued,
            1 => JobState::InFlight,
            2 => JobState::Completed,
            _ => JobState::Cancelled,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Cancelled)
    }
}

/// Outcome of a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderSummary {
    pub state: JobState,
    /// Tiles the job was split into
    pub tiles: usize,
    /// Tiles whose rendering panicked
    pub failed_tiles: usize,
}

/// Shared state of one submitted job.
struct RenderJob {
    id: u64,
    sink: Arc<dyn ImageSink>,
    camera: Arc<dyn Camera>,
    scene: Arc<Scene>,
    width: u32,
    height: u32,
    sample_rate: u32,
    max_depth: u32,
    tiles: usize,
    remaining: AtomicUsize,
    failed: AtomicUsize,
    state: AtomicU8,
    finished: AtomicBool,
    done: Mutex<bool>,
    done_signal: Condvar,
    submitted: Instant,
}

impl RenderJob {
    fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn frame(&self) -> FrameParams<'_> {
        FrameParams {
            scene: &self.scene,
            camera: self.camera.as_ref(),
            width: self.width,
            height: self.height,
            sample_rate: self.sample_rate,
            max_depth: self.max_depth,
        }
    }

    fn mark_in_flight(&self) {
        let _ = self.state.compare_exchange(
            JobState::Queued as u8,
            JobState::InFlight as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn mark_cancelled(&self) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (JobState::from_u8(s) != JobState::Completed).then_some(JobState::Cancelled as u8)
            });
    }

    /// Count `count` tiles as finished, completing the job on the last one.
    fn finish_tiles(&self, count: usize) {
        if count == 0 {
            return;
        }
        if self.remaining.fetch_sub(count, Ordering::AcqRel) == count {
            self.complete();
        }
    }

    /// Terminal transition. Runs its body at most once.
    fn complete(&self) {
        if self
            .finished
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (JobState::from_u8(s) != JobState::Cancelled).then_some(JobState::Completed as u8)
            });

        let failed = self.failed.load(Ordering::Acquire);
        log::info!(
            "Job {} {:?} in {:.2?} ({} tiles, {} failed)",
            self.id,
            self.state(),
            self.submitted.elapsed(),
            self.tiles,
            failed
        );

        if panic::catch_unwind(AssertUnwindSafe(|| self.sink.imaging_done())).is_err() {
            log::error!("Sink panicked in imaging_done of job {}", self.id);
        }

        let mut done = self.done.lock();
        *done = true;
        self.done_signal.notify_all();
    }

    fn summary(&self) -> RenderSummary {
        RenderSummary {
            state: self.state(),
            tiles: self.tiles,
            failed_tiles: self.failed.load(Ordering::Acquire),
        }
    }
}

/// A queued tile of a job.
struct WorkItem {
    tile: Tile,
    job: Arc<RenderJob>,
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<WorkItem>,
    shutdown: bool,
}

/// Queue shared between the engine, its handles and the workers.
#[derive(Default)]
struct Shared {
    queue: Mutex<QueueState>,
    available: Condvar,
}

impl Shared {
    /// Block until a tile is available; `None` once shut down.
    fn next_item(&self) -> Option<WorkItem> {
        let mut queue = self.queue.lock();
        loop {
            if let Some(item) = queue.items.pop_front() {
                return Some(item);
            }
            if queue.shutdown {
                return None;
            }
            self.available.wait(&mut queue);
        }
    }

    /// Remove every queued tile whose job matches `predicate` and complete
    /// the affected jobs as cancelled. Returns the number of tiles removed.
    fn cancel_where(&self, predicate: impl Fn(&RenderJob) -> bool) -> usize {
        let removed = {
            let mut queue = self.queue.lock();
            let (removed, kept): (VecDeque<WorkItem>, VecDeque<WorkItem>) = queue
                .items
                .drain(..)
                .partition(|item| predicate(item.job.as_ref()));
            queue.items = kept;
            removed
        };

        // Per-job tile counts; sink callbacks run outside the queue lock
        let mut jobs: Vec<(Arc<RenderJob>, usize)> = Vec::new();
        for item in &removed {
            match jobs.iter_mut().find(|(job, _)| job.id == item.job.id) {
                Some((_, count)) => *count += 1,
                None => jobs.push((Arc::clone(&item.job), 1)),
            }
        }

        for (job, count) in &jobs {
            log::warn!("Cancelled {} queued tiles of job {}", count, job.id);
            job.mark_cancelled();
            job.finish_tiles(*count);
        }

        removed.len()
    }
}

/// Returns true if both sinks are the same object.
fn same_sink(a: &Arc<dyn ImageSink>, b: &Arc<dyn ImageSink>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Handle to a submitted job.
pub struct RenderHandle {
    job: Arc<RenderJob>,
    shared: Arc<Shared>,
}

impl RenderHandle {
    pub fn id(&self) -> u64 {
        self.job.id
    }

    pub fn state(&self) -> JobState {
        self.job.state()
    }

    /// Tiles not yet finished or cancelled.
    pub fn remaining_tiles(&self) -> usize {
        self.job.remaining.load(Ordering::Acquire)
    }

    pub fn failed_tiles(&self) -> usize {
        self.job.failed.load(Ordering::Acquire)
    }

    /// True once `imaging_done` has been delivered.
    pub fn is_done(&self) -> bool {
        *self.job.done.lock()
    }

    /// Block until the job is done.
    pub fn wait(&self) -> RenderSummary {
        let mut done = self.job.done.lock();
        while !*done {
            self.job.done_signal.wait(&mut done);
        }
        drop(done);
        self.job.summary()
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<RenderSummary> {
        let deadline = Instant::now() + timeout;
        let mut done = self.job.done.lock();
        while !*done {
            if self.job.done_signal.wait_until(&mut done, deadline).timed_out() {
                break;
            }
        }
        let finished = *done;
        drop(done);
        finished.then(|| self.job.summary())
    }

    /// Drop this job's tiles that have not started yet.
    pub fn cancel(&self) -> usize {
        let id = self.job.id;
        self.shared.cancel_where(|job| job.id == id)
    }
}

/// Fixed pool of render workers.
pub struct Engine {
    config: EngineConfig,
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    next_job: AtomicU64,
}

impl Engine {
    /// Start the worker threads.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let shared = Arc::new(Shared::default());
        let count = config.worker_count();
        let mut engine = Self {
            config,
            shared,
            workers: Vec::with_capacity(count),
            next_job: AtomicU64::new(0),
        };

        for index in 0..count {
            let shared = Arc::clone(&engine.shared);
            let integrator = PathIntegrator::new(config.integrator);
            let rng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
                None => StdRng::from_entropy(),
            };

            let worker = thread::Builder::new()
                .name(format!("ivar-worker-{index}"))
                .spawn(move || worker_loop(index, &shared, &integrator, rng))
                .map_err(|e| EngineError::Spawn(e.to_string()))?;
            engine.workers.push(worker);
        }

        log::info!(
            "Started render engine with {} workers, {}px tiles",
            count,
            config.tile_size
        );
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue a frame for rendering and return immediately.
    ///
    /// The image is split into tiles over `sink.resolution()`, rendered with
    /// `sample_rate²` samples per pixel and up to `max_depth` bounces.
    pub fn submit(
        &self,
        sink: Arc<dyn ImageSink>,
        camera: Arc<dyn Camera>,
        scene: Arc<Scene>,
        sample_rate: u32,
        max_depth: u32,
    ) -> Result<RenderHandle, EngineError> {
        // sample_rate² samples per pixel must fit in a u32
        if sample_rate == 0 || sample_rate.checked_mul(sample_rate).is_none() {
            return Err(EngineError::InvalidSampleRate);
        }
        if self.shared.queue.lock().shutdown {
            return Err(EngineError::ShutDown);
        }

        let (width, height) = sink.resolution();
        let tiles = generate_tiles(width, height, self.config.tile_size);
        let job = Arc::new(RenderJob {
            id: self.next_job.fetch_add(1, Ordering::Relaxed),
            sink,
            camera,
            scene,
            width,
            height,
            sample_rate,
            max_depth,
            tiles: tiles.len(),
            remaining: AtomicUsize::new(tiles.len()),
            failed: AtomicUsize::new(0),
            state: AtomicU8::new(JobState::Queued as u8),
            finished: AtomicBool::new(false),
            done: Mutex::new(false),
            done_signal: Condvar::new(),
            submitted: Instant::now(),
        });

        log::info!(
            "Submitted job {}: {}x{}, {} tiles, {} spp, depth {}",
            job.id,
            width,
            height,
            tiles.len(),
            sample_rate * sample_rate,
            max_depth
        );

        job.sink.imaging_started();

        if tiles.is_empty() {
            job.complete();
        } else {
            let mut queue = self.shared.queue.lock();
            if queue.shutdown {
                drop(queue);
                job.mark_cancelled();
                job.complete();
                return Err(EngineError::ShutDown);
            }
            queue.items.extend(tiles.into_iter().map(|tile| WorkItem {
                tile,
                job: Arc::clone(&job),
            }));
            drop(queue);
            self.shared.available.notify_all();
        }

        Ok(RenderHandle {
            job,
            shared: Arc::clone(&self.shared),
        })
    }

    /// Drop every queued tile of every job rendering into `sink`.
    ///
    /// Returns the number of tiles removed. Tiles already rendering finish.
    pub fn cancel(&self, sink: &Arc<dyn ImageSink>) -> usize {
        self.shared.cancel_where(|job| same_sink(&job.sink, sink))
    }

    /// Cancel all queued work and stop the workers. Later submissions fail
    /// with [`EngineError::ShutDown`].
    pub fn shutdown(&mut self) {
        self.shared.queue.lock().shutdown = true;
        self.shared.cancel_where(|_| true);
        self.shared.available.notify_all();

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Render worker exited with a panic");
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(index: usize, shared: &Shared, integrator: &PathIntegrator, mut rng: StdRng) {
    let mut scratch = TileScratch::new();

    while let Some(WorkItem { tile, job }) = shared.next_item() {
        job.mark_in_flight();
        let start = Instant::now();

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            integrator.render_tile(&tile, &job.frame(), &mut scratch, &mut rng);
            job.sink
                .set_pixels(tile.x, tile.y, tile.width, tile.height, scratch.rgb());
        }));

        match result {
            Ok(()) => log::debug!(
                "Worker {} rendered tile {} of job {} in {:.2?}",
                index,
                tile.index,
                job.id,
                start.elapsed()
            ),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                log::error!(
                    "Tile {} of job {} panicked at ({}, {}): {}",
                    tile.index,
                    job.id,
                    tile.x,
                    tile.y,
                    message
                );
                job.failed.fetch_add(1, Ordering::AcqRel);
            }
        }

        job.finish_tiles(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ShadingData;
    use crate::sample_ray::SampleRay;
    use crate::sampling::cosine_hemisphere;
    use crate::{
        Color, DiffuseLight, FrameBuffer, Geometry, ImageBuffer, Lambertian, Light, Material,
        PinholeCamera, PointLight, Scatter, Sphere, SphereLight, TriangleMesh,
    };
    use ivar_math::DVec3;
    use rand::RngCore;
    use std::f64::consts::FRAC_1_PI;

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn simple_scene() -> Arc<Scene> {
        let sphere: Arc<dyn Geometry> = Arc::new(Sphere::new(
            DVec3::new(0.0, 0.0, -3.0),
            1.0,
            Lambertian::new(Color::splat(0.5)),
        ));
        let light: Arc<dyn Light> = Arc::new(PointLight::new(DVec3::new(2.0, 4.0, 0.0), Color::splat(100.0)));
        Arc::new(Scene::new(vec![sphere], vec![light], Color::splat(0.1)).unwrap())
    }

    fn camera() -> Arc<dyn Camera> {
        Arc::new(PinholeCamera::new().with_lens(60.0, 0.0, 1.0))
    }

    fn engine(threads: usize, tile_size: u32) -> Engine {
        init_logger();
        Engine::new(
            EngineConfig::default()
                .with_threads(threads)
                .with_tile_size(tile_size)
                .with_seed(7),
        )
        .unwrap()
    }

    /// Camera that blocks inside `generate_rays` until the gate opens.
    #[derive(Default)]
    struct Gate {
        state: Mutex<(bool, bool)>, // (entered, open)
        signal: Condvar,
    }

    impl Gate {
        fn wait_entered(&self) {
            let mut state = self.state.lock();
            while !state.0 {
                self.signal.wait(&mut state);
            }
        }

        fn open(&self) {
            self.state.lock().1 = true;
            self.signal.notify_all();
        }
    }

    struct GatedCamera {
        gate: Arc<Gate>,
        inner: PinholeCamera,
    }

    impl Camera for GatedCamera {
        fn generate_rays(&self, rays: &mut [SampleRay], width: u32, height: u32, rng: &mut dyn RngCore) {
            {
                let mut state = self.gate.state.lock();
                state.0 = true;
                self.gate.signal.notify_all();
                while !state.1 {
                    self.gate.signal.wait(&mut state);
                }
            }
            self.inner.generate_rays(rays, width, height, rng);
        }
    }

    /// Camera that panics on tiles starting in selected columns.
    struct FaultyCamera {
        period: u32,
    }

    impl Camera for FaultyCamera {
        fn generate_rays(&self, rays: &mut [SampleRay], width: u32, height: u32, rng: &mut dyn RngCore) {
            if rays.iter().any(|r| r.pixel.0 % self.period == 0) {
                panic!("injected tile failure");
            }
            PinholeCamera::new().generate_rays(rays, width, height, rng);
        }
    }

    #[test]
    fn test_render_completes_exactly_once() {
        let engine = engine(4, 8);
        let frame = Arc::new(FrameBuffer::new(40, 40));

        let handle = engine
            .submit(frame.clone(), camera(), simple_scene(), 1, 2)
            .unwrap();
        let summary = handle.wait();

        assert_eq!(summary.state, JobState::Completed);
        assert_eq!(summary.tiles, 25);
        assert_eq!(summary.failed_tiles, 0);
        assert_eq!(handle.remaining_tiles(), 0);
        assert!(handle.is_done());
        assert_eq!(frame.done_count(), 1);
        assert_eq!(frame.blocks_written(), 25);

        // Centre pixel sees the lit sphere, the corner sees the background
        let image = frame.snapshot();
        assert!(image.get(20, 20).x > 0.1);
        assert!((image.get(0, 0) - Color::splat(0.1)).length() < 1e-6);
    }

    #[test]
    fn test_many_tiles_with_failures_complete_once() {
        let engine = engine(8, 4);
        let frame = Arc::new(FrameBuffer::new(64, 64));

        let handle = engine
            .submit(frame.clone(), Arc::new(FaultyCamera { period: 16 }), simple_scene(), 1, 1)
            .unwrap();
        let summary = handle.wait();

        // Tiles whose first column is a multiple of 16 fail
        assert_eq!(summary.tiles, 256);
        assert_eq!(summary.failed_tiles, 64);
        assert_eq!(summary.state, JobState::Completed);
        assert_eq!(frame.blocks_written(), 192);
        assert_eq!(frame.done_count(), 1);

        // Workers survive the panics
        let frame = Arc::new(FrameBuffer::new(8, 8));
        let summary = engine
            .submit(frame.clone(), camera(), simple_scene(), 1, 1)
            .unwrap()
            .wait();
        assert_eq!(summary.failed_tiles, 0);
        assert_eq!(frame.done_count(), 1);
    }

    #[test]
    fn test_cancel_before_start() {
        let engine = engine(1, 8);
        let gate = Arc::new(Gate::default());

        // Occupy the only worker
        let blocker = Arc::new(FrameBuffer::new(4, 4));
        let blocked = engine
            .submit(
                blocker.clone(),
                Arc::new(GatedCamera {
                    gate: gate.clone(),
                    inner: PinholeCamera::new(),
                }),
                simple_scene(),
                1,
                0,
            )
            .unwrap();

        let frame = Arc::new(FrameBuffer::new(32, 32));
        let sink: Arc<dyn ImageSink> = frame.clone();
        let handle = engine
            .submit(sink.clone(), camera(), simple_scene(), 1, 0)
            .unwrap();
        assert_eq!(handle.state(), JobState::Queued);

        assert_eq!(engine.cancel(&sink), 16);
        assert_eq!(engine.cancel(&sink), 0);

        let summary = handle.wait();
        assert_eq!(summary.state, JobState::Cancelled);
        assert_eq!(frame.blocks_written(), 0);
        assert_eq!(frame.done_count(), 1);
        assert_eq!(handle.remaining_tiles(), 0);

        gate.open();
        assert_eq!(blocked.wait().state, JobState::Completed);
        assert_eq!(blocker.done_count(), 1);
    }

    #[test]
    fn test_cancel_mid_flight() {
        let engine = engine(1, 8);
        let gate = Arc::new(Gate::default());
        let frame = Arc::new(FrameBuffer::new(32, 16));

        let handle = engine
            .submit(
                frame.clone(),
                Arc::new(GatedCamera {
                    gate: gate.clone(),
                    inner: PinholeCamera::new(),
                }),
                simple_scene(),
                1,
                0,
            )
            .unwrap();

        // The worker holds the first tile; the remaining seven are queued
        gate.wait_entered();
        assert_eq!(handle.state(), JobState::InFlight);
        assert_eq!(handle.cancel(), 7);
        assert!(!handle.is_done());
        assert_eq!(handle.remaining_tiles(), 1);

        gate.open();
        let summary = handle.wait();
        assert_eq!(summary.state, JobState::Cancelled);
        assert_eq!(frame.blocks_written(), 1);
        assert_eq!(frame.done_count(), 1);

        // Nothing left to cancel and no second completion
        assert_eq!(handle.cancel(), 0);
        assert_eq!(frame.done_count(), 1);
    }

    #[test]
    fn test_invalid_sample_rate() {
        let engine = engine(1, 8);
        let frame = Arc::new(FrameBuffer::new(8, 8));
        let result = engine.submit(frame.clone(), camera(), simple_scene(), 0, 4);

        assert_eq!(result.err(), Some(EngineError::InvalidSampleRate));

        // The per-pixel sample count would not fit in a u32
        for sample_rate in [65_536, u32::MAX] {
            let result = engine.submit(frame.clone(), camera(), simple_scene(), sample_rate, 4);
            assert_eq!(result.err(), Some(EngineError::InvalidSampleRate));
        }
        assert_eq!(frame.done_count(), 0);
    }

    #[test]
    fn test_wait_timeout() {
        let engine = engine(1, 8);
        let gate = Arc::new(Gate::default());
        let frame = Arc::new(FrameBuffer::new(8, 8));

        let handle = engine
            .submit(
                frame.clone(),
                Arc::new(GatedCamera {
                    gate: gate.clone(),
                    inner: PinholeCamera::new(),
                }),
                simple_scene(),
                1,
                0,
            )
            .unwrap();

        gate.wait_entered();
        assert_eq!(handle.wait_timeout(Duration::from_millis(20)), None);
        assert!(!handle.is_done());

        gate.open();
        let summary = handle.wait_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(summary.state, JobState::Completed);
        assert_eq!(summary.tiles, 1);
        assert_eq!(frame.done_count(), 1);
    }

    /// Sink that panics when told the job is done.
    struct FailingDoneSink;

    impl ImageSink for FailingDoneSink {
        fn resolution(&self) -> (u32, u32) {
            (8, 8)
        }

        fn set_pixels(&self, _x: u32, _y: u32, _width: u32, _height: u32, _pixels: &[f32]) {}

        fn imaging_done(&self) {
            panic!("injected imaging_done failure");
        }
    }

    #[test]
    fn test_panicking_imaging_done_keeps_worker() {
        let engine = engine(1, 4);

        let failing = engine
            .submit(Arc::new(FailingDoneSink), camera(), simple_scene(), 1, 0)
            .unwrap();
        let summary = failing.wait_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(summary.state, JobState::Completed);
        assert!(failing.is_done());

        // The only worker is still serving jobs
        let frame = Arc::new(FrameBuffer::new(8, 8));
        let healthy = engine
            .submit(frame.clone(), camera(), simple_scene(), 1, 0)
            .unwrap();
        let summary = healthy.wait_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(summary.state, JobState::Completed);
        assert_eq!(frame.blocks_written(), 4);
        assert_eq!(frame.done_count(), 1);
    }

    #[test]
    fn test_empty_image_completes_immediately() {
        let engine = engine(1, 8);
        let frame = Arc::new(FrameBuffer::new(0, 8));
        let handle = engine.submit(frame.clone(), camera(), simple_scene(), 1, 1).unwrap();

        assert!(handle.is_done());
        assert_eq!(handle.wait().tiles, 0);
        assert_eq!(frame.done_count(), 1);
    }

    #[test]
    fn test_shutdown_rejects_and_completes_queued() {
        let mut engine = engine(1, 8);
        let gate = Arc::new(Gate::default());
        let frame = Arc::new(FrameBuffer::new(32, 32));

        let handle = engine
            .submit(
                frame.clone(),
                Arc::new(GatedCamera {
                    gate: gate.clone(),
                    inner: PinholeCamera::new(),
                }),
                simple_scene(),
                1,
                0,
            )
            .unwrap();
        gate.wait_entered();

        // Shutdown joins the busy worker, so let it finish in the background
        let opener = {
            let gate = gate.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                gate.open();
            })
        };
        engine.shutdown();
        opener.join().unwrap();

        assert_eq!(handle.wait().state, JobState::Cancelled);
        assert_eq!(frame.done_count(), 1);
        assert_eq!(frame.blocks_written(), 1);

        let result = engine.submit(frame.clone(), camera(), simple_scene(), 1, 0);
        assert!(matches!(result, Err(EngineError::ShutDown)));
    }

    /// Diffuse surface that also emits, for closed-form furnace tests.
    struct Glow {
        albedo: f64,
        emit: f64,
    }

    impl Material for Glow {
        fn is_diffuse(&self) -> bool {
            true
        }

        fn emission(&self, _direction: DVec3, _shading: &ShadingData<'_>) -> Color {
            Color::splat(self.emit)
        }

        fn brdf(&self, _wo: DVec3, _wi: DVec3, _shading: &ShadingData<'_>) -> Color {
            Color::splat(self.albedo * FRAC_1_PI)
        }

        fn sample_scatter(
            &self,
            rng: &mut dyn RngCore,
            _incoming: DVec3,
            shading: &ShadingData<'_>,
        ) -> Option<Scatter> {
            let direction = cosine_hemisphere(rng, shading.normal);
            Some(Scatter {
                direction,
                weight: Color::splat(self.albedo),
                pdf: direction.dot(shading.normal) * FRAC_1_PI,
                specular: false,
                extinction: None,
            })
        }
    }

    #[test]
    fn test_furnace_mean_independent_of_worker_count() {
        // Inside a closed box emitting E with albedo a, radiance after D
        // bounces is E * (1 + a + ... + a^D)
        let (albedo, emit, depth) = (0.5f64, 0.5f64, 16);
        let expected = emit * (1.0 - albedo.powi(depth + 1)) / (1.0 - albedo);

        let walls: Arc<dyn Geometry> = Arc::new(TriangleMesh::axis_box(
            DVec3::splat(-1.0),
            DVec3::splat(1.0),
            Glow { albedo, emit },
        ));
        let scene = Arc::new(Scene::new(vec![walls], Vec::new(), Color::splat(expected)).unwrap());
        let camera: Arc<dyn Camera> = Arc::new(PinholeCamera::new());

        let mut means = Vec::new();
        for threads in [1, 4] {
            let engine = engine(threads, 4);
            let frame = Arc::new(FrameBuffer::new(16, 16));
            engine
                .submit(frame.clone(), camera.clone(), scene.clone(), 2, depth as u32)
                .unwrap()
                .wait();

            let mean = frame.snapshot().mean();
            assert!((mean.x - expected).abs() < 0.05, "{threads} workers: {mean:?} vs {expected}");
            means.push(mean.x);
        }
        assert!((means[0] - means[1]).abs() < 0.05);
    }

    const BOX_ALBEDO: f64 = 0.7;
    const BULB_RADIANCE: f64 = 5.0;

    /// White room lit by a small emissive ball, seen from inside.
    fn lit_room() -> (Arc<Scene>, Arc<dyn Camera>) {
        let walls: Arc<dyn Geometry> = Arc::new(TriangleMesh::axis_box(
            DVec3::splat(-1.0),
            DVec3::splat(1.0),
            Lambertian::new(Color::splat(BOX_ALBEDO)),
        ));
        let center = DVec3::new(0.0, 0.5, 0.0);
        let radius = 0.2;
        let radiance = Color::splat(BULB_RADIANCE);
        let bulb: Arc<dyn Geometry> = Arc::new(Sphere::new(center, radius, DiffuseLight::new(radiance)));
        let light: Arc<dyn Light> = Arc::new(SphereLight::new(center, radius, radiance));

        let scene = Scene::new(vec![walls, bulb], vec![light], Color::ZERO).unwrap();
        let camera = PinholeCamera::new().with_position(
            DVec3::new(0.0, -0.4, 0.9),
            DVec3::new(0.0, 0.2, -1.0),
            DVec3::Y,
        );
        (Arc::new(scene), Arc::new(camera))
    }

    fn render_lit_room(threads: usize, seed: u64, sample_rate: u32) -> ImageBuffer {
        init_logger();
        let engine = Engine::new(
            EngineConfig::default()
                .with_threads(threads)
                .with_tile_size(4)
                .with_seed(seed),
        )
        .unwrap();
        let (scene, camera) = lit_room();
        let frame = Arc::new(FrameBuffer::new(32, 32));
        let summary = engine
            .submit(frame.clone(), camera, scene, sample_rate, 6)
            .unwrap()
            .wait();
        assert_eq!(summary.state, JobState::Completed);
        frame.snapshot()
    }

    #[test]
    fn test_enclosed_room_energy_bounds() {
        // Each bounce keeps at most the albedo, so no pixel can average more
        // than the emitted radiance times 1 / (1 - albedo)
        let bound = BULB_RADIANCE / (1.0 - BOX_ALBEDO);

        let means: Vec<f64> = [1, 4]
            .into_iter()
            .map(|threads| render_lit_room(threads, 3, 4).mean().x)
            .collect();
        for mean in &means {
            assert!(*mean > 0.0 && *mean < bound, "mean {mean} outside (0, {bound})");
        }
        assert!(
            (means[0] - means[1]).abs() < 0.1 * means[0],
            "1 worker: {}, 4 workers: {}",
            means[0],
            means[1]
        );

        // Half the mean squared difference of two independent renders
        // estimates the per-pixel variance
        let variance = |sample_rate: u32| {
            let a = render_lit_room(2, 11, sample_rate);
            let b = render_lit_room(2, 23, sample_rate);
            let total: f64 = a
                .pixels
                .iter()
                .zip(&b.pixels)
                .map(|(p, q)| (*p - *q).length_squared())
                .sum();
            total / (2.0 * a.pixels.len() as f64)
        };
        let coarse = variance(1);
        let fine = variance(4);
        assert!(fine < coarse, "variance at rate 4: {fine}, at rate 1: {coarse}");
    }

    #[test]
    fn test_drop_completes_queued_jobs() {
        let frame = Arc::new(FrameBuffer::new(64, 64));
        let handle = {
            let engine = engine(1, 4);
            engine
                .submit(frame.clone(), camera(), simple_scene(), 1, 1)
                .unwrap()
        };

        // Either every tile made it before shutdown or the rest was cancelled
        let summary = handle.wait();
        assert!(summary.state.is_terminal());
        assert_eq!(frame.done_count(), 1);
        assert_eq!(handle.remaining_tiles(), 0);
        match summary.state {
            JobState::Completed => assert_eq!(frame.blocks_written(), 256),
            _ => assert!(frame.blocks_written() < 256),
        }
    }
}
