//! ivar - render built-in scenes with the Ivar path tracer.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ivar_renderer::{Engine, FrameBuffer, ImageSink, JobState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

mod scenes;
mod settings;

use scenes::SceneKind;
use settings::RenderSettings;

#[derive(Parser)]
#[command(name = "ivar")]
#[command(about = "Offline CPU path tracer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a built-in scene to a PNG file
    Render {
        /// Scene to render
        #[arg(short, long, value_enum, default_value_t = SceneKind::Cornell)]
        scene: SceneKind,
        /// JSON settings file; flags below override its fields
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        width: Option<u32>,
        #[arg(long)]
        height: Option<u32>,
        /// Samples per pixel along each axis
        #[arg(long)]
        samples: Option<u32>,
        /// Maximum bounce depth
        #[arg(long)]
        depth: Option<u32>,
        /// Worker threads (default: all cores)
        #[arg(long)]
        threads: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        /// Output PNG file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Print the default render settings as JSON
    Settings,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            scene,
            config,
            width,
            height,
            samples,
            depth,
            threads,
            seed,
            output,
        } => {
            let mut settings = match config {
                Some(path) => RenderSettings::load(&path)?,
                None => RenderSettings::default(),
            };
            settings.width = width.unwrap_or(settings.width);
            settings.height = height.unwrap_or(settings.height);
            settings.sample_rate = samples.unwrap_or(settings.sample_rate);
            settings.max_depth = depth.unwrap_or(settings.max_depth);
            settings.threads = threads.or(settings.threads);
            settings.seed = seed.or(settings.seed);

            render(scene, &settings, &output)?;
        }
        Commands::Settings => {
            println!("{}", RenderSettings::default().to_json()?);
        }
    }

    Ok(())
}

fn render(kind: SceneKind, settings: &RenderSettings, output: &Path) -> Result<()> {
    let start = Instant::now();
    let (scene, camera) = scenes::build(kind)?;
    log::info!("Scene {:?} built in {:.2?}", kind, start.elapsed());

    let engine = Engine::new(settings.engine_config())?;
    let frame = Arc::new(FrameBuffer::new(settings.width, settings.height));
    let sink: Arc<dyn ImageSink> = frame.clone();

    let start = Instant::now();
    let handle = engine.submit(sink, camera, scene, settings.sample_rate, settings.max_depth)?;
    let summary = handle.wait();
    log::info!(
        "Rendered {}x{} @ {} spp in {:.2?}",
        settings.width,
        settings.height,
        u64::from(settings.sample_rate).pow(2),
        start.elapsed()
    );

    if summary.failed_tiles > 0 {
        log::warn!("{} of {} tiles failed", summary.failed_tiles, summary.tiles);
    }
    if summary.state != JobState::Completed {
        anyhow::bail!("Render finished in state {:?}", summary.state);
    }

    let image = frame.snapshot();
    image::RgbaImage::from_raw(image.width, image.height, image.to_rgba())
        .context("Image buffer size mismatch")?
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    log::info!("Saved to {}", output.display());

    Ok(())
}
