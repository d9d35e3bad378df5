//! Thin driver: loads a configuration document, feeds frames from an image
//! directory through the pipeline and logs what comes out.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use motion_regions::config::CoreConfig;
use motion_regions::core::Frame;
use motion_regions::imgcodecs::imread;
use motion_regions::motion::{ConsolidatedRegion, MotionPipeline};
use motion_regions::sink::{FrameMetadata, FrameSink, TrackingUpdate};

#[derive(Parser, Debug)]
#[command(name = "motion-regions", about = "Motion detection and region consolidation")]
struct Args {
    /// Path to the YAML configuration document
    #[arg(long, short, default_value = "config.yaml")]
    config: PathBuf,

    /// Directory of frame images, processed in sorted order
    #[arg(long, short)]
    source: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long)]
    limit: Option<usize>,
}

/// Sink that reports pipeline output through the logger
#[derive(Default)]
struct LoggingSink {
    tracking_records: u64,
    lost_objects: u64,
}

impl FrameSink for LoggingSink {
    fn on_tracking_data(&mut self, update: &TrackingUpdate<'_>) {
        self.tracking_records += 1;
        info!(
            id = update.tracker_id,
            uuid = update.uuid,
            bounds = ?update.bounds,
            confidence = update.confidence,
            "Tracking data"
        );
    }

    fn on_object_lost(&mut self, tracker_id: u64) {
        self.lost_objects += 1;
        info!(id = tracker_id, "Object lost");
    }

    fn on_frame_artifacts(
        &mut self,
        _original: &Frame,
        _annotated: &Frame,
        regions: &[ConsolidatedRegion],
        metadata: &FrameMetadata,
    ) {
        if metadata.has_motion {
            info!(
                frame = metadata.frame_index,
                trackers = metadata.tracker_count,
                regions = regions.len(),
                "Motion"
            );
        }
    }
}

fn init_logging(config: &CoreConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.log_level.clone()));
    tracing_subscriber::registry()
        .with(fmt::layer().compact())
        .with(filter)
        .init();
}

fn frame_paths(dir: &PathBuf) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Cannot read source directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("png" | "jpg" | "jpeg" | "bmp" | "tiff")
            )
        })
        .collect();
    paths.sort();
    Ok(paths)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = CoreConfig::from_yaml_file(&args.config)
        .with_context(|| format!("Failed to load configuration {}", args.config.display()))?;
    init_logging(&config);
    info!("Configuration loaded from {}", args.config.display());

    let mut pipeline = MotionPipeline::new(&config)
        .context("Failed to construct pipeline")?
        .with_sink(Box::new(LoggingSink::default()));

    let Some(source) = args.source else {
        info!("No frame source given; nothing to do");
        return Ok(());
    };

    let paths = frame_paths(&source)?;
    if paths.is_empty() {
        warn!("No frames found in {}", source.display());
        return Ok(());
    }

    let limit = args.limit.unwrap_or(usize::MAX);
    let mut processed = 0usize;
    let mut motion_frames = 0usize;

    for path in paths.iter().take(limit) {
        let frame = match imread(path) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Skipping {}: {e}", path.display());
                continue;
            }
        };

        let output = pipeline.process(&frame);
        processed += 1;
        if output.processing.has_motion {
            motion_frames += 1;
        }
    }

    info!(
        processed,
        motion_frames,
        live_trackers = pipeline.tracker().tracked().len(),
        regions = pipeline.regions().len(),
        "Run complete"
    );

    Ok(())
}
