mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use dpi::PhysicalSize;
use lumen_capture::{CaptureWorker, FramePool, FrameSource, Pacing, TestPatternSource, Y4mSource};
use lumen_core::{EdgeExtractor, FrameProcessor, SharedState};
use lumen_window::PreviewParams;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, DEFAULT_PATTERN_FRAME_RATE, SourceKind, window_size};

struct Capture {
    worker: CaptureWorker,
    frame_size: PhysicalSize<u32>,
    effect_name: String,
}

fn start_capture<S: FrameSource + 'static>(
    source: S,
    pacing: Pacing,
    cli: &Cli,
    shared: &SharedState,
) -> Result<Capture> {
    let frame_size = source.frame_size();
    let extractor = EdgeExtractor::new(cli.pipeline_config().edge_thresholds);
    let processor = FrameProcessor::new(shared.clone(), Box::new(extractor));
    let effect_name = processor.extractor_name().to_string();

    let worker = CaptureWorker::spawn(source, FramePool::new(cli.pool_size), processor, pacing)
        .context("Starting the capture thread")?;

    Ok(Capture {
        worker,
        frame_size,
        effect_name,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .compact()
        .init();

    let cli = Cli::parse();
    let shared = SharedState::new(&cli.pipeline_config());

    let Capture {
        worker,
        frame_size,
        effect_name,
    } = match cli.source {
        SourceKind::Pattern => {
            let source = TestPatternSource::new(cli.pattern_size(), cli.row_padding);
            let pacing = Pacing::frame_rate(cli.frame_rate.unwrap_or(DEFAULT_PATTERN_FRAME_RATE));
            start_capture(source, pacing, &cli, &shared)?
        }
        SourceKind::Y4m => {
            let path = cli
                .input
                .as_ref()
                .context("--source y4m needs an --input file")?;
            let source = Y4mSource::open(path)
                .with_context(|| format!("Opening {}", path.display()))?;
            let pacing = match cli.frame_rate {
                Some(frame_rate) => Pacing::frame_rate(frame_rate),
                None => source
                    .header()
                    .frame_rate
                    .as_f64()
                    .map_or(Pacing::Unpaced, Pacing::fps),
            };
            start_capture(source, pacing, &cli, &shared)?
        }
    };

    let params = PreviewParams {
        shared: shared.clone(),
        effect_name,
        orientation: cli.orientation(),
        window_size: window_size(frame_size, cli.orientation()),
    };

    // the render stage is dropped only after this has run
    let relay = shared.relay.clone();
    let on_exit = move || {
        worker.stop();
        if relay.clear() {
            info!("Discarded a frame that was never displayed");
        }
        let stats = relay.stats();
        info!(
            "Published {} frames, {} displayed, {} replaced before display",
            stats.published, stats.taken, stats.replaced
        );
    };

    lumen_window::run_window(params, on_exit)
}
