use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use lumen_core::FrameProcessor;
use tracing::{debug, error, info, warn};

use crate::{CaptureError, FramePool, FrameSource, Pacing};

const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Runs the capture schedule on its own thread: pull a frame from the source, process it, release it.
///
/// Frame buffers are released after every frame, whatever the outcome of processing it.
pub struct CaptureWorker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureWorker {
    pub fn spawn<S: FrameSource + 'static>(
        source: S,
        pool: FramePool,
        processor: FrameProcessor,
        pacing: Pacing,
    ) -> Result<Self, CaptureError> {
        let stop = Arc::new(AtomicBool::new(false));

        let handle = thread::Builder::new()
            .name("lumen-capture".to_string())
            .spawn({
                let stop = stop.clone();
                move || capture_loop(source, pool, processor, pacing, &stop)
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// `false` once the source has ended or failed.
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops the schedule and waits for the frame in progress to be finished.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        self.stop.store(true, Ordering::Relaxed);
        // cut a pacing sleep short
        handle.thread().unpark();

        if handle.join().is_err() {
            error!("Capture thread panicked");
        } else {
            debug!("Capture thread stopped");
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn capture_loop<S: FrameSource>(
    mut source: S,
    pool: FramePool,
    mut processor: FrameProcessor,
    pacing: Pacing,
    stop: &AtomicBool,
) {
    let size = source.frame_size();
    info!(
        "Capturing from {} ({}x{}, {} buffers, {:?}), extractor: {}",
        source.name(),
        size.width,
        size.height,
        pool.capacity(),
        pacing,
        processor.extractor_name()
    );

    let mut deadline = Instant::now();
    let mut last_stats = Instant::now();
    let mut dropped = 0u64;

    while !stop.load(Ordering::Relaxed) {
        match source.next_frame(&pool) {
            Ok(Some(lease)) => {
                if let Err(e) = processor.process(&lease.raw_frame()) {
                    dropped += 1;
                    warn!("Dropping frame {}: {}", lease.sequence(), e);
                }
            }
            Ok(None) => {
                info!("{} has no more frames", source.name());
                break;
            }
            Err(e @ CaptureError::ResourceExhaustion { .. }) => {
                dropped += 1;
                error!("Skipping a frame: {}", e);
            }
            Err(e) => {
                error!("Capture from {} failed: {}", source.name(), e);
                break;
            }
        }

        if last_stats.elapsed() >= STATS_INTERVAL {
            let stats = processor.shared().relay.stats();
            debug!(
                "Relay: {} published, {} replaced, {} taken; {} frames dropped; {:.1} fps",
                stats.published,
                stats.replaced,
                stats.taken,
                dropped,
                processor.shared().fps.read()
            );
            last_stats = Instant::now();
        }

        if let Some(interval) = pacing.interval() {
            deadline += interval;
            let now = Instant::now();
            if deadline > now {
                // woken up early by `stop`, or spuriously; either way the loop condition is checked again
                thread::park_timeout(deadline - now);
            } else {
                // fell behind, do not try to catch up with a burst
                deadline = now;
            }
        }
    }
}
