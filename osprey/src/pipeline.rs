use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use tracing::{info, warn};

use encoder_writer::EncoderWriter;
use osprey_detect::{DetectionStage, LockContext};
use osprey_tracker::{compose_overlay, BoxRenderer, OverlayRenderer, SpatialTracker, TickInput};
use osprey_types::{FatalReason, PipelineConfig, RawFrame, ShutdownFlag};
use ptz_isapi::PtzHandle;

/// How often the FPS reporter looks at the counters.
const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Fill-level policy for the capture queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueAction {
    Normal,
    /// Between 50% and 80% full: log and carry on.
    Warn,
    /// Over 80% full: drain everything and resynchronize to the newest
    /// frame. Latency beats completeness.
    Drain,
}

pub fn queue_action(len: usize, capacity: usize) -> QueueAction {
    if len * 10 > capacity * 8 {
        QueueAction::Drain
    } else if len * 10 > capacity * 5 {
        QueueAction::Warn
    } else {
        QueueAction::Normal
    }
}

/// Shared stage counters for the stall watchdog.
#[derive(Debug, Default)]
pub struct StageCounters {
    pub processed: AtomicU64,
    pub written: AtomicU64,
}

/// Watches frame progress across the whole pipeline. Both counters frozen
/// for one full report interval means nothing flows and nothing writes:
/// fatal, exit code 2.
pub fn spawn_fps_reporter(
    counters: Arc<StageCounters>,
    shutdown: ShutdownFlag,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("fps-reporter".into())
        .spawn(move || {
            // Skip the first interval: startup is legitimately slow.
            let mut armed = false;
            loop {
                std::thread::sleep(REPORT_INTERVAL);
                if shutdown.is_set() {
                    return;
                }
                let processed = counters.processed.swap(0, Ordering::Relaxed);
                let written = counters.written.swap(0, Ordering::Relaxed);
                let secs = REPORT_INTERVAL.as_secs_f64();
                info!(
                    process_fps = format!("{:.1}", processed as f64 / secs).as_str(),
                    write_fps = format!("{:.1}", written as f64 / secs).as_str(),
                    "pipeline rate"
                );
                if armed && processed == 0 && written == 0 {
                    shutdown.request_fatal(FatalReason::PipelineStall);
                    return;
                }
                armed = true;
            }
        })
        .expect("spawn fps reporter")
}

/// Everything the process thread owns.
pub struct ProcessStage {
    pub rx: Receiver<RawFrame>,
    pub detection: DetectionStage,
    pub tracker: SpatialTracker,
    pub ptz: PtzHandle,
    pub writer: EncoderWriter,
    pub renderer: BoxRenderer,
    pub pipeline_cfg: PipelineConfig,
    pub counters: Arc<StageCounters>,
    pub shutdown: ShutdownFlag,
}

impl ProcessStage {
    pub fn spawn(self) -> std::thread::JoinHandle<()> {
        std::thread::Builder::new()
            .name("process".into())
            .spawn(move || self.run())
            .expect("spawn process thread")
    }

    /// The detect -> track -> overlay -> encode loop.
    fn run(mut self) {
        let capacity = self.pipeline_cfg.queue_capacity;
        loop {
            if self.shutdown.is_set() {
                break;
            }
            let mut frame = match self.rx.recv_timeout(Duration::from_millis(250)) {
                Ok(f) => f,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
            };

            match queue_action(self.rx.len(), capacity) {
                QueueAction::Normal => {}
                QueueAction::Warn => {
                    warn!(
                        backlog = self.rx.len(),
                        "capture queue filling, processing is behind"
                    );
                }
                QueueAction::Drain => {
                    let mut skipped = 0u64;
                    while let Ok(newer) = self.rx.try_recv() {
                        skipped += 1;
                        frame = newer;
                    }
                    warn!(skipped, resume_seq = frame.seq, "queue drained, jumped to real time");
                }
            }

            if let Err(e) = self.process_one(&mut frame) {
                self.shutdown
                    .request_fatal(FatalReason::Invariant(e.to_string()));
                break;
            }

            match self.writer.write(frame) {
                Ok(()) => {
                    self.counters.written.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    // The writer already requested fatal shutdown for real
                    // encoder failures; anything else lands here.
                    warn!("encoder write failed: {e}");
                    break;
                }
            }
            self.counters.processed.fetch_add(1, Ordering::Relaxed);
        }

        // Bounded drain, then release the encoder.
        if let Err(e) = self.writer.finish() {
            warn!("encoder finish failed: {e}");
        }
        info!("process thread done");
    }

    fn process_one(&mut self, frame: &mut RawFrame) -> osprey_tracker::Result<()> {
        let lock_ctx = LockContext {
            locked_boxes: self.tracker.locked_boxes(),
        };
        let detections = self.detection.process(frame, &lock_ctx);

        let outcome = self.tracker.tick(TickInput {
            seq: frame.seq,
            stamp: frame.stamp,
            frame_dims: (frame.width(), frame.height()),
            detections: &detections,
            camera: self.ptz.motion(),
            current_pose: self.ptz.current_pose(),
        })?;

        if let Some(cmd) = outcome.command {
            self.ptz.submit(cmd);
        }

        if outcome.first_lock {
            info!(
                target = outcome.snapshot.target_id.as_deref().unwrap_or("-"),
                "first target locked"
            );
            // Debug-dump hook: the full tracker state at the moment of the
            // first lock, for offline analysis.
            if let Ok(json) = serde_json::to_string(&outcome.snapshot) {
                tracing::debug!(snapshot = %json, "lock snapshot");
            }
            if self.pipeline_cfg.exit_on_first_track {
                self.shutdown.request();
            }
        }

        let plan = compose_overlay(&outcome.snapshot);
        self.renderer.render(&plan, frame);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_thresholds() {
        // Capacity 120: drain strictly above 96, warn strictly above 60.
        assert_eq!(queue_action(0, 120), QueueAction::Normal);
        assert_eq!(queue_action(60, 120), QueueAction::Normal);
        assert_eq!(queue_action(61, 120), QueueAction::Warn);
        assert_eq!(queue_action(96, 120), QueueAction::Warn);
        assert_eq!(queue_action(97, 120), QueueAction::Drain);
        assert_eq!(queue_action(120, 120), QueueAction::Drain);
    }

    #[test]
    fn drain_keeps_latest_frame() {
        use osprey_types::FramePool;
        use std::time::Instant;

        // The drain loop itself: fill a queue, drain, the survivor is the
        // newest sequence.
        let (tx, rx) = crossbeam_channel::bounded(120);
        let pool = FramePool::new(100, 4 * 2 * 3);
        for seq in 1..=100u64 {
            let frame = RawFrame::new(seq, Instant::now(), 4, 2, pool.take().unwrap());
            tx.send(frame).unwrap();
        }
        let mut frame = rx.recv().unwrap();
        assert_eq!(queue_action(rx.len(), 120), QueueAction::Drain);
        while let Ok(newer) = rx.try_recv() {
            frame = newer;
        }
        assert_eq!(frame.seq, 100);
        assert_eq!(rx.len(), 0);
    }
}
