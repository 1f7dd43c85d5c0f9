use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStderr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use tracing::{debug, error, info};

use osprey_types::{FatalReason, ShutdownFlag};

use crate::process::terminate;

/// No stderr output for this long (after the startup grace) means the
/// encoder is wedged.
const OUTPUT_STALL: Duration = Duration::from_secs(5);
/// Startup grace before the output watchdog arms.
const STARTUP_GRACE: Duration = Duration::from_secs(10);
/// The parsed `frame=N` counter must advance at least this often.
const PROGRESS_STALL: Duration = Duration::from_millis(6700);
/// How much recent encoder output to keep for crash dumps.
const RING_CAPACITY: usize = 100;
/// Cadence of the watchdog checks.
const CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Pull the frame counter out of an encoder progress line like
/// `frame=  123 fps= 30 q=28.0 size=...`.
pub fn parse_frame_counter(line: &str) -> Option<u64> {
    let rest = line.split("frame=").nth(1)?;
    let token = rest.split_whitespace().next()?;
    token.parse().ok()
}

/// Watches the encoder subprocess: output stall, frame-progress stall, and
/// liveness. On any unhealthy verdict it dumps the recent output ring,
/// requests fatal shutdown, and terminates the subprocess.
///
/// `stand_down` is raised by the writer when the encoder is being closed on
/// purpose, so the monitor does not mistake a normal exit for a crash.
pub fn spawn_health_monitor(
    stderr: ChildStderr,
    child: Arc<Mutex<Child>>,
    shutdown: ShutdownFlag,
    stand_down: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    let (line_tx, line_rx) = crossbeam_channel::unbounded::<String>();

    // Dedicated tail thread: a blocking read is the only way to follow the
    // pipe, and it must not stall the watchdog cadence.
    std::thread::Builder::new()
        .name("encoder-stderr-tail".into())
        .spawn(move || {
            let reader = BufReader::new(stderr);
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if line_tx.send(line).is_err() {
                            return;
                        }
                    }
                    Err(_) => return,
                }
            }
        })
        .expect("spawn stderr tail");

    std::thread::Builder::new()
        .name("encoder-health".into())
        .spawn(move || {
            let started = Instant::now();
            let mut ring: VecDeque<String> = VecDeque::with_capacity(RING_CAPACITY);
            let mut last_output = Instant::now();
            let mut last_frame: Option<u64> = None;
            let mut last_progress = Instant::now();

            let unhealthy = loop {
                if shutdown.is_set() || stand_down.load(Ordering::SeqCst) {
                    debug!("health monitor standing down");
                    return;
                }

                match line_rx.recv_timeout(CHECK_INTERVAL) {
                    Ok(line) => {
                        last_output = Instant::now();
                        if let Some(n) = parse_frame_counter(&line) {
                            if Some(n) != last_frame {
                                last_frame = Some(n);
                                last_progress = Instant::now();
                            }
                        }
                        if ring.len() == RING_CAPACITY {
                            ring.pop_front();
                        }
                        ring.push_back(line);
                        continue;
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        // Pipe closed: the encoder is gone or going.
                    }
                }

                // Liveness.
                {
                    let mut guard = child.lock().expect("child lock");
                    if let Ok(Some(status)) = guard.try_wait() {
                        if stand_down.load(Ordering::SeqCst) {
                            return;
                        }
                        break format!("encoder exited unexpectedly ({status})");
                    }
                }

                let now = Instant::now();
                if now.duration_since(started) > STARTUP_GRACE {
                    if now.duration_since(last_output) > OUTPUT_STALL {
                        break "encoder output stalled".to_string();
                    }
                    if last_frame.is_some() && now.duration_since(last_progress) > PROGRESS_STALL
                    {
                        break "encoder frame counter stopped advancing".to_string();
                    }
                }
            };

            error!("encoder unhealthy: {unhealthy}");
            info!("last {} encoder output lines follow", ring.len());
            for line in &ring {
                error!(target: "encoder", "{line}");
            }
            shutdown.request_fatal(FatalReason::EncoderFailure(unhealthy));
            terminate(&child);
        })
        .expect("spawn health monitor")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ffmpeg_progress_lines() {
        assert_eq!(
            parse_frame_counter("frame=  123 fps= 30 q=28.0 size=    1024KiB"),
            Some(123)
        );
        assert_eq!(parse_frame_counter("frame=7 fps=0.0"), Some(7));
        assert_eq!(parse_frame_counter("[libx264] started"), None);
        assert_eq!(parse_frame_counter("frame= abc"), None);
    }
}
