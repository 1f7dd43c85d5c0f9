use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use eyre::{eyre, Result, WrapErr};
use tracing::{debug, info, warn};

use osprey_types::{FramePool, RawFrame, ShutdownFlag};

/// Backoff between capture subprocess respawns.
const RESPAWN_BACKOFF: Duration = Duration::from_secs(2);

/// Ask ffprobe for the negotiated stream resolution. Dimensions are
/// discovered once at startup, before any worker spawns.
pub fn probe_dimensions(rtsp_url: &str) -> Result<(u32, u32)> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-rtsp_transport",
            "tcp",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
            rtsp_url,
        ])
        .output()
        .wrap_err("running ffprobe")?;
    if !output.status.success() {
        return Err(eyre!(
            "ffprobe failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    let text = String::from_utf8_lossy(&output.stdout);
    parse_dimensions(text.trim())
}

fn parse_dimensions(text: &str) -> Result<(u32, u32)> {
    let mut parts = text.split('x');
    let width: u32 = parts
        .next()
        .and_then(|p| p.trim().parse().ok())
        .ok_or_else(|| eyre!("unparseable ffprobe output: {text:?}"))?;
    let height: u32 = parts
        .next()
        .and_then(|p| p.trim().parse().ok())
        .ok_or_else(|| eyre!("unparseable ffprobe output: {text:?}"))?;
    if width == 0 || height == 0 {
        return Err(eyre!("degenerate stream dimensions {width}x{height}"));
    }
    Ok((width, height))
}

fn spawn_ffmpeg(rtsp_url: &str) -> std::io::Result<Child> {
    Command::new("ffmpeg")
        .args([
            "-hide_banner",
            "-loglevel",
            "warning",
            "-rtsp_transport",
            "tcp",
            "-i",
            rtsp_url,
            "-an",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "bgr24",
            "-",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
}

/// The capture thread: reads `W*H*3`-byte records from an ffmpeg subprocess
/// decoding the RTSP stream, assigns monotonic sequence numbers, and pushes
/// into the bounded capture queue.
///
/// Transient read failures respawn the subprocess and never propagate. When
/// the queue is full or the pool is exhausted the frame is dropped; the
/// sequence still advances, so downstream sees the gap.
pub fn spawn_capture(
    rtsp_url: String,
    dims: (u32, u32),
    pool: FramePool,
    tx: Sender<RawFrame>,
    shutdown: ShutdownFlag,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("capture".into())
        .spawn(move || capture_main(&rtsp_url, dims, pool, tx, shutdown))
        .expect("spawn capture thread")
}

fn capture_main(
    rtsp_url: &str,
    (width, height): (u32, u32),
    pool: FramePool,
    tx: Sender<RawFrame>,
    shutdown: ShutdownFlag,
) {
    let frame_len = width as usize * height as usize * 3;
    let mut seq: u64 = 0;
    let mut dropped: u64 = 0;
    // Scratch buffer keeps the pipe draining when no pool slot is free.
    let mut scratch = vec![0u8; frame_len];

    'respawn: loop {
        if shutdown.is_set() {
            return;
        }
        let mut child = match spawn_ffmpeg(rtsp_url) {
            Ok(c) => c,
            Err(e) => {
                warn!("capture subprocess failed to spawn: {e}");
                std::thread::sleep(RESPAWN_BACKOFF);
                continue;
            }
        };
        let mut stdout = child.stdout.take().expect("stdout was piped");
        info!(width, height, "capture stream open");

        loop {
            if shutdown.is_set() {
                let _ = child.kill();
                let _ = child.wait();
                return;
            }

            let mut buf = pool.take();
            let target: &mut [u8] = match &mut buf {
                Some(b) => b.as_mut_slice(),
                None => scratch.as_mut_slice(),
            };

            if let Err(e) = stdout.read_exact(target) {
                warn!("capture read failed ({e}), reopening stream");
                let _ = child.kill();
                let _ = child.wait();
                std::thread::sleep(RESPAWN_BACKOFF);
                continue 'respawn;
            }

            seq += 1;
            let Some(buf) = buf else {
                dropped += 1;
                if dropped % 30 == 1 {
                    warn!(dropped, "frame pool exhausted, dropping");
                }
                continue;
            };

            let frame = RawFrame::new(seq, Instant::now(), width, height, buf);
            match tx.try_send(frame) {
                Ok(()) => {}
                Err(crossbeam_channel::TrySendError::Full(_)) => {
                    dropped += 1;
                    debug!(seq, "capture queue full, dropping frame");
                }
                Err(crossbeam_channel::TrySendError::Disconnected(_)) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_parsing() {
        assert_eq!(parse_dimensions("2688x1520").unwrap(), (2688, 1520));
        assert_eq!(parse_dimensions("1280x720\n").unwrap(), (1280, 720));
        assert!(parse_dimensions("garbage").is_err());
        assert!(parse_dimensions("0x0").is_err());
    }
}
