//! Ordered, bounded frame queue into an external encoder subprocess.
//!
//! The public [`EncoderWriter`] hands frames to a background writer thread
//! over a bounded channel. The writer reorders by sequence number, feeds the
//! subprocess stdin with raw BGR24, and reports failures back on an error
//! side channel. A separate health monitor watches the subprocess itself.

use std::io::Write;

use tracing::warn;

use osprey_types::{EncoderConfig, FatalReason, RawFrame, ShutdownFlag};

mod health;
mod process;
mod reorder;

pub use health::{parse_frame_counter, spawn_health_monitor};
pub use process::{spawn_encoder, terminate, EncoderProcess, KILL_GRACE};
pub use reorder::ReorderBuffer;

/// Consecutive stdin write failures tolerated before the pipeline dies.
const MAX_WRITE_FAILURES: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("encoder command is empty")]
    EmptyCommand,
    #[error("writer thread is gone")]
    Disconnected,
    #[error("already finished")]
    AlreadyDone,
    #[error("encoder stdin failed: {0}")]
    StdinFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;

macro_rules! async_err {
    ($rx: expr) => {
        match $rx.try_recv() {
            Ok(e) => {
                return Err(e);
            }
            Err(crossbeam_channel::TryRecvError::Empty) => {}
            Err(crossbeam_channel::TryRecvError::Disconnected) => {
                return Err(Error::Disconnected);
            }
        }
    };
}

enum Msg {
    Write(RawFrame),
    Finish,
}

/// Handle held by the process thread. `write` never blocks: when the queue
/// is full the frame is dropped, preferring latency over completeness.
pub struct EncoderWriter {
    tx: crossbeam_channel::Sender<Msg>,
    err_rx: crossbeam_channel::Receiver<Error>,
    is_done: bool,
    dropped: u64,
    join: Option<std::thread::JoinHandle<()>>,
}

impl EncoderWriter {
    /// Spawn the encoder subprocess, its writer thread, and its health
    /// monitor.
    pub fn launch(
        cfg: &EncoderConfig,
        width: u32,
        height: u32,
        shutdown: ShutdownFlag,
    ) -> Result<Self> {
        let proc = spawn_encoder(&cfg.command, width, height)?;
        let (err_tx, err_rx) = crossbeam_channel::unbounded();
        let (tx, rx) = crossbeam_channel::bounded::<Msg>(cfg.queue_capacity);
        let stand_down = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));

        spawn_health_monitor(
            proc.stderr,
            proc.child.clone(),
            shutdown.clone(),
            stand_down.clone(),
        );

        let reorder_horizon = cfg.reorder_timeout_frames;
        let reorder_capacity = cfg.queue_capacity;
        let stdin = proc.stdin;
        let child = proc.child;
        let join = std::thread::Builder::new()
            .name("encoder-writer".into())
            .spawn(move || {
                writer_main(
                    rx,
                    stdin,
                    child,
                    err_tx,
                    shutdown,
                    stand_down,
                    reorder_capacity,
                    reorder_horizon,
                );
            })?;

        Ok(Self {
            tx,
            err_rx,
            is_done: false,
            dropped: 0,
            join: Some(join),
        })
    }

    /// Queue one frame for encoding. Returns `Ok` even when the frame was
    /// dropped on overload; queue-full is policy, not an error.
    pub fn write(&mut self, frame: RawFrame) -> Result<()> {
        async_err!(self.err_rx);
        if self.is_done {
            return Err(Error::AlreadyDone);
        }
        match self.tx.try_send(Msg::Write(frame)) {
            Ok(()) => Ok(()),
            Err(crossbeam_channel::TrySendError::Full(_)) => {
                self.dropped += 1;
                if self.dropped % 30 == 1 {
                    warn!(dropped = self.dropped, "encoder queue full, dropping");
                }
                Ok(())
            }
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => Err(Error::Disconnected),
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Flush the reorder buffer, close stdin, and wait for the subprocess.
    pub fn finish(&mut self) -> Result<()> {
        if self.is_done {
            return Err(Error::AlreadyDone);
        }
        async_err!(self.err_rx);
        self.is_done = true;
        self.tx.send(Msg::Finish).map_err(|_| Error::Disconnected)?;
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
        Ok(())
    }
}

fn writer_main(
    rx: crossbeam_channel::Receiver<Msg>,
    mut stdin: std::process::ChildStdin,
    child: std::sync::Arc<std::sync::Mutex<std::process::Child>>,
    err_tx: crossbeam_channel::Sender<Error>,
    shutdown: ShutdownFlag,
    stand_down: std::sync::Arc<std::sync::atomic::AtomicBool>,
    reorder_capacity: usize,
    reorder_horizon: u64,
) {
    let mut reorder: ReorderBuffer<RawFrame> = ReorderBuffer::new(reorder_capacity, reorder_horizon);
    let mut write_failures: u32 = 0;

    let mut write_ready = |ready: Vec<(u64, RawFrame)>,
                           stdin: &mut std::process::ChildStdin|
     -> std::result::Result<(), String> {
        for (_seq, frame) in ready {
            match stdin.write_all(frame.data()) {
                Ok(()) => {
                    write_failures = 0;
                }
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    return Err(format!("broken pipe: {e}"));
                }
                Err(e) => {
                    write_failures += 1;
                    warn!(failures = write_failures, "encoder stdin write failed: {e}");
                    if write_failures >= MAX_WRITE_FAILURES {
                        return Err(format!("repeated stdin write failure: {e}"));
                    }
                }
            }
        }
        Ok(())
    };

    loop {
        let msg = match rx.recv_timeout(std::time::Duration::from_millis(250)) {
            Ok(msg) => msg,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if shutdown.is_set() {
                    break;
                }
                continue;
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        };

        match msg {
            Msg::Write(frame) => {
                let ready = reorder.push(frame.seq, frame);
                if let Err(reason) = write_ready(ready, &mut stdin) {
                    shutdown.request_fatal(FatalReason::EncoderFailure(reason.clone()));
                    let _ = err_tx.send(Error::StdinFailed(reason));
                    return;
                }
            }
            Msg::Finish => break,
        }
    }

    // Bounded drain: emit whatever the reorder buffer still holds, then let
    // the subprocess see EOF on stdin and exit on its own.
    stand_down.store(true, std::sync::atomic::Ordering::SeqCst);
    let remainder = reorder.flush();
    if let Err(reason) = write_ready(remainder, &mut stdin) {
        shutdown.request_fatal(FatalReason::EncoderFailure(reason.clone()));
        let _ = err_tx.send(Error::StdinFailed(reason));
        return;
    }
    drop(stdin);

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(1);
    loop {
        {
            let mut guard = child.lock().expect("child lock");
            if let Ok(Some(_)) = guard.try_wait() {
                return;
            }
        }
        if std::time::Instant::now() >= deadline {
            terminate(&child);
            return;
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osprey_types::FramePool;
    use std::time::Instant;

    fn cfg(command: Vec<&str>) -> EncoderConfig {
        EncoderConfig {
            command: command.into_iter().map(String::from).collect(),
            queue_capacity: 16,
            reorder_timeout_frames: 15,
        }
    }

    fn frame(pool: &FramePool, seq: u64) -> RawFrame {
        RawFrame::new(seq, Instant::now(), 4, 2, pool.take().unwrap())
    }

    #[test]
    fn frames_flow_through_cat() {
        // `cat` consumes stdin like an encoder would; writing and finishing
        // must complete without errors.
        let shutdown = ShutdownFlag::new();
        let mut writer =
            EncoderWriter::launch(&cfg(vec!["cat"]), 4, 2, shutdown.clone()).unwrap();
        let pool = FramePool::new(8, 4 * 2 * 3);
        for seq in 1..=5 {
            writer.write(frame(&pool, seq)).unwrap();
        }
        writer.finish().unwrap();
        assert!(!shutdown.is_set());
    }

    #[test]
    fn double_finish_is_an_error() {
        let shutdown = ShutdownFlag::new();
        let mut writer = EncoderWriter::launch(&cfg(vec!["cat"]), 4, 2, shutdown).unwrap();
        writer.finish().unwrap();
        assert!(matches!(writer.finish(), Err(Error::AlreadyDone)));
    }

    #[test]
    fn empty_command_is_rejected() {
        let shutdown = ShutdownFlag::new();
        assert!(matches!(
            EncoderWriter::launch(&cfg(vec![]), 4, 2, shutdown),
            Err(Error::EmptyCommand)
        ));
    }

    #[test]
    fn substitution_reaches_the_command_line() {
        // `true` exits immediately regardless of arguments; spawn succeeds
        // and substitution must not panic.
        let shutdown = ShutdownFlag::new();
        let writer = EncoderWriter::launch(
            &cfg(vec!["true", "-s", "{width}x{height}"]),
            640,
            360,
            shutdown,
        );
        assert!(writer.is_ok());
    }
}
