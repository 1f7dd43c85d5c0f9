use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A condition that ends the process with a distinct exit code.
#[derive(Debug, Clone)]
pub enum FatalReason {
    /// Startup or configuration failure.
    Startup(String),
    /// A violated pipeline invariant (out-of-order frames, broken counters).
    Invariant(String),
    /// Zero FPS on both the process and write stages for one report interval.
    PipelineStall,
    /// Encoder subprocess crashed or its stdin stopped accepting writes.
    EncoderFailure(String),
}

impl FatalReason {
    pub fn exit_code(&self) -> i32 {
        match self {
            FatalReason::Startup(_) | FatalReason::Invariant(_) => 1,
            FatalReason::PipelineStall => 2,
            FatalReason::EncoderFailure(_) => 3,
        }
    }
}

impl std::fmt::Display for FatalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FatalReason::Startup(msg) => write!(f, "startup error: {msg}"),
            FatalReason::Invariant(msg) => write!(f, "pipeline invariant violated: {msg}"),
            FatalReason::PipelineStall => write!(f, "pipeline stall: zero FPS"),
            FatalReason::EncoderFailure(msg) => write!(f, "encoder failure: {msg}"),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    requested: AtomicBool,
    reason: Mutex<Option<FatalReason>>,
}

/// Process-wide cooperative shutdown signal.
///
/// Every worker checks `is_set()` at its next suspension point and then has a
/// bounded drain phase. The first fatal reason wins; later requests do not
/// overwrite it.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<Inner>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orderly shutdown (exit code 0) unless a fatal reason was already set.
    pub fn request(&self) {
        self.0.requested.store(true, Ordering::SeqCst);
    }

    /// Fatal shutdown. Keeps the first reason if called more than once.
    pub fn request_fatal(&self, reason: FatalReason) {
        {
            let mut slot = self.0.reason.lock().expect("shutdown reason lock");
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
        self.0.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.requested.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<FatalReason> {
        self.0.reason.lock().expect("shutdown reason lock").clone()
    }

    pub fn exit_code(&self) -> i32 {
        self.reason().map(|r| r.exit_code()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fatal_reason_wins() {
        let flag = ShutdownFlag::new();
        assert!(!flag.is_set());
        assert_eq!(flag.exit_code(), 0);

        flag.request_fatal(FatalReason::PipelineStall);
        flag.request_fatal(FatalReason::EncoderFailure("late".into()));
        assert!(flag.is_set());
        assert_eq!(flag.exit_code(), 2);
    }

    #[test]
    fn orderly_request_keeps_code_zero() {
        let flag = ShutdownFlag::new();
        flag.request();
        assert!(flag.is_set());
        assert_eq!(flag.exit_code(), 0);
    }
}
