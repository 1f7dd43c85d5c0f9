use std::time::{Duration, Instant};

use osprey_types::{CameraMotion, PtzPose};

/// Axis movement below this between polls counts as "not advancing".
const PROGRESS_EPSILON: f64 = 1.0;

/// What a status poll means for the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    NoChange,
    /// The camera reached its target; fire arrival callbacks exactly once.
    Arrived(PtzPose),
    /// The pose stopped advancing; the command should be sent again.
    NeedResend(PtzPose),
    /// Still stalled after the one resend; surface an error and give up on
    /// this move.
    Stalled(PtzPose),
}

/// IDLE/MOVING/ARRIVED as pure logic, driven by commands and status polls.
///
/// ARRIVED is transient: `on_poll` reports it once and the machine is
/// already IDLE again when the call returns.
#[derive(Debug)]
pub struct CameraStateMachine {
    target: Option<PtzPose>,
    tolerance: f64,
    stall_timeout: Duration,
    last_pose: Option<PtzPose>,
    last_progress: Option<Instant>,
    resent: bool,
}

impl CameraStateMachine {
    pub fn new(tolerance: f64, stall_timeout: Duration) -> Self {
        Self {
            target: None,
            tolerance,
            stall_timeout,
            last_pose: None,
            last_progress: None,
            resent: false,
        }
    }

    pub fn motion(&self) -> CameraMotion {
        if self.target.is_some() {
            CameraMotion::Moving
        } else {
            CameraMotion::Idle
        }
    }

    pub fn active_target(&self) -> Option<&PtzPose> {
        self.target.as_ref()
    }

    /// True when `target` is the same move as the one in flight; such
    /// commands are dropped rather than resent.
    pub fn is_duplicate(&self, target: &PtzPose) -> bool {
        match &self.target {
            Some(active) => target.within(active, self.tolerance),
            None => false,
        }
    }

    /// Record that an absolute-position command went out on the wire.
    pub fn command_sent(&mut self, target: PtzPose, now: Instant) {
        self.target = Some(target);
        self.last_pose = None;
        self.last_progress = Some(now);
        self.resent = false;
    }

    pub fn on_poll(&mut self, pose: PtzPose, now: Instant) -> PollOutcome {
        let target = match self.target {
            Some(t) => t,
            None => return PollOutcome::NoChange,
        };

        if pose.within(&target, self.tolerance) {
            self.target = None;
            self.last_pose = None;
            return PollOutcome::Arrived(pose);
        }

        let advancing = match self.last_pose {
            None => true,
            Some(prev) => {
                (pose.pan - prev.pan).abs() >= PROGRESS_EPSILON
                    || (pose.tilt - prev.tilt).abs() >= PROGRESS_EPSILON
                    || (pose.zoom - prev.zoom).abs() >= PROGRESS_EPSILON
            }
        };

        if advancing {
            self.last_pose = Some(pose);
            self.last_progress = Some(now);
            return PollOutcome::NoChange;
        }

        let stalled_for = self
            .last_progress
            .map(|t| now.duration_since(t))
            .unwrap_or_default();
        if stalled_for <= self.stall_timeout {
            return PollOutcome::NoChange;
        }

        if !self.resent {
            self.resent = true;
            self.last_progress = Some(now);
            PollOutcome::NeedResend(target)
        } else {
            self.target = None;
            self.last_pose = None;
            PollOutcome::Stalled(pose)
        }
    }
}
