use std::collections::VecDeque;
use std::time::Instant;

use motion_models::{FilterParams, PositionFilter};
use osprey_types::{Detection, PixelRect, Priority, TrackerConfig};
use serde::Serialize;
use tracing::debug;

/// Confidence gate for the Building -> Locked promotion.
const LOCK_MIN_CONFIDENCE: f32 = 0.30;
/// Detection count required before Building -> Locked.
const LOCK_MIN_DETECTIONS: u32 = 2;
/// Detection count required before Locked -> SuperLocked.
const SUPER_LOCK_MIN_DETECTIONS: u32 = 24;

/// Stage of confidence that a tracked object is real and worth pursuing.
///
/// Transitions are monotonic within one object lifetime; a downgrade only
/// happens by destroying the object and re-birthing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum LockState {
    Building,
    Locked,
    SuperLocked,
}

impl LockState {
    pub fn is_locked(&self) -> bool {
        matches!(self, LockState::Locked | LockState::SuperLocked)
    }
}

/// A stable identity for one detected object.
#[derive(Debug)]
pub struct TrackedObject {
    pub object_id: String,
    pub class_name: String,
    pub confidence: f32,
    /// Smoothed center (Kalman) with the size of the last matching detection.
    pub rect: PixelRect,
    pub detection_count: u32,
    pub lost_frames: u32,
    pub tracked_frames: u32,
    pub lock_state: LockState,
    pub priority: Priority,
    /// Birth order, for stable "oldest wins" tie-breaks.
    pub birth_seq: u64,
    /// Consecutive matched ticks while Locked, for the SuperLocked gate.
    stable_ticks: u32,
    /// Recent smoothed positions, newest last.
    history: VecDeque<(Instant, f64, f64)>,
    history_len: usize,
    pub(crate) filter: PositionFilter,
    /// P2 detections found inside the box this tick.
    pub p2_inside: Vec<PixelRect>,
}

impl TrackedObject {
    pub fn birth(
        object_id: String,
        det: &Detection,
        birth_seq: u64,
        cfg: &TrackerConfig,
        stamp: Instant,
    ) -> Self {
        let filter = PositionFilter::new(det.rect.cx, det.rect.cy, FilterParams::default());
        let mut history = VecDeque::with_capacity(cfg.history_len);
        history.push_back((stamp, det.rect.cx, det.rect.cy));
        debug!(id = %object_id, class = %det.class_name, "object born");
        Self {
            object_id,
            class_name: det.class_name.clone(),
            confidence: det.confidence,
            rect: det.rect,
            detection_count: 1,
            lost_frames: 0,
            tracked_frames: 0,
            lock_state: LockState::Building,
            priority: Priority::P1,
            birth_seq,
            stable_ticks: 0,
            history,
            history_len: cfg.history_len,
            filter,
            p2_inside: Vec::new(),
        }
    }

    /// Advance the motion model by `dt` seconds. Runs for every object at
    /// the start of a tick, before association.
    pub fn predict(&mut self, dt: f64) {
        self.filter.predict(dt);
        self.tracked_frames += 1;
    }

    pub fn predicted_center(&self) -> (f64, f64) {
        let p = self.filter.position();
        (p.x, p.y)
    }

    /// Fold in the matching detection and roll the lock state forward.
    pub fn update_matched(
        &mut self,
        det: &Detection,
        stamp: Instant,
        cfg: &TrackerConfig,
    ) -> crate::Result<()> {
        if det.class_name != self.class_name {
            // The detector rarely flips classes on a stable object; when it
            // does, the identity is no longer trustworthy.
            debug!(
                id = %self.object_id,
                from = %self.class_name,
                to = %det.class_name,
                "class change, lock reset"
            );
            self.class_name = det.class_name.clone();
            self.lock_state = LockState::Building;
            self.detection_count = 1;
            self.stable_ticks = 0;
        } else {
            self.detection_count += 1;
        }

        self.filter.correct(det.rect.cx, det.rect.cy)?;
        let center = self.filter.position();
        self.rect = PixelRect::new(center.x, center.y, det.rect.width, det.rect.height);
        self.confidence = det.confidence;
        self.lost_frames = 0;

        self.history.push_back((stamp, center.x, center.y));
        while self.history.len() > self.history_len {
            self.history.pop_front();
        }

        self.advance_lock_state(cfg);
        Ok(())
    }

    fn advance_lock_state(&mut self, cfg: &TrackerConfig) {
        match self.lock_state {
            LockState::Building => {
                if self.detection_count >= LOCK_MIN_DETECTIONS
                    && self.confidence >= LOCK_MIN_CONFIDENCE
                {
                    self.lock_state = LockState::Locked;
                    self.stable_ticks = 0;
                    debug!(id = %self.object_id, "locked");
                }
            }
            LockState::Locked => {
                self.stable_ticks += 1;
                if self.detection_count >= SUPER_LOCK_MIN_DETECTIONS
                    && self.stable_ticks >= cfg.stability_window
                {
                    self.lock_state = LockState::SuperLocked;
                    debug!(id = %self.object_id, "super-locked");
                }
            }
            LockState::SuperLocked => {}
        }
    }

    /// Account for a tick without a matching detection. While the camera is
    /// moving the object's real-world position may simply have left the
    /// frame, so the predicted position is snapshotted instead of letting
    /// the box go stale.
    pub fn update_unmatched(&mut self, camera_moving: bool) {
        self.lost_frames += 1;
        self.stable_ticks = 0;
        if camera_moving {
            let (cx, cy) = self.predicted_center();
            self.rect = PixelRect::new(cx, cy, self.rect.width, self.rect.height);
        }
    }

    /// True once `lost_frames` exceeds the recovery horizon for the current
    /// lock state.
    pub fn is_expired(&self, cfg: &TrackerConfig) -> bool {
        let horizon = match self.lock_state {
            LockState::Building => cfg.recovery_horizon,
            LockState::Locked | LockState::SuperLocked => cfg.locked_recovery_horizon,
        };
        self.lost_frames > horizon
    }

    pub fn history(&self) -> impl Iterator<Item = &(Instant, f64, f64)> {
        self.history.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(cx: f64, cy: f64, conf: f32) -> Detection {
        Detection {
            rect: PixelRect::new(cx, cy, 120.0, 80.0),
            class_name: "boat".into(),
            confidence: conf,
            priority: Priority::P1,
        }
    }

    fn cfg() -> TrackerConfig {
        TrackerConfig::default()
    }

    #[test]
    fn builds_then_locks_on_second_detection() {
        let now = Instant::now();
        let mut obj = TrackedObject::birth("t.000".into(), &det(1000.0, 500.0, 0.4), 0, &cfg(), now);
        assert_eq!(obj.lock_state, LockState::Building);
        assert_eq!(obj.detection_count, 1);

        obj.predict(1.0 / 30.0);
        obj.update_matched(&det(1000.0, 500.0, 0.4), now, &cfg()).unwrap();
        assert_eq!(obj.detection_count, 2);
        assert_eq!(obj.lock_state, LockState::Locked);
        assert_eq!(obj.lost_frames, 0);
    }

    #[test]
    fn low_confidence_delays_lock() {
        let now = Instant::now();
        let mut obj = TrackedObject::birth("t.000".into(), &det(0.0, 0.0, 0.28), 0, &cfg(), now);
        for _ in 0..5 {
            obj.predict(1.0 / 30.0);
            obj.update_matched(&det(0.0, 0.0, 0.28), now, &cfg()).unwrap();
        }
        assert_eq!(obj.lock_state, LockState::Building);
        obj.predict(1.0 / 30.0);
        obj.update_matched(&det(0.0, 0.0, 0.35), now, &cfg()).unwrap();
        assert_eq!(obj.lock_state, LockState::Locked);
    }

    #[test]
    fn super_lock_needs_count_and_stability() {
        let now = Instant::now();
        let mut obj = TrackedObject::birth("t.000".into(), &det(0.0, 0.0, 0.4), 0, &cfg(), now);
        for i in 0..23 {
            obj.predict(1.0 / 30.0);
            obj.update_matched(&det(0.0, 0.0, 0.4), now, &cfg()).unwrap();
            if i < 22 {
                assert_ne!(obj.lock_state, LockState::SuperLocked, "tick {i}");
            }
        }
        // 24 detections total, and well past the stability window.
        assert_eq!(obj.detection_count, 24);
        assert_eq!(obj.lock_state, LockState::SuperLocked);
    }

    #[test]
    fn class_change_resets_to_building() {
        let now = Instant::now();
        let mut obj = TrackedObject::birth("t.000".into(), &det(0.0, 0.0, 0.4), 0, &cfg(), now);
        obj.predict(1.0 / 30.0);
        obj.update_matched(&det(0.0, 0.0, 0.4), now, &cfg()).unwrap();
        assert_eq!(obj.lock_state, LockState::Locked);

        let mut other = det(0.0, 0.0, 0.4);
        other.class_name = "surfboard".into();
        obj.predict(1.0 / 30.0);
        obj.update_matched(&other, now, &cfg()).unwrap();
        assert_eq!(obj.lock_state, LockState::Building);
        assert_eq!(obj.detection_count, 1);
        assert_eq!(obj.class_name, "surfboard");
    }

    #[test]
    fn expiry_horizons_scale_with_lock_state() {
        let now = Instant::now();
        let mut obj = TrackedObject::birth("t.000".into(), &det(0.0, 0.0, 0.4), 0, &cfg(), now);
        for _ in 0..30 {
            obj.update_unmatched(false);
        }
        assert!(!obj.is_expired(&cfg()));
        obj.update_unmatched(false);
        assert!(obj.is_expired(&cfg()));
    }

    #[test]
    fn moving_camera_snapshots_predicted_position() {
        let now = Instant::now();
        let mut obj = TrackedObject::birth("t.000".into(), &det(100.0, 100.0, 0.4), 0, &cfg(), now);
        obj.predict(1.0 / 30.0);
        obj.update_unmatched(true);
        let (cx, cy) = obj.predicted_center();
        assert_eq!(obj.rect.cx, cx);
        assert_eq!(obj.rect.cy, cy);
        assert_eq!(obj.lost_frames, 1);
    }
}
