use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use osprey_types::{
    CameraMotion, Detection, PixelRect, Priority, PtzCommand, PtzPose, SoftLimits, TrackerConfig,
};
use zoom_calib::CalibrationTable;

use crate::convert::propose_pose;
use crate::object_id::ObjectIdGenerator;
use crate::snapshot::{ObjectSnapshot, TrackerSnapshot};
use crate::target::select_target;
use crate::tracked_object::TrackedObject;
use crate::{associate_greedy, Result};

/// Weight of the P2 centroid when biasing the aim point of a supported
/// target.
const P2_BIAS: f64 = 0.3;

/// Everything one tick needs from the rest of the pipeline.
#[derive(Debug)]
pub struct TickInput<'a> {
    pub seq: u64,
    pub stamp: Instant,
    pub frame_dims: (u32, u32),
    pub detections: &'a [Detection],
    pub camera: CameraMotion,
    pub current_pose: PtzPose,
}

/// What one tick produced.
#[derive(Debug)]
pub struct TickOutcome {
    /// Pose proposal for the PTZ worker, already clamped and quantized.
    pub command: Option<PtzCommand>,
    pub snapshot: TrackerSnapshot,
    /// True on the tick where the first object of this session locked.
    pub first_lock: bool,
}

/// The spatial tracker. Owned by the process thread; object updates are
/// linearized by that single thread, so there are no per-object locks.
pub struct SpatialTracker {
    cfg: TrackerConfig,
    calib: Arc<CalibrationTable>,
    limits: SoftLimits,
    id_gen: ObjectIdGenerator,
    objects: Vec<TrackedObject>,
    last_seq: Option<u64>,
    last_stamp: Option<Instant>,
    birth_counter: u64,
    ever_locked: bool,
}

impl SpatialTracker {
    pub fn new(cfg: TrackerConfig, calib: Arc<CalibrationTable>, limits: SoftLimits) -> Self {
        Self {
            cfg,
            calib,
            limits,
            id_gen: ObjectIdGenerator::new(),
            objects: Vec::new(),
            last_seq: None,
            last_stamp: None,
            birth_counter: 0,
            ever_locked: false,
        }
    }

    #[cfg(test)]
    fn with_id_prefix(mut self, prefix: &str) -> Self {
        self.id_gen = ObjectIdGenerator::with_prefix(prefix.into());
        self
    }

    /// Boxes of currently locked objects, for the P2 gate of the next
    /// frame's priority filter.
    pub fn locked_boxes(&self) -> Vec<PixelRect> {
        self.objects
            .iter()
            .filter(|o| o.lock_state.is_locked())
            .map(|o| o.rect)
            .collect()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn tick(&mut self, input: TickInput<'_>) -> Result<TickOutcome> {
        if let Some(last) = self.last_seq {
            if input.seq <= last {
                return Err(crate::Error::OutOfOrderFrame {
                    last,
                    got: input.seq,
                });
            }
        }
        let dt = self
            .last_stamp
            .map(|t| input.stamp.duration_since(t).as_secs_f64())
            .unwrap_or(1.0 / 30.0)
            .max(1e-3);
        self.last_seq = Some(input.seq);
        self.last_stamp = Some(input.stamp);

        for obj in &mut self.objects {
            obj.predict(dt);
        }

        let p1: Vec<Detection> = input
            .detections
            .iter()
            .filter(|d| d.priority == Priority::P1)
            .cloned()
            .collect();
        let p2: Vec<&Detection> = input
            .detections
            .iter()
            .filter(|d| d.priority == Priority::P2)
            .collect();

        let pairs = associate_greedy(&self.objects, &p1, dt);

        let mut object_matched = vec![false; self.objects.len()];
        let mut detection_matched = vec![false; p1.len()];
        for &(oi, di) in &pairs {
            self.objects[oi].update_matched(&p1[di], input.stamp, &self.cfg)?;
            object_matched[oi] = true;
            detection_matched[di] = true;
        }

        let camera_moving = input.camera == CameraMotion::Moving;
        for (oi, obj) in self.objects.iter_mut().enumerate() {
            if !object_matched[oi] {
                obj.update_unmatched(camera_moving);
            }
        }

        self.objects.retain(|obj| {
            let expired = obj.is_expired(&self.cfg);
            if expired {
                info!(
                    id = %obj.object_id,
                    lost = obj.lost_frames,
                    "object destroyed"
                );
            }
            !expired
        });

        for (di, det) in p1.iter().enumerate() {
            if !detection_matched[di] {
                let id = self.id_gen.next_id();
                self.objects.push(TrackedObject::birth(
                    id,
                    det,
                    self.birth_counter,
                    &self.cfg,
                    input.stamp,
                ));
                self.birth_counter += 1;
            }
        }

        // P2 annotations refine locked targets only.
        for obj in &mut self.objects {
            obj.p2_inside.clear();
            if obj.lock_state.is_locked() {
                for det in &p2 {
                    if obj.rect.contains_center_of(&det.rect) {
                        obj.p2_inside.push(det.rect);
                    }
                }
            }
        }

        let first_lock = !self.ever_locked
            && self.objects.iter().any(|o| o.lock_state.is_locked());
        if first_lock {
            self.ever_locked = true;
        }

        let target_idx = select_target(&self.objects);
        let command = target_idx.and_then(|ti| {
            let obj = &self.objects[ti];
            let aim = aim_point(obj);
            propose_pose(
                aim,
                input.frame_dims,
                &input.current_pose,
                self.cfg.desired_zoom,
                &self.calib,
                &self.limits,
            )
            .map(|target| {
                debug!(id = %obj.object_id, %target, "pose proposal");
                PtzCommand::AbsolutePosition {
                    target,
                    reason: format!("track {}", obj.object_id),
                }
            })
        });

        let snapshot = TrackerSnapshot {
            seq: input.seq,
            target_id: target_idx.map(|ti| self.objects[ti].object_id.clone()),
            objects: self
                .objects
                .iter()
                .enumerate()
                .map(|(i, o)| ObjectSnapshot::from_object(o, Some(i) == target_idx))
                .collect(),
        };

        Ok(TickOutcome {
            command,
            snapshot,
            first_lock,
        })
    }
}

/// The smoothed center, biased toward the centroid of supporting P2
/// detections when there are any.
fn aim_point(obj: &TrackedObject) -> (f64, f64) {
    if obj.p2_inside.is_empty() {
        return (obj.rect.cx, obj.rect.cy);
    }
    let n = obj.p2_inside.len() as f64;
    let (sx, sy) = obj
        .p2_inside
        .iter()
        .fold((0.0, 0.0), |(sx, sy), r| (sx + r.cx, sy + r.cy));
    let (px, py) = (sx / n, sy / n);
    (
        (1.0 - P2_BIAS) * obj.rect.cx + P2_BIAS * px,
        (1.0 - P2_BIAS) * obj.rect.cy + P2_BIAS * py,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracked_object::LockState;
    use std::time::Duration;
    use zoom_calib::CalibrationPoint;

    const DIMS: (u32, u32) = (2688, 1520);

    fn calib() -> Arc<CalibrationTable> {
        Arc::new(
            CalibrationTable::new(vec![
                CalibrationPoint {
                    zoom: 10.0,
                    pan_px_per_unit: -2.0,
                    tilt_px_per_unit: -2.0,
                },
                CalibrationPoint {
                    zoom: 120.0,
                    pan_px_per_unit: -20.0,
                    tilt_px_per_unit: -20.0,
                },
            ])
            .unwrap(),
        )
    }

    fn tracker() -> SpatialTracker {
        SpatialTracker::new(TrackerConfig::default(), calib(), SoftLimits::default())
            .with_id_prefix("20260801-14-30")
    }

    fn boat(cx: f64, cy: f64, conf: f32) -> Detection {
        Detection {
            rect: PixelRect::new(cx, cy, 200.0, 120.0),
            class_name: "boat".into(),
            confidence: conf,
            priority: Priority::P1,
        }
    }

    fn person_inside(cx: f64, cy: f64) -> Detection {
        Detection {
            rect: PixelRect::new(cx, cy, 30.0, 60.0),
            class_name: "person".into(),
            confidence: 0.5,
            priority: Priority::P2,
        }
    }

    struct Driver {
        tracker: SpatialTracker,
        seq: u64,
        stamp: Instant,
        pose: PtzPose,
    }

    impl Driver {
        fn new() -> Self {
            Self {
                tracker: tracker(),
                seq: 0,
                stamp: Instant::now(),
                pose: PtzPose::new(1800.0, 450.0, 10.0),
            }
        }

        fn tick(&mut self, detections: Vec<Detection>) -> TickOutcome {
            self.seq += 1;
            self.stamp += Duration::from_millis(33);
            self.tracker
                .tick(TickInput {
                    seq: self.seq,
                    stamp: self.stamp,
                    frame_dims: DIMS,
                    detections: &detections,
                    camera: CameraMotion::Idle,
                    current_pose: self.pose,
                })
                .unwrap()
        }
    }

    #[test]
    fn lock_progression_and_expiry() {
        let mut d = Driver::new();

        // Two ticks of the same detection: Building then Locked.
        let out = d.tick(vec![boat(1000.0, 500.0, 0.4)]);
        assert_eq!(out.snapshot.objects[0].lock_state, LockState::Building);
        assert!(!out.first_lock);

        let out = d.tick(vec![boat(1000.0, 500.0, 0.4)]);
        assert_eq!(out.snapshot.objects[0].lock_state, LockState::Locked);
        assert!(out.first_lock);

        // 22 more matching ticks: SuperLocked.
        let mut last = None;
        for _ in 0..22 {
            last = Some(d.tick(vec![boat(1000.0, 500.0, 0.4)]));
        }
        let out = last.unwrap();
        assert_eq!(out.snapshot.objects[0].lock_state, LockState::SuperLocked);
        assert_eq!(out.snapshot.objects[0].detection_count, 24);
        assert!(!out.first_lock);

        // 35 empty ticks: destroyed.
        for _ in 0..34 {
            d.tick(vec![]);
            assert_eq!(d.tracker.object_count(), 1);
        }
        d.tick(vec![]);
        assert_eq!(d.tracker.object_count(), 0);
    }

    #[test]
    fn identity_is_stable_across_motion() {
        let mut d = Driver::new();
        d.tick(vec![boat(1000.0, 500.0, 0.6)]);
        // Drifting detection stays the same object.
        for i in 1..=20 {
            let out = d.tick(vec![boat(1000.0 + 8.0 * i as f64, 500.0, 0.6)]);
            assert_eq!(out.snapshot.objects.len(), 1);
            assert_eq!(out.snapshot.objects[0].object_id, "20260801-14-30.000");
        }
    }

    #[test]
    fn lost_frames_zero_iff_matched() {
        let mut d = Driver::new();
        let out = d.tick(vec![boat(1000.0, 500.0, 0.6)]);
        assert_eq!(out.snapshot.objects[0].lost_frames, 0);
        let out = d.tick(vec![]);
        assert_eq!(out.snapshot.objects[0].lost_frames, 1);
        let out = d.tick(vec![boat(1000.0, 500.0, 0.6)]);
        assert_eq!(out.snapshot.objects[0].lost_frames, 0);
    }

    #[test]
    fn locked_target_produces_clamped_command() {
        let mut d = Driver::new();
        d.tick(vec![boat(2000.0, 500.0, 0.6)]);
        let out = d.tick(vec![boat(2000.0, 500.0, 0.6)]);
        let cmd = out.command.expect("locked target should move the camera");
        match cmd {
            PtzCommand::AbsolutePosition { target, .. } => {
                // Target right of center with negative ratio: pan decreases.
                assert!(target.pan < 1800.0);
                assert_eq!(target.zoom, 30.0);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn building_object_never_moves_camera() {
        let mut d = Driver::new();
        let out = d.tick(vec![boat(2000.0, 500.0, 0.6)]);
        assert!(out.command.is_none());
    }

    #[test]
    fn p2_support_biases_aim_and_is_reported() {
        let mut d = Driver::new();
        d.tick(vec![boat(1000.0, 500.0, 0.6)]);
        d.tick(vec![boat(1000.0, 500.0, 0.6)]);
        // Locked now; P2 inside the box.
        let out = d.tick(vec![
            boat(1000.0, 500.0, 0.6),
            person_inside(1050.0, 480.0),
        ]);
        assert!(out.snapshot.target_id.is_some());
        let boxes = d.tracker.locked_boxes();
        assert_eq!(boxes.len(), 1);
    }

    #[test]
    fn out_of_order_seq_is_fatal() {
        let mut d = Driver::new();
        d.tick(vec![]);
        let err = d.tracker.tick(TickInput {
            seq: 0,
            stamp: d.stamp,
            frame_dims: DIMS,
            detections: &[],
            camera: CameraMotion::Idle,
            current_pose: d.pose,
        });
        assert!(matches!(err, Err(crate::Error::OutOfOrderFrame { .. })));
    }

    #[test]
    fn two_boats_keep_distinct_ids() {
        let mut d = Driver::new();
        let out = d.tick(vec![boat(500.0, 400.0, 0.6), boat(2000.0, 900.0, 0.6)]);
        assert_eq!(out.snapshot.objects.len(), 2);
        let ids: Vec<_> = out
            .snapshot
            .objects
            .iter()
            .map(|o| o.object_id.clone())
            .collect();
        assert_ne!(ids[0], ids[1]);

        // Both drift; both identities survive.
        let out = d.tick(vec![boat(510.0, 405.0, 0.6), boat(1990.0, 895.0, 0.6)]);
        let ids2: Vec<_> = out
            .snapshot
            .objects
            .iter()
            .map(|o| o.object_id.clone())
            .collect();
        assert_eq!(ids, ids2);
    }
}
