use serde::Serialize;

use crate::tracked_object::{LockState, TrackedObject};

/// Immutable copy of one tracked object, safe to hand to other threads.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectSnapshot {
    pub object_id: String,
    pub class_name: String,
    pub confidence: f32,
    pub cx: f64,
    pub cy: f64,
    pub width: f64,
    pub height: f64,
    pub detection_count: u32,
    pub lost_frames: u32,
    pub tracked_frames: u32,
    pub lock_state: LockState,
    pub is_target: bool,
}

impl ObjectSnapshot {
    pub(crate) fn from_object(obj: &TrackedObject, is_target: bool) -> Self {
        Self {
            object_id: obj.object_id.clone(),
            class_name: obj.class_name.clone(),
            confidence: obj.confidence,
            cx: obj.rect.cx,
            cy: obj.rect.cy,
            width: obj.rect.width,
            height: obj.rect.height,
            detection_count: obj.detection_count,
            lost_frames: obj.lost_frames,
            tracked_frames: obj.tracked_frames,
            lock_state: obj.lock_state,
            is_target,
        }
    }
}

/// State of the whole tracker after one tick.
#[derive(Debug, Clone, Serialize, Default)]
pub struct TrackerSnapshot {
    pub seq: u64,
    pub objects: Vec<ObjectSnapshot>,
    pub target_id: Option<String>,
}

impl TrackerSnapshot {
    pub fn target(&self) -> Option<&ObjectSnapshot> {
        self.objects.iter().find(|o| o.is_target)
    }
}
