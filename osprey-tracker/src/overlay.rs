use osprey_types::{PixelRect, RawFrame};

use crate::snapshot::TrackerSnapshot;
use crate::tracked_object::LockState;

/// One box the renderer should draw.
#[derive(Debug, Clone)]
pub struct OverlayBox {
    pub rect: PixelRect,
    pub label: String,
    pub lock_state: LockState,
    pub is_target: bool,
}

/// Draw list built from one tracker snapshot. The renderer is free to ignore
/// fields it cannot express (picture-in-picture on a text renderer, say).
#[derive(Debug, Clone, Default)]
pub struct OverlayPlan {
    pub boxes: Vec<OverlayBox>,
    /// Crosshair at the aim point of the current target.
    pub crosshair: Option<(f64, f64)>,
    pub status_line: String,
    /// Source region for a picture-in-picture inset; only populated for
    /// super-locked targets.
    pub pip: Option<PixelRect>,
}

/// Build the draw list for one frame.
pub fn compose_overlay(snapshot: &TrackerSnapshot) -> OverlayPlan {
    let boxes = snapshot
        .objects
        .iter()
        .map(|o| OverlayBox {
            rect: PixelRect::new(o.cx, o.cy, o.width, o.height),
            label: format!("{} {} {:.2}", o.object_id, o.class_name, o.confidence),
            lock_state: o.lock_state,
            is_target: o.is_target,
        })
        .collect();

    let target = snapshot.target();
    let crosshair = target.map(|t| (t.cx, t.cy));
    let pip = target
        .filter(|t| t.lock_state == LockState::SuperLocked)
        .map(|t| PixelRect::new(t.cx, t.cy, t.width, t.height));

    let status_line = format!(
        "seq {} objects {} target {}",
        snapshot.seq,
        snapshot.objects.len(),
        snapshot.target_id.as_deref().unwrap_or("-")
    );

    OverlayPlan {
        boxes,
        crosshair,
        status_line,
        pip,
    }
}

/// Contract with the pixel renderer.
pub trait OverlayRenderer {
    fn render(&self, plan: &OverlayPlan, frame: &mut RawFrame);
}

/// Minimal built-in renderer: colored box outlines and a target crosshair.
/// Anything fancier (labels, trails, picture-in-picture) belongs to an
/// external renderer implementing [`OverlayRenderer`].
#[derive(Debug, Default)]
pub struct BoxRenderer {}

/// BGR colors per lock state.
fn color_for(lock_state: LockState, is_target: bool) -> [u8; 3] {
    if is_target {
        return [0, 0, 255];
    }
    match lock_state {
        LockState::Building => [160, 160, 160],
        LockState::Locked => [0, 255, 0],
        LockState::SuperLocked => [0, 215, 255],
    }
}

impl OverlayRenderer for BoxRenderer {
    fn render(&self, plan: &OverlayPlan, frame: &mut RawFrame) {
        for b in &plan.boxes {
            draw_rect(frame, &b.rect, color_for(b.lock_state, b.is_target));
        }
        if let Some((cx, cy)) = plan.crosshair {
            draw_crosshair(frame, cx, cy, [255, 255, 255]);
        }
    }
}

const BORDER: i64 = 2;
const CROSSHAIR_ARM: i64 = 14;

fn put_pixel(frame: &mut RawFrame, x: i64, y: i64, color: [u8; 3]) {
    if x < 0 || y < 0 || x >= frame.width() as i64 || y >= frame.height() as i64 {
        return;
    }
    let stride = frame.stride();
    let off = y as usize * stride + x as usize * 3;
    frame.data_mut()[off..off + 3].copy_from_slice(&color);
}

fn draw_rect(frame: &mut RawFrame, rect: &PixelRect, color: [u8; 3]) {
    let (l, r) = (rect.left() as i64, rect.right() as i64);
    let (t, b) = (rect.top() as i64, rect.bottom() as i64);
    for x in l..=r {
        for dy in 0..BORDER {
            put_pixel(frame, x, t + dy, color);
            put_pixel(frame, x, b - dy, color);
        }
    }
    for y in t..=b {
        for dx in 0..BORDER {
            put_pixel(frame, l + dx, y, color);
            put_pixel(frame, r - dx, y, color);
        }
    }
}

fn draw_crosshair(frame: &mut RawFrame, cx: f64, cy: f64, color: [u8; 3]) {
    let (cx, cy) = (cx as i64, cy as i64);
    for d in -CROSSHAIR_ARM..=CROSSHAIR_ARM {
        put_pixel(frame, cx + d, cy, color);
        put_pixel(frame, cx, cy + d, color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ObjectSnapshot;
    use osprey_types::FramePool;
    use std::time::Instant;

    fn snapshot_with_target() -> TrackerSnapshot {
        TrackerSnapshot {
            seq: 42,
            target_id: Some("x.000".into()),
            objects: vec![ObjectSnapshot {
                object_id: "x.000".into(),
                class_name: "boat".into(),
                confidence: 0.7,
                cx: 32.0,
                cy: 16.0,
                width: 20.0,
                height: 10.0,
                detection_count: 5,
                lost_frames: 0,
                tracked_frames: 5,
                lock_state: LockState::Locked,
                is_target: true,
            }],
        }
    }

    #[test]
    fn plan_reflects_snapshot() {
        let plan = compose_overlay(&snapshot_with_target());
        assert_eq!(plan.boxes.len(), 1);
        assert!(plan.boxes[0].is_target);
        assert_eq!(plan.crosshair, Some((32.0, 16.0)));
        assert!(plan.pip.is_none(), "locked but not super-locked");
        assert!(plan.status_line.contains("seq 42"));
    }

    #[test]
    fn super_locked_target_requests_pip() {
        let mut snap = snapshot_with_target();
        snap.objects[0].lock_state = LockState::SuperLocked;
        let plan = compose_overlay(&snap);
        assert!(plan.pip.is_some());
    }

    #[test]
    fn renderer_marks_pixels_in_bounds() {
        let pool = FramePool::new(1, 64 * 32 * 3);
        let mut frame = RawFrame::new(1, Instant::now(), 64, 32, pool.take().unwrap());
        let plan = compose_overlay(&snapshot_with_target());
        BoxRenderer::default().render(&plan, &mut frame);
        // The crosshair center pixel is white.
        let off = 16 * frame.stride() + 32 * 3;
        assert_eq!(&frame.data()[off..off + 3], &[255, 255, 255]);
    }

    #[test]
    fn renderer_survives_out_of_bounds_boxes() {
        let pool = FramePool::new(1, 16 * 16 * 3);
        let mut frame = RawFrame::new(1, Instant::now(), 16, 16, pool.take().unwrap());
        let mut snap = snapshot_with_target();
        snap.objects[0].cx = -50.0;
        snap.objects[0].cy = 500.0;
        let plan = compose_overlay(&snap);
        BoxRenderer::default().render(&plan, &mut frame);
    }
}
