use osprey_types::Detection;

use crate::tracked_object::TrackedObject;

/// Gate as a multiple of the object's own diagonal: a detection further than
/// this from the predicted center cannot be the same object.
const GATE_DIAGONAL_FACTOR: f64 = 1.5;
/// Floor on the gate so small or newborn objects still associate, px.
const GATE_FLOOR_PX: f64 = 48.0;

fn gate_for(obj: &TrackedObject, dt: f64) -> f64 {
    // The window widens with the object's apparent size and with how far its
    // velocity says it can travel in one tick.
    let speed = {
        let v = obj.filter.velocity();
        (v.x * v.x + v.y * v.y).sqrt()
    };
    (obj.rect.diagonal() * GATE_DIAGONAL_FACTOR + speed * dt).max(GATE_FLOOR_PX)
}

/// Greedy one-to-one assignment in increasing cost order.
///
/// Cost is Euclidean distance between the object's predicted center and the
/// detection center. Sufficient for the expected density of targets; a full
/// Hungarian solve buys nothing here.
///
/// Returns `(object_index, detection_index)` pairs.
pub fn associate_greedy(
    objects: &[TrackedObject],
    detections: &[Detection],
    dt: f64,
) -> Vec<(usize, usize)> {
    let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
    for (oi, obj) in objects.iter().enumerate() {
        let (px, py) = obj.predicted_center();
        let gate = gate_for(obj, dt);
        for (di, det) in detections.iter().enumerate() {
            if det.class_name != obj.class_name {
                continue;
            }
            let dx = det.rect.cx - px;
            let dy = det.rect.cy - py;
            let cost = (dx * dx + dy * dy).sqrt();
            if cost <= gate {
                candidates.push((cost, oi, di));
            }
        }
    }

    candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).expect("costs are finite"));

    let mut object_used = vec![false; objects.len()];
    let mut detection_used = vec![false; detections.len()];
    let mut pairs = Vec::new();
    for (_cost, oi, di) in candidates {
        if object_used[oi] || detection_used[di] {
            continue;
        }
        object_used[oi] = true;
        detection_used[di] = true;
        pairs.push((oi, di));
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use osprey_types::{PixelRect, Priority, TrackerConfig};
    use std::time::Instant;

    fn det(cx: f64, cy: f64) -> Detection {
        Detection {
            rect: PixelRect::new(cx, cy, 120.0, 80.0),
            class_name: "boat".into(),
            confidence: 0.5,
            priority: Priority::P1,
        }
    }

    fn obj(cx: f64, cy: f64, id: &str) -> TrackedObject {
        TrackedObject::birth(
            id.into(),
            &det(cx, cy),
            0,
            &TrackerConfig::default(),
            Instant::now(),
        )
    }

    #[test]
    fn nearest_detection_wins() {
        let objects = vec![obj(100.0, 100.0, "a"), obj(500.0, 100.0, "b")];
        let detections = vec![det(510.0, 105.0), det(95.0, 98.0)];
        let mut pairs = associate_greedy(&objects, &detections, 1.0 / 30.0);
        pairs.sort();
        assert_eq!(pairs, vec![(0, 1), (1, 0)]);
    }

    #[test]
    fn distant_detection_is_gated_out() {
        let objects = vec![obj(100.0, 100.0, "a")];
        let detections = vec![det(2000.0, 1000.0)];
        assert!(associate_greedy(&objects, &detections, 1.0 / 30.0).is_empty());
    }

    #[test]
    fn one_to_one_even_with_two_close_detections() {
        let objects = vec![obj(100.0, 100.0, "a")];
        let detections = vec![det(102.0, 100.0), det(110.0, 100.0)];
        let pairs = associate_greedy(&objects, &detections, 1.0 / 30.0);
        assert_eq!(pairs, vec![(0, 0)]);
    }

    #[test]
    fn class_mismatch_never_associates() {
        let objects = vec![obj(100.0, 100.0, "a")];
        let mut d = det(100.0, 100.0);
        d.class_name = "person".into();
        assert!(associate_greedy(&objects, &[d], 1.0 / 30.0).is_empty());
    }
}
