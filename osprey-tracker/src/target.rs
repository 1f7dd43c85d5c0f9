use crate::tracked_object::TrackedObject;

fn score(obj: &TrackedObject) -> f64 {
    let count_term = 0.5 * ((obj.detection_count as f64 / 24.0).min(1.0));
    let p2_term = if obj.p2_inside.is_empty() { 0.0 } else { 0.7 };
    obj.confidence as f64 + count_term + p2_term - 0.01 * obj.lost_frames as f64
}

/// Pick the primary target among locked objects.
///
/// Only locked and super-locked objects can steer the camera. Ties go to the
/// oldest object so the target does not flap between near-equal candidates.
pub fn select_target(objects: &[TrackedObject]) -> Option<usize> {
    objects
        .iter()
        .enumerate()
        .filter(|(_, o)| o.lock_state.is_locked())
        .max_by(|(_, a), (_, b)| {
            score(a)
                .partial_cmp(&score(b))
                .expect("scores are finite")
                // On equal score the smaller birth_seq must win the max.
                .then(b.birth_seq.cmp(&a.birth_seq))
        })
        .map(|(i, _)| i)
}
