use tracing::{debug, warn};

use osprey_types::{Detection, RawFrame};

use crate::classes::ClassVocabulary;
use crate::detector::Detector;
use crate::filter::{LockContext, PriorityFilter};
use crate::letterbox::{letterbox_bgr, LetterboxGeometry};

/// The per-frame detection stage: letterbox, invoke the backend, invert
/// coordinates, look up class names, and apply the priority filter.
pub struct DetectionStage {
    detector: Box<dyn Detector>,
    vocab: ClassVocabulary,
    filter: PriorityFilter,
    input_size: u32,
    malformed_frames: u64,
}

impl DetectionStage {
    pub fn new(
        detector: Box<dyn Detector>,
        vocab: ClassVocabulary,
        filter: PriorityFilter,
        input_size: u32,
    ) -> Self {
        Self {
            detector,
            vocab,
            filter,
            input_size,
            malformed_frames: 0,
        }
    }

    /// Frames on which the backend produced malformed output. Those frames
    /// contribute no detections; the tracker simply sees an empty tick.
    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames
    }

    pub fn geometry_for(&self, frame: &RawFrame) -> LetterboxGeometry {
        LetterboxGeometry::new(frame.width(), frame.height(), self.input_size)
    }

    pub fn process(&mut self, frame: &RawFrame, lock: &LockContext) -> Vec<Detection> {
        let image = letterbox_bgr(
            frame.data(),
            frame.width(),
            frame.height(),
            self.input_size,
        );

        let raw = match self.detector.detect(&image) {
            Ok(raw) => raw,
            Err(e) => {
                self.malformed_frames += 1;
                warn!(seq = frame.seq, "detector backend failed: {e}");
                return Vec::new();
            }
        };

        // Malformed output drops the whole frame.
        if raw
            .iter()
            .any(|d| !d.is_well_formed() || self.vocab.get(d.class_idx).is_none())
        {
            self.malformed_frames += 1;
            warn!(seq = frame.seq, "malformed detector output, dropping frame");
            return Vec::new();
        }

        let mut out = Vec::new();
        for d in &raw {
            let rect = image.geometry.invert(d.x, d.y, d.w, d.h);
            let class_name = self.vocab.get(d.class_idx).expect("checked above");
            if let Some(det) = self.filter.assign(rect, class_name, d.confidence, lock) {
                out.push(det);
            }
        }
        debug!(
            seq = frame.seq,
            raw = raw.len(),
            kept = out.len(),
            "detection tick"
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{RawDetection, ScriptedDetector};
    use osprey_types::{ClassSet, DetectorConfig, FramePool, Priority};
    use std::time::Instant;

    fn frame(pool: &FramePool, seq: u64) -> RawFrame {
        RawFrame::new(seq, Instant::now(), 64, 36, pool.take().unwrap())
    }

    fn vocab() -> ClassVocabulary {
        ClassVocabulary::from_names(vec!["person".into(), "boat".into()])
    }

    fn filter() -> PriorityFilter {
        PriorityFilter::new(DetectorConfig {
            input_size: 64,
            class_names_path: "coco.names".into(),
            p1_classes: ClassSet::List(vec!["boat".into()]),
            p2_classes: ClassSet::List(vec!["person".into()]),
            p1_min_conf: 0.25,
            p2_min_conf: 0.15,
            min_area: 10.0,
            min_p1_side: 2.0,
        })
    }

    #[test]
    fn detections_are_inverted_and_filtered() {
        let pool = FramePool::new(1, 64 * 36 * 3);
        let script = vec![vec![RawDetection {
            class_idx: 1,
            x: 0.5,
            y: 0.5,
            w: 0.2,
            h: 0.2,
            confidence: 0.8,
        }]];
        let mut stage = DetectionStage::new(
            Box::new(ScriptedDetector::new(64, script)),
            vocab(),
            filter(),
            64,
        );
        let dets = stage.process(&frame(&pool, 1), &LockContext::default());
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].priority, Priority::P1);
        // Center of canvas maps to center of frame.
        assert!((dets[0].rect.cx - 32.0).abs() < 1.0);
        assert!((dets[0].rect.cy - 18.0).abs() < 1.0);
    }

    #[test]
    fn malformed_output_drops_the_frame() {
        let pool = FramePool::new(1, 64 * 36 * 3);
        let script = vec![vec![
            RawDetection {
                class_idx: 1,
                x: 0.5,
                y: 0.5,
                w: 0.2,
                h: 0.2,
                confidence: 0.8,
            },
            RawDetection {
                class_idx: 99, // out of vocabulary
                x: 0.5,
                y: 0.5,
                w: 0.2,
                h: 0.2,
                confidence: 0.8,
            },
        ]];
        let mut stage = DetectionStage::new(
            Box::new(ScriptedDetector::new(64, script)),
            vocab(),
            filter(),
            64,
        );
        let dets = stage.process(&frame(&pool, 1), &LockContext::default());
        assert!(dets.is_empty());
        assert_eq!(stage.malformed_frames(), 1);
    }

    #[test]
    fn exhausted_script_yields_empty_ticks() {
        let pool = FramePool::new(1, 64 * 36 * 3);
        let mut stage = DetectionStage::new(
            Box::new(ScriptedDetector::new(64, vec![])),
            vocab(),
            filter(),
            64,
        );
        assert!(stage
            .process(&frame(&pool, 1), &LockContext::default())
            .is_empty());
        assert_eq!(stage.malformed_frames(), 0);
    }
}
