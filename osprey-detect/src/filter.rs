use osprey_types::{Detection, DetectorConfig, PixelRect, Priority};

/// What the tracker currently holds locked, as needed by the P2 gate.
#[derive(Debug, Clone, Default)]
pub struct LockContext {
    pub locked_boxes: Vec<PixelRect>,
}

impl LockContext {
    pub fn any_locked(&self) -> bool {
        !self.locked_boxes.is_empty()
    }

    fn covers(&self, rect: &PixelRect) -> bool {
        self.locked_boxes.iter().any(|b| b.contains_center_of(rect))
    }
}

/// Assigns P1/P2 priorities and applies size and confidence gates.
#[derive(Debug, Clone)]
pub struct PriorityFilter {
    cfg: DetectorConfig,
}

impl PriorityFilter {
    pub fn new(cfg: DetectorConfig) -> Self {
        Self { cfg }
    }

    /// Classify one inverted detection. Returns `None` when it is rejected.
    pub fn assign(
        &self,
        rect: PixelRect,
        class_name: &str,
        confidence: f32,
        lock: &LockContext,
    ) -> Option<Detection> {
        if rect.area() < self.cfg.min_area {
            return None;
        }

        if self.cfg.p1_classes.contains(class_name) {
            if confidence < self.cfg.p1_min_conf {
                return None;
            }
            // Far-background false positives are tiny on at least one side.
            if rect.width <= self.cfg.min_p1_side || rect.height <= self.cfg.min_p1_side {
                return None;
            }
            return Some(Detection {
                rect,
                class_name: class_name.to_string(),
                confidence,
                priority: Priority::P1,
            });
        }

        if self.cfg.p2_classes.contains(class_name) {
            if confidence < self.cfg.p2_min_conf {
                return None;
            }
            // P2 only refines an existing locked target.
            if !lock.any_locked() || !lock.covers(&rect) {
                return None;
            }
            return Some(Detection {
                rect,
                class_name: class_name.to_string(),
                confidence,
                priority: Priority::P2,
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osprey_types::ClassSet;

    fn config() -> DetectorConfig {
        DetectorConfig {
            input_size: 832,
            class_names_path: "coco.names".into(),
            p1_classes: ClassSet::List(vec!["boat".into()]),
            p2_classes: ClassSet::List(vec!["person".into()]),
            p1_min_conf: 0.25,
            p2_min_conf: 0.15,
            min_area: 2000.0,
            min_p1_side: 50.0,
        }
    }

    fn big_rect() -> PixelRect {
        PixelRect::new(1000.0, 500.0, 120.0, 80.0)
    }

    #[test]
    fn p1_below_threshold_and_p2_without_lock_are_rejected() {
        let filter = PriorityFilter::new(config());
        let lock = LockContext::default();

        // boat at 0.20 is below p1_min_conf.
        assert!(filter.assign(big_rect(), "boat", 0.20, &lock).is_none());
        // person at 0.50 is P2 but nothing is locked.
        assert!(filter.assign(big_rect(), "person", 0.50, &lock).is_none());
    }

    #[test]
    fn p1_above_threshold_is_accepted() {
        let filter = PriorityFilter::new(config());
        let det = filter
            .assign(big_rect(), "boat", 0.4, &LockContext::default())
            .unwrap();
        assert_eq!(det.priority, Priority::P1);
        assert_eq!(det.class_name, "boat");
    }

    #[test]
    fn p2_inside_locked_box_is_accepted() {
        let filter = PriorityFilter::new(config());
        let lock = LockContext {
            locked_boxes: vec![PixelRect::new(1000.0, 500.0, 400.0, 300.0)],
        };
        let inside = PixelRect::new(1010.0, 510.0, 60.0, 60.0);
        let det = filter.assign(inside, "person", 0.5, &lock).unwrap();
        assert_eq!(det.priority, Priority::P2);

        let outside = PixelRect::new(2000.0, 500.0, 60.0, 60.0);
        assert!(filter.assign(outside, "person", 0.5, &lock).is_none());
    }

    #[test]
    fn small_area_rejected_for_both_priorities() {
        let filter = PriorityFilter::new(config());
        let tiny = PixelRect::new(10.0, 10.0, 40.0, 40.0); // 1600 px^2
        assert!(filter
            .assign(tiny, "boat", 0.9, &LockContext::default())
            .is_none());
    }

    #[test]
    fn thin_p1_rejected() {
        let filter = PriorityFilter::new(config());
        // Large area but one side at the 50 px gate.
        let thin = PixelRect::new(100.0, 100.0, 50.0, 200.0);
        assert!(filter
            .assign(thin, "boat", 0.9, &LockContext::default())
            .is_none());
    }

    #[test]
    fn unknown_class_rejected() {
        let filter = PriorityFilter::new(config());
        assert!(filter
            .assign(big_rect(), "giraffe", 0.9, &LockContext::default())
            .is_none());
    }
}
