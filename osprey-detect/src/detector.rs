use std::collections::VecDeque;

use tracing::info;

use crate::letterbox::LetterboxImage;
use crate::Result;

/// One raw detection as reported by a backend: a box normalized to the
/// square letterbox canvas, a class index into the vocabulary, and a score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub class_idx: usize,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub confidence: f32,
}

impl RawDetection {
    /// Backend output sanity: indices are checked against the vocabulary by
    /// the stage; here we reject non-finite or out-of-band geometry.
    pub fn is_well_formed(&self) -> bool {
        let coords = [self.x, self.y, self.w, self.h];
        coords.iter().all(|v| v.is_finite() && (-0.5..=1.5).contains(v))
            && self.confidence.is_finite()
            && (0.0..=1.0).contains(&self.confidence)
    }
}

#[derive(Debug, Clone)]
pub struct DetectorInfo {
    pub name: String,
    pub input_size: u32,
}

/// Capability interface over detector backends (GPU vs CPU, model formats).
/// Selection happens once at startup based on a probe.
pub trait Detector: Send {
    fn detect(&mut self, image: &LetterboxImage) -> Result<Vec<RawDetection>>;
    fn info(&self) -> DetectorInfo;
}

/// Backend that never detects anything. Stands in when no real backend is
/// linked; the pipeline runs end to end and simply never locks a target.
pub struct NullDetector {
    input_size: u32,
}

impl NullDetector {
    pub fn new(input_size: u32) -> Self {
        Self { input_size }
    }
}

impl Detector for NullDetector {
    fn detect(&mut self, _image: &LetterboxImage) -> Result<Vec<RawDetection>> {
        Ok(Vec::new())
    }

    fn info(&self) -> DetectorInfo {
        DetectorInfo {
            name: "null".into(),
            input_size: self.input_size,
        }
    }
}

/// Backend that replays a scripted sequence of detection lists, one list per
/// frame. Used by tests and by the startup probe.
pub struct ScriptedDetector {
    input_size: u32,
    script: VecDeque<Vec<RawDetection>>,
}

impl ScriptedDetector {
    pub fn new(input_size: u32, script: Vec<Vec<RawDetection>>) -> Self {
        Self {
            input_size,
            script: script.into(),
        }
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, _image: &LetterboxImage) -> Result<Vec<RawDetection>> {
        Ok(self.script.pop_front().unwrap_or_default())
    }

    fn info(&self) -> DetectorInfo {
        DetectorInfo {
            name: "scripted".into(),
            input_size: self.input_size,
        }
    }
}

/// Probe available backends and pick one. External backends register by
/// handing in a constructed instance; with none available the null backend
/// keeps the pipeline alive.
pub fn select_detector(
    external: Option<Box<dyn Detector>>,
    input_size: u32,
) -> Box<dyn Detector> {
    match external {
        Some(d) => {
            info!(backend = %d.info().name, "selected detector backend");
            d
        }
        None => {
            info!("no detector backend available, using null backend");
            Box::new(NullDetector::new(input_size))
        }
    }
}
