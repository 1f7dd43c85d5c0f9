use serde::{Deserialize, Serialize};

/// Hardware pan range in motor units (0.1 degree steps on ISAPI cameras).
pub const PAN_RANGE: (f64, f64) = (0.0, 3599.0);
/// Hardware tilt range in motor units.
pub const TILT_RANGE: (f64, f64) = (0.0, 900.0);
/// Hardware zoom range in motor units.
pub const ZOOM_RANGE: (f64, f64) = (10.0, 120.0);

/// An absolute camera pose in native motor units.
///
/// Stored as `f64` so intermediate math keeps sub-unit precision; the wire
/// protocol and all equality checks use the integer-rounded value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PtzPose {
    pub pan: f64,
    pub tilt: f64,
    pub zoom: f64,
}

impl PtzPose {
    pub fn new(pan: f64, tilt: f64, zoom: f64) -> Self {
        Self { pan, tilt, zoom }
    }

    /// Round each axis to the integer motor unit actually sent on the wire.
    pub fn quantize(&self) -> PtzPose {
        PtzPose {
            pan: self.pan.round(),
            tilt: self.tilt.round(),
            zoom: self.zoom.round(),
        }
    }

    /// Pose equality by integer rounding.
    pub fn same_position(&self, other: &PtzPose) -> bool {
        let a = self.quantize();
        let b = other.quantize();
        a.pan == b.pan && a.tilt == b.tilt && a.zoom == b.zoom
    }

    /// True when every axis is within `tol` motor units of `other`.
    pub fn within(&self, other: &PtzPose, tol: f64) -> bool {
        (self.pan - other.pan).abs() <= tol
            && (self.tilt - other.tilt).abs() <= tol
            && (self.zoom - other.zoom).abs() <= tol
    }
}

impl std::fmt::Display for PtzPose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(pan {}, tilt {}, zoom {})",
            self.pan.round(),
            self.tilt.round(),
            self.zoom.round()
        )
    }
}

/// A command to the PTZ worker.
#[derive(Debug, Clone)]
pub enum PtzCommand {
    /// Move to an absolute pose. `reason` is free text for the log.
    AbsolutePosition { target: PtzPose, reason: String },
    /// Halt motion at the current pose.
    Stop,
    /// Return to the configured home pose.
    Recenter,
}

/// What the camera is currently doing, as seen by the rest of the pipeline.
///
/// `Arrived` is transient: the state machine fires callbacks and collapses to
/// `Idle` within the same poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMotion {
    Idle,
    Moving,
    Arrived,
}

/// User-configured motion limits, always intersected with hardware limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoftLimits {
    pub min_pan: f64,
    pub max_pan: f64,
    pub min_tilt: f64,
    pub max_tilt: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

impl Default for SoftLimits {
    fn default() -> Self {
        Self {
            min_pan: PAN_RANGE.0,
            max_pan: PAN_RANGE.1,
            min_tilt: TILT_RANGE.0,
            max_tilt: TILT_RANGE.1,
            min_zoom: ZOOM_RANGE.0,
            max_zoom: ZOOM_RANGE.1,
        }
    }
}

impl SoftLimits {
    /// Clamp every bound into the hardware range, preserving the invariant
    /// `soft_min >= hard_min` and `soft_max <= hard_max` on each axis.
    pub fn intersect_hardware(mut self) -> Self {
        self.min_pan = self.min_pan.clamp(PAN_RANGE.0, PAN_RANGE.1);
        self.max_pan = self.max_pan.clamp(PAN_RANGE.0, PAN_RANGE.1);
        self.min_tilt = self.min_tilt.clamp(TILT_RANGE.0, TILT_RANGE.1);
        self.max_tilt = self.max_tilt.clamp(TILT_RANGE.0, TILT_RANGE.1);
        self.min_zoom = self.min_zoom.clamp(ZOOM_RANGE.0, ZOOM_RANGE.1);
        self.max_zoom = self.max_zoom.clamp(ZOOM_RANGE.0, ZOOM_RANGE.1);
        self
    }

    pub fn clamp_pose(&self, pose: PtzPose) -> PtzPose {
        PtzPose {
            pan: pose.pan.clamp(self.min_pan, self.max_pan),
            tilt: pose.tilt.clamp(self.min_tilt, self.max_tilt),
            zoom: pose.zoom.clamp(self.min_zoom, self.max_zoom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pose_equality_is_by_rounding() {
        let a = PtzPose::new(100.4, 50.0, 20.0);
        let b = PtzPose::new(100.0, 50.3, 19.7);
        assert!(a.same_position(&b));
        let c = PtzPose::new(101.0, 50.0, 20.0);
        assert!(!a.same_position(&c));
    }

    #[test]
    fn soft_limits_clamped_by_hardware() {
        let limits = SoftLimits {
            min_pan: -100.0,
            max_pan: 9000.0,
            min_tilt: 0.0,
            max_tilt: 2000.0,
            min_zoom: 0.0,
            max_zoom: 500.0,
        }
        .intersect_hardware();
        assert_eq!(limits.min_pan, PAN_RANGE.0);
        assert_eq!(limits.max_pan, PAN_RANGE.1);
        assert_eq!(limits.max_tilt, TILT_RANGE.1);
        assert_eq!(limits.min_zoom, ZOOM_RANGE.0);
        assert_eq!(limits.max_zoom, ZOOM_RANGE.1);
    }

    #[test]
    fn clamp_pose_applies_soft_limits() {
        let limits = SoftLimits {
            max_pan: 2000.0,
            ..SoftLimits::default()
        };
        let clamped = limits.clamp_pose(PtzPose::new(2300.0, 450.0, 30.0));
        assert_eq!(clamped.pan, 2000.0);
        assert_eq!(clamped.tilt, 450.0);
    }
}
