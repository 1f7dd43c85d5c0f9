//! Zoom-indexed calibration: how many image pixels one PTZ motor unit moves.
//!
//! The table is sparse (tens of entries), strictly increasing in zoom, and
//! immutable after load. Ratios are signed; the sign encodes the axis
//! convention of the camera and is preserved by interpolation.

use serde::{Deserialize, Serialize};

use osprey_types::CalibrationPointConfig;

#[derive(thiserror::Error, Debug)]
pub enum CalibError {
    #[error("calibration table needs at least two points, got {0}")]
    TooFewPoints(usize),
    #[error("calibration zooms must be strictly increasing (row {0})")]
    NonMonotonicZoom(usize),
    #[error("calibration ratio must be nonzero (row {0})")]
    ZeroRatio(usize),
}

/// One calibration sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub zoom: f64,
    pub pan_px_per_unit: f64,
    pub tilt_px_per_unit: f64,
}

impl From<CalibrationPointConfig> for CalibrationPoint {
    fn from(c: CalibrationPointConfig) -> Self {
        Self {
            zoom: c.zoom,
            pan_px_per_unit: c.pan_px_per_unit,
            tilt_px_per_unit: c.tilt_px_per_unit,
        }
    }
}

/// Interpolated ratios at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRatios {
    pub pan_px_per_unit: f64,
    pub tilt_px_per_unit: f64,
}

/// The loaded table. Lookup clamps to the endpoint range and linearly
/// interpolates between the two bracketing entries.
#[derive(Debug, Clone)]
pub struct CalibrationTable {
    points: Vec<CalibrationPoint>,
}

impl CalibrationTable {
    pub fn new(points: Vec<CalibrationPoint>) -> Result<Self, CalibError> {
        if points.len() < 2 {
            return Err(CalibError::TooFewPoints(points.len()));
        }
        for (i, pair) in points.windows(2).enumerate() {
            if pair[1].zoom <= pair[0].zoom {
                return Err(CalibError::NonMonotonicZoom(i + 1));
            }
        }
        for (i, p) in points.iter().enumerate() {
            if p.pan_px_per_unit == 0.0 || p.tilt_px_per_unit == 0.0 {
                return Err(CalibError::ZeroRatio(i));
            }
        }
        Ok(Self { points })
    }

    pub fn from_config(rows: &[CalibrationPointConfig]) -> Result<Self, CalibError> {
        Self::new(rows.iter().copied().map(Into::into).collect())
    }

    /// Ratios at `zoom`. Out-of-range zooms saturate at the endpoints.
    pub fn ratios_at(&self, zoom: f64) -> PixelRatios {
        let first = self.points.first().expect("validated nonempty");
        let last = self.points.last().expect("validated nonempty");
        let zoom = zoom.clamp(first.zoom, last.zoom);

        // Linear scan; the table has tens of entries.
        for pair in self.points.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if zoom <= b.zoom {
                let t = (zoom - a.zoom) / (b.zoom - a.zoom);
                return PixelRatios {
                    pan_px_per_unit: a.pan_px_per_unit + t * (b.pan_px_per_unit - a.pan_px_per_unit),
                    tilt_px_per_unit: a.tilt_px_per_unit
                        + t * (b.tilt_px_per_unit - a.tilt_px_per_unit),
                };
            }
        }
        PixelRatios {
            pan_px_per_unit: last.pan_px_per_unit,
            tilt_px_per_unit: last.tilt_px_per_unit,
        }
    }
}
