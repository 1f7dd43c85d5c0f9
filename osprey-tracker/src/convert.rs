use osprey_types::{PtzPose, SoftLimits};
use zoom_calib::CalibrationTable;

/// Convert a target's image center into an absolute pose proposal.
///
/// The calibration ratios are signed pixels-per-motor-unit, so dividing the
/// pixel offset by the ratio yields a signed motor delta with the camera's
/// axis convention already applied.
///
/// Returns `None` when the quantized proposal equals the current quantized
/// pose on every axis: a zero integer delta is not worth a command.
pub fn propose_pose(
    target_px: (f64, f64),
    frame_dims: (u32, u32),
    current: &PtzPose,
    desired_zoom: f64,
    calib: &CalibrationTable,
    limits: &SoftLimits,
) -> Option<PtzPose> {
    let (cx, cy) = target_px;
    let (w, h) = frame_dims;
    let ratios = calib.ratios_at(current.zoom);

    let dpan = (cx - w as f64 / 2.0) / ratios.pan_px_per_unit;
    let dtilt = (cy - h as f64 / 2.0) / ratios.tilt_px_per_unit;

    let proposal = limits
        .clamp_pose(PtzPose::new(
            current.pan + dpan,
            current.tilt + dtilt,
            desired_zoom,
        ))
        .quantize();

    if proposal.same_position(current) {
        None
    } else {
        Some(proposal)
    }
}
