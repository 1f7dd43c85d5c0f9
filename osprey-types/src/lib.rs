//! Shared data model for the osprey pipeline.
//!
//! Everything that crosses a stage boundary lives here: frames, detections,
//! PTZ poses and commands, the runtime configuration, and the process-wide
//! shutdown flag.

mod config;
mod detection;
mod frame;
mod ptz;
mod shutdown;

pub use config::{
    parse_config_file, CalibrationPointConfig, ClassSet, ConfigError, DetectorConfig,
    EncoderConfig, OspreyConfig, PipelineConfig, PtzConfig, TrackerConfig,
};
pub use detection::{Detection, PixelRect, Priority};
pub use frame::{FrameBuf, FramePool, RawFrame};
pub use ptz::{
    CameraMotion, PtzCommand, PtzPose, SoftLimits, PAN_RANGE, TILT_RANGE, ZOOM_RANGE,
};
pub use shutdown::{FatalReason, ShutdownFlag};
