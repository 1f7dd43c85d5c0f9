use serde::{Deserialize, Serialize};

use crate::ptz::{PtzPose, SoftLimits};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("TOML deserialization error: {source}")]
    TomlDe {
        #[from]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

type Result<T> = std::result::Result<T, ConfigError>;

/// A class-label set: either an explicit list or the token `all`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassSet {
    Token(String),
    List(Vec<String>),
}

impl ClassSet {
    pub fn is_all(&self) -> bool {
        matches!(self, ClassSet::Token(t) if t == "all")
    }

    pub fn contains(&self, class_name: &str) -> bool {
        match self {
            ClassSet::Token(t) => t == "all",
            ClassSet::List(names) => names.iter().any(|n| n == class_name),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ClassSet::Token(t) => t != "all",
            ClassSet::List(names) => names.is_empty(),
        }
    }

    fn validate(&self, which: &str) -> Result<()> {
        if let ClassSet::Token(t) = self {
            if t != "all" {
                return Err(ConfigError::Invalid(format!(
                    "{which} must be a class list or the token \"all\", got \"{t}\""
                )));
            }
        }
        Ok(())
    }
}

fn default_cmd_cooldown_msec() -> u64 {
    150
}

fn default_poll_interval_msec() -> u64 {
    200
}

fn default_arrival_tolerance() -> f64 {
    1.0
}

fn default_http_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PtzConfig {
    /// Base URL of the camera's HTTP API, e.g. `http://192.168.1.64`.
    pub url: String,
    pub username: String,
    pub password: String,
    /// Pose taken before the pipeline goes live. Required: there is no
    /// sensible default for an installed camera.
    pub home_pose: PtzPose,
    #[serde(default)]
    pub soft_limits: SoftLimits,
    /// Minimum spacing between absolute-position commands.
    #[serde(default = "default_cmd_cooldown_msec")]
    pub cmd_cooldown_msec: u64,
    #[serde(default = "default_poll_interval_msec")]
    pub poll_interval_msec: u64,
    /// Per-axis arrival tolerance in motor units.
    #[serde(default = "default_arrival_tolerance")]
    pub arrival_tolerance: f64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_input_size() -> u32 {
    832
}

fn default_p1_min_conf() -> f32 {
    0.25
}

fn default_p2_min_conf() -> f32 {
    0.15
}

fn default_min_area() -> f64 {
    2000.0
}

fn default_min_p1_side() -> f64 {
    50.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectorConfig {
    /// Side length of the square detector input.
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    /// Text file with one class label per line (the 80-label vocabulary).
    pub class_names_path: std::path::PathBuf,
    /// Classes that can become targets, or `"all"`.
    pub p1_classes: ClassSet,
    /// Classes that refine a locked target's localization.
    #[serde(default = "empty_class_list")]
    pub p2_classes: ClassSet,
    #[serde(default = "default_p1_min_conf")]
    pub p1_min_conf: f32,
    #[serde(default = "default_p2_min_conf")]
    pub p2_min_conf: f32,
    /// Reject detections below this area, px^2.
    #[serde(default = "default_min_area")]
    pub min_area: f64,
    /// Reject P1 detections with a side at or below this, px.
    #[serde(default = "default_min_p1_side")]
    pub min_p1_side: f64,
}

fn empty_class_list() -> ClassSet {
    ClassSet::List(Vec::new())
}

fn default_recovery_horizon() -> u32 {
    30
}

fn default_locked_recovery_horizon() -> u32 {
    34
}

fn default_stability_window() -> u32 {
    8
}

fn default_history_len() -> usize {
    64
}

fn default_desired_zoom() -> f64 {
    30.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackerConfig {
    /// Frames a building object may go unmatched before it is destroyed.
    #[serde(default = "default_recovery_horizon")]
    pub recovery_horizon: u32,
    /// Loss threshold shared by locked and super-locked objects.
    #[serde(default = "default_locked_recovery_horizon")]
    pub locked_recovery_horizon: u32,
    /// Consecutive matched ticks required on top of the detection count
    /// before a locked object is promoted.
    #[serde(default = "default_stability_window")]
    pub stability_window: u32,
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    /// Zoom level commanded while pursuing a target.
    #[serde(default = "default_desired_zoom")]
    pub desired_zoom: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            recovery_horizon: default_recovery_horizon(),
            locked_recovery_horizon: default_locked_recovery_horizon(),
            stability_window: default_stability_window(),
            history_len: default_history_len(),
            desired_zoom: default_desired_zoom(),
        }
    }
}

fn default_queue_capacity() -> usize {
    120
}

fn default_reorder_timeout_frames() -> u64 {
    15
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncoderConfig {
    /// Encoder command line. `{width}` and `{height}` are substituted before
    /// spawn; the subprocess must read raw BGR24 frames on stdin.
    pub command: Vec<String>,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How many frames a missing sequence may age before the writer skips it.
    #[serde(default = "default_reorder_timeout_frames")]
    pub reorder_timeout_frames: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// End the run successfully as soon as the first object locks. Used by
    /// integration smoke tests.
    #[serde(default)]
    pub exit_on_first_track: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            exit_on_first_track: false,
        }
    }
}

/// One row of the zoom calibration table as it appears in the config file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalibrationPointConfig {
    pub zoom: f64,
    pub pan_px_per_unit: f64,
    pub tilt_px_per_unit: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OspreyConfig {
    /// RTSP source URL, credentials embedded.
    pub rtsp_url: String,
    /// Optional log file, in addition to console logging.
    #[serde(default)]
    pub log_file: Option<std::path::PathBuf>,
    pub ptz: PtzConfig,
    pub detector: DetectorConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Zoom-ordered calibration table; at least two rows.
    pub calibration: Vec<CalibrationPointConfig>,
}

impl OspreyConfig {
    fn validate(&self) -> Result<()> {
        self.detector.p1_classes.validate("p1_classes")?;
        self.detector.p2_classes.validate("p2_classes")?;
        if self.detector.p1_classes.is_all() && !self.detector.p2_classes.is_empty() {
            return Err(ConfigError::Invalid(
                "p2_classes must be empty when p1_classes is \"all\"".into(),
            ));
        }
        if self.detector.p1_classes.is_empty() {
            return Err(ConfigError::Invalid("p1_classes is empty".into()));
        }
        if self.calibration.len() < 2 {
            return Err(ConfigError::Invalid(
                "calibration table needs at least two rows".into(),
            ));
        }
        if self.encoder.command.is_empty() {
            return Err(ConfigError::Invalid("encoder command is empty".into()));
        }
        Ok(())
    }
}

/// Read and validate a TOML config file.
pub fn parse_config_file<P: AsRef<std::path::Path>>(path: P) -> Result<OspreyConfig> {
    let contents = std::fs::read_to_string(path)?;
    let mut cfg: OspreyConfig = toml::from_str(&contents)?;
    cfg.ptz.soft_limits = cfg.ptz.soft_limits.intersect_hardware();
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
rtsp_url = "rtsp://admin:pw@10.0.0.5:554/Streaming/Channels/101"

[ptz]
url = "http://10.0.0.5"
username = "admin"
password = "pw"
home_pose = { pan = 1800.0, tilt = 450.0, zoom = 30.0 }

[detector]
class_names_path = "coco.names"
p1_classes = ["boat"]
p2_classes = ["person"]

[encoder]
command = ["ffmpeg", "-f", "rawvideo", "-pix_fmt", "bgr24", "-s", "{width}x{height}", "-i", "-", "out.mp4"]

[[calibration]]
zoom = 10.0
pan_px_per_unit = -1.6
tilt_px_per_unit = -1.6

[[calibration]]
zoom = 120.0
pan_px_per_unit = -19.0
tilt_px_per_unit = -19.0
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_parses_with_defaults() {
        let f = write_config(MINIMAL);
        let cfg = parse_config_file(f.path()).unwrap();
        assert_eq!(cfg.detector.input_size, 832);
        assert_eq!(cfg.detector.p1_min_conf, 0.25);
        assert_eq!(cfg.detector.p2_min_conf, 0.15);
        assert_eq!(cfg.pipeline.queue_capacity, 120);
        assert_eq!(cfg.encoder.reorder_timeout_frames, 15);
        assert!(!cfg.pipeline.exit_on_first_track);
        assert!(cfg.detector.p1_classes.contains("boat"));
        assert!(!cfg.detector.p1_classes.contains("person"));
    }

    #[test]
    fn all_token_accepted_for_p1() {
        let contents = MINIMAL
            .replace("p1_classes = [\"boat\"]", "p1_classes = \"all\"")
            .replace("p2_classes = [\"person\"]", "p2_classes = []");
        let f = write_config(&contents);
        let cfg = parse_config_file(f.path()).unwrap();
        assert!(cfg.detector.p1_classes.is_all());
        assert!(cfg.detector.p1_classes.contains("giraffe"));
    }

    #[test]
    fn all_p1_with_nonempty_p2_rejected() {
        let contents = MINIMAL.replace("p1_classes = [\"boat\"]", "p1_classes = \"all\"");
        let f = write_config(&contents);
        assert!(matches!(
            parse_config_file(f.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn bad_token_rejected() {
        let contents = MINIMAL.replace("p1_classes = [\"boat\"]", "p1_classes = \"any\"");
        let f = write_config(&contents);
        assert!(parse_config_file(f.path()).is_err());
    }

    #[test]
    fn unknown_field_rejected() {
        let contents = format!("{MINIMAL}\nbogus_field = 1\n");
        let f = write_config(&contents);
        assert!(matches!(
            parse_config_file(f.path()),
            Err(ConfigError::TomlDe { .. })
        ));
    }
}
