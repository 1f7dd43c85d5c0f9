//! Motion and observation models for Kalman filtering of image-plane tracks.
//!
//! The state vector is `[x y xvel yvel]` in pixels and pixels/second.

pub mod motion_model_2d;
pub mod observation_model_2d;
mod position_filter;

pub use position_filter::{FilterParams, PositionFilter};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("covariance update failed: {0}")]
    CovarianceUpdate(String),
}

pub type Result<T> = std::result::Result<T, Error>;
