//! Detector wrapper stage.
//!
//! The neural detector itself is an external collaborator behind the
//! [`Detector`] trait. This crate owns everything around it: letterbox
//! geometry and its inversion back to original-frame pixels, the class
//! vocabulary, and the P1/P2 priority filter.

mod classes;
mod detector;
mod filter;
mod letterbox;
mod stage;

pub use classes::ClassVocabulary;
pub use detector::{
    select_detector, Detector, DetectorInfo, NullDetector, RawDetection, ScriptedDetector,
};
pub use filter::{LockContext, PriorityFilter};
pub use letterbox::{letterbox_bgr, LetterboxGeometry, LetterboxImage};
pub use stage::DetectionStage;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("class vocabulary file is empty")]
    EmptyVocabulary,
    #[error("detector backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, Error>;
