//! Absolute-position PTZ control for ISAPI cameras.
//!
//! One worker task owns the HTTP session and the camera state machine. The
//! rest of the pipeline talks to it through a [`PtzHandle`]: submit commands,
//! read the cached pose and motion state, register arrival callbacks.

mod client;
mod state;
mod worker;

pub use client::{absolute_body, parse_status_xml, IsapiClient};
pub use state::{CameraStateMachine, PollOutcome};
pub use worker::{start, PtzHandle};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("http error: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },
    #[error("digest auth error: {0}")]
    DigestAuth(String),
    #[error("camera rejected request with status {0}")]
    Status(reqwest::StatusCode),
    #[error("camera requires auth but sent no digest challenge")]
    MissingChallenge,
    #[error("status XML error: {source}")]
    Xml {
        #[from]
        source: serde_xml_rs::Error,
    },
    #[error("transport failed after {0} attempts")]
    RetriesExhausted(u32),
}

pub type Result<T> = std::result::Result<T, Error>;
