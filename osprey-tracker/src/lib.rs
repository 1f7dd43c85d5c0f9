//! Multi-object spatial tracker.
//!
//! Maintains stable identities for detected objects across frames and across
//! camera motion, promotes them through the lock state machine, selects the
//! primary target, and converts its image position into an absolute PTZ pose
//! proposal.

mod association;
mod convert;
mod object_id;
mod overlay;
mod snapshot;
mod target;
mod tracked_object;
mod tracker;

pub use association::associate_greedy;
pub use convert::propose_pose;
pub use object_id::ObjectIdGenerator;
pub use overlay::{compose_overlay, BoxRenderer, OverlayBox, OverlayPlan, OverlayRenderer};
pub use snapshot::{ObjectSnapshot, TrackerSnapshot};
pub use target::select_target;
pub use tracked_object::{LockState, TrackedObject};
pub use tracker::{SpatialTracker, TickInput, TickOutcome};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Frames must arrive in capture order; anything else is a violated
    /// pipeline invariant and fatal for the process.
    #[error("out-of-order frame: last seq {last}, got {got}")]
    OutOfOrderFrame { last: u64, got: u64 },
    #[error("{source}")]
    Kalman {
        #[from]
        source: motion_models::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
