pub mod controller;
pub mod job;
pub mod manager;
pub mod models;
pub mod status;

pub use controller::{Action, SessionController};
pub use job::{DropReason, JobProgressTracker, UpdateOutcome};
pub use manager::SessionManager;
pub use models::*;
pub use status::SystemStatusTracker;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Robot not connected")]
    NotConnected,

    #[error("Robot channel not ready for commands")]
    NotReady,

    #[error("A job is already dispensing")]
    JobInProgress,

    #[error("Invalid drink: {0}")]
    InvalidDrink(String),

    #[error("Transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
