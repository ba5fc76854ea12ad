pub mod codec;
pub mod types;

pub use codec::{decode, encode_cancel, encode_handshake, encode_job, parse_job_frame};
pub use types::{Message, StepStatus};

/// Outbound handshake frame, sent once per connection when the channel becomes writable
pub const HANDSHAKE_FRAME: &str = "ehlo";
/// Outbound cancel frame
pub const CANCEL_FRAME: &str = "C!";
/// Prefix of the outbound dispense command
pub const JOB_PREFIX: &str = "D:";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed frame {frame:?}: {reason}")]
    Malformed { frame: String, reason: &'static str },

    #[error("Invalid job frame: {0}")]
    InvalidJobFrame(String),
}

impl ProtocolError {
    pub(crate) fn malformed(frame: &str, reason: &'static str) -> Self {
        ProtocolError::Malformed { frame: frame.to_string(), reason }
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
