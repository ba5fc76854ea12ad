//! Decoded inbound robot messages
use serde::{Deserialize, Serialize};

/// Per-step dispensing status as reported by the robot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// Command frame sent, station not started yet
    Sent,
    Processing,
    Complete,
    Failed,
    /// Reserved; no inbound frame maps to it
    Unknown,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Sent => "sent",
            StepStatus::Processing => "processing",
            StepStatus::Complete => "complete",
            StepStatus::Failed => "failed",
            StepStatus::Unknown => "unknown",
        }
    }
}

/// One classified inbound frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// `$0=<text>`
    TextStatus(String),
    /// `$1=1` / `$1=0`
    CupStatus(bool),
    /// `W<step>=<float>;`
    WeightUpdate { step: usize, weight: f64 },
    /// `S<step>=<P|C|other>;`
    StateUpdate { step: usize, status: StepStatus },
    /// Well-formed system frame with a type this client does not know
    Unknown(String),
}

impl Message {
    /// Step index for step-level messages
    pub fn step(&self) -> Option<usize> {
        match self {
            Message::WeightUpdate { step, .. } | Message::StateUpdate { step, .. } => Some(*step),
            _ => None,
        }
    }
}
