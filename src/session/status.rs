use chrono::Utc;

use super::models::{CupPresence, SystemStatus};

/// Holds the robot's free-text status and cup sensor reading
#[derive(Debug, Default)]
pub struct SystemStatusTracker {
    status: SystemStatus,
}

impl SystemStatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_text_status(&mut self, text: &str) {
        log::info!("Robot status: {}", text);
        self.status = SystemStatus {
            text: Some(text.to_string()),
            updated_at: Some(Utc::now()),
            ..self.status.clone()
        };
    }

    pub fn apply_cup_status(&mut self, present: bool) {
        log::debug!("Cup present: {}", present);
        self.status = SystemStatus {
            cup: if present { CupPresence::Present } else { CupPresence::Absent },
            updated_at: Some(Utc::now()),
            ..self.status.clone()
        };
    }

    /// Forget everything reported so far; cup goes back to Unknown
    pub fn reset(&mut self) {
        self.status = SystemStatus::default();
    }

    pub fn status(&self) -> &SystemStatus {
        &self.status
    }
}
