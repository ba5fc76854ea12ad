use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Result, SessionError};
use crate::protocol::StepStatus;

/// One component of a drink, poured from a single station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: Uuid,
    pub name: String,
    pub station_id: u32,
    /// Share of the drink's total quantity, 0-100
    pub percent: f64,
}

impl Ingredient {
    pub fn new(name: impl Into<String>, station_id: u32, percent: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            station_id,
            percent,
        }
    }
}

/// A drink recipe. Ingredient order is the dispensing order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drink {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub total_qty: u32,
    pub ingredients: Vec<Ingredient>,
}

impl Drink {
    pub fn new(name: impl Into<String>, total_qty: u32, ingredients: Vec<Ingredient>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            total_qty,
            ingredients,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check the drink can be turned into a dispense job.
    /// Percentages are not required to add up to 100.
    pub fn validate(&self) -> Result<()> {
        if self.ingredients.is_empty() {
            return Err(SessionError::InvalidDrink(format!("{} has no ingredients", self.name)));
        }
        for ingredient in &self.ingredients {
            if ingredient.station_id == 0 {
                return Err(SessionError::InvalidDrink(format!(
                    "{} uses station 0",
                    ingredient.name
                )));
            }
            if !ingredient.percent.is_finite() || !(0.0..=100.0).contains(&ingredient.percent) {
                return Err(SessionError::InvalidDrink(format!(
                    "{} has percent {} outside 0-100",
                    ingredient.name, ingredient.percent
                )));
            }
        }
        Ok(())
    }

    /// Copy of this drink with percentages rescaled to sum to 100
    pub fn normalized(&self) -> Drink {
        let sum: f64 = self.ingredients.iter().map(|i| i.percent).sum();
        let mut drink = self.clone();
        if sum > 0.0 {
            for ingredient in &mut drink.ingredients {
                ingredient.percent = ingredient.percent * 100.0 / sum;
            }
        }
        drink
    }
}

/// One station pour within a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStep {
    pub index: usize,
    pub station_id: u32,
    pub ingredient: String,
    pub target: f64,
}

/// Dispensing job derived from a drink when dispensing starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispenseJob {
    pub id: Uuid,
    pub drink_name: String,
    pub steps: Vec<JobStep>,
}

impl DispenseJob {
    pub fn from_drink(drink: &Drink) -> Self {
        let total = f64::from(drink.total_qty);
        let steps = drink
            .ingredients
            .iter()
            .enumerate()
            .map(|(index, ingredient)| JobStep {
                index,
                station_id: ingredient.station_id,
                ingredient: ingredient.name.clone(),
                target: total * ingredient.percent / 100.0,
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            drink_name: drink.name.clone(),
            steps,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Observed progress of one step of the active job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepProgress {
    pub step: usize,
    pub station_id: u32,
    pub target: f64,
    /// Running weight from the robot scale; None until the first report
    pub weight: Option<f64>,
    pub status: StepStatus,
    pub updated_at: DateTime<Utc>,
}

impl StepProgress {
    pub fn new(step: &JobStep) -> Self {
        Self {
            step: step.index,
            station_id: step.station_id,
            target: step.target,
            weight: None,
            status: StepStatus::Sent,
            updated_at: Utc::now(),
        }
    }

    pub fn with_weight(&self, weight: f64) -> Self {
        Self {
            weight: Some(weight),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn with_status(&self, status: StepStatus) -> Self {
        Self {
            status,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == StepStatus::Complete
    }
}

/// Whether the robot reports a cup under the nozzle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CupPresence {
    Present,
    Absent,
    /// No cup report since connecting
    Unknown,
}

/// Soft robot signals from `$` frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub text: Option<String>,
    pub cup: CupPresence,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self {
            text: None,
            cup: CupPresence::Unknown,
            updated_at: None,
        }
    }
}

/// Session connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Disconnected,
    Connecting,
    /// Link up, channel not writable yet
    Connected,
    /// Handshake sent, commands accepted
    Ready,
    Dispensing,
}

/// How a job left the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Completed,
    Cancelled,
    /// Link lost mid-job
    Aborted,
}

/// Read-only view handed to observers after every committed change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub job_id: Option<Uuid>,
    pub steps: Vec<StepProgress>,
    pub system: SystemStatus,
    pub last_outcome: Option<JobOutcome>,
    pub status_message: String,
    pub updated_at: DateTime<Utc>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Disconnected,
            job_id: None,
            steps: Vec::new(),
            system: SystemStatus::default(),
            last_outcome: None,
            status_message: "Disconnected".to_string(),
            updated_at: Utc::now(),
        }
    }
}

/// Notifications broadcast to observers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    StateChanged(SessionState),
    JobStarted { job_id: Uuid, steps: usize },
    StepUpdated(StepProgress),
    JobFinished { job_id: Uuid, outcome: JobOutcome },
    SystemStatusChanged(SystemStatus),
}
