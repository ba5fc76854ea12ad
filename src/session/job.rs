use uuid::Uuid;

use super::models::{DispenseJob, StepProgress};
use crate::protocol::StepStatus;

/// Why an inbound step update was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DropReason {
    #[error("no active job")]
    NoActiveJob,

    #[error("step {step} outside job of {len} steps")]
    StepOutOfRange { step: usize, len: usize },
}

/// Result of applying one update to the tracker
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Step replaced with the new value
    Applied(StepProgress),
    /// Update was valid but did not change the step
    Unchanged,
    Dropped(DropReason),
}

struct ActiveJob {
    job: DispenseJob,
    steps: Vec<StepProgress>,
}

/// Per-step progress of the job currently dispensing
#[derive(Default)]
pub struct JobProgressTracker {
    active: Option<ActiveJob>,
}

impl JobProgressTracker {
    pub fn new() -> Self {
        Self { active: None }
    }

    /// Start tracking a new job, replacing any previous one.
    /// The robot starts the first station as soon as it accepts the command,
    /// so step 0 begins in Processing.
    pub fn begin_job(&mut self, job: DispenseJob) {
        let mut steps: Vec<StepProgress> = job.steps.iter().map(StepProgress::new).collect();
        if let Some(first) = steps.first_mut() {
            *first = first.with_status(StepStatus::Processing);
        }
        log::info!("Tracking job {} ({}) with {} steps", job.id, job.drink_name, steps.len());
        self.active = Some(ActiveJob { job, steps });
    }

    /// Record a running weight. Only increases are kept: the scale reading
    /// climbs while pouring and dips are sensor noise or stale notifications.
    pub fn apply_weight_update(&mut self, step: usize, weight: f64) -> UpdateOutcome {
        let current = match self.step_mut(step) {
            Ok(current) => current,
            Err(reason) => return UpdateOutcome::Dropped(reason),
        };

        let newer = match current.weight {
            None => true,
            Some(stored) => weight > stored,
        };
        if !newer {
            return UpdateOutcome::Unchanged;
        }

        let updated = current.with_weight(weight);
        *current = updated.clone();
        UpdateOutcome::Applied(updated)
    }

    /// Overwrite a step's status. No ordering is enforced between states.
    pub fn apply_state_update(&mut self, step: usize, status: StepStatus) -> UpdateOutcome {
        let current = match self.step_mut(step) {
            Ok(current) => current,
            Err(reason) => return UpdateOutcome::Dropped(reason),
        };

        let updated = current.with_status(status);
        *current = updated.clone();
        UpdateOutcome::Applied(updated)
    }

    /// True when a job is active and every step reports Complete
    pub fn is_job_complete(&self) -> bool {
        match &self.active {
            Some(active) => !active.steps.is_empty() && active.steps.iter().all(StepProgress::is_complete),
            None => false,
        }
    }

    /// Discard the active job. Returns its id if there was one.
    pub fn cancel(&mut self) -> Option<Uuid> {
        self.active.take().map(|active| {
            log::info!("Discarding job {}", active.job.id);
            active.job.id
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn job_id(&self) -> Option<Uuid> {
        self.active.as_ref().map(|active| active.job.id)
    }

    pub fn steps(&self) -> &[StepProgress] {
        self.active.as_ref().map(|active| active.steps.as_slice()).unwrap_or(&[])
    }

    fn step_mut(&mut self, step: usize) -> Result<&mut StepProgress, DropReason> {
        let active = self.active.as_mut().ok_or(DropReason::NoActiveJob)?;
        let len = active.steps.len();
        active
            .steps
            .get_mut(step)
            .ok_or(DropReason::StepOutOfRange { step, len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::models::{Drink, Ingredient};

    fn three_step_job() -> DispenseJob {
        let drink = Drink::new(
            "Paloma",
            300,
            vec![
                Ingredient::new("Tequila", 1, 30.0),
                Ingredient::new("Grapefruit", 2, 20.0),
                Ingredient::new("Lime", 3, 10.0),
            ],
        );
        DispenseJob::from_drink(&drink)
    }

    fn tracker() -> JobProgressTracker {
        let mut tracker = JobProgressTracker::new();
        tracker.begin_job(three_step_job());
        tracker
    }

    #[test]
    fn test_begin_job_targets_and_initial_status() {
        let tracker = tracker();
        let steps = tracker.steps();
        let targets: Vec<f64> = steps.iter().map(|s| s.target).collect();
        assert_eq!(targets, vec![90.0, 60.0, 30.0]);
        assert_eq!(steps[0].status, StepStatus::Processing);
        assert_eq!(steps[1].status, StepStatus::Sent);
        assert_eq!(steps[2].status, StepStatus::Sent);
        assert!(steps.iter().all(|s| s.weight.is_none()));
    }

    #[test]
    fn test_weight_merge_is_monotonic() {
        let mut tracker = tracker();
        assert!(matches!(tracker.apply_weight_update(0, 10.0), UpdateOutcome::Applied(_)));
        assert_eq!(tracker.apply_weight_update(0, 5.0), UpdateOutcome::Unchanged);
        assert_eq!(tracker.steps()[0].weight, Some(10.0));
        assert_eq!(tracker.apply_weight_update(0, 10.0), UpdateOutcome::Unchanged);
        assert!(matches!(tracker.apply_weight_update(0, 12.0), UpdateOutcome::Applied(_)));
        assert_eq!(tracker.steps()[0].weight, Some(12.0));
    }

    #[test]
    fn test_first_weight_is_always_taken() {
        let mut tracker = tracker();
        assert!(matches!(tracker.apply_weight_update(1, 0.0), UpdateOutcome::Applied(_)));
        assert_eq!(tracker.steps()[1].weight, Some(0.0));
    }

    #[test]
    fn test_state_update_overwrites() {
        let mut tracker = tracker();
        tracker.apply_state_update(0, StepStatus::Complete);
        assert_eq!(tracker.steps()[0].status, StepStatus::Complete);
        tracker.apply_state_update(0, StepStatus::Failed);
        assert_eq!(tracker.steps()[0].status, StepStatus::Failed);
    }

    #[test]
    fn test_completion_only_after_last_step() {
        let mut tracker = tracker();
        for step in 0..3 {
            assert!(!tracker.is_job_complete());
            tracker.apply_state_update(step, StepStatus::Complete);
        }
        assert!(tracker.is_job_complete());
    }

    #[test]
    fn test_out_of_range_updates_are_dropped() {
        let mut tracker = tracker();
        let before = tracker.steps().to_vec();
        assert_eq!(
            tracker.apply_weight_update(99, 1.0),
            UpdateOutcome::Dropped(DropReason::StepOutOfRange { step: 99, len: 3 })
        );
        assert_eq!(
            tracker.apply_state_update(3, StepStatus::Complete),
            UpdateOutcome::Dropped(DropReason::StepOutOfRange { step: 3, len: 3 })
        );
        assert_eq!(tracker.steps(), before.as_slice());
    }

    #[test]
    fn test_updates_after_cancel_are_dropped() {
        let mut tracker = tracker();
        assert!(tracker.cancel().is_some());
        assert_eq!(tracker.apply_weight_update(0, 4.0), UpdateOutcome::Dropped(DropReason::NoActiveJob));
        assert_eq!(
            tracker.apply_state_update(0, StepStatus::Complete),
            UpdateOutcome::Dropped(DropReason::NoActiveJob)
        );
        assert!(tracker.steps().is_empty());
        assert!(!tracker.is_job_complete());
        assert!(tracker.cancel().is_none());
    }
}
