use mixbot_remote_lib::protocol::StepStatus;
use mixbot_remote_lib::session::{
    DispenseJob, Drink, DropReason, Ingredient, JobProgressTracker, SessionError, UpdateOutcome,
};

fn paloma() -> Drink {
    Drink::new(
        "Paloma",
        300,
        vec![
            Ingredient::new("Tequila", 1, 30.0),
            Ingredient::new("Grapefruit", 2, 20.0),
            Ingredient::new("Lime", 3, 10.0),
        ],
    )
}

#[test]
fn test_job_targets_follow_ingredient_order() {
    let job = DispenseJob::from_drink(&paloma());
    let targets: Vec<f64> = job.steps.iter().map(|s| s.target).collect();
    let stations: Vec<u32> = job.steps.iter().map(|s| s.station_id).collect();
    let indices: Vec<usize> = job.steps.iter().map(|s| s.index).collect();
    assert_eq!(targets, vec![90.0, 60.0, 30.0]);
    assert_eq!(stations, vec![1, 2, 3]);
    assert_eq!(indices, vec![0, 1, 2]);
}

#[test]
fn test_out_of_order_weights_never_regress() {
    let mut tracker = JobProgressTracker::new();
    tracker.begin_job(DispenseJob::from_drink(&paloma()));

    for weight in [4.0, 12.0, 9.5, 12.0, 30.25, 2.0] {
        tracker.apply_weight_update(1, weight);
    }
    assert_eq!(tracker.steps()[1].weight, Some(30.25));
    assert_eq!(tracker.steps()[0].weight, None);
}

#[test]
fn test_new_job_resets_progress() {
    let mut tracker = JobProgressTracker::new();
    tracker.begin_job(DispenseJob::from_drink(&paloma()));
    tracker.apply_weight_update(0, 80.0);
    tracker.apply_state_update(0, StepStatus::Complete);
    let first = tracker.job_id();

    tracker.begin_job(DispenseJob::from_drink(&paloma()));
    assert_ne!(tracker.job_id(), first);
    assert_eq!(tracker.steps()[0].weight, None);
    assert_eq!(tracker.steps()[0].status, StepStatus::Processing);
}

#[test]
fn test_failed_step_blocks_completion() {
    let mut tracker = JobProgressTracker::new();
    tracker.begin_job(DispenseJob::from_drink(&paloma()));
    tracker.apply_state_update(0, StepStatus::Complete);
    tracker.apply_state_update(1, StepStatus::Failed);
    tracker.apply_state_update(2, StepStatus::Complete);
    assert!(!tracker.is_job_complete());
}

#[test]
fn test_updates_without_job_are_dropped() {
    let mut tracker = JobProgressTracker::new();
    assert_eq!(tracker.apply_weight_update(0, 1.0), UpdateOutcome::Dropped(DropReason::NoActiveJob));
    assert!(!tracker.is_job_complete());
}

#[test]
fn test_drink_validation() {
    assert!(paloma().validate().is_ok());

    let mut bad_station = paloma();
    bad_station.ingredients[1].station_id = 0;
    assert!(matches!(bad_station.validate(), Err(SessionError::InvalidDrink(_))));

    let mut bad_percent = paloma();
    bad_percent.ingredients[2].percent = 140.0;
    assert!(matches!(bad_percent.validate(), Err(SessionError::InvalidDrink(_))));

    // Percentages are advisory: 60% in total is still a valid drink
    let sum: f64 = paloma().ingredients.iter().map(|i| i.percent).sum();
    assert_eq!(sum, 60.0);
}

#[test]
fn test_normalized_drink_sums_to_hundred() {
    let normalized = paloma().normalized();
    let sum: f64 = normalized.ingredients.iter().map(|i| i.percent).sum();
    assert!((sum - 100.0).abs() < 1e-9);
    assert!((normalized.ingredients[0].percent - 50.0).abs() < 1e-9);

    let job = DispenseJob::from_drink(&normalized);
    let total: f64 = job.steps.iter().map(|s| s.target).sum();
    assert!((total - 300.0).abs() < 1e-9);
}
