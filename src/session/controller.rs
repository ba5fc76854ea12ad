use chrono::Utc;

use super::job::{DropReason, JobProgressTracker, UpdateOutcome};
use super::models::{
    DispenseJob, Drink, JobOutcome, SessionEvent, SessionSnapshot, SessionState, StepProgress,
};
use super::status::SystemStatusTracker;
use super::{Result, SessionError};
use crate::config::EngineConfig;
use crate::protocol::{codec, Message};
use crate::transport::{TransportError, TransportEvent};

/// Work the controller asks its owner to perform on the transport
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Connect,
    Disconnect,
    Send(String),
}

/// Connection handshake, job lifecycle and inbound routing for one robot.
///
/// Every method is a single synchronous transition with no I/O. Frames to
/// send come back as `Action`s; observer notifications queue up until
/// `drain_events` is called.
pub struct SessionController {
    state: SessionState,
    jobs: JobProgressTracker,
    system: SystemStatusTracker,
    handshake_sent: bool,
    connect_on_adapter: bool,
    retry_when_adapter_available: bool,
    reset_status_on_disconnect: bool,
    last_outcome: Option<JobOutcome>,
    finished_steps: Vec<StepProgress>,
    status_message: String,
    events: Vec<SessionEvent>,
}

impl SessionController {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            state: SessionState::Disconnected,
            jobs: JobProgressTracker::new(),
            system: SystemStatusTracker::new(),
            handshake_sent: false,
            connect_on_adapter: config.auto_connect,
            retry_when_adapter_available: config.retry_when_adapter_available,
            reset_status_on_disconnect: config.reset_status_on_disconnect,
            last_outcome: None,
            finished_steps: Vec::new(),
            status_message: "Disconnected".to_string(),
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn jobs(&self) -> &JobProgressTracker {
        &self.jobs
    }

    pub fn system(&self) -> &SystemStatusTracker {
        &self.system
    }

    pub fn last_outcome(&self) -> Option<JobOutcome> {
        self.last_outcome
    }

    /// Begin connecting. Only valid from Disconnected.
    pub fn connect(&mut self) -> Option<Action> {
        self.connect_on_adapter = false;
        if self.state != SessionState::Disconnected {
            log::debug!("connect() ignored in state {:?}", self.state);
            return None;
        }
        self.set_state(SessionState::Connecting, "Searching for robot");
        Some(Action::Connect)
    }

    /// The transport refused to start connecting
    pub fn connect_failed(&mut self, error: &TransportError) {
        if matches!(error, TransportError::AdapterUnavailable) {
            self.connect_on_adapter = self.retry_when_adapter_available;
            log::warn!("Radio adapter unavailable, will retry: {}", self.connect_on_adapter);
            self.set_state(SessionState::Disconnected, "Bluetooth not available");
        } else {
            log::error!("Connection failed: {}", error);
            self.set_state(SessionState::Disconnected, &format!("Connection failed: {}", error));
        }
    }

    /// Host-requested teardown. Any job in flight is aborted.
    pub fn disconnect(&mut self) -> Option<Action> {
        self.connect_on_adapter = false;
        if self.state == SessionState::Disconnected {
            return None;
        }
        self.link_down();
        Some(Action::Disconnect)
    }

    pub fn handle_event(&mut self, event: TransportEvent) -> Vec<Action> {
        let mut actions = Vec::new();

        match event {
            TransportEvent::AdapterAvailable => {
                log::info!("Radio adapter available");
                if self.connect_on_adapter && self.state == SessionState::Disconnected {
                    actions.extend(self.connect());
                }
            }
            TransportEvent::AdapterUnavailable => {
                log::warn!("Radio adapter went away");
                if self.state == SessionState::Connecting {
                    self.connect_on_adapter = self.retry_when_adapter_available;
                    self.set_state(SessionState::Disconnected, "Bluetooth not available");
                }
            }
            TransportEvent::Connected => match self.state {
                SessionState::Connecting | SessionState::Disconnected => {
                    self.set_state(SessionState::Connected, "Robot connected");
                }
                _ => log::debug!("Duplicate connected event in state {:?}", self.state),
            },
            TransportEvent::Ready => match self.state {
                SessionState::Connecting | SessionState::Connected => {
                    self.set_state(SessionState::Ready, "Robot ready");
                    if !self.handshake_sent {
                        self.handshake_sent = true;
                        log::info!("Channel writable, sending handshake");
                        actions.push(Action::Send(codec::encode_handshake().to_string()));
                    }
                }
                _ => log::debug!("Ready event ignored in state {:?}", self.state),
            },
            TransportEvent::Disconnected => {
                if self.state != SessionState::Disconnected {
                    log::warn!("Link to robot lost");
                }
                self.link_down();
            }
            TransportEvent::Frame(frame) => self.handle_frame(&frame),
        }

        actions
    }

    /// Decode one inbound frame and apply it. Bad or stray frames are logged and dropped.
    pub fn handle_frame(&mut self, frame: &str) {
        let message = match codec::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Dropping frame: {}", e);
                return;
            }
        };

        match message {
            Message::TextStatus(text) => {
                self.system.apply_text_status(&text);
                self.events.push(SessionEvent::SystemStatusChanged(self.system.status().clone()));
            }
            Message::CupStatus(present) => {
                self.system.apply_cup_status(present);
                self.events.push(SessionEvent::SystemStatusChanged(self.system.status().clone()));
            }
            Message::WeightUpdate { step, weight } => {
                let outcome = self.jobs.apply_weight_update(step, weight);
                self.record(frame, outcome);
            }
            Message::StateUpdate { step, status } => {
                log::info!("Step {} {}", step, status.as_str());
                let outcome = self.jobs.apply_state_update(step, status);
                self.record(frame, outcome);
                if self.state == SessionState::Dispensing && self.jobs.is_job_complete() {
                    self.finish_job(JobOutcome::Completed);
                    self.set_state(SessionState::Ready, "Drink ready");
                }
            }
            Message::Unknown(raw) => log::warn!("Ignoring unknown status frame {:?}", raw),
        }
    }

    /// Start dispensing a drink. Returns the job frame to send.
    pub fn begin_job(&mut self, drink: &Drink) -> Result<Action> {
        match self.state {
            SessionState::Disconnected | SessionState::Connecting => return Err(SessionError::NotConnected),
            SessionState::Connected => return Err(SessionError::NotReady),
            SessionState::Dispensing => return Err(SessionError::JobInProgress),
            SessionState::Ready => {}
        }
        drink.validate()?;

        let job = DispenseJob::from_drink(drink);
        let frame = codec::encode_job(&job);
        log::info!("Sending job {} for {}: {}", job.id, drink.name, frame);

        self.events.push(SessionEvent::JobStarted { job_id: job.id, steps: job.len() });
        self.finished_steps.clear();
        self.last_outcome = None;
        self.jobs.begin_job(job);
        self.set_state(SessionState::Dispensing, "Requesting drink");

        Ok(Action::Send(frame))
    }

    /// Stop the active job locally and tell the robot. There is no acknowledgement,
    /// so late updates for the old job are dropped.
    pub fn cancel(&mut self) -> Result<Action> {
        match self.state {
            SessionState::Disconnected | SessionState::Connecting => return Err(SessionError::NotConnected),
            SessionState::Connected => return Err(SessionError::NotReady),
            SessionState::Ready | SessionState::Dispensing => {}
        }
        self.finish_job(JobOutcome::Cancelled);
        let state = if self.state == SessionState::Dispensing { SessionState::Ready } else { self.state };
        self.set_state(state, "Cancel requested");
        Ok(Action::Send(codec::encode_cancel().to_string()))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let steps = if self.jobs.is_active() {
            self.jobs.steps().to_vec()
        } else {
            self.finished_steps.clone()
        };
        SessionSnapshot {
            state: self.state,
            job_id: self.jobs.job_id(),
            steps,
            system: self.system.status().clone(),
            last_outcome: self.last_outcome,
            status_message: self.status_message.clone(),
            updated_at: Utc::now(),
        }
    }

    /// Notifications queued since the last call
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    fn link_down(&mut self) {
        self.finish_job(JobOutcome::Aborted);
        self.handshake_sent = false;
        if self.reset_status_on_disconnect {
            self.system.reset();
            self.events.push(SessionEvent::SystemStatusChanged(self.system.status().clone()));
        }
        self.set_state(SessionState::Disconnected, "Disconnected");
    }

    fn finish_job(&mut self, outcome: JobOutcome) {
        let steps = self.jobs.steps().to_vec();
        if let Some(job_id) = self.jobs.cancel() {
            log::info!("Job {} finished: {:?}", job_id, outcome);
            self.finished_steps = steps;
            self.last_outcome = Some(outcome);
            self.events.push(SessionEvent::JobFinished { job_id, outcome });
        }
    }

    fn record(&mut self, frame: &str, outcome: UpdateOutcome) {
        match outcome {
            UpdateOutcome::Applied(progress) => self.events.push(SessionEvent::StepUpdated(progress)),
            UpdateOutcome::Unchanged => {}
            UpdateOutcome::Dropped(DropReason::NoActiveJob) => {
                log::debug!("No active job, dropping {:?}", frame);
            }
            UpdateOutcome::Dropped(reason) => log::warn!("Dropping {:?}: {}", frame, reason),
        }
    }

    fn set_state(&mut self, state: SessionState, message: &str) {
        if self.state != state {
            log::info!("Session {:?} -> {:?}", self.state, state);
            self.state = state;
            self.events.push(SessionEvent::StateChanged(state));
        }
        self.status_message = message.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::StepStatus;
    use crate::session::models::{CupPresence, Ingredient};

    fn drink() -> Drink {
        Drink::new(
            "Negroni",
            300,
            vec![
                Ingredient::new("Gin", 1, 30.0),
                Ingredient::new("Campari", 2, 20.0),
                Ingredient::new("Vermouth", 3, 10.0),
            ],
        )
    }

    fn ready_controller() -> SessionController {
        let mut controller = SessionController::new(&EngineConfig::default());
        assert_eq!(controller.connect(), Some(Action::Connect));
        controller.handle_event(TransportEvent::Connected);
        let actions = controller.handle_event(TransportEvent::Ready);
        assert_eq!(actions, vec![Action::Send("ehlo".to_string())]);
        controller
    }

    #[test]
    fn test_handshake_sent_once_per_connection() {
        let mut controller = ready_controller();
        assert!(controller.handle_event(TransportEvent::Ready).is_empty());

        controller.handle_event(TransportEvent::Disconnected);
        controller.connect();
        controller.handle_event(TransportEvent::Connected);
        assert_eq!(controller.handle_event(TransportEvent::Ready), vec![Action::Send("ehlo".to_string())]);
    }

    #[test]
    fn test_begin_job_requires_connection() {
        let mut controller = SessionController::new(&EngineConfig::default());
        assert!(matches!(controller.begin_job(&drink()), Err(SessionError::NotConnected)));
        assert!(matches!(controller.cancel(), Err(SessionError::NotConnected)));
        assert_eq!(controller.state(), SessionState::Disconnected);

        controller.connect();
        assert!(matches!(controller.cancel(), Err(SessionError::NotConnected)));
        controller.handle_event(TransportEvent::Connected);
        assert!(matches!(controller.begin_job(&drink()), Err(SessionError::NotReady)));
    }

    #[test]
    fn test_cancel_waits_for_writable_channel() {
        let mut controller = SessionController::new(&EngineConfig::default());
        controller.connect();
        controller.handle_event(TransportEvent::Connected);
        assert!(matches!(controller.cancel(), Err(SessionError::NotReady)));
        assert_eq!(controller.state(), SessionState::Connected);
        assert!(controller.drain_events().iter().all(|e| matches!(e, SessionEvent::StateChanged(_))));

        controller.handle_event(TransportEvent::Ready);
        assert_eq!(controller.cancel().unwrap(), Action::Send("C!".to_string()));
    }

    #[test]
    fn test_begin_job_sends_frame_and_dispenses() {
        let mut controller = ready_controller();
        let action = controller.begin_job(&drink()).unwrap();
        assert_eq!(action, Action::Send("D:1=90.00,2=60.00,3=30.00".to_string()));
        assert_eq!(controller.state(), SessionState::Dispensing);
        assert!(matches!(controller.begin_job(&drink()), Err(SessionError::JobInProgress)));

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.steps.len(), 3);
        assert_eq!(snapshot.steps[0].status, StepStatus::Processing);
    }

    #[test]
    fn test_invalid_drink_rejected_without_state_change() {
        let mut controller = ready_controller();
        let empty = Drink::new("Nothing", 100, Vec::new());
        assert!(matches!(controller.begin_job(&empty), Err(SessionError::InvalidDrink(_))));
        assert_eq!(controller.state(), SessionState::Ready);
    }

    #[test]
    fn test_job_completes_after_last_step() {
        let mut controller = ready_controller();
        controller.begin_job(&drink()).unwrap();

        for step in 0..3 {
            assert_eq!(controller.state(), SessionState::Dispensing);
            controller.handle_frame(&format!("W{}=12.5;", step));
            controller.handle_frame(&format!("S{}=C;", step));
        }

        assert_eq!(controller.state(), SessionState::Ready);
        assert_eq!(controller.last_outcome(), Some(JobOutcome::Completed));
        let snapshot = controller.snapshot();
        assert!(snapshot.job_id.is_none());
        assert!(snapshot.steps.iter().all(|s| s.status == StepStatus::Complete));
        assert!(snapshot.steps.iter().all(|s| s.weight == Some(12.5)));
    }

    #[test]
    fn test_cancel_drops_late_updates() {
        let mut controller = ready_controller();
        controller.begin_job(&drink()).unwrap();
        controller.handle_frame("W0=20.0;");

        assert_eq!(controller.cancel().unwrap(), Action::Send("C!".to_string()));
        assert_eq!(controller.state(), SessionState::Ready);
        assert_eq!(controller.last_outcome(), Some(JobOutcome::Cancelled));

        controller.handle_frame("S0=C;");
        controller.handle_frame("W0=50.0;");
        assert!(!controller.jobs().is_active());
        assert_eq!(controller.snapshot().steps[0].weight, Some(20.0));
    }

    #[test]
    fn test_link_loss_aborts_job_and_keeps_status() {
        let mut controller = ready_controller();
        controller.handle_frame("$1=1");
        controller.handle_frame("$0=Idle");
        controller.begin_job(&drink()).unwrap();
        controller.drain_events();

        controller.handle_event(TransportEvent::Disconnected);
        assert_eq!(controller.state(), SessionState::Disconnected);
        assert_eq!(controller.last_outcome(), Some(JobOutcome::Aborted));
        assert_eq!(controller.system().status().cup, CupPresence::Present);
        assert_eq!(controller.system().status().text.as_deref(), Some("Idle"));

        let events = controller.drain_events();
        assert!(events.iter().any(|e| matches!(e, SessionEvent::JobFinished { outcome: JobOutcome::Aborted, .. })));
    }

    #[test]
    fn test_link_loss_resets_status_when_configured() {
        let config = EngineConfig { reset_status_on_disconnect: true, ..EngineConfig::default() };
        let mut controller = SessionController::new(&config);
        controller.connect();
        controller.handle_event(TransportEvent::Connected);
        controller.handle_frame("$1=1");
        controller.handle_event(TransportEvent::Disconnected);
        assert_eq!(controller.system().status().cup, CupPresence::Unknown);
    }

    #[test]
    fn test_adapter_unavailable_retries_when_available() {
        let mut controller = SessionController::new(&EngineConfig::default());
        assert_eq!(controller.connect(), Some(Action::Connect));
        controller.connect_failed(&TransportError::AdapterUnavailable);
        assert_eq!(controller.state(), SessionState::Disconnected);

        assert_eq!(controller.handle_event(TransportEvent::AdapterAvailable), vec![Action::Connect]);
        assert_eq!(controller.state(), SessionState::Connecting);
        assert!(controller.handle_event(TransportEvent::AdapterAvailable).is_empty());
    }

    #[test]
    fn test_auto_connect_on_first_adapter_event() {
        let mut controller = SessionController::new(&EngineConfig::default());
        assert_eq!(controller.handle_event(TransportEvent::AdapterAvailable), vec![Action::Connect]);

        let config = EngineConfig { auto_connect: false, ..EngineConfig::default() };
        let mut manual = SessionController::new(&config);
        assert!(manual.handle_event(TransportEvent::AdapterAvailable).is_empty());
    }

    #[test]
    fn test_out_of_range_and_malformed_frames_are_harmless() {
        let mut controller = ready_controller();
        controller.begin_job(&drink()).unwrap();
        let before = controller.snapshot().steps;

        controller.handle_frame("W99=1.0;");
        controller.handle_frame("S7=C;");
        controller.handle_frame("Zgarbage");
        controller.handle_frame("$7=whatever");

        assert_eq!(controller.snapshot().steps, before);
        assert_eq!(controller.state(), SessionState::Dispensing);
    }
}
