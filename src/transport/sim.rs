//! Software stand-in for the robot. Answers the wire protocol with plausible
//! status, weight and step frames so the session can run without hardware.
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{PeripheralProfile, Result, Transport, TransportError, TransportEvent};
use crate::config::SimulatorSettings;
use crate::protocol::{self, CANCEL_FRAME, HANDSHAKE_FRAME};

pub struct SimulatedRobot {
    settings: SimulatorSettings,
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: Option<mpsc::Receiver<TransportEvent>>,
    connected: bool,
    pour: Option<JoinHandle<()>>,
}

impl SimulatedRobot {
    pub fn new(settings: SimulatorSettings, event_capacity: usize) -> Self {
        let (events_tx, events_rx) = mpsc::channel(event_capacity);
        Self {
            settings,
            events_tx,
            events_rx: Some(events_rx),
            connected: false,
            pour: None,
        }
    }

    fn tick(&self) -> Duration {
        Duration::from_millis(self.settings.tick_ms)
    }

    // Emission runs on its own task so a full event queue never stalls the caller
    fn emit(&self, events: Vec<TransportEvent>) {
        let tx = self.events_tx.clone();
        let tick = self.tick();
        tokio::spawn(async move {
            for event in events {
                tokio::time::sleep(tick).await;
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
    }

    fn stop_pour(&mut self) -> bool {
        match self.pour.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    fn start_pour(&mut self, stations: Vec<(u32, f64)>) {
        self.stop_pour();
        let tx = self.events_tx.clone();
        let tick = self.tick();
        let flow = self.settings.flow_per_tick.max(0.01);

        self.pour = Some(tokio::spawn(async move {
            if !notify(&tx, "$0=Pouring".to_string()).await {
                return;
            }
            for (step, (station, amount)) in stations.into_iter().enumerate() {
                log::debug!("Simulated station {} pouring {:.2}", station, amount);
                if !notify(&tx, format!("S{}=P;", step)).await {
                    return;
                }
                let mut weight = 0.0;
                while weight < amount {
                    tokio::time::sleep(tick).await;
                    weight = f64::min(weight + flow, amount);
                    if !notify(&tx, format!("W{}={:.2};", step, weight)).await {
                        return;
                    }
                }
                if !notify(&tx, format!("S{}=C;", step)).await {
                    return;
                }
            }
            notify(&tx, "$0=Done".to_string()).await;
        }));
    }
}

async fn notify(tx: &mpsc::Sender<TransportEvent>, frame: String) -> bool {
    tx.send(TransportEvent::Frame(frame)).await.is_ok()
}

#[async_trait::async_trait]
impl Transport for SimulatedRobot {
    async fn connect(&mut self, profile: &PeripheralProfile) -> Result<()> {
        log::info!("Simulated robot answering for service {}", profile.service);
        self.connected = true;
        self.emit(vec![TransportEvent::Connected, TransportEvent::Ready]);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.stop_pour();
        if self.connected {
            self.connected = false;
            self.emit(vec![TransportEvent::Disconnected]);
        }
        Ok(())
    }

    async fn send(&mut self, frame: &str) -> Result<()> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        match frame {
            HANDSHAKE_FRAME => {
                let cup = if self.settings.cup_present { "$1=1" } else { "$1=0" };
                self.emit(vec![
                    TransportEvent::Frame("$0=Ready".to_string()),
                    TransportEvent::Frame(cup.to_string()),
                ]);
            }
            CANCEL_FRAME => {
                if self.stop_pour() {
                    self.emit(vec![TransportEvent::Frame("$0=Cancelled".to_string())]);
                }
            }
            _ => {
                let stations = protocol::parse_job_frame(frame)
                    .map_err(|e| TransportError::SendFailed(e.to_string()))?;
                self.start_pour(stations);
            }
        }
        Ok(())
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events_rx.take()
    }
}

impl Drop for SimulatedRobot {
    fn drop(&mut self) {
        self.stop_pour();
    }
}
