use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use super::controller::{Action, SessionController};
use super::models::{Drink, SessionEvent, SessionSnapshot, SessionState};
use super::Result;
use crate::config::EngineConfig;
use crate::transport::{Transport, TransportError, TransportEvent};

/// Owns one robot session: the controller, the transport and the event pump.
/// All controller mutations, from the host or from the link, go through one lock.
pub struct SessionManager {
    inner: Arc<Inner>,
    pump: std::sync::Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    config: EngineConfig,
    controller: Mutex<SessionController>,
    transport: Mutex<Box<dyn Transport>>,
    snapshot_tx: watch::Sender<Arc<SessionSnapshot>>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    /// Must be called from within a Tokio runtime; spawns the event pump.
    pub fn new(config: EngineConfig, mut transport: Box<dyn Transport>) -> Self {
        let events_rx = transport.take_events();
        let controller = SessionController::new(&config);
        let (snapshot_tx, _snapshot_rx) = watch::channel(Arc::new(controller.snapshot()));
        let (events_tx, _events_rx) = broadcast::channel(config.event_capacity);

        let inner = Arc::new(Inner {
            config,
            controller: Mutex::new(controller),
            transport: Mutex::new(transport),
            snapshot_tx,
            events_tx,
        });

        let pump = match events_rx {
            Some(rx) => Some(tokio::spawn(pump_events(inner.clone(), rx))),
            None => {
                log::warn!("Transport event stream already taken; inbound frames will not be processed");
                None
            }
        };

        Self {
            inner,
            pump: std::sync::Mutex::new(pump),
        }
    }

    /// Start connecting to the robot. An unavailable adapter is returned as an
    /// error and the connect is retried when the adapter comes back.
    pub async fn connect(&self) -> Result<()> {
        let mut controller = self.inner.controller.lock().await;
        let action = controller.connect();
        self.inner.publish(&mut controller);
        if action.is_some() {
            self.inner.connect_transport(&mut controller).await?;
        }
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        let mut controller = self.inner.controller.lock().await;
        let actions: Vec<Action> = controller.disconnect().into_iter().collect();
        self.inner.publish(&mut controller);
        self.inner.execute(&mut controller, actions).await;
        Ok(())
    }

    /// Send a drink to the robot. Rejected with `NotConnected`/`NotReady` when
    /// the link cannot take commands.
    pub async fn begin_job(&self, drink: &Drink) -> Result<()> {
        let mut controller = self.inner.controller.lock().await;
        let action = controller.begin_job(drink);
        self.inner.publish(&mut controller);
        self.inner.execute(&mut controller, vec![action?]).await;
        Ok(())
    }

    pub async fn cancel(&self) -> Result<()> {
        let mut controller = self.inner.controller.lock().await;
        let action = controller.cancel();
        self.inner.publish(&mut controller);
        self.inner.execute(&mut controller, vec![action?]).await;
        Ok(())
    }

    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.inner.snapshot_tx.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.snapshot().state
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<Arc<SessionSnapshot>> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Stop processing transport events and drop the link
    pub async fn shutdown(&self) {
        let pump = self.pump.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = pump {
            handle.abort();
        }
        if let Err(e) = self.disconnect().await {
            log::warn!("Disconnect during shutdown failed: {}", e);
        }
        log::info!("Session shut down");
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.pump.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

// Transport writes happen while the controller lock is held, so frames reach
// the wire in the same order as the transitions that produced them.
impl Inner {
    fn publish(&self, controller: &mut SessionController) {
        self.snapshot_tx.send_replace(Arc::new(controller.snapshot()));
        for event in controller.drain_events() {
            // No subscribers is fine
            let _ = self.events_tx.send(event);
        }
    }

    async fn connect_transport(&self, controller: &mut SessionController) -> std::result::Result<(), TransportError> {
        let result = {
            let mut transport = self.transport.lock().await;
            transport.connect(&self.config.peripheral).await
        };
        if let Err(e) = &result {
            controller.connect_failed(e);
            self.publish(controller);
        }
        result
    }

    async fn execute(&self, controller: &mut SessionController, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Connect => {
                    if let Err(e) = self.connect_transport(controller).await {
                        log::warn!("Connect attempt failed: {}", e);
                    }
                }
                Action::Disconnect => {
                    let mut transport = self.transport.lock().await;
                    if let Err(e) = transport.disconnect().await {
                        log::warn!("Transport disconnect failed: {}", e);
                    }
                }
                Action::Send(frame) => {
                    let mut transport = self.transport.lock().await;
                    match transport.send(&frame).await {
                        Ok(()) => log::debug!("TX {}", frame),
                        Err(e) => log::error!("Failed to send {:?}: {}", frame, e),
                    }
                }
            }
        }
    }
}

async fn pump_events(inner: Arc<Inner>, mut events_rx: mpsc::Receiver<TransportEvent>) {
    while let Some(event) = events_rx.recv().await {
        if let TransportEvent::Frame(frame) = &event {
            log::debug!("RX {}", frame);
        }
        let mut controller = inner.controller.lock().await;
        let actions = controller.handle_event(event);
        inner.publish(&mut controller);
        inner.execute(&mut controller, actions).await;
    }
    log::info!("Transport event stream ended");
}
