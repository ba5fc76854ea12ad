//! In-memory transport for hosts that bridge their own radio stack, and for tests.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::{PeripheralProfile, Result, Transport, TransportError, TransportEvent};

/// Requests the session made of the link, as seen from the host side
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Connect(PeripheralProfile),
    Disconnect,
    Frame(String),
}

struct LinkFlags {
    adapter_available: AtomicBool,
    connected: AtomicBool,
}

pub struct ChannelTransport {
    events_rx: Option<mpsc::Receiver<TransportEvent>>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    link: Arc<LinkFlags>,
}

/// Host end of a `ChannelTransport`: injects link events and robot frames,
/// observes what the session asked for.
pub struct PeerHandle {
    events_tx: mpsc::Sender<TransportEvent>,
    outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    link: Arc<LinkFlags>,
}

impl ChannelTransport {
    pub fn new(event_capacity: usize) -> (Self, PeerHandle) {
        let (events_tx, events_rx) = mpsc::channel(event_capacity);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let link = Arc::new(LinkFlags {
            adapter_available: AtomicBool::new(true),
            connected: AtomicBool::new(false),
        });

        let transport = Self {
            events_rx: Some(events_rx),
            outbound_tx,
            link: link.clone(),
        };
        let peer = PeerHandle { events_tx, outbound_rx, link };
        (transport, peer)
    }

    fn push(&self, outbound: Outbound) -> Result<()> {
        self.outbound_tx.send(outbound).map_err(|_| TransportError::ChannelClosed)
    }
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn connect(&mut self, profile: &PeripheralProfile) -> Result<()> {
        if !self.link.adapter_available.load(Ordering::SeqCst) {
            return Err(TransportError::AdapterUnavailable);
        }
        log::debug!("Requesting connection to service {}", profile.service);
        self.push(Outbound::Connect(profile.clone()))
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.link.connected.store(false, Ordering::SeqCst);
        self.push(Outbound::Disconnect)
    }

    async fn send(&mut self, frame: &str) -> Result<()> {
        if !self.link.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.push(Outbound::Frame(frame.to_string()))
    }

    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>> {
        self.events_rx.take()
    }
}

impl PeerHandle {
    async fn emit(&self, event: TransportEvent) -> Result<()> {
        self.events_tx.send(event).await.map_err(|_| TransportError::ChannelClosed)
    }

    pub async fn set_adapter_available(&self, available: bool) -> Result<()> {
        self.link.adapter_available.store(available, Ordering::SeqCst);
        if available {
            self.emit(TransportEvent::AdapterAvailable).await
        } else {
            self.emit(TransportEvent::AdapterUnavailable).await
        }
    }

    pub async fn connected(&self) -> Result<()> {
        self.link.connected.store(true, Ordering::SeqCst);
        self.emit(TransportEvent::Connected).await
    }

    pub async fn ready(&self) -> Result<()> {
        self.emit(TransportEvent::Ready).await
    }

    pub async fn link_lost(&self) -> Result<()> {
        self.link.connected.store(false, Ordering::SeqCst);
        self.emit(TransportEvent::Disconnected).await
    }

    /// Deliver one frame as if notified by the robot
    pub async fn push_frame(&self, frame: &str) -> Result<()> {
        self.emit(TransportEvent::Frame(frame.to_string())).await
    }

    pub async fn next_outbound(&mut self) -> Option<Outbound> {
        self.outbound_rx.recv().await
    }

    pub fn try_next_outbound(&mut self) -> Option<Outbound> {
        self.outbound_rx.try_recv().ok()
    }

    /// Frames written so far and not yet read, skipping connect/disconnect requests
    pub fn drain_frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(outbound) = self.outbound_rx.try_recv() {
            if let Outbound::Frame(frame) = outbound {
                frames.push(frame);
            }
        }
        frames
    }
}
