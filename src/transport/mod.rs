use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

pub mod channel;
pub mod sim;

pub use channel::{ChannelTransport, PeerHandle};
pub use sim::SimulatedRobot;

/// MixBot GATT service advertised by the robot
pub const MIXBOT_SERVICE_UUID: &str = "94635d24-cf8d-4ff8-9191-de713f39db89";
/// Characteristic the client writes commands to
pub const CONTROL_CHARACTERISTIC_UUID: &str = "4ac8a682-9736-4e5d-932b-e9b31405049c";
/// Characteristic the robot notifies status frames on
pub const STATUS_CHARACTERISTIC_UUID: &str = "6bcdd021-ffa5-4522-9454-a21d025d6562";

/// BLE identifiers a radio transport needs to reach the robot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeripheralProfile {
    pub service: Uuid,
    pub control_characteristic: Uuid,
    pub status_characteristic: Uuid,
}

impl Default for PeripheralProfile {
    fn default() -> Self {
        Self {
            service: Uuid::from_u128(0x94635d24_cf8d_4ff8_9191_de713f39db89),
            control_characteristic: Uuid::from_u128(0x4ac8a682_9736_4e5d_932b_e9b31405049c),
            status_characteristic: Uuid::from_u128(0x6bcdd021_ffa5_4522_9454_a21d025d6562),
        }
    }
}

/// Lifecycle events and inbound frames, delivered in order on one channel
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Radio adapter powered on
    AdapterAvailable,
    AdapterUnavailable,
    Connected,
    /// Channel writable
    Ready,
    Disconnected,
    /// One complete text frame from the robot
    Frame(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Radio adapter unavailable")]
    AdapterUnavailable,

    #[error("Not connected")]
    NotConnected,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Event channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Link to the robot. Implementations own discovery and GATT details;
/// the session only sees whole text frames and lifecycle events.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Start connecting. Completion is reported later as `TransportEvent::Connected`.
    async fn connect(&mut self, profile: &PeripheralProfile) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;

    /// Fire-and-forget write of one frame
    async fn send(&mut self, frame: &str) -> Result<()>;

    /// Take the event receiver. Returns None once taken.
    fn take_events(&mut self) -> Option<mpsc::Receiver<TransportEvent>>;
}
