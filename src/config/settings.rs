use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::transport::PeripheralProfile;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Engine settings. Missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Connect as soon as the radio adapter reports it is available
    pub auto_connect: bool,
    /// Retry a connect that failed for lack of an adapter once it shows up
    pub retry_when_adapter_available: bool,
    /// Clear text/cup status on link loss instead of keeping the last report
    pub reset_status_on_disconnect: bool,
    pub event_capacity: usize,
    pub log_level: String,
    pub peripheral: PeripheralProfile,
    pub simulator: SimulatorSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_connect: true,
            retry_when_adapter_available: true,
            reset_status_on_disconnect: false,
            event_capacity: 64,
            log_level: "info".to_string(),
            peripheral: PeripheralProfile::default(),
            simulator: SimulatorSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        log::info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be at least 1".to_string()));
        }
        if self.simulator.tick_ms == 0 {
            return Err(ConfigError::Invalid("simulator.tick_ms must be at least 1".to_string()));
        }
        if !(self.simulator.flow_per_tick.is_finite() && self.simulator.flow_per_tick > 0.0) {
            return Err(ConfigError::Invalid("simulator.flow_per_tick must be positive".to_string()));
        }
        Ok(())
    }
}

/// Behaviour of the software robot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    pub tick_ms: u64,
    /// Weight added per tick while a station pours
    pub flow_per_tick: f64,
    pub cup_present: bool,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            flow_per_tick: 5.0,
            cup_present: true,
        }
    }
}
