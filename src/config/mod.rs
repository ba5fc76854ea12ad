pub mod settings;

pub use settings::{ConfigError, ConfigResult, EngineConfig, SimulatorSettings};
