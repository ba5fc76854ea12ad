pub mod config;
pub mod protocol;
pub mod session;
pub mod transport;

use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use config::EngineConfig;
use session::{Drink, Ingredient, SessionEvent, SessionManager, SessionState};
use transport::SimulatedRobot;

/// Environment variable naming a JSON engine config file
pub const CONFIG_ENV: &str = "MIXBOT_CONFIG";

const DEMO_TIMEOUT: Duration = Duration::from_secs(60);

pub fn init_logging(default_level: &str) {
  let filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
  // Installs the log -> tracing bridge as well, so log:: records show up
  let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Run one dispensing session against the simulated robot
pub fn run() -> anyhow::Result<()> {
  let config = match std::env::var(CONFIG_ENV) {
    Ok(path) => EngineConfig::load(&path)?,
    Err(_) => EngineConfig::default(),
  };
  init_logging(&config.log_level);

  let runtime = tokio::runtime::Runtime::new()?;
  runtime.block_on(run_simulated_session(config))
}

async fn run_simulated_session(config: EngineConfig) -> anyhow::Result<()> {
  let robot = SimulatedRobot::new(config.simulator.clone(), config.event_capacity);
  let manager = SessionManager::new(config, Box::new(robot));

  let mut events = manager.subscribe_events();
  let logger = tokio::spawn(async move {
    loop {
      match events.recv().await {
        Ok(SessionEvent::StepUpdated(step)) => {
          log::info!("step {} [{}] {:.2}/{:.2}", step.step, step.status.as_str(), step.weight.unwrap_or(0.0), step.target);
        }
        Ok(SessionEvent::SystemStatusChanged(status)) => {
          log::info!("robot says {:?}, cup {:?}", status.text, status.cup);
        }
        Ok(event) => log::debug!("{:?}", event),
        Err(RecvError::Lagged(skipped)) => log::warn!("Event log skipped {} events", skipped),
        Err(RecvError::Closed) => break,
      }
    }
  });

  let mut snapshots = manager.subscribe_snapshots();
  manager.connect().await?;
  tokio::time::timeout(DEMO_TIMEOUT, snapshots.wait_for(|s| s.state == SessionState::Ready)).await??;

  let drink = Drink::new(
    "Paloma",
    200,
    vec![
      Ingredient::new("Tequila", 1, 25.0),
      Ingredient::new("Grapefruit soda", 2, 65.0),
      Ingredient::new("Lime juice", 3, 10.0),
    ],
  )
  .with_description("Tequila, grapefruit and lime");
  manager.begin_job(&drink).await?;

  let finished = tokio::time::timeout(DEMO_TIMEOUT, snapshots.wait_for(|s| s.last_outcome.is_some())).await??.clone();
  log::info!("{} finished: {:?}", drink.name, finished.last_outcome);
  for step in &finished.steps {
    log::info!("  station {} poured {:.2} of {:.2}", step.station_id, step.weight.unwrap_or(0.0), step.target);
  }

  manager.shutdown().await;
  drop(manager);
  logger.abort();
  Ok(())
}
