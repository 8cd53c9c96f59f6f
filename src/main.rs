// src/main.rs

mod actuation;
mod arbiter;
mod config;
mod features;
mod platform;
mod scoring;
mod sensor_buffer;
mod sim;
mod smoother;
mod supervisor;
mod types;

use anyhow::{Context, Result};
use platform::SensorRig;
use scoring::{AnomalyScorer, ReconstructionScorer};
use sensor_buffer::SensorHub;
use sim::{FixedIntent, LogControlSink, SyntheticRig};
use std::sync::Arc;
use supervisor::Supervisor;
use tracing::info;
use tracing_subscriber::EnvFilter;
use types::{Config, ManualIntent, SeverityLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load("config.yaml").context("Failed to load config.yaml")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("🚗 Anomaly-Gated Control Supervisor Starting");
    info!("✓ Configuration loaded");
    info!(
        "Anomaly threshold: {:.1}, history: {}, streak: {} ticks, severe tier: {}/{}",
        config.anomaly.threshold,
        config.anomaly.history_len,
        config.anomaly.streak_ticks,
        config.arbiter.severe_tier,
        config.arbiter.severity_tiers
    );

    // Model load failures are fatal and happen before any listener exists.
    let mut scorer = ReconstructionScorer::new(&config.model)?;

    // Probe with a zero vector so an incompatible input width fails here
    // instead of on every tick.
    let probe = vec![0.0f32; config.model.input_dim];
    let baseline = scorer
        .score(&probe)
        .context("Model rejected a probe vector at the configured input width")?;
    info!("✓ Reconstruction scorer ready (zero-input mse: {:.4})", baseline);

    let hub = Arc::new(SensorHub::new());
    let mut rig = SyntheticRig::new();
    rig.attach(Arc::clone(&hub))
        .context("Failed to attach sensor rig")?;

    let (severity_tx, severity_rx) = tokio::sync::watch::channel(SeverityLevel(0));
    let severity_task = sim::spawn_severity_schedule(sim::demo_severity_schedule(), severity_tx);

    // The demo operator keeps the throttle held whenever control is manual.
    let intents = FixedIntent(ManualIntent {
        accelerate: true,
        ..ManualIntent::default()
    });

    let result = async {
        let mut supervisor = Supervisor::new(
            &config,
            Arc::clone(&hub),
            scorer,
            Box::new(LogControlSink),
            Box::new(intents),
            severity_rx,
        )?;
        supervisor.run().await
    }
    .await;

    // Listeners are released on every exit path, fatal ones included.
    severity_task.abort();
    rig.detach();

    result
}
