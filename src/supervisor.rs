// src/supervisor.rs
//
// The decision loop: once per tick, snapshot the sensors, build the
// feature vector, score it, smooth the score, arbitrate the control mode,
// and emit the actuation command. The supervisor task is the only owner
// of arbiter and actuation state; producers never touch it.

use crate::actuation::ActuationMapper;
use crate::arbiter::{ModeArbiter, ModeTransition};
use crate::features::FeatureExtractor;
use crate::platform::{ControlSink, IntentSource};
use crate::scoring::AnomalyScorer;
use crate::sensor_buffer::SensorHub;
use crate::smoother::{ScoreSmoother, SmoothedSignal};
use crate::types::{ActuationCommand, Config, ControlMode, SeverityLevel};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const PROGRESS_INTERVAL_TICKS: u64 = 150;

pub struct Supervisor<S: AnomalyScorer> {
    hub: Arc<SensorHub>,
    extractor: FeatureExtractor,
    scorer: S,
    smoother: ScoreSmoother,
    arbiter: ModeArbiter,
    mapper: ActuationMapper,
    control: Box<dyn ControlSink>,
    intents: Box<dyn IntentSource>,
    severity_rx: watch::Receiver<SeverityLevel>,

    tick_hz: u32,
    tick_count: u64,
    started: Instant,
    /// Last autopilot state the sink accepted; `None` until the first call
    /// lands. Retried on later ticks whenever it disagrees with the mode.
    autopilot_acked: Option<bool>,
    events: Option<File>,
}

impl<S: AnomalyScorer> Supervisor<S> {
    pub fn new(
        config: &Config,
        hub: Arc<SensorHub>,
        scorer: S,
        control: Box<dyn ControlSink>,
        intents: Box<dyn IntentSource>,
        severity_rx: watch::Receiver<SeverityLevel>,
    ) -> Result<Self> {
        let events = if config.output.log_events {
            std::fs::create_dir_all(&config.output.dir)
                .with_context(|| format!("Failed to create output dir {}", config.output.dir))?;
            let path = Path::new(&config.output.dir).join("mode_events.jsonl");
            let file = File::create(&path)?;
            info!("💾 Mode events will be written to: {}", path.display());
            Some(file)
        } else {
            None
        };

        Ok(Self {
            hub,
            extractor: FeatureExtractor::new(config.sensors.clone(), config.model.input_dim),
            scorer,
            smoother: ScoreSmoother::new(config.anomaly.history_len, config.anomaly.threshold),
            arbiter: ModeArbiter::new(config.arbiter.clone(), config.anomaly.clone()),
            mapper: ActuationMapper::new(config.control.clone()),
            control,
            intents,
            severity_rx,
            tick_hz: config.runtime.tick_hz,
            tick_count: 0,
            started: Instant::now(),
            autopilot_acked: None,
            events,
        })
    }

    pub fn mode(&self) -> ControlMode {
        self.arbiter.mode()
    }

    /// Run until shutdown is requested, then stop actuation. An over-budget
    /// tick (scoring is the heavy part) drops the missed ticks instead of
    /// stacking them; sensor producers are never blocked either way.
    pub async fn run(&mut self) -> Result<()> {
        let period = Duration::from_secs_f64(1.0 / self.tick_hz as f64);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("🚗 Decision loop running at {} Hz", self.tick_hz);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let tick_start = Instant::now();
                    self.tick();
                    let elapsed = tick_start.elapsed();
                    if elapsed > period {
                        debug!(
                            "Tick {} overran its {:?} budget ({:?}); dropping missed ticks",
                            self.tick_count, period, elapsed
                        );
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        self.stop_actuation();
        Ok(())
    }

    /// One pass of sense → extract → score → smooth → arbitrate → actuate.
    /// Severity changes land at the start of the next tick.
    pub fn tick(&mut self) {
        self.tick_count += 1;
        let severity = *self.severity_rx.borrow();
        let snapshot = self.hub.snapshot();

        let signal = match self.extractor.extract(&snapshot) {
            Ok(features) => match self.scorer.score(&features) {
                Ok(score) => self.smoother.push(score),
                Err(err) => {
                    warn!("Tick {}: scoring skipped: {}", self.tick_count, err);
                    self.smoother.signal()
                }
            },
            Err(err) => {
                warn!("Tick {}: feature extraction skipped: {}", self.tick_count, err);
                self.smoother.signal()
            }
        };

        if let Some(transition) = self.arbiter.update(severity, &signal) {
            if transition.to.mode == ControlMode::Autonomous {
                self.mapper.reset();
            }
            self.record_transition(&transition, severity, &signal);
        }

        let want_autopilot = self.arbiter.mode() == ControlMode::Autonomous;
        if self.autopilot_acked != Some(want_autopilot) {
            match self.control.set_autopilot(want_autopilot) {
                Ok(()) => self.autopilot_acked = Some(want_autopilot),
                Err(err) => warn!("set_autopilot({}) rejected: {}", want_autopilot, err),
            }
        }

        if self.arbiter.mode() == ControlMode::Manual {
            let intent = self.intents.sample();
            let command = self.mapper.step(&intent);
            if let Err(err) = self.control.apply_control(&command) {
                // Retried next tick with a freshly computed command.
                warn!("apply_control rejected: {}", err);
            }
        }

        if self.tick_count % PROGRESS_INTERVAL_TICKS == 0 {
            let state = self.arbiter.state();
            info!(
                "Tick {} | Mode: {} | Lock: {} | mean={:.2} high={} low={} | severity={}",
                self.tick_count,
                state.mode.as_str(),
                if state.forced_manual_lock { "YES" } else { "no" },
                signal.mean,
                signal.high_streak,
                signal.low_streak,
                severity.tier()
            );
        }
    }

    fn record_transition(
        &mut self,
        transition: &ModeTransition,
        severity: SeverityLevel,
        signal: &SmoothedSignal,
    ) {
        let Some(file) = &mut self.events else {
            return;
        };

        let line = serde_json::json!({
            "tick": self.tick_count,
            "elapsed_ms": self.started.elapsed().as_secs_f64() * 1000.0,
            "from": transition.from.mode.as_str(),
            "to": transition.to.mode.as_str(),
            "locked": transition.to.forced_manual_lock,
            "reason": transition.reason,
            "severity": severity.tier(),
            "score_mean": signal.mean,
            "high_streak": signal.high_streak,
            "low_streak": signal.low_streak,
        });

        if let Err(err) = writeln!(file, "{}", line).and_then(|_| file.flush()) {
            warn!("Failed to record mode event: {}", err);
        }
    }

    /// Final neutral command and autopilot release before the process exits.
    fn stop_actuation(&mut self) {
        if let Err(err) = self.control.apply_control(&ActuationCommand::neutral()) {
            warn!("Final neutral command rejected: {}", err);
        }
        if let Err(err) = self.control.set_autopilot(false) {
            warn!("Final autopilot release rejected: {}", err);
        }
        self.autopilot_acked = Some(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::ScoreError;
    use crate::types::{LidarFrame, ManualIntent};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Plays back a fixed score sequence; repeats the last score when the
    /// script runs out.
    struct ScriptedScorer {
        dim: usize,
        scores: VecDeque<f32>,
        last: f32,
    }

    impl ScriptedScorer {
        fn new(dim: usize, scores: &[f32]) -> Self {
            Self {
                dim,
                scores: scores.iter().copied().collect(),
                last: *scores.last().unwrap_or(&0.0),
            }
        }
    }

    impl AnomalyScorer for ScriptedScorer {
        fn score(&mut self, features: &[f32]) -> Result<f32, ScoreError> {
            if features.len() != self.dim {
                return Err(crate::features::ShapeMismatch {
                    expected: self.dim,
                    actual: features.len(),
                }
                .into());
            }
            Ok(self.scores.pop_front().unwrap_or(self.last))
        }
    }

    #[derive(Default)]
    struct SinkState {
        autopilot_calls: Vec<bool>,
        commands: Vec<ActuationCommand>,
        autopilot_failures_left: usize,
    }

    #[derive(Clone)]
    struct RecordingSink(Arc<Mutex<SinkState>>);

    impl RecordingSink {
        fn new() -> Self {
            Self(Arc::new(Mutex::new(SinkState::default())))
        }

        fn failing_autopilot(times: usize) -> Self {
            let sink = Self::new();
            sink.0.lock().unwrap().autopilot_failures_left = times;
            sink
        }
    }

    impl ControlSink for RecordingSink {
        fn set_autopilot(&mut self, engaged: bool) -> Result<()> {
            let mut state = self.0.lock().unwrap();
            if state.autopilot_failures_left > 0 {
                state.autopilot_failures_left -= 1;
                anyhow::bail!("bridge unavailable");
            }
            state.autopilot_calls.push(engaged);
            Ok(())
        }

        fn apply_control(&mut self, command: &ActuationCommand) -> Result<()> {
            self.0.lock().unwrap().commands.push(*command);
            Ok(())
        }
    }

    struct HeldIntent(ManualIntent);

    impl IntentSource for HeldIntent {
        fn sample(&mut self) -> ManualIntent {
            self.0
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.sensors.use_camera = false;
        config.sensors.use_radar = false;
        config.sensors.lidar_max_points = 4;
        config.model.input_dim = 12;
        config.output.log_events = false;
        config
    }

    fn supervisor_with(
        scores: &[f32],
        sink: RecordingSink,
        intent: ManualIntent,
    ) -> (Supervisor<ScriptedScorer>, Arc<SensorHub>, watch::Sender<SeverityLevel>) {
        let config = test_config();
        let hub = Arc::new(SensorHub::new());
        let (tx, rx) = watch::channel(SeverityLevel(0));
        let supervisor = Supervisor::new(
            &config,
            Arc::clone(&hub),
            ScriptedScorer::new(12, scores),
            Box::new(sink),
            Box::new(HeldIntent(intent)),
            rx,
        )
        .unwrap();
        (supervisor, hub, tx)
    }

    #[test]
    fn test_autonomous_ticks_do_not_actuate() {
        let sink = RecordingSink::new();
        let (mut supervisor, _hub, _tx) =
            supervisor_with(&[1.0], sink.clone(), ManualIntent::default());

        for _ in 0..5 {
            supervisor.tick();
        }

        let state = sink.0.lock().unwrap();
        assert!(state.commands.is_empty());
        // Autopilot engaged once at startup, not re-sent every tick.
        assert_eq!(state.autopilot_calls, vec![true]);
    }

    #[test]
    fn test_high_scores_switch_to_manual_and_actuate() {
        let sink = RecordingSink::new();
        let held = ManualIntent {
            accelerate: true,
            ..ManualIntent::default()
        };
        // One clean tick, then the score stays high: the high streak
        // completes on tick 4 and the mode flips there.
        let (mut supervisor, _hub, _tx) = supervisor_with(&[1.0, 25.0], sink.clone(), held);

        for _ in 0..15 {
            supervisor.tick();
        }

        assert_eq!(supervisor.mode(), ControlMode::Manual);
        let state = sink.0.lock().unwrap();
        assert_eq!(state.autopilot_calls, vec![true, false]);
        // Manual from tick 4 on: 12 actuation commands, throttle ramped
        // and clamped at the cap.
        assert_eq!(state.commands.len(), 12);
        assert!(state.commands.iter().all(|c| c.throttle <= 0.5));
        assert_eq!(state.commands.last().unwrap().throttle, 0.5);
    }

    #[test]
    fn test_severity_override_applies_on_next_tick() {
        let sink = RecordingSink::new();
        let (mut supervisor, _hub, tx) =
            supervisor_with(&[1.0], sink.clone(), ManualIntent::default());

        supervisor.tick();
        assert_eq!(supervisor.mode(), ControlMode::Autonomous);

        tx.send(SeverityLevel(3)).unwrap();
        supervisor.tick();
        assert_eq!(supervisor.mode(), ControlMode::Manual);

        tx.send(SeverityLevel(0)).unwrap();
        supervisor.tick();
        assert_eq!(supervisor.mode(), ControlMode::Autonomous);
    }

    #[test]
    fn test_shape_mismatch_keeps_state_and_mode() {
        let sink = RecordingSink::new();
        let (mut supervisor, hub, _tx) =
            supervisor_with(&[25.0], sink.clone(), ManualIntent::default());

        // Healthy ticks drive the mode to manual.
        supervisor.tick();
        assert_eq!(supervisor.mode(), ControlMode::Manual);
        let history_before = supervisor.smoother.history_len();

        // A lidar frame alone cannot break the vector shape (pad/truncate
        // absorbs it), so narrow the extractor's expectation instead.
        supervisor.extractor = FeatureExtractor::new(test_config().sensors, 99);
        hub.update_lidar(LidarFrame {
            points: vec![[0.0; 3]; 4],
            timestamp_ms: 0.0,
        });

        for _ in 0..5 {
            supervisor.tick();
        }

        assert_eq!(supervisor.mode(), ControlMode::Manual);
        assert_eq!(supervisor.smoother.history_len(), history_before);
    }

    #[test]
    fn test_autopilot_retried_until_sink_accepts() {
        let sink = RecordingSink::failing_autopilot(2);
        let (mut supervisor, _hub, _tx) =
            supervisor_with(&[1.0], sink.clone(), ManualIntent::default());

        supervisor.tick();
        assert!(sink.0.lock().unwrap().autopilot_calls.is_empty());

        supervisor.tick();
        supervisor.tick();
        let state = sink.0.lock().unwrap();
        assert_eq!(state.autopilot_calls, vec![true]);
    }

    #[test]
    fn test_mapper_reset_on_return_to_autonomous() {
        let sink = RecordingSink::new();
        let held = ManualIntent {
            accelerate: true,
            ..ManualIntent::default()
        };
        // High long enough to go manual and build throttle, low long enough
        // to recover, then a fresh high streak.
        let scores = [25.0, 25.0, 25.0, 1.0, 1.0, 1.0, 25.0, 25.0, 25.0];
        let (mut supervisor, _hub, _tx) = supervisor_with(&scores, sink.clone(), held);

        for _ in 0..6 {
            supervisor.tick();
        }
        assert_eq!(supervisor.mode(), ControlMode::Autonomous);

        // The new streak completes on tick 9; the first manual command
        // starts from a neutral mapper, not the stale throttle.
        for _ in 0..3 {
            supervisor.tick();
        }
        assert_eq!(supervisor.mode(), ControlMode::Manual);
        let state = sink.0.lock().unwrap();
        let first_after_reset = state.commands.last().unwrap();
        assert!((first_after_reset.throttle - 0.05).abs() < 1e-6);
    }
}
