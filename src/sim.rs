// src/sim.rs
//
// Stand-in platform collaborators for running the supervisor without a
// simulator attached: random-walk sensor producers, a scripted severity
// schedule, and a control sink that only logs. A real deployment replaces
// these with implementations over its vehicle bridge.

use crate::platform::{ControlSink, IntentSource, SensorRig};
use crate::sensor_buffer::SensorHub;
use crate::types::{
    ActuationCommand, CameraFrame, LidarFrame, ManualIntent, RadarFrame, RadarReturn,
    SeverityLevel,
};
use anyhow::Result;
use std::hash::{BuildHasher as _, Hasher as _, RandomState};
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

const CAMERA_PERIOD: Duration = Duration::from_millis(33);
const LIDAR_PERIOD: Duration = Duration::from_millis(100);
const RADAR_PERIOD: Duration = Duration::from_millis(66);

const CAMERA_WIDTH: usize = 160;
const CAMERA_HEIGHT: usize = 120;

/// Emulated sensors pushing frames into the hub from independent tasks,
/// each on its own period, none sharing state with another.
#[derive(Default)]
pub struct SyntheticRig {
    tasks: Vec<JoinHandle<()>>,
}

impl SyntheticRig {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SensorRig for SyntheticRig {
    fn attach(&mut self, hub: Arc<SensorHub>) -> Result<()> {
        let start = Instant::now();

        let camera_hub = Arc::clone(&hub);
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CAMERA_PERIOD);
            let mut brightness = 128.0f64;
            loop {
                ticker.tick().await;
                brightness = random_walk_float(brightness, 0.8, 6.0).clamp(30.0, 220.0);
                camera_hub.update_camera(CameraFrame {
                    rgb: vec![brightness as u8; CAMERA_WIDTH * CAMERA_HEIGHT * 3],
                    width: CAMERA_WIDTH,
                    height: CAMERA_HEIGHT,
                    timestamp_ms: start.elapsed().as_secs_f64() * 1000.0,
                });
            }
        }));

        let lidar_hub = Arc::clone(&hub);
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(LIDAR_PERIOD);
            let mut point_count = 950usize;
            loop {
                ticker.tick().await;
                point_count = random_walk_integer(point_count, 0.8, 60).clamp(200, 1100);
                let points = (0..point_count)
                    .map(|_| {
                        [
                            gen_random_in_range(-50_000..50_000) as f32 / 1000.0,
                            gen_random_in_range(-50_000..50_000) as f32 / 1000.0,
                            gen_random_in_range(-2_000..4_000) as f32 / 1000.0,
                        ]
                    })
                    .collect();
                lidar_hub.update_lidar(LidarFrame {
                    points,
                    timestamp_ms: start.elapsed().as_secs_f64() * 1000.0,
                });
            }
        }));

        let radar_hub = hub;
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RADAR_PERIOD);
            let mut return_count = 40usize;
            loop {
                ticker.tick().await;
                return_count = random_walk_integer(return_count, 0.8, 10).clamp(0, 100);
                let returns = (0..return_count)
                    .map(|_| RadarReturn {
                        depth: gen_random_in_range(1_000..20_000) as f32 / 1000.0,
                        velocity: gen_random_in_range(-15_000..15_000) as f32 / 1000.0,
                        azimuth: gen_random_in_range(-260..260) as f32 / 1000.0,
                        altitude: gen_random_in_range(-90..90) as f32 / 1000.0,
                    })
                    .collect();
                radar_hub.update_radar(RadarFrame {
                    returns,
                    timestamp_ms: start.elapsed().as_secs_f64() * 1000.0,
                });
            }
        }));

        info!("✓ Synthetic sensor rig attached (camera, lidar, radar)");
        Ok(())
    }

    fn detach(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("Synthetic sensor rig detached");
    }
}

/// Plays a (delay, tier) schedule into the severity channel, the way an
/// operator stepping through weather presets would.
pub fn spawn_severity_schedule(
    schedule: Vec<(Duration, u8)>,
    tx: watch::Sender<SeverityLevel>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        for (delay, tier) in schedule {
            tokio::time::sleep(delay).await;
            info!("🌦️ Scripted severity: tier {}", tier);
            if tx.send(SeverityLevel(tier)).is_err() {
                return;
            }
        }
    })
}

/// A demo run: conditions degrade past the severe tier, then clear.
pub fn demo_severity_schedule() -> Vec<(Duration, u8)> {
    vec![
        (Duration::from_secs(5), 1),
        (Duration::from_secs(5), 3),
        (Duration::from_secs(10), 4),
        (Duration::from_secs(5), 2),
        (Duration::from_secs(5), 0),
    ]
}

/// Control sink that narrates instead of driving anything.
#[derive(Default)]
pub struct LogControlSink;

impl ControlSink for LogControlSink {
    fn set_autopilot(&mut self, engaged: bool) -> Result<()> {
        info!(
            "Autopilot {}",
            if engaged { "engaged" } else { "released" }
        );
        Ok(())
    }

    fn apply_control(&mut self, command: &ActuationCommand) -> Result<()> {
        debug!(
            "apply_control throttle={:.2} brake={:.2} steer={:.2}",
            command.throttle, command.brake, command.steer
        );
        Ok(())
    }
}

/// Holds one intent pattern, as if the operator kept the keys pressed.
pub struct FixedIntent(pub ManualIntent);

impl IntentSource for FixedIntent {
    fn sample(&mut self) -> ManualIntent {
        self.0
    }
}

fn gen_random_in_range(range: Range<i64>) -> i64 {
    let rand = RandomState::new().build_hasher().finish();
    let rand = (rand % (i64::MAX as u64)) as i64;
    rand % (range.end - range.start + 1) + range.start
}

/// Random walk from `previous` with probability `change_prop`, step within ±`max_delta`.
fn random_walk_float(previous: f64, change_prop: f64, max_delta: f64) -> f64 {
    if gen_random_in_range(0..100) as f64 / 100.0 < change_prop {
        const SCALE_FACTOR: f64 = 1000.0;

        let scaled_max_delta = (max_delta * SCALE_FACTOR) as i64;
        let scaled_delta = gen_random_in_range(-scaled_max_delta..scaled_max_delta) as f64;

        return previous + (scaled_delta / SCALE_FACTOR);
    }

    previous
}

fn random_walk_integer(previous: usize, change_prop: f64, max_delta: usize) -> usize {
    let max_delta = max_delta as i64;

    if gen_random_in_range(0..100) as f64 / 100.0 < change_prop {
        let delta = gen_random_in_range(-max_delta..max_delta);

        return i64::max(0, previous as i64 + delta) as usize;
    }

    previous
}
