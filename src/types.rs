use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub sensors: SensorConfig,
    pub anomaly: AnomalyConfig,
    pub arbiter: ArbiterConfig,
    pub control: ControlConfig,
    pub runtime: RuntimeConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: String,
    /// Width of the model's input layer. Must equal the concatenated
    /// feature blocks of the enabled sensor channels.
    pub input_dim: usize,
    pub use_cuda: bool,
    pub num_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: "models/vae_model.onnx".to_string(),
            input_dim: 52_552,
            use_cuda: false,
            num_threads: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub use_camera: bool,
    pub camera_width: usize,
    pub camera_height: usize,
    pub use_lidar: bool,
    pub lidar_max_points: usize,
    pub use_radar: bool,
    pub radar_max_returns: usize,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            use_camera: true,
            camera_width: 128,
            camera_height: 128,
            use_lidar: true,
            lidar_max_points: 1000,
            use_radar: true,
            radar_max_returns: 100,
        }
    }
}

impl SensorConfig {
    /// Total feature-vector length produced by the enabled channels.
    pub fn feature_dim(&self) -> usize {
        let mut dim = 0;
        if self.use_camera {
            dim += self.camera_width * self.camera_height * 3;
        }
        if self.use_lidar {
            dim += self.lidar_max_points * 3;
        }
        if self.use_radar {
            dim += self.radar_max_returns * 4;
        }
        dim
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Reconstruction error above this marks a tick anomalous.
    pub threshold: f32,
    pub history_len: usize,
    /// Consecutive ticks on one side of the threshold needed to act on a streak.
    pub streak_ticks: u32,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            threshold: 20.0,
            history_len: 10,
            streak_ticks: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    pub severity_tiers: u8,
    /// Severity at or above this tier forces the manual lock.
    pub severe_tier: u8,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            severity_tiers: 6,
            severe_tier: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub throttle_step: f32,
    pub throttle_cap: f32,
    pub brake_step: f32,
    pub brake_release_step: f32,
    pub steer_step: f32,
    pub steer_cap: f32,
    pub steer_decay: f32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            throttle_step: 0.05,
            throttle_cap: 0.5,
            brake_step: 0.1,
            brake_release_step: 0.05,
            steer_step: 0.05,
            steer_cap: 0.5,
            steer_decay: 0.9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub tick_hz: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { tick_hz: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: String,
    pub log_events: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: "output".to_string(),
            log_events: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "ood_guard=info,ort=warn".to_string(),
        }
    }
}

// ============================================================================
// SENSOR FRAMES
// ============================================================================

/// Raw RGB8 camera frame as delivered by the platform.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub rgb: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub timestamp_ms: f64,
}

#[derive(Debug, Clone)]
pub struct LidarFrame {
    pub points: Vec<[f32; 3]>,
    pub timestamp_ms: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadarReturn {
    pub depth: f32,
    pub velocity: f32,
    pub azimuth: f32,
    pub altitude: f32,
}

#[derive(Debug, Clone)]
pub struct RadarFrame {
    pub returns: Vec<RadarReturn>,
    pub timestamp_ms: f64,
}

// ============================================================================
// CONTROL
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMode {
    Autonomous,
    Manual,
}

impl ControlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlMode::Autonomous => "AUTONOMOUS",
            ControlMode::Manual => "MANUAL",
        }
    }
}

/// Externally supplied hazard tier, ordered. Tier 0 is clear conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeverityLevel(pub u8);

impl SeverityLevel {
    pub fn tier(self) -> u8 {
        self.0
    }
}

/// Discrete control intents currently asserted, sampled once per tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManualIntent {
    pub accelerate: bool,
    pub brake: bool,
    pub steer_left: bool,
    pub steer_right: bool,
}

/// The only artifact handed to the vehicle-control collaborator.
/// Steer is left-negative, right-positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ActuationCommand {
    pub throttle: f32,
    pub brake: f32,
    pub steer: f32,
}

impl ActuationCommand {
    pub const fn neutral() -> Self {
        Self {
            throttle: 0.0,
            brake: 0.0,
            steer: 0.0,
        }
    }
}
