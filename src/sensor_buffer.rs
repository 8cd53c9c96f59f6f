// src/sensor_buffer.rs
//
// Latest-value cache for the three sensor channels. Producers overwrite
// their own slot; the decision tick reads a snapshot. No lock is shared
// across channels and no channel blocks another.

use crate::types::{CameraFrame, LidarFrame, RadarFrame};
use arc_swap::ArcSwapOption;
use std::sync::Arc;

#[derive(Default)]
pub struct SensorHub {
    camera: ArcSwapOption<CameraFrame>,
    lidar: ArcSwapOption<LidarFrame>,
    radar: ArcSwapOption<RadarFrame>,
}

/// The most recent frame per channel at one instant. A channel that has
/// never delivered is `None`; downstream treats that as a zero-valued frame.
/// No ordering is guaranteed between the channels' timestamps.
pub struct SensorSnapshot {
    pub camera: Option<Arc<CameraFrame>>,
    pub lidar: Option<Arc<LidarFrame>>,
    pub radar: Option<Arc<RadarFrame>>,
}

impl SensorHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_camera(&self, frame: CameraFrame) {
        self.camera.store(Some(Arc::new(frame)));
    }

    pub fn update_lidar(&self, frame: LidarFrame) {
        self.lidar.store(Some(Arc::new(frame)));
    }

    pub fn update_radar(&self, frame: RadarFrame) {
        self.radar.store(Some(Arc::new(frame)));
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            camera: self.camera.load_full(),
            lidar: self.lidar.load_full(),
            radar: self.radar.load_full(),
        }
    }
}
