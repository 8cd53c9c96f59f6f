// src/features.rs
//
// Builds the fixed-shape feature vector the scorer expects from whatever
// the sensor snapshot holds. Each channel pads or truncates to its own
// configured block size; the concatenated vector must match the model
// input width exactly or the tick is rejected here.

use crate::sensor_buffer::SensorSnapshot;
use crate::types::{CameraFrame, LidarFrame, RadarFrame, SensorConfig};
use ndarray::Array2;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("feature vector has {actual} values, model expects {expected}")]
pub struct ShapeMismatch {
    pub expected: usize,
    pub actual: usize,
}

pub struct FeatureExtractor {
    config: SensorConfig,
    expected_dim: usize,
}

impl FeatureExtractor {
    pub fn new(config: SensorConfig, expected_dim: usize) -> Self {
        Self {
            config,
            expected_dim,
        }
    }

    /// Channel blocks concatenate in fixed order: camera, lidar, radar.
    /// Absent channels become zero-valued blocks, never an error.
    pub fn extract(&self, snapshot: &SensorSnapshot) -> Result<Vec<f32>, ShapeMismatch> {
        let mut features = Vec::with_capacity(self.expected_dim);

        if self.config.use_camera {
            features.extend(camera_block(
                snapshot.camera.as_deref(),
                self.config.camera_width,
                self.config.camera_height,
            ));
        }
        if self.config.use_lidar {
            features.extend(lidar_block(
                snapshot.lidar.as_deref(),
                self.config.lidar_max_points,
            ));
        }
        if self.config.use_radar {
            features.extend(radar_block(
                snapshot.radar.as_deref(),
                self.config.radar_max_returns,
            ));
        }

        if features.len() != self.expected_dim {
            return Err(ShapeMismatch {
                expected: self.expected_dim,
                actual: features.len(),
            });
        }
        Ok(features)
    }
}

/// Resize to the model resolution and scale u8 into [0, 1].
fn camera_block(frame: Option<&CameraFrame>, dst_width: usize, dst_height: usize) -> Vec<f32> {
    let Some(frame) = frame else {
        return vec![0.0; dst_width * dst_height * 3];
    };
    if frame.width == 0 || frame.height == 0 || frame.rgb.len() < frame.width * frame.height * 3 {
        return vec![0.0; dst_width * dst_height * 3];
    }

    let resized = resize_bilinear(&frame.rgb, frame.width, frame.height, dst_width, dst_height);
    resized.iter().map(|&v| v as f32 / 255.0).collect()
}

/// Up to `max_points` 3-D points, zero-padded or truncated, flattened row-major.
fn lidar_block(frame: Option<&LidarFrame>, max_points: usize) -> Vec<f32> {
    let mut block = Array2::<f32>::zeros((max_points, 3));
    if let Some(frame) = frame {
        for (row, point) in frame.points.iter().take(max_points).enumerate() {
            block[[row, 0]] = point[0];
            block[[row, 1]] = point[1];
            block[[row, 2]] = point[2];
        }
    }
    block.into_iter().collect()
}

/// Up to `max_returns` (depth, velocity, azimuth, altitude) tuples,
/// zero-padded or truncated, flattened row-major.
fn radar_block(frame: Option<&RadarFrame>, max_returns: usize) -> Vec<f32> {
    let mut block = Array2::<f32>::zeros((max_returns, 4));
    if let Some(frame) = frame {
        for (row, ret) in frame.returns.iter().take(max_returns).enumerate() {
            block[[row, 0]] = ret.depth;
            block[[row, 1]] = ret.velocity;
            block[[row, 2]] = ret.azimuth;
            block[[row, 3]] = ret.altitude;
        }
    }
    block.into_iter().collect()
}

/// Bilinear image resize over packed RGB8.
fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];

    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;

            let sx0 = sx.floor() as usize;
            let sy0 = sy.floor() as usize;
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);

            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round() as u8;
            }
        }
    }

    dst
}
