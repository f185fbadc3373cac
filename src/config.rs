//! Runtime configuration.
//!
//! Every tunable of the tracker lives here with its default. A JSON file may
//! override any subset of the fields; missing fields keep their defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::hologram::{max_extent, VIEW_DISTANCE};

/// Thumb-to-index distance (normalized image units) below which a hand pinches.
pub const PINCH_THRESHOLD: f32 = 0.05;
/// Hologram spin per frame with the hand centered (radians).
pub const BASE_ROTATION_RATE: f32 = 0.005;
/// Extra spin per unit of horizontal hand offset from the center.
pub const ROTATION_SENSITIVITY: f32 = 0.05;
pub const BASE_SCALE: f32 = 1.0;
/// Pinch distance that maps to the largest scale.
pub const PINCH_CEILING: f32 = 0.1;
/// Fraction of the remaining distance to the target scale covered per frame.
pub const SCALE_SMOOTHING: f32 = 0.1;
pub const HUD_OFFSET_X: f32 = 180.0;
pub const HUD_OFFSET_Y: f32 = -50.0;
pub const HUD_DIM_OPACITY: f32 = 0.3;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub models: ModelConfig,
    pub tracking: TrackingConfig,
    pub hud: HudConfig,
    pub hologram: HologramConfig,
    pub driver: DriverConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub device: u32,
    pub width: u32,
    pub height: u32,
    /// Mirror the preview horizontally (front-facing camera).
    pub mirror: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: 0,
            width: 1280,
            height: 720,
            mirror: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub face: PathBuf,
    pub hand: PathBuf,
    /// Whole-frame face detector used to find the face again after a loss.
    /// `null` falls back to the centered square of the frame.
    pub face_detector: Option<PathBuf>,
    /// Whole-frame palm detector, same role for the hand.
    pub palm_detector: Option<PathBuf>,
    pub intra_threads: i16,
    /// Minimum presence score for a detection to count.
    pub presence_threshold: f32,
    /// Minimum score of a face or palm box.
    pub detection_threshold: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            face: PathBuf::from("models/face_landmarks_detector.onnx"),
            hand: PathBuf::from("models/hand_landmark.onnx"),
            face_detector: Some(PathBuf::from("models/face_detection_short_range.onnx")),
            palm_detector: Some(PathBuf::from("models/palm_detection.onnx")),
            intra_threads: 2,
            presence_threshold: 0.5,
            detection_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub pinch_threshold: f32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            pinch_threshold: PINCH_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HudConfig {
    pub offset_x: f32,
    pub offset_y: f32,
    pub dim_opacity: f32,
    pub log_interval_ms: u64,
    /// Draw the detected landmarks onto the preview frame.
    pub show_landmarks: bool,
}

impl Default for HudConfig {
    fn default() -> Self {
        Self {
            offset_x: HUD_OFFSET_X,
            offset_y: HUD_OFFSET_Y,
            dim_opacity: HUD_DIM_OPACITY,
            log_interval_ms: 2000,
            show_landmarks: false,
        }
    }
}

impl HudConfig {
    pub fn log_interval(&self) -> Duration {
        Duration::from_millis(self.log_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HologramConfig {
    pub base_rotation: f32,
    pub sensitivity: f32,
    pub base_scale: f32,
    pub pinch_ceiling: f32,
    pub smoothing: f32,
    pub mid_multiplier: f32,
    pub inner_multiplier: f32,
}

impl Default for HologramConfig {
    fn default() -> Self {
        Self {
            base_rotation: BASE_ROTATION_RATE,
            sensitivity: ROTATION_SENSITIVITY,
            base_scale: BASE_SCALE,
            pinch_ceiling: PINCH_CEILING,
            smoothing: SCALE_SMOOTHING,
            mid_multiplier: 1.5,
            inner_multiplier: -2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub poll_interval_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self { poll_interval_ms: 1 }
    }
}

impl DriverConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Config {
    /// Loads the config at `path`, or the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_json(&raw)?
            }
            None => Config::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Config> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.tracking.pinch_threshold > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "tracking.pinch_threshold must be positive, got {}",
                self.tracking.pinch_threshold
            )));
        }
        if !(self.hologram.pinch_ceiling > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "hologram.pinch_ceiling must be positive, got {}",
                self.hologram.pinch_ceiling
            )));
        }
        if !(self.hologram.smoothing > 0.0 && self.hologram.smoothing <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "hologram.smoothing must be in (0, 1], got {}",
                self.hologram.smoothing
            )));
        }
        if !(self.hologram.base_scale > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "hologram.base_scale must be positive, got {}",
                self.hologram.base_scale
            )));
        }
        if max_extent(&self.hologram) >= VIEW_DISTANCE {
            return Err(Error::InvalidConfig(format!(
                "hologram.base_scale {} lets the hologram reach the camera at distance {}",
                self.hologram.base_scale, VIEW_DISTANCE
            )));
        }
        if !(0.0..=1.0).contains(&self.hud.dim_opacity) {
            return Err(Error::InvalidConfig(format!(
                "hud.dim_opacity must be in [0, 1], got {}",
                self.hud.dim_opacity
            )));
        }
        for (name, value) in [
            ("models.presence_threshold", self.models.presence_threshold),
            ("models.detection_threshold", self.models.detection_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidConfig(format!("{} must be in [0, 1], got {}", name, value)));
            }
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(Error::InvalidConfig("camera resolution must be non-zero".into()));
        }
        Ok(())
    }
}
