use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Turntable rotation per captured image, in degrees.
pub const DEFAULT_STEP_DEGREES: f64 = 1.8;
/// Angle between the laser plane and the camera axis, in degrees.
pub const DEFAULT_FAN_ANGLE_DEG: f64 = 30.0;
pub const DEFAULT_CYLINDER_RADIUS: f64 = 1000.0;
/// Vertical extent relative to the cylinder radius.
pub const DEFAULT_VERTICAL_SCALE: f64 = 1.35;
pub const DEFAULT_BLUR_KERNEL_SIZE: u32 = 5;
pub const DEFAULT_STEPS_PER_PHASE: u32 = 200;
/// Step numbers run up to twice the phase length and must fit in a `u32`.
pub const MAX_STEPS_PER_PHASE: u32 = u32::MAX / 2;
pub const DEFAULT_CONTROLLER_HOST: &str = "192.168.236.90";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;

// Fan angles closer than this to 0° or 90° make tan() blow up or vanish.
const FAN_ANGLE_MARGIN_DEG: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("laser fan angle must be strictly between 0 and 90 degrees, got {0}")]
    FanAngleOutOfRange(f64),
    #[error("{name} must be finite and greater than zero, got {value}")]
    NonPositive { name: &'static str, value: f64 },
    #[error("image size must be non-zero, got {width}x{height}")]
    InvalidImageSize { width: u32, height: u32 },
    #[error("blur kernel size must be odd and at least 1, got {0}")]
    InvalidKernelSize(usize),
    #[error("steps_per_phase must be at most {max}, got {value}")]
    TooManySteps { value: u32, max: u32 },
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Calibration constants of the scanner rig.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanGeometry {
    pub step_degrees: f64,
    pub fan_angle_deg: f64,
    pub cylinder_radius: f64,
    pub vertical_scale: f64,
}

impl Default for ScanGeometry {
    fn default() -> Self {
        Self {
            step_degrees: DEFAULT_STEP_DEGREES,
            fan_angle_deg: DEFAULT_FAN_ANGLE_DEG,
            cylinder_radius: DEFAULT_CYLINDER_RADIUS,
            vertical_scale: DEFAULT_VERTICAL_SCALE,
        }
    }
}

impl ScanGeometry {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fan = self.fan_angle_deg;
        if !fan.is_finite() || fan <= FAN_ANGLE_MARGIN_DEG || fan >= 90.0 - FAN_ANGLE_MARGIN_DEG {
            return Err(ConfigError::FanAngleOutOfRange(fan));
        }
        for (name, value) in [
            ("step_degrees", self.step_degrees),
            ("cylinder_radius", self.cylinder_radius),
            ("vertical_scale", self.vertical_scale),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        Ok(())
    }

    pub fn angle_for_index(&self, index: u32) -> f64 {
        self.step_degrees * index as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub blur_kernel_size: u32,
    /// Write gray/difference/blurred rasters and line overlays next to the scan.
    pub save_diagnostics: bool,
    /// Use `cropped/` images when a crop has been applied to the scan.
    pub prefer_cropped: bool,
    /// Events retained per scan for late status queries.
    pub history_capacity: usize,
    /// Bounded wait used by status pollers before emitting a heartbeat.
    pub heartbeat_interval_ms: u64,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            blur_kernel_size: DEFAULT_BLUR_KERNEL_SIZE,
            save_diagnostics: false,
            prefer_cropped: true,
            history_capacity: 256,
            heartbeat_interval_ms: 500,
        }
    }
}

impl ReconstructionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blur_kernel_size == 0 || self.blur_kernel_size % 2 == 0 {
            return Err(ConfigError::InvalidKernelSize(
                self.blur_kernel_size as usize,
            ));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::Zero("history_capacity"));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Zero("heartbeat_interval_ms"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub steps_per_phase: u32,
    pub step_delay_ms: u64,
    /// Host (and optional port) of the motor / laser controller.
    pub controller_host: String,
    pub request_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            steps_per_phase: DEFAULT_STEPS_PER_PHASE,
            step_delay_ms: 500,
            controller_host: DEFAULT_CONTROLLER_HOST.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps_per_phase == 0 {
            return Err(ConfigError::Zero("steps_per_phase"));
        }
        if self.steps_per_phase > MAX_STEPS_PER_PHASE {
            return Err(ConfigError::TooManySteps {
                value: self.steps_per_phase,
                max: MAX_STEPS_PER_PHASE,
            });
        }
        if self.controller_host.trim().is_empty() {
            return Err(ConfigError::Empty("controller_host"));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Zero("request_timeout_ms"));
        }
        Ok(())
    }

    /// Both phases together.
    pub fn total_steps(&self) -> u32 {
        self.steps_per_phase.saturating_mul(2)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub geometry: ScanGeometry,
    pub reconstruction: ReconstructionConfig,
    pub capture: CaptureConfig,
}

impl ScannerConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: ScannerConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.geometry.validate()?;
        self.reconstruction.validate()?;
        self.capture.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ScannerConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_degenerate_fan_angles() {
        for fan in [0.0, 90.0, -10.0, 120.0, f64::NAN, 1e-9, 90.0 - 1e-9] {
            let geometry = ScanGeometry {
                fan_angle_deg: fan,
                ..ScanGeometry::default()
            };
            assert!(
                matches!(geometry.validate(), Err(ConfigError::FanAngleOutOfRange(_))),
                "fan angle {fan} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_non_positive_radius() {
        let geometry = ScanGeometry {
            cylinder_radius: 0.0,
            ..ScanGeometry::default()
        };
        assert!(matches!(
            geometry.validate(),
            Err(ConfigError::NonPositive {
                name: "cylinder_radius",
                ..
            })
        ));
    }

    #[test]
    fn rejects_even_kernel() {
        let config = ReconstructionConfig {
            blur_kernel_size: 4,
            ..ReconstructionConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidKernelSize(4))
        ));
    }

    #[test]
    fn step_count_is_bounded() {
        let config = CaptureConfig {
            steps_per_phase: u32::MAX,
            ..CaptureConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::TooManySteps { value: u32::MAX, .. })
        ));
        assert_eq!(config.total_steps(), u32::MAX);

        let largest = CaptureConfig {
            steps_per_phase: MAX_STEPS_PER_PHASE,
            ..CaptureConfig::default()
        };
        largest.validate().unwrap();
        assert_eq!(largest.total_steps(), MAX_STEPS_PER_PHASE * 2);
    }

    #[test]
    fn rejects_blank_controller_host() {
        let config = CaptureConfig {
            controller_host: " ".to_string(),
            ..CaptureConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Empty("controller_host"))
        ));
    }

    #[test]
    fn angle_is_step_times_index() {
        let geometry = ScanGeometry::default();
        assert_eq!(geometry.angle_for_index(0), 0.0);
        assert_eq!(geometry.angle_for_index(7), 1.8 * 7.0);
        assert_eq!(geometry.angle_for_index(200), 1.8 * 200.0);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanner.json");
        fs::write(&path, r#"{ "geometry": { "fan_angle_deg": 25.0 } }"#).unwrap();

        let config = ScannerConfig::from_json_file(&path).unwrap();
        assert_eq!(config.geometry.fan_angle_deg, 25.0);
        assert_eq!(config.geometry.cylinder_radius, DEFAULT_CYLINDER_RADIUS);
        assert_eq!(config.reconstruction.blur_kernel_size, 5);
        assert_eq!(config.capture.steps_per_phase, 200);
        assert_eq!(config.capture.controller_host, DEFAULT_CONTROLLER_HOST);
        assert_eq!(config.capture.request_timeout_ms, 5000);
    }
}
