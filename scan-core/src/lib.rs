pub mod config;
pub mod pointcloud;
pub mod scan;

pub use config::{CaptureConfig, ConfigError, ReconstructionConfig, ScanGeometry, ScannerConfig};
