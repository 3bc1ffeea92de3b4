use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SCAN_ID_PREFIX: &str = "scan_";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid scan id: {0:?}")]
pub struct ScanIdError(pub String);

/// Name of a scan directory, e.g. `scan_20241019_083000`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScanId(String);

impl ScanId {
    pub fn parse(value: &str) -> Result<Self, ScanIdError> {
        let valid = value.starts_with(SCAN_ID_PREFIX)
            && value.len() > SCAN_ID_PREFIX.len()
            && !value.contains(['/', '\\'])
            && !value.contains("..");
        if valid {
            Ok(Self(value.to_string()))
        } else {
            Err(ScanIdError(value.to_string()))
        }
    }

    pub fn from_timestamp(timestamp: &str) -> Result<Self, ScanIdError> {
        Self::parse(&format!("{SCAN_ID_PREFIX}{timestamp}"))
    }

    /// The part after `scan_`.
    pub fn timestamp(&self) -> &str {
        &self.0[SCAN_ID_PREFIX.len()..]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ScanId {
    type Error = ScanIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ScanId> for String {
    fn from(value: ScanId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    LaserOn,
    LaserOff,
}

impl CaptureMode {
    /// Subdirectory of a scan holding this phase's images.
    pub fn dir_name(&self) -> &'static str {
        match self {
            CaptureMode::LaserOn => "laser_on",
            CaptureMode::LaserOff => "laser_off",
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureMode::LaserOn => f.write_str("Laser ON"),
            CaptureMode::LaserOff => f.write_str("Laser OFF"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_timestamped_ids() {
        let id = ScanId::parse("scan_20241019_083000").unwrap();
        assert_eq!(id.timestamp(), "20241019_083000");
        assert_eq!(id.to_string(), "scan_20241019_083000");
    }

    #[test]
    fn rejects_path_like_ids() {
        for bad in ["", "scan_", "images", "scan_../etc", "scan_a/b", "scan_a\\b"] {
            assert!(ScanId::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn serde_validates() {
        let id: ScanId = serde_json::from_str("\"scan_1\"").unwrap();
        assert_eq!(id.as_str(), "scan_1");
        assert!(serde_json::from_str::<ScanId>("\"nope\"").is_err());
    }
}
