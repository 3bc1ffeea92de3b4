//! Filesystem layout of captured scans.
//!
//! ```text
//! <root>/scan_<YYYYmmdd_HHMMSS>/
//!     laser_on/image_<step>.jpg
//!     laser_off/image_<step>.jpg
//!     cropped/{laser_on,laser_off}/   (after a crop)
//!     processed/                      (reconstruction output)
//! ```

mod crop;

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use glob::glob;
use serde::Serialize;
use thiserror::Error;

use scan_core::scan::{CaptureMode, ScanId, ScanIdError, SCAN_ID_PREFIX};

use crate::metadata::{has_image_extension, parse_index};

pub use crop::CropRect;

pub const PROCESSED_DIR: &str = "processed";
pub const CROPPED_DIR: &str = "cropped";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    InvalidScanId(#[from] ScanIdError),
    #[error("scan not found: {0}")]
    ScanNotFound(ScanId),
    #[error("missing directory: {0}")]
    MissingDirectory(PathBuf),
    #[error("invalid crop size {width}x{height}")]
    InvalidCrop { width: u32, height: u32 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// On- and off-phase image files of one scan, each sorted by step index.
#[derive(Debug, Clone, Default)]
pub struct PairListing {
    pub on: Vec<PathBuf>,
    pub off: Vec<PathBuf>,
    /// Listing comes from `cropped/`.
    pub cropped: bool,
}

/// Where the reconstruction pipeline gets its inputs and puts its outputs.
pub trait PairSource: Send + Sync {
    fn image_pairs(&self, scan_id: &ScanId) -> Result<PairListing, StorageError>;

    /// Output directory for the scan, created on demand.
    fn processed_dir(&self, scan_id: &ScanId) -> Result<PathBuf, StorageError>;

    /// Root under which intermediate rasters may be written.
    fn scan_dir(&self, scan_id: &ScanId) -> PathBuf;
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub id: ScanId,
    pub date: String,
    pub time: String,
    pub laser_on_images: usize,
    pub laser_off_images: usize,
    pub total_images: usize,
    pub size_bytes: u64,
    pub size: String,
    pub processed: bool,
}

#[derive(Debug, Clone)]
pub struct ScanStore {
    root: PathBuf,
    prefer_cropped: bool,
}

impl ScanStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            prefer_cropped: true,
        })
    }

    pub fn with_prefer_cropped(mut self, prefer_cropped: bool) -> Self {
        self.prefer_cropped = prefer_cropped;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn create_scan(&self) -> Result<ScanId, StorageError> {
        self.create_scan_at(Local::now())
    }

    pub fn create_scan_at<Tz: TimeZone>(&self, when: DateTime<Tz>) -> Result<ScanId, StorageError>
    where
        Tz::Offset: std::fmt::Display,
    {
        let id = ScanId::from_timestamp(&when.format(TIMESTAMP_FORMAT).to_string())?;
        let dir = self.scan_path(&id);
        for mode in [CaptureMode::LaserOn, CaptureMode::LaserOff] {
            fs::create_dir_all(dir.join(mode.dir_name()))?;
        }
        log::info!("created scan directory {}", dir.display());
        Ok(id)
    }

    fn scan_path(&self, scan_id: &ScanId) -> PathBuf {
        self.root.join(scan_id.as_str())
    }

    fn existing_scan_path(&self, scan_id: &ScanId) -> Result<PathBuf, StorageError> {
        let path = self.scan_path(scan_id);
        if path.is_dir() {
            Ok(path)
        } else {
            Err(StorageError::ScanNotFound(scan_id.clone()))
        }
    }

    fn scan_ids(&self) -> Result<Vec<ScanId>, StorageError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(SCAN_ID_PREFIX) {
                continue;
            }
            if let Ok(id) = ScanId::parse(name) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Most recent scan, which is where phone uploads land.
    pub fn latest_scan(&self) -> Result<Option<ScanId>, StorageError> {
        Ok(self.scan_ids()?.pop())
    }

    /// All scans, newest first.
    pub fn list_scans(&self) -> Result<Vec<ScanSummary>, StorageError> {
        let mut summaries = Vec::new();
        for id in self.scan_ids()?.into_iter().rev() {
            let path = self.scan_path(&id);

            let (date, time) = match NaiveDateTime::parse_from_str(id.timestamp(), TIMESTAMP_FORMAT)
            {
                Ok(ts) => (
                    ts.format("%B %d, %Y").to_string(),
                    ts.format("%I:%M %p").to_string(),
                ),
                Err(_) => ("Unknown".to_string(), "Unknown".to_string()),
            };

            let laser_on_images = count_images(&path.join(CaptureMode::LaserOn.dir_name()))?;
            let laser_off_images = count_images(&path.join(CaptureMode::LaserOff.dir_name()))?;
            let size_bytes = dir_size(&path)?;

            summaries.push(ScanSummary {
                date,
                time,
                laser_on_images,
                laser_off_images,
                total_images: laser_on_images + laser_off_images,
                size_bytes,
                size: format_size(size_bytes),
                processed: path.join(PROCESSED_DIR).exists(),
                id,
            });
        }
        Ok(summaries)
    }

    pub fn delete_scan(&self, scan_id: &ScanId) -> Result<(), StorageError> {
        let path = self.existing_scan_path(scan_id)?;
        fs::remove_dir_all(&path)?;
        log::info!("deleted scan: {}", scan_id);
        Ok(())
    }

    /// Stores one captured frame as `image_<step>.jpg` in the phase directory.
    pub fn save_capture(
        &self,
        scan_id: &ScanId,
        mode: CaptureMode,
        step: u32,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let dir = self.existing_scan_path(scan_id)?.join(mode.dir_name());
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("image_{step}.jpg"));
        fs::write(&path, bytes)?;
        log::debug!("image saved: {} (mode: {})", path.display(), mode);
        Ok(path)
    }

    pub fn crop_scan(&self, scan_id: &ScanId, rect: CropRect) -> Result<usize, StorageError> {
        let scan_dir = self.existing_scan_path(scan_id)?;
        crop::crop_scan_dir(&scan_dir, rect)
    }
}

impl PairSource for ScanStore {
    fn image_pairs(&self, scan_id: &ScanId) -> Result<PairListing, StorageError> {
        let scan_dir = self.existing_scan_path(scan_id)?;
        let cropped_dir = scan_dir.join(CROPPED_DIR);
        // Only a complete crop (both phases) replaces the originals.
        let cropped = self.prefer_cropped
            && [CaptureMode::LaserOn, CaptureMode::LaserOff]
                .iter()
                .all(|mode| cropped_dir.join(mode.dir_name()).is_dir());
        let base = if cropped { cropped_dir } else { scan_dir };

        Ok(PairListing {
            on: list_images(&base.join(CaptureMode::LaserOn.dir_name()))?,
            off: list_images(&base.join(CaptureMode::LaserOff.dir_name()))?,
            cropped,
        })
    }

    fn processed_dir(&self, scan_id: &ScanId) -> Result<PathBuf, StorageError> {
        let dir = self.existing_scan_path(scan_id)?.join(PROCESSED_DIR);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn scan_dir(&self, scan_id: &ScanId) -> PathBuf {
        self.scan_path(scan_id)
    }
}

/// Image files in `dir`, ordered by their step index.
/// Names without an index sort last, by name, so that they still reach the
/// pipeline and get reported.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    if !dir.is_dir() {
        return Err(StorageError::MissingDirectory(dir.to_path_buf()));
    }
    let pattern = format!("{}/*", glob::Pattern::escape(&dir.to_string_lossy()));
    let mut files: Vec<PathBuf> = glob(&pattern)?
        .filter_map(Result::ok)
        .filter(|path| path.is_file() && has_image_extension(path))
        .collect();

    files.sort_by_cached_key(|path| {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let key = match parse_index(&name) {
            Some(index) => (0u8, index),
            None => (1u8, 0),
        };
        (key, name)
    });
    Ok(files)
}

fn count_images(dir: &Path) -> Result<usize, StorageError> {
    if !dir.is_dir() {
        return Ok(0);
    }
    Ok(list_images(dir)?.len())
}

fn dir_size(dir: &Path) -> Result<u64, StorageError> {
    let mut total = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            total += dir_size(&entry.path())?;
        } else if file_type.is_file() {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn store() -> (tempfile::TempDir, ScanStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ScanStore::new(dir.path().join("scan_images")).unwrap();
        (dir, store)
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<chrono::Utc> {
        NaiveDate::from_ymd_opt(2024, 10, 19)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn create_scan_makes_phase_dirs() {
        let (_tmp, store) = store();
        let id = store.create_scan_at(at(8, 30, 0)).unwrap();
        assert_eq!(id.as_str(), "scan_20241019_083000");
        assert!(store.root().join("scan_20241019_083000/laser_on").is_dir());
        assert!(store.root().join("scan_20241019_083000/laser_off").is_dir());
    }

    #[test]
    fn listing_sorts_by_step_index() {
        let (_tmp, store) = store();
        let id = store.create_scan_at(at(8, 30, 0)).unwrap();
        for step in [10u32, 2, 1] {
            store
                .save_capture(&id, CaptureMode::LaserOn, step, b"x")
                .unwrap();
        }
        let on_dir = store.scan_dir(&id).join("laser_on");
        fs::write(on_dir.join("notes.txt"), b"ignored").unwrap();
        fs::write(on_dir.join("stray.png"), b"x").unwrap();

        let names: Vec<String> = list_images(&on_dir)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["image_1.jpg", "image_2.jpg", "image_10.jpg", "stray.png"]
        );
    }

    #[test]
    fn pairs_prefer_cropped_images() {
        let (_tmp, store) = store();
        let id = store.create_scan_at(at(8, 30, 0)).unwrap();
        store
            .save_capture(&id, CaptureMode::LaserOn, 1, b"x")
            .unwrap();
        store
            .save_capture(&id, CaptureMode::LaserOff, 201, b"x")
            .unwrap();

        let listing = store.image_pairs(&id).unwrap();
        assert!(!listing.cropped);
        assert_eq!((listing.on.len(), listing.off.len()), (1, 1));

        let cropped = store.scan_dir(&id).join("cropped");
        fs::create_dir_all(cropped.join("laser_on")).unwrap();
        fs::create_dir_all(cropped.join("laser_off")).unwrap();
        let listing = store.image_pairs(&id).unwrap();
        assert!(listing.cropped);
        assert!(listing.on.is_empty());

        let listing = store
            .clone()
            .with_prefer_cropped(false)
            .image_pairs(&id)
            .unwrap();
        assert!(!listing.cropped);
    }

    #[test]
    fn half_cropped_scan_uses_originals() {
        let (_tmp, store) = store();
        let id = store.create_scan_at(at(8, 30, 0)).unwrap();
        store
            .save_capture(&id, CaptureMode::LaserOn, 1, b"x")
            .unwrap();
        store
            .save_capture(&id, CaptureMode::LaserOff, 201, b"x")
            .unwrap();
        fs::create_dir_all(store.scan_dir(&id).join("cropped/laser_on")).unwrap();

        let listing = store.image_pairs(&id).unwrap();
        assert!(!listing.cropped);
        assert_eq!((listing.on.len(), listing.off.len()), (1, 1));
    }

    #[test]
    fn list_scans_newest_first_with_counts() {
        let (_tmp, store) = store();
        let old = store.create_scan_at(at(8, 0, 0)).unwrap();
        let new = store.create_scan_at(at(9, 15, 0)).unwrap();
        store
            .save_capture(&new, CaptureMode::LaserOn, 1, &[0u8; 2048])
            .unwrap();
        store.processed_dir(&new).unwrap();

        let scans = store.list_scans().unwrap();
        assert_eq!(scans.len(), 2);
        assert_eq!(scans[0].id, new);
        assert_eq!(scans[0].laser_on_images, 1);
        assert_eq!(scans[0].total_images, 1);
        assert_eq!(scans[0].size, "2.0 KB");
        assert_eq!(scans[0].date, "October 19, 2024");
        assert_eq!(scans[0].time, "09:15 AM");
        assert!(scans[0].processed);
        assert_eq!(scans[1].id, old);
        assert!(!scans[1].processed);
        assert_eq!(store.latest_scan().unwrap(), Some(new));
    }

    #[test]
    fn delete_scan_removes_directory() {
        let (_tmp, store) = store();
        let id = store.create_scan_at(at(8, 0, 0)).unwrap();
        store.delete_scan(&id).unwrap();
        assert!(!store.scan_dir(&id).exists());
        assert!(matches!(
            store.delete_scan(&id),
            Err(StorageError::ScanNotFound(_))
        ));
    }

    #[test]
    fn size_formatting() {
        assert_eq!(format_size(12), "12 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
