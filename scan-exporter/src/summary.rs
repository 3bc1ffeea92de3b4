use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};

pub const PROCESSING_INFO_FILE: &str = "processing_info.txt";

#[derive(Debug, Clone)]
pub struct ProcessingInfo {
    pub processed_at: DateTime<Local>,
    pub total_points: usize,
    /// Number of image pairs the run iterated over, skipped ones included.
    pub total_pairs: usize,
}

impl ProcessingInfo {
    pub fn now(total_points: usize, total_pairs: usize) -> Self {
        Self {
            processed_at: Local::now(),
            total_points,
            total_pairs,
        }
    }

    pub fn render(&self) -> String {
        format!(
            "Processed on {}\nTotal points: {}\nTotal images processed: {}\n",
            self.processed_at.format("%Y-%m-%d %H:%M:%S"),
            self.total_points,
            self.total_pairs
        )
    }
}

pub fn write_processing_info(dir: &Path, info: &ProcessingInfo) -> io::Result<PathBuf> {
    let path = dir.join(PROCESSING_INFO_FILE);
    fs::write(&path, info.render())?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn renders_summary_lines() {
        let info = ProcessingInfo {
            processed_at: Local.with_ymd_and_hms(2024, 10, 19, 8, 30, 5).unwrap(),
            total_points: 1234,
            total_pairs: 200,
        };
        assert_eq!(
            info.render(),
            "Processed on 2024-10-19 08:30:05\nTotal points: 1234\nTotal images processed: 200\n"
        );
    }

    #[test]
    fn writes_next_to_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_processing_info(dir.path(), &ProcessingInfo::now(3, 1)).unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert!(text.contains("Total points: 3"));
    }
}
