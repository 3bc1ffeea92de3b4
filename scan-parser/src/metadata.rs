use std::path::Path;

use scan_core::ScanGeometry;
use thiserror::Error;

const INDEX_MARKER: &str = "image_";
const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("cannot extract metadata from filename: {0}")]
    MalformedIdentifier(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairMetadata {
    pub index: u32,
    /// Turntable angle in degrees.
    pub angle: f64,
}

pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext))
}

/// Reads the step index out of `image_<n>.<jpg|jpeg|png>`.
/// Only the file name is inspected, anything before `image_` is ignored.
pub fn parse_index(identifier: &str) -> Option<u32> {
    let name = Path::new(identifier).file_name()?.to_str()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if !IMAGE_EXTENSIONS.contains(&ext) {
        return None;
    }
    let (_, digits) = stem.rsplit_once(INDEX_MARKER)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

pub fn extract_metadata(
    identifier: &str,
    geometry: &ScanGeometry,
) -> Result<PairMetadata, MetadataError> {
    let index = parse_index(identifier)
        .ok_or_else(|| MetadataError::MalformedIdentifier(identifier.to_string()))?;
    Ok(PairMetadata {
        index,
        angle: geometry.angle_for_index(index),
    })
}
