use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageReader};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("could not open image {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not decode image {path}: {source}")]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Decodes an image file, guessing the format from its content.
pub fn load_image(path: &Path) -> Result<DynamicImage, DecodeError> {
    let reader = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|source| DecodeError::Open {
            path: path.to_path_buf(),
            source,
        })?;
    reader.decode().map_err(|source| DecodeError::Decode {
        path: path.to_path_buf(),
        source,
    })
}
