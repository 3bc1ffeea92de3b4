use std::{fs, path::Path};

use image::{imageops, DynamicImage};
use rayon::iter::{IntoParallelRefIterator as _, ParallelIterator as _};
use serde::Deserialize;

use scan_core::scan::CaptureMode;

use super::{list_images, StorageError, CROPPED_DIR};

// Staging directory, renamed to `cropped/` once both phases are written.
const CROPPED_STAGING_DIR: &str = "cropped.partial";

/// Region of interest in pixel coordinates of the captured frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Cuts `rect` out of `img`. The result is always `width x height`; parts of
/// the rectangle outside the frame are black.
fn crop_padded(img: &DynamicImage, rect: CropRect) -> DynamicImage {
    let mut canvas = DynamicImage::new(rect.width, rect.height, img.color());
    // crop_imm clamps to the frame, so this is the in-frame part only
    let overlap = img.crop_imm(rect.x, rect.y, rect.width, rect.height);
    imageops::replace(&mut canvas, &overlap, 0, 0);
    canvas
}

/// Writes cropped copies of every phase image into `cropped/<phase>/`.
/// Returns the number of images written.
///
/// Both phases are staged first; an existing `cropped/` is only replaced
/// when every image was written.
pub(super) fn crop_scan_dir(scan_dir: &Path, rect: CropRect) -> Result<usize, StorageError> {
    if rect.width == 0 || rect.height == 0 {
        return Err(StorageError::InvalidCrop {
            width: rect.width,
            height: rect.height,
        });
    }

    let staging = scan_dir.join(CROPPED_STAGING_DIR);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }

    let written = match write_phases(scan_dir, &staging, rect) {
        Ok(written) => written,
        Err(e) => {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                log::warn!("failed to remove {}: {}", staging.display(), cleanup);
            }
            return Err(e);
        }
    };

    let target = scan_dir.join(CROPPED_DIR);
    if target.exists() {
        fs::remove_dir_all(&target)?;
    }
    fs::rename(&staging, &target)?;

    log::info!("applied cropping to {} images", written);
    Ok(written)
}

fn write_phases(scan_dir: &Path, staging: &Path, rect: CropRect) -> Result<usize, StorageError> {
    let mut written = 0;
    for mode in [CaptureMode::LaserOn, CaptureMode::LaserOff] {
        let source_dir = scan_dir.join(mode.dir_name());
        let target_dir = staging.join(mode.dir_name());
        fs::create_dir_all(&target_dir)?;

        let files = list_images(&source_dir)?;
        files.par_iter().try_for_each(|path| {
            let img = image::open(path)?;
            if let Some(name) = path.file_name() {
                crop_padded(&img, rect).save(target_dir.join(name))?;
            }
            Ok::<(), StorageError>(())
        })?;
        written += files.len();
    }
    Ok(written)
}
