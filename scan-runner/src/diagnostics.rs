//! Optional intermediate rasters. Failures here are logged and never reach
//! the reconstruction result.

use std::{fs, path::Path};

use image::{DynamicImage, GrayImage, Rgb};

use scan_core::scan::ScanId;
use scan_parser::{PairMetadata, PairSource};
use scan_transformer::LineExtraction;

const OVERLAY_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

pub(crate) fn save_pair<S: PairSource>(
    source: &S,
    scan_id: &ScanId,
    metadata: &PairMetadata,
    line: &LineExtraction,
    laser_on: &DynamicImage,
) {
    let scan_dir = source.scan_dir(scan_id);
    let prefix = format!("{}_{}", scan_id, metadata.index);
    for (dir, kind, img) in [
        ("Gray_on", "gray_on", &line.gray_on),
        ("Gray_off", "gray_off", &line.gray_off),
        ("difference", "diff", &line.difference),
        ("blurred", "blurred", &line.profile),
    ] {
        let path = scan_dir.join(dir).join(format!("{prefix}_{kind}.png"));
        save_gray(&path, img);
    }

    if line.points.is_empty() {
        return;
    }
    let processed_dir = match source.processed_dir(scan_id) {
        Ok(dir) => dir,
        Err(e) => {
            log::warn!("diagnostics skipped for {}: {}", prefix, e);
            return;
        }
    };

    save_gray(
        &processed_dir.join(format!("processed_angle_{:.1}.png", metadata.angle)),
        &line.profile,
    );

    let mut overlay = laser_on.to_rgb8();
    let (width, height) = overlay.dimensions();
    for p in &line.points {
        // 3x3 dot around each peak
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let x = p.x as i64 + dx;
                let y = p.y as i64 + dy;
                if (0..width as i64).contains(&x) && (0..height as i64).contains(&y) {
                    overlay.put_pixel(x as u32, y as u32, OVERLAY_COLOR);
                }
            }
        }
    }
    let path = processed_dir.join(format!("detected_line_angle_{:.1}.png", metadata.angle));
    if let Err(e) = overlay.save(&path) {
        log::warn!("failed to write {}: {}", path.display(), e);
    }
}

fn save_gray(path: &Path, img: &GrayImage) {
    let result = match path.parent() {
        Some(parent) => fs::create_dir_all(parent).map_err(image::ImageError::IoError),
        None => Ok(()),
    }
    .and_then(|_| img.save(path));
    if let Err(e) = result {
        log::warn!("failed to write {}: {}", path.display(), e);
    }
}
