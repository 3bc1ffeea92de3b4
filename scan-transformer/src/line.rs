use image::{DynamicImage, GrayImage, Luma};
use rayon::prelude::*;
use thiserror::Error;

use scan_core::{config::ConfigError, pointcloud::point::Point2D};

use crate::kernel::{gaussian_blur, GaussianKernel};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineError {
    #[error(
        "laser-on image is {on_width}x{on_height} but laser-off image is {off_width}x{off_height}"
    )]
    DimensionMismatch {
        on_width: u32,
        on_height: u32,
        off_width: u32,
        off_height: u32,
    },
}

/// Every intermediate raster of one extraction, plus the detected points.
/// Only `points` feeds the reconstruction; the rasters are kept for
/// diagnostics.
#[derive(Debug, Clone)]
pub struct LineExtraction {
    pub gray_on: GrayImage,
    pub gray_off: GrayImage,
    pub difference: GrayImage,
    pub profile: GrayImage,
    pub points: Vec<Point2D>,
}

/// BT.601 luma in 14-bit fixed point. 8-bit gray input is passed through.
pub fn to_luma(img: &DynamicImage) -> GrayImage {
    if let DynamicImage::ImageLuma8(gray) = img {
        return gray.clone();
    }
    let rgb = img.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = (r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + 8192) >> 14;
        Luma([luma as u8])
    })
}

/// `max(0, on - off)` per pixel.
pub fn subtract_background(on: &GrayImage, off: &GrayImage) -> Result<GrayImage, LineError> {
    if on.dimensions() != off.dimensions() {
        return Err(LineError::DimensionMismatch {
            on_width: on.width(),
            on_height: on.height(),
            off_width: off.width(),
            off_height: off.height(),
        });
    }
    Ok(GrayImage::from_fn(on.width(), on.height(), |x, y| {
        Luma([on.get_pixel(x, y).0[0].saturating_sub(off.get_pixel(x, y).0[0])])
    }))
}

/// Column of the brightest pixel in `row`, lowest x on ties.
/// `None` when the row carries no signal.
pub fn row_peak(row: &[u8]) -> Option<usize> {
    let max = *row.iter().max()?;
    if max == 0 {
        return None;
    }
    row.iter().position(|&v| v == max)
}

/// One point per row that has signal, ordered top to bottom.
pub fn peak_points(profile: &GrayImage) -> Vec<Point2D> {
    let width = profile.width() as usize;
    if width == 0 {
        return Vec::new();
    }
    profile
        .as_raw()
        .par_chunks(width)
        .enumerate()
        .filter_map(|(y, row)| row_peak(row).map(|x| Point2D::new(x as u32, y as u32)))
        .collect()
}

#[derive(Debug, Clone)]
pub struct LineExtractor {
    kernel: GaussianKernel,
}

impl Default for LineExtractor {
    fn default() -> Self {
        Self {
            kernel: GaussianKernel::default(),
        }
    }
}

impl LineExtractor {
    /// Fails on an even `kernel_size`.
    pub fn new(kernel_size: usize) -> Result<Self, ConfigError> {
        Ok(Self {
            kernel: GaussianKernel::with_size(kernel_size)?,
        })
    }

    pub fn extract(
        &self,
        laser_on: &DynamicImage,
        laser_off: &DynamicImage,
    ) -> Result<LineExtraction, LineError> {
        let gray_on = to_luma(laser_on);
        let gray_off = to_luma(laser_off);
        let difference = subtract_background(&gray_on, &gray_off)?;
        let profile = gaussian_blur(&difference, &self.kernel);
        let points = peak_points(&profile);
        log::trace!(
            "line extraction: {} of {} rows with signal",
            points.len(),
            profile.height()
        );

        Ok(LineExtraction {
            gray_on,
            gray_off,
            difference,
            profile,
            points,
        })
    }
}

pub fn extract_line(
    laser_on: &DynamicImage,
    laser_off: &DynamicImage,
) -> Result<LineExtraction, LineError> {
    LineExtractor::default().extract(laser_on, laser_off)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn background(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| Luma([((x * 7 + y * 13) % 60) as u8]))
    }

    fn with_column(base: &GrayImage, column: u32) -> GrayImage {
        let mut img = base.clone();
        for y in 0..img.height() {
            img.put_pixel(column, y, Luma([250]));
        }
        img
    }

    #[test]
    fn identical_images_yield_no_points() {
        let img = DynamicImage::ImageLuma8(background(64, 48));
        let line = extract_line(&img, &img).unwrap();
        assert!(line.points.is_empty());
        assert!(line.difference.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn bright_column_is_found_on_every_row() {
        let off = background(100, 40);
        let on = with_column(&off, 50);
        let line = extract_line(
            &DynamicImage::ImageLuma8(on),
            &DynamicImage::ImageLuma8(off),
        )
        .unwrap();

        assert_eq!(line.points.len(), 40);
        for (row, p) in line.points.iter().enumerate() {
            assert_eq!(p.y, row as u32);
            assert!(p.x.abs_diff(50) <= 2, "row {row}: x = {}", p.x);
        }
    }

    #[test]
    fn dark_rows_are_skipped() {
        let off = GrayImage::new(30, 20);
        let mut on = off.clone();
        on.put_pixel(10, 10, Luma([255]));
        let line = extract_line(
            &DynamicImage::ImageLuma8(on),
            &DynamicImage::ImageLuma8(off),
        )
        .unwrap();

        // The 5x5 blur spreads the pixel over rows 8..=12.
        let rows: Vec<u32> = line.points.iter().map(|p| p.y).collect();
        assert_eq!(rows, vec![8, 9, 10, 11, 12]);
        assert!(line.points.iter().all(|p| p.x == 10));
    }

    #[test]
    fn background_brighter_than_laser_saturates_to_zero() {
        let on = GrayImage::from_pixel(8, 8, Luma([10]));
        let off = GrayImage::from_pixel(8, 8, Luma([200]));
        let diff = subtract_background(&on, &off).unwrap();
        assert!(diff.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn even_blur_kernel_is_an_error() {
        assert!(matches!(
            LineExtractor::new(4),
            Err(ConfigError::InvalidKernelSize(4))
        ));
        assert!(LineExtractor::new(7).is_ok());
    }

    #[test]
    fn ties_pick_lowest_column() {
        assert_eq!(row_peak(&[0, 9, 3, 9, 1]), Some(1));
        assert_eq!(row_peak(&[0, 0, 0]), None);
        assert_eq!(row_peak(&[]), None);
    }

    #[test]
    fn mismatched_sizes_are_rejected() {
        let on = DynamicImage::ImageLuma8(GrayImage::new(10, 10));
        let off = DynamicImage::ImageLuma8(GrayImage::new(10, 9));
        assert_eq!(
            extract_line(&on, &off).unwrap_err(),
            LineError::DimensionMismatch {
                on_width: 10,
                on_height: 10,
                off_width: 10,
                off_height: 9,
            }
        );
    }

    #[test]
    fn rgb_uses_bt601_weights() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(3, 1, |x, _| match x {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 255, 0]),
            _ => Rgb([255, 255, 255]),
        }));
        let gray = to_luma(&img);
        assert_eq!(gray.get_pixel(0, 0).0[0], 76);
        assert_eq!(gray.get_pixel(1, 0).0[0], 150);
        assert_eq!(gray.get_pixel(2, 0).0[0], 255);
    }
}
