use rayon::prelude::*;

use scan_core::{
    config::{ConfigError, ScanGeometry},
    pointcloud::point::{Point2D, Point3D},
};

/// Projects laser peaks onto the cylindrical scan volume.
///
/// For a peak at `(x, y)` in a `width x height` image:
/// - `r = width / 2 - x` is the offset from the image center, positive to the left;
/// - `z = r / tan(fan)` is the depth implied by the fixed laser plane;
/// - `(r, z)` is rotated about the vertical axis by the turntable angle;
/// - horizontal coordinates are scaled by `radius / width`, the vertical one
///   is `(height - y) / height * radius * vertical_scale`.
#[derive(Debug, Clone)]
pub struct Triangulator {
    geometry: ScanGeometry,
    tan_fan: f64,
}

impl Triangulator {
    pub fn new(geometry: ScanGeometry) -> Result<Self, ConfigError> {
        geometry.validate()?;
        Ok(Self {
            tan_fan: geometry.fan_angle_deg.to_radians().tan(),
            geometry,
        })
    }

    pub fn geometry(&self) -> &ScanGeometry {
        &self.geometry
    }

    pub fn project(
        &self,
        points: &[Point2D],
        angle_deg: f64,
        width: u32,
        height: u32,
    ) -> Result<Vec<Point3D>, ConfigError> {
        if width == 0 || height == 0 {
            return Err(ConfigError::InvalidImageSize { width, height });
        }

        let (sin_a, cos_a) = angle_deg.to_radians().sin_cos();
        let width = width as f64;
        let height = height as f64;
        let radius = self.geometry.cylinder_radius;
        let scale = radius / width;
        let vertical = radius * self.geometry.vertical_scale;

        Ok(points
            .par_iter()
            .map(|p| {
                let r = width / 2.0 - p.x as f64;
                let z_cam = r / self.tan_fan;
                let y_norm = (height - p.y as f64) / height;

                let x3 = r * cos_a - z_cam * sin_a;
                let z3 = r * sin_a + z_cam * cos_a;
                Point3D::new(x3 * scale, y_norm * vertical, z3 * scale)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    fn triangulator() -> Triangulator {
        Triangulator::new(ScanGeometry::default()).unwrap()
    }

    #[test]
    fn center_column_maps_to_axis() {
        let pts = triangulator()
            .project(&[Point2D::new(100, 50)], 0.0, 200, 100)
            .unwrap();
        assert_close(pts[0].x, 0.0);
        assert_close(pts[0].z, 0.0);
        assert_close(pts[0].y, 0.5 * 1000.0 * 1.35);
    }

    #[test]
    fn reference_values() {
        let t = triangulator();
        // r = 100, z = 100 / tan(30deg), scale = 1000 / 200
        let depth = 100.0 / 30f64.to_radians().tan() * 5.0;

        let p0 = t.project(&[Point2D::new(0, 0)], 0.0, 200, 100).unwrap()[0];
        assert_close(p0.x, 500.0);
        assert_close(p0.z, depth);
        assert_close(p0.y, 1350.0);

        let p90 = t.project(&[Point2D::new(0, 100)], 90.0, 200, 100).unwrap()[0];
        assert_close(p90.x, -depth);
        assert_close(p90.z, 500.0);
        assert_close(p90.y, 0.0);
    }

    #[test]
    fn rotation_preserves_horizontal_distance() {
        let t = triangulator();
        let input = [Point2D::new(30, 10)];
        let base = t.project(&input, 0.0, 200, 100).unwrap()[0];
        for angle in [1.8, 45.0, 180.0, 359.0] {
            let p = t.project(&input, angle, 200, 100).unwrap()[0];
            let d0 = base.x.hypot(base.z);
            let d = p.x.hypot(p.z);
            assert!((d - d0).abs() < 1e-9);
            assert_close(p.y, base.y);
        }
    }

    #[test]
    fn output_follows_input_order() {
        let input: Vec<Point2D> = (0..50).map(|y| Point2D::new(y * 3, y)).collect();
        let out = triangulator().project(&input, 12.6, 200, 50).unwrap();
        assert_eq!(out.len(), input.len());
        for (p2, p3) in input.iter().zip(&out) {
            assert_close(p3.y, (50.0 - p2.y as f64) / 50.0 * 1350.0);
        }
    }

    #[test]
    fn zero_sized_image_is_a_configuration_error() {
        let err = triangulator()
            .project(&[Point2D::new(0, 0)], 0.0, 0, 10)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidImageSize {
                width: 0,
                height: 10
            }
        ));
    }

    #[test]
    fn invalid_fan_angle_is_rejected_up_front() {
        let geometry = ScanGeometry {
            fan_angle_deg: 90.0,
            ..ScanGeometry::default()
        };
        assert!(Triangulator::new(geometry).is_err());
    }
}
