use serde::{Deserialize, Serialize};

/// Brightest pixel of one image row after background subtraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point2D {
    pub x: u32,
    pub y: u32,
}

impl Point2D {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// A reconstructed point in scan space.
/// `y` is the vertical axis, `x`/`z` span the turntable plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3D {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

// Running extent of everything appended so far.
// An empty cloud keeps the inverted sentinel bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingVolume {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl BoundingVolume {
    pub fn empty() -> Self {
        Self {
            min: [f64::MAX, f64::MAX, f64::MAX],
            max: [f64::MIN, f64::MIN, f64::MIN],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min[0] > self.max[0]
    }

    fn expand(&mut self, point: &Point3D) {
        self.max[0] = self.max[0].max(point.x);
        self.max[1] = self.max[1].max(point.y);
        self.max[2] = self.max[2].max(point.z);
        self.min[0] = self.min[0].min(point.x);
        self.min[1] = self.min[1].min(point.y);
        self.min[2] = self.min[2].min(point.z);
    }
}

impl Default for BoundingVolume {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub point_count: usize,
    /// Number of `extend` calls that contributed at least one point.
    pub batches: usize,
    pub bounding_volume: BoundingVolume,
}

/// Flat, append-only list of points for one scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<Point3D>,
    pub metadata: Metadata,
}

impl PointCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_points(points: Vec<Point3D>) -> Self {
        let mut cloud = Self::new();
        cloud.extend(points);
        cloud
    }

    /// Appends in arrival order. No deduplication.
    pub fn extend<I>(&mut self, points: I)
    where
        I: IntoIterator<Item = Point3D>,
    {
        let before = self.points.len();
        for point in points {
            self.metadata.bounding_volume.expand(&point);
            self.points.push(point);
        }
        let added = self.points.len() - before;
        if added > 0 {
            self.metadata.batches += 1;
            self.metadata.point_count += added;
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point3D] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64, f64, &Point3D)> {
        self.points
            .iter()
            .map(|point| (point.x, point.y, point.z, point))
    }
}
