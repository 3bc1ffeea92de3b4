use std::path::{Path, PathBuf};

use thiserror::Error;

use scan_core::{
    config::{ConfigError, ReconstructionConfig, ScanGeometry},
    pointcloud::point::{Point3D, PointCloud},
    scan::ScanId,
};
use scan_exporter::{write_ply, write_processing_info, PlyError, ProcessingInfo};
use scan_parser::{
    extract_metadata, load_image, DecodeError, MetadataError, PairMetadata, PairSource,
    StorageError,
};
use scan_transformer::{LineError, LineExtractor, Triangulator};

use crate::{diagnostics, event::StatusEvent, sink::ProgressSink};

pub const MODEL_FILE: &str = "reconstructed_model.ply";
const NO_POINTS_MESSAGE: &str =
    "No 3D points were generated. Check your image processing parameters.";

/// Why a single pair was skipped. Never aborts the run.
#[derive(Debug, Error)]
pub enum PairError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Line(#[from] LineError),
}

/// Scan-level failures. These end the run in the `Failed` state.
#[derive(Debug, Error)]
pub enum ReconstructError {
    #[error("mismatched number of images: {on} in laser_on, {off} in laser_off")]
    MismatchedPairCount { on: usize, off: usize },
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to write point cloud: {0}")]
    Write(#[source] PlyError),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconstructionReport {
    pub total_pairs: usize,
    pub processed_pairs: usize,
    /// `(pair position, reason)` for every skipped pair.
    pub warnings: Vec<(usize, String)>,
    pub total_points: usize,
    /// `None` when no point was produced.
    pub output_path: Option<PathBuf>,
}

struct PairOutcome {
    points: Vec<Point3D>,
}

enum PairFailure {
    Skip(PairError),
    Abort(ConfigError),
}

macro_rules! skip_on {
    ($($err:ty),*) => {
        $(impl From<$err> for PairFailure {
            fn from(e: $err) -> Self {
                PairFailure::Skip(e.into())
            }
        })*
    };
}

skip_on!(MetadataError, DecodeError, LineError);

/// Turns all image pairs of a scan into one PLY point cloud.
pub struct Orchestrator<S> {
    source: S,
    extractor: LineExtractor,
    triangulator: Triangulator,
    config: ReconstructionConfig,
}

impl<S: PairSource> Orchestrator<S> {
    pub fn new(
        source: S,
        geometry: ScanGeometry,
        config: ReconstructionConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let triangulator = Triangulator::new(geometry)?;
        Ok(Self {
            source,
            extractor: LineExtractor::new(config.blur_kernel_size as usize)?,
            triangulator,
            config,
        })
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Runs the whole scan. Exactly one terminal event is pushed to `sink`.
    pub fn reconstruct(
        &self,
        scan_id: &ScanId,
        sink: &dyn ProgressSink,
    ) -> Result<ReconstructionReport, ReconstructError> {
        log::info!("start reconstructing {}", scan_id);
        let start = std::time::Instant::now();

        match self.run(scan_id, sink) {
            Ok(report) => {
                log::info!(
                    "finish reconstructing {} in {:?}: {} points, {} of {} pairs skipped",
                    scan_id,
                    start.elapsed(),
                    report.total_points,
                    report.warnings.len(),
                    report.total_pairs
                );
                Ok(report)
            }
            Err(e) => {
                log::error!("reconstruction of {} failed: {}", scan_id, e);
                sink.push(StatusEvent::Failed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn run(
        &self,
        scan_id: &ScanId,
        sink: &dyn ProgressSink,
    ) -> Result<ReconstructionReport, ReconstructError> {
        let listing = self.source.image_pairs(scan_id)?;
        if listing.cropped {
            sink.push(StatusEvent::Info {
                message: "Using cropped images for processing".to_string(),
            });
        }
        if listing.on.len() != listing.off.len() {
            return Err(ReconstructError::MismatchedPairCount {
                on: listing.on.len(),
                off: listing.off.len(),
            });
        }

        let total = listing.on.len();
        sink.push(StatusEvent::Starting { total_pairs: total });

        let mut cloud = PointCloud::new();
        let mut report = ReconstructionReport {
            total_pairs: total,
            ..Default::default()
        };

        for (index, (on_path, off_path)) in listing.on.iter().zip(&listing.off).enumerate() {
            match self.process_pair(scan_id, index, total, on_path, off_path, sink) {
                Ok(outcome) => {
                    cloud.extend(outcome.points);
                    report.processed_pairs += 1;
                }
                Err(PairFailure::Skip(e)) => {
                    let reason = format!(
                        "Error processing image pair {}/{}: {}",
                        file_name(on_path),
                        file_name(off_path),
                        e
                    );
                    log::warn!("{}", reason);
                    sink.push(StatusEvent::PairWarning {
                        index,
                        reason: reason.clone(),
                    });
                    report.warnings.push((index, reason));
                }
                Err(PairFailure::Abort(e)) => return Err(e.into()),
            }
        }

        if cloud.is_empty() {
            log::warn!("{}: {}", scan_id, NO_POINTS_MESSAGE);
            sink.push(StatusEvent::CompletedEmpty {
                message: NO_POINTS_MESSAGE.to_string(),
            });
            return Ok(report);
        }

        let processed_dir = self.source.processed_dir(scan_id)?;
        let output_path = processed_dir.join(MODEL_FILE);
        let total_points = write_ply(&cloud, &output_path).map_err(ReconstructError::Write)?;

        let info = ProcessingInfo::now(total_points, total);
        if let Err(e) = write_processing_info(&processed_dir, &info) {
            log::warn!("failed to write processing summary: {}", e);
            sink.push(StatusEvent::Info {
                message: format!("Could not write processing summary: {e}"),
            });
        }

        sink.push(StatusEvent::Completed {
            total_points,
            output_path: output_path.clone(),
        });
        report.total_points = total_points;
        report.output_path = Some(output_path);
        Ok(report)
    }

    fn process_pair(
        &self,
        scan_id: &ScanId,
        index: usize,
        total: usize,
        on_path: &Path,
        off_path: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<PairOutcome, PairFailure> {
        let metadata: PairMetadata =
            extract_metadata(&file_name(on_path), self.triangulator.geometry())?;
        sink.push(StatusEvent::ProcessingPair {
            index,
            image_index: metadata.index,
            angle: metadata.angle,
            total,
        });

        let laser_on = load_image(on_path)?;
        let laser_off = load_image(off_path)?;
        let line = self.extractor.extract(&laser_on, &laser_off)?;

        let points = self
            .triangulator
            .project(
                &line.points,
                metadata.angle,
                laser_on.width(),
                laser_on.height(),
            )
            .map_err(PairFailure::Abort)?;

        if self.config.save_diagnostics {
            diagnostics::save_pair(&self.source, scan_id, &metadata, &line, &laser_on);
        }

        log::debug!(
            "pair {} (image {}, {:.1}°): {} points",
            index,
            metadata.index,
            metadata.angle,
            points.len()
        );
        sink.push(StatusEvent::PairProcessed {
            index,
            angle: metadata.angle,
            points: points.len(),
        });
        Ok(PairOutcome { points })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
