use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Progress of one reconstruction run, in emission order.
///
/// `index` is the position of the pair in the run (0-based), `image_index`
/// the step number parsed from the laser-on file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusEvent {
    Starting {
        total_pairs: usize,
    },
    Info {
        message: String,
    },
    ProcessingPair {
        index: usize,
        image_index: u32,
        angle: f64,
        total: usize,
    },
    PairProcessed {
        index: usize,
        angle: f64,
        points: usize,
    },
    PairWarning {
        index: usize,
        reason: String,
    },
    Completed {
        total_points: usize,
        output_path: PathBuf,
    },
    CompletedEmpty {
        message: String,
    },
    Failed {
        reason: String,
    },
}

impl StatusEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatusEvent::Completed { .. }
                | StatusEvent::CompletedEmpty { .. }
                | StatusEvent::Failed { .. }
        )
    }

    /// Human-readable line for logs and consoles.
    pub fn message(&self) -> String {
        match self {
            StatusEvent::Starting { total_pairs } => {
                format!("Starting processing of {total_pairs} image pairs")
            }
            StatusEvent::Info { message } => message.clone(),
            StatusEvent::ProcessingPair {
                index,
                angle,
                total,
                ..
            } => format!(
                "Processing image pair {}/{} (angle: {:.1}°)",
                index + 1,
                total,
                angle
            ),
            StatusEvent::PairProcessed {
                index,
                angle,
                points,
            } => format!(
                "Image pair {} at {:.1}°: {} points detected",
                index + 1,
                angle,
                points
            ),
            StatusEvent::PairWarning { reason, .. } => reason.clone(),
            StatusEvent::Completed {
                total_points,
                output_path,
            } => format!(
                "Saved {} points to {}",
                total_points,
                output_path.display()
            ),
            StatusEvent::CompletedEmpty { message } => message.clone(),
            StatusEvent::Failed { reason } => format!("Error during processing: {reason}"),
        }
    }
}

/// `Idle -> Starting -> Processing(i) -> Completed | CompletedEmpty | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Starting,
    Processing(usize),
    Completed,
    CompletedEmpty,
    Failed,
}

impl ScanState {
    pub fn is_active(&self) -> bool {
        matches!(self, ScanState::Starting | ScanState::Processing(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanState::Completed | ScanState::CompletedEmpty | ScanState::Failed
        )
    }

    pub fn advance(self, event: &StatusEvent) -> ScanState {
        match event {
            StatusEvent::Starting { .. } => ScanState::Starting,
            StatusEvent::ProcessingPair { index, .. }
            | StatusEvent::PairProcessed { index, .. }
            | StatusEvent::PairWarning { index, .. } => ScanState::Processing(*index),
            StatusEvent::Completed { .. } => ScanState::Completed,
            StatusEvent::CompletedEmpty { .. } => ScanState::CompletedEmpty,
            StatusEvent::Failed { .. } => ScanState::Failed,
            StatusEvent::Info { .. } => self,
        }
    }
}
