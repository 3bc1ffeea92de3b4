//! Reconstruction orchestration for laser-line scans.
//!
//! [`Orchestrator`] runs one scan synchronously and reports through a
//! [`ProgressSink`]. [`ReconstructionService`] runs scans on worker threads,
//! one active run per scan id, and fans events out to any number of
//! [`Subscription`]s.

pub mod capture;
pub mod channel;
mod diagnostics;
pub mod event;
pub mod orchestrator;
pub mod service;
pub mod sink;

pub use capture::{
    CaptureController, CaptureProgress, CaptureReport, CaptureSequence, ControlError,
};
pub use channel::{Poll, ScanChannel, Subscription};
pub use event::{ScanState, StatusEvent};
pub use orchestrator::{
    Orchestrator, PairError, ReconstructError, ReconstructionReport, MODEL_FILE,
};
pub use service::{ReconstructionService, ServiceError};
pub use sink::{EventLog, ProgressSink};
