//! Motor / laser step sequence of a capture run.
//!
//! A run has two phases of `steps_per_phase` steps each: the first with the
//! laser on (steps `1..=n`), the second with the laser off (`n+1..=2n`). At
//! every step the camera is asked for a frame. Controller failures are
//! logged and the sequence carries on.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::Duration,
};

use serde::Serialize;
use thiserror::Error;

use scan_core::{config::CaptureConfig, scan::CaptureMode};

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("controller unreachable: {0}")]
    Unreachable(String),
    #[error("controller rejected {command}: {message}")]
    Rejected {
        command: &'static str,
        message: String,
    },
}

/// Motor and laser driver of the turntable.
pub trait CaptureController: Send + Sync {
    fn laser_on(&self) -> Result<(), ControlError>;
    fn laser_off(&self) -> Result<(), ControlError>;
    /// Starts the motor for the next phase.
    fn step_motor(&self) -> Result<(), ControlError>;
    fn check_status(&self) -> Result<(), ControlError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureProgress {
    pub step: u32,
    pub total: u32,
    pub percent: f64,
    pub images: u32,
    pub mode: CaptureMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureReport {
    /// `false` when the stop flag ended the run early.
    pub completed: bool,
    pub images_requested: u32,
    pub last_step: u32,
}

pub struct CaptureSequence {
    config: CaptureConfig,
}

fn best_effort(command: &str, result: Result<(), ControlError>) {
    if let Err(e) = result {
        log::error!("{} failed: {}", command, e);
    }
}

impl CaptureSequence {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Runs both phases. `stop` is checked once per step; `request_frame`
    /// is called with the step number and phase of every frame.
    pub fn run<F, P>(
        &self,
        controller: &dyn CaptureController,
        stop: &AtomicBool,
        mut request_frame: F,
        mut on_progress: P,
    ) -> CaptureReport
    where
        F: FnMut(u32, CaptureMode),
        P: FnMut(&CaptureProgress),
    {
        if let Err(e) = controller.check_status() {
            log::warn!("controller status check failed: {}", e);
        }

        let steps = self.config.steps_per_phase;
        let total = self.config.total_steps();
        let delay = Duration::from_millis(self.config.step_delay_ms);
        let mut images = 0;
        let mut last_step = 0;
        let mut completed = true;

        'phases: for (phase, mode) in [CaptureMode::LaserOn, CaptureMode::LaserOff]
            .into_iter()
            .enumerate()
        {
            if stop.load(Ordering::SeqCst) {
                completed = false;
                break;
            }
            log::info!("capture phase: {}", mode);
            match mode {
                CaptureMode::LaserOn => best_effort("laser on", controller.laser_on()),
                CaptureMode::LaserOff => best_effort("laser off", controller.laser_off()),
            }
            best_effort("step motor", controller.step_motor());

            for i in 0..steps {
                if stop.load(Ordering::SeqCst) {
                    completed = false;
                    break 'phases;
                }
                let step = phase as u32 * steps + i + 1;
                thread::sleep(delay);
                request_frame(step, mode);
                images += 1;
                last_step = step;
                on_progress(&CaptureProgress {
                    step,
                    total,
                    percent: step as f64 / total as f64 * 100.0,
                    images,
                    mode,
                });
                thread::sleep(delay);
            }
        }

        // Leave the laser off whatever happened.
        best_effort("laser off", controller.laser_off());
        if completed {
            log::info!("scan completed successfully, {} images requested", images);
        } else {
            log::info!("scan was stopped manually after step {}", last_step);
        }

        CaptureReport {
            completed,
            images_requested: images,
            last_step,
        }
    }
}
