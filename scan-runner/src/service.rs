use std::{
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread::{self, JoinHandle},
};

use thiserror::Error;

use scan_core::scan::ScanId;
use scan_parser::PairSource;

use crate::{
    channel::{ScanChannel, Subscription},
    event::{ScanState, StatusEvent},
    orchestrator::Orchestrator,
    sink::ProgressSink,
};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("already processing scan {0}")]
    AlreadyRunning(ScanId),
    #[error("no reconstruction has been started for scan {0}")]
    UnknownScan(ScanId),
    #[error("failed to spawn reconstruction worker: {0}")]
    Spawn(#[from] std::io::Error),
}

struct ScanRecord {
    channel: Arc<ScanChannel>,
    worker: Option<JoinHandle<()>>,
}

/// Runs reconstructions on worker threads, at most one per scan id.
pub struct ReconstructionService<S> {
    orchestrator: Arc<Orchestrator<S>>,
    scans: Arc<Mutex<HashMap<ScanId, ScanRecord>>>,
}

impl<S> Clone for ReconstructionService<S> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: Arc::clone(&self.orchestrator),
            scans: Arc::clone(&self.scans),
        }
    }
}

impl<S: PairSource + 'static> ReconstructionService<S> {
    pub fn new(orchestrator: Orchestrator<S>) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            scans: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn scans(&self) -> MutexGuard<'_, HashMap<ScanId, ScanRecord>> {
        self.scans.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a run and returns a subscription that sees all of its events.
    pub fn start(&self, scan_id: ScanId) -> Result<Subscription, ServiceError> {
        let mut scans = self.scans();
        if let Some(record) = scans.get(&scan_id) {
            if record.channel.state().is_active() {
                return Err(ServiceError::AlreadyRunning(scan_id));
            }
        }

        let capacity = self.orchestrator.config().history_capacity;
        let channel = Arc::new(ScanChannel::new(capacity));
        channel.begin();
        let subscription = channel.subscribe();

        let orchestrator = Arc::clone(&self.orchestrator);
        let worker_channel = Arc::clone(&channel);
        let worker_id = scan_id.clone();
        let worker = thread::Builder::new()
            .name(format!("reconstruct-{scan_id}"))
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    orchestrator.reconstruct(&worker_id, worker_channel.as_ref())
                }));
                if result.is_err() {
                    log::error!("reconstruction worker for {} panicked", worker_id);
                    worker_channel.push(StatusEvent::Failed {
                        reason: "reconstruction worker panicked".to_string(),
                    });
                }
                worker_channel.close();
            })?;

        log::info!("started processing scan: {}", scan_id);
        scans.insert(
            scan_id,
            ScanRecord {
                channel,
                worker: Some(worker),
            },
        );
        Ok(subscription)
    }

    pub fn subscribe(&self, scan_id: &ScanId) -> Result<Subscription, ServiceError> {
        self.scans()
            .get(scan_id)
            .map(|record| record.channel.subscribe())
            .ok_or_else(|| ServiceError::UnknownScan(scan_id.clone()))
    }

    /// Retained events of the latest run, oldest first.
    pub fn history(&self, scan_id: &ScanId) -> Result<Vec<StatusEvent>, ServiceError> {
        self.scans()
            .get(scan_id)
            .map(|record| record.channel.history())
            .ok_or_else(|| ServiceError::UnknownScan(scan_id.clone()))
    }

    pub fn state(&self, scan_id: &ScanId) -> ScanState {
        self.scans()
            .get(scan_id)
            .map(|record| record.channel.state())
            .unwrap_or(ScanState::Idle)
    }

    pub fn is_active(&self, scan_id: &ScanId) -> bool {
        self.state(scan_id).is_active()
    }

    /// Blocks until the current run of `scan_id` has finished.
    pub fn wait(&self, scan_id: &ScanId) -> Result<ScanState, ServiceError> {
        let worker = self
            .scans()
            .get_mut(scan_id)
            .ok_or_else(|| ServiceError::UnknownScan(scan_id.clone()))?
            .worker
            .take();
        if let Some(worker) = worker {
            // Panics are already turned into a Failed event by the worker.
            let _ = worker.join();
        }
        Ok(self.state(scan_id))
    }
}
