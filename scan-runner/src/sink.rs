use std::sync::{Mutex, PoisonError};

use crossbeam::channel::Sender;

use crate::event::StatusEvent;

/// Receives status events from a reconstruction run. The run never reads
/// anything back.
pub trait ProgressSink: Send + Sync {
    fn push(&self, event: StatusEvent);
}

impl ProgressSink for Sender<StatusEvent> {
    fn push(&self, event: StatusEvent) {
        // A dropped receiver only means nobody is listening anymore.
        let _ = self.send(event);
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<StatusEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProgressSink for EventLog {
    fn push(&self, event: StatusEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
