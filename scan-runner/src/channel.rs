use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::{
    event::{ScanState, StatusEvent},
    sink::ProgressSink,
};

/// Result of a bounded wait on a [`Subscription`].
#[derive(Debug, Clone, PartialEq)]
pub enum Poll {
    Event(StatusEvent),
    /// Nothing arrived within the timeout but the run is still alive.
    Heartbeat,
    /// The run has finished and every event has been drained.
    Closed,
}

struct Inner {
    subscribers: Vec<Sender<StatusEvent>>,
    history: VecDeque<StatusEvent>,
    state: ScanState,
    closed: bool,
}

/// Ordered fan-out of one scan's events.
///
/// Subscribers only see events pushed after they subscribed. The last
/// `capacity` events are retained for status queries.
pub struct ScanChannel {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl ScanChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                subscribers: Vec::new(),
                history: VecDeque::with_capacity(capacity.min(1024)),
                state: ScanState::Idle,
                closed: false,
            }),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks the run as started before its first event.
    pub fn begin(&self) {
        let mut inner = self.lock();
        if !inner.state.is_active() {
            inner.state = ScanState::Starting;
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = unbounded();
        let mut inner = self.lock();
        if !inner.closed {
            inner.subscribers.push(tx);
        }
        Subscription { rx }
    }

    pub fn state(&self) -> ScanState {
        self.lock().state
    }

    pub fn history(&self) -> Vec<StatusEvent> {
        self.lock().history.iter().cloned().collect()
    }

    /// Disconnects all subscribers once they have drained their queues.
    /// A run that ends without a terminal event is recorded as failed.
    pub fn close(&self) {
        if !self.state().is_terminal() {
            self.push(StatusEvent::Failed {
                reason: "reconstruction stopped unexpectedly".to_string(),
            });
        }
        let mut inner = self.lock();
        inner.closed = true;
        inner.subscribers.clear();
    }
}

impl ProgressSink for ScanChannel {
    fn push(&self, event: StatusEvent) {
        let mut inner = self.lock();
        if inner.closed {
            log::debug!("dropping event on closed channel: {:?}", event);
            return;
        }
        inner.state = inner.state.advance(&event);
        if inner.history.len() == self.capacity {
            inner.history.pop_front();
        }
        inner.history.push_back(event.clone());
        inner
            .subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// One consumer's view of a scan's events.
pub struct Subscription {
    rx: Receiver<StatusEvent>,
}

impl Subscription {
    /// Waits at most `timeout` for the next event.
    pub fn poll(&self, timeout: Duration) -> Poll {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Poll::Event(event),
            Err(RecvTimeoutError::Timeout) => Poll::Heartbeat,
            Err(RecvTimeoutError::Disconnected) => Poll::Closed,
        }
    }

    /// Blocks until the run finishes, yielding every remaining event.
    pub fn iter(&self) -> impl Iterator<Item = StatusEvent> + '_ {
        self.rx.iter()
    }
}
