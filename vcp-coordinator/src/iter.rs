//! Blocking access to the coordinator's event stream
//!
//! The worker pushes every [`CoordinatorEvent`] onto one std channel. Hosts
//! without a runtime read it through [`EventIterator`], either one event at a
//! time or through the [`Events`] adapters.

use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::event::CoordinatorEvent;
use crate::operation::OperationResult;

type SharedReceiver = Arc<Mutex<mpsc::Receiver<CoordinatorEvent>>>;

/// Handle on the coordinator's event stream
///
/// Iterating blocks until the next event and ends once the worker is gone.
/// Clones read from the same queue: an event goes to whichever clone asks
/// first.
#[derive(Clone)]
pub struct EventIterator {
    rx: SharedReceiver,
}

impl EventIterator {
    pub(crate) fn new(rx: SharedReceiver) -> Self {
        Self { rx }
    }

    pub fn recv(&self) -> Option<CoordinatorEvent> {
        self.rx.lock().recv().ok()
    }

    pub fn try_recv(&self) -> Option<CoordinatorEvent> {
        self.rx.lock().try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<CoordinatorEvent> {
        self.rx.lock().recv_timeout(timeout).ok()
    }

    /// Events already queued, without waiting for more
    pub fn drain(&self) -> Events<'_> {
        Events {
            source: self,
            gap: None,
        }
    }

    /// Events that keep arriving at most `gap` apart
    pub fn within(&self, gap: Duration) -> Events<'_> {
        Events {
            source: self,
            gap: Some(gap),
        }
    }

    /// Wait up to `timeout` for the next operation outcome
    ///
    /// Mirror and device events received meanwhile are consumed and dropped.
    pub fn next_completion(&self, timeout: Duration) -> Option<OperationResult> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match self.recv_timeout(remaining)? {
                CoordinatorEvent::OperationCompleted(result) => return Some(result),
                other => tracing::trace!("Skipping {:?} while waiting for an outcome", other),
            }
        }
    }
}

impl Iterator for EventIterator {
    type Item = CoordinatorEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

/// Bounded view of the event stream; see [`EventIterator::drain`] and
/// [`EventIterator::within`]
pub struct Events<'a> {
    source: &'a EventIterator,
    /// `None` never waits
    gap: Option<Duration>,
}

impl Iterator for Events<'_> {
    type Item = CoordinatorEvent;

    fn next(&mut self) -> Option<Self::Item> {
        match self.gap {
            None => self.source.try_recv(),
            Some(gap) => self.source.recv_timeout(gap),
        }
    }
}
