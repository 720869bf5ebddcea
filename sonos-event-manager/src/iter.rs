//! Sync iterator for consuming events from SonosEventManager
//!
//! Provides a blocking iterator interface for processing discovery,
//! subscription and notification events without async/await.

use std::time::Duration;

use crossbeam::channel::Receiver;

use crate::event::ManagerEvent;

/// Blocking iterator over manager events
///
/// Clones share one queue: each event is handed to exactly one of them.
/// A clone blocked in `recv()` never stalls another clone's `try_recv()`.
#[derive(Clone)]
pub struct EventManagerIterator {
    rx: Receiver<ManagerEvent>,
}

impl EventManagerIterator {
    pub(crate) fn new(rx: Receiver<ManagerEvent>) -> Self {
        Self { rx }
    }

    /// Block until an event is available
    ///
    /// Returns `None` once the worker has stopped and the queue is drained.
    pub fn recv(&self) -> Option<ManagerEvent> {
        self.rx.recv().ok()
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<ManagerEvent> {
        self.rx.try_recv().ok()
    }

    /// Block until an event is available or timeout expires
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ManagerEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Number of events waiting in the queue
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Non-blocking iterator over currently queued events
    pub fn try_iter(&self) -> TryIterator<'_> {
        TryIterator { inner: self }
    }

    /// Blocking iterator that gives up after `timeout` on each `next()`
    pub fn timeout_iter(&self, timeout: Duration) -> TimeoutIterator<'_> {
        TimeoutIterator {
            inner: self,
            timeout,
        }
    }
}

impl Iterator for EventManagerIterator {
    type Item = ManagerEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

/// Non-blocking iterator over currently available events
pub struct TryIterator<'a> {
    inner: &'a EventManagerIterator,
}

impl<'a> Iterator for TryIterator<'a> {
    type Item = ManagerEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.try_recv()
    }
}

/// Blocking iterator with timeout
pub struct TimeoutIterator<'a> {
    inner: &'a EventManagerIterator,
    timeout: Duration,
}

impl<'a> Iterator for TimeoutIterator<'a> {
    type Item = ManagerEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.recv_timeout(self.timeout)
    }
}
