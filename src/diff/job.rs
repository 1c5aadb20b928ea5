use super::input::{CompareInput, Input};
use super::tree::{DiffOutcome, DiffTreeBuilder};
use crate::progress::ProgressMonitor;
use std::cell::Cell;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error};

/// A diff running on its own thread.
///
/// Dropping an unfinished job cancels it; the worker notices at its next
/// node.
pub struct DiffJob {
    monitor: ProgressMonitor,
    receiver: Receiver<DiffOutcome>,
    delivered: Cell<bool>,
    _thread_handle: thread::JoinHandle<()>,
}

/// Run `builder` on a background thread, reporting through `monitor`
pub fn spawn_diff(
    builder: DiffTreeBuilder,
    three_way: bool,
    ancestor: Option<Input>,
    left: Input,
    right: Input,
    monitor: ProgressMonitor,
) -> DiffJob {
    let (sender, receiver) = mpsc::channel();

    let worker_monitor = monitor.clone();
    let thread_handle = thread::spawn(move || {
        debug!("Background diff of {} started", left.name());
        let outcome = builder.build(three_way, ancestor.as_ref(), &left, &right, &worker_monitor);
        // the job may already be gone
        let _ = sender.send(outcome);
    });

    DiffJob {
        monitor,
        receiver,
        delivered: Cell::new(false),
        _thread_handle: thread_handle,
    }
}

impl DiffJob {
    pub fn monitor(&self) -> &ProgressMonitor {
        &self.monitor
    }

    pub fn cancel(&self) {
        self.monitor.cancel();
    }

    /// Non-blocking check, `None` while the worker is still running
    pub fn try_result(&self) -> Option<DiffOutcome> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(self.deliver(outcome)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Self::lost()),
        }
    }

    /// Block until the worker finishes or `timeout` passes
    pub fn wait_timeout(&self, timeout: Duration) -> Option<DiffOutcome> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => Some(self.deliver(outcome)),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => Some(Self::lost()),
        }
    }

    pub fn wait(self) -> DiffOutcome {
        match self.receiver.recv() {
            Ok(outcome) => self.deliver(outcome),
            Err(_) => Self::lost(),
        }
    }

    fn deliver(&self, outcome: DiffOutcome) -> DiffOutcome {
        self.delivered.set(true);
        outcome
    }

    fn lost() -> DiffOutcome {
        error!("Background diff worker exited without a result");
        DiffOutcome::Cancelled
    }
}

impl Drop for DiffJob {
    fn drop(&mut self) {
        if !self.delivered.get() {
            self.monitor.cancel();
        }
    }
}
