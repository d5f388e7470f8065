//! Event boundary: notifications from the core to a presentation layer.
//!
//! Every method has a no-op default so a sink implements only what it
//! shows. Run notifications arrive from the worker thread.

use std::sync::mpsc::{Receiver, Sender, channel};

use hn_core::RunId;
use hn_network::NetworkChange;

use crate::error::AppError;
use crate::progress::RunProgress;

/// Receiver of run and network notifications.
///
/// Run callbacks are invoked on the run's worker thread after the run record
/// is updated. They may query the controller.
pub trait EventSink: Send + Sync {
    fn on_progress(&self, _progress: &RunProgress) {}
    fn on_run_completed(&self, _run_id: RunId) {}
    fn on_run_failed(&self, _run_id: RunId, _error: &AppError) {}
    fn on_run_cancelled(&self, _run_id: RunId) {}
    fn on_network_changed(&self, _change: &NetworkChange) {}
}

/// Discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {}

/// Owned form of a notification, for channel delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    Progress(RunProgress),
    RunCompleted { run_id: RunId },
    RunFailed { run_id: RunId, message: String },
    RunCancelled { run_id: RunId },
    NetworkChanged(NetworkChange),
}

/// Forwards notifications over an mpsc channel a UI loop can poll.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<SimEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<SimEvent>) {
        let (tx, rx) = channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SimEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

impl EventSink for ChannelSink {
    fn on_progress(&self, progress: &RunProgress) {
        self.send(SimEvent::Progress(progress.clone()));
    }

    fn on_run_completed(&self, run_id: RunId) {
        self.send(SimEvent::RunCompleted { run_id });
    }

    fn on_run_failed(&self, run_id: RunId, error: &AppError) {
        self.send(SimEvent::RunFailed {
            run_id,
            message: error.to_string(),
        });
    }

    fn on_run_cancelled(&self, run_id: RunId) {
        self.send(SimEvent::RunCancelled { run_id });
    }

    fn on_network_changed(&self, change: &NetworkChange) {
        self.send(SimEvent::NetworkChanged(change.clone()));
    }
}
