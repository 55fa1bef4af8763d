// src/installer/progress.rs

//! Install/uninstall progress reporting
//!
//! A sink receives zero or more `(Doing, 0, percent)` events with strictly
//! increasing percentages, then exactly one terminal `(Ok, 0, 100)` or
//! `(Fail, code, percent)` event.

use crate::error::Result;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    Doing,
    Ok,
    Fail,
}

/// Receiver of progress events
pub trait ProgressSink {
    fn report(&mut self, status: InstallStatus, code: u8, percent: u8);
}

impl<F> ProgressSink for F
where
    F: FnMut(InstallStatus, u8, u8),
{
    fn report(&mut self, status: InstallStatus, code: u8, percent: u8) {
        self(status, code, percent)
    }
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn report(&mut self, _status: InstallStatus, _code: u8, _percent: u8) {}
}

/// Reports progress through tracing
#[derive(Debug, Clone)]
pub struct LogProgress {
    label: String,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl ProgressSink for LogProgress {
    fn report(&mut self, status: InstallStatus, code: u8, percent: u8) {
        match status {
            InstallStatus::Doing => debug!("{}: {}%", self.label, percent),
            InstallStatus::Ok => info!("{}: done", self.label),
            InstallStatus::Fail => warn!("{}: failed with code {} at {}%", self.label, code, percent),
        }
    }
}

/// Enforces the event protocol on top of a sink
pub(crate) struct ProgressTracker<'a> {
    sink: &'a mut dyn ProgressSink,
    percent: u8,
}

impl<'a> ProgressTracker<'a> {
    pub(crate) fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self { sink, percent: 0 }
    }

    /// Report a checkpoint; percentages that do not move forward are dropped
    pub(crate) fn checkpoint(&mut self, percent: u8) {
        if percent > self.percent {
            self.percent = percent;
            self.sink.report(InstallStatus::Doing, 0, percent);
        }
    }

    /// Emit the terminal event
    pub(crate) fn finish<T>(self, result: &Result<T>) {
        match result {
            Ok(_) => self.sink.report(InstallStatus::Ok, 0, 100),
            Err(e) => self.sink.report(InstallStatus::Fail, e.code(), self.percent),
        }
    }
}
