//! Diagnostic sink for the series reconciler
//!
//! Merge logic never reaches for a global logger. It reports to whatever
//! [`MergeObserver`] the caller put in the merge context, so tests can
//! assert on diagnostics without capturing log output.

use crate::errors::ZipperError;
use crate::protocol::FetchResponse;
use parking_lot::Mutex;

/// Receives diagnostics from fetch merges. Shared across queries.
pub trait MergeObserver: Send + Sync {
    /// Two records for the same series disagreed on resolution. `base` is
    /// the finer record that was kept, `discarded` the coarser one.
    fn step_time_mismatch(&self, base: &FetchResponse, discarded: &FetchResponse, uuid: &str);

    /// A series pair could not be merged.
    fn merge_failed(
        &self,
        err: &ZipperError,
        m1: &FetchResponse,
        m2: &FetchResponse,
        uuid: &str,
    );
}

/// Default observer: structured `tracing` events.
#[derive(Debug, Clone, Copy)]
pub struct TracingObserver {
    log_step_mismatch: bool,
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TracingObserver {
    pub const DEFAULT: TracingObserver = TracingObserver {
        log_step_mismatch: true,
    };

    pub fn new(log_step_mismatch: bool) -> Self {
        TracingObserver { log_step_mismatch }
    }
}

impl MergeObserver for TracingObserver {
    fn step_time_mismatch(&self, m1: &FetchResponse, m2: &FetchResponse, uuid: &str) {
        if !self.log_step_mismatch {
            return;
        }
        tracing::warn!(
            name = %m1.name,
            m1_request_start_time = m1.request_start_time,
            m1_start_time = m1.start_time,
            m1_stop_time = m1.stop_time,
            m1_step_time = m1.step_time,
            m2_request_start_time = m2.request_start_time,
            m2_start_time = m2.start_time,
            m2_stop_time = m2.stop_time,
            m2_step_time = m2.step_time,
            uuid = %uuid,
            "fetch responses had different step times"
        );
    }

    fn merge_failed(
        &self,
        err: &ZipperError,
        m1: &FetchResponse,
        m2: &FetchResponse,
        uuid: &str,
    ) {
        tracing::error!(
            error = %err,
            name = %m1.name,
            m1_request_start_time = m1.request_start_time,
            m1_start_time = m1.start_time,
            m1_stop_time = m1.stop_time,
            m1_step_time = m1.step_time,
            m2_request_start_time = m2.request_start_time,
            m2_start_time = m2.start_time,
            m2_stop_time = m2.stop_time,
            m2_step_time = m2.step_time,
            uuid = %uuid,
            "unable to merge fetch responses"
        );
    }
}

/// Data window of one record at the time of the event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesWindow {
    pub request_start_time: i64,
    pub start_time: i64,
    pub stop_time: i64,
    pub step_time: i64,
}

impl From<&FetchResponse> for SeriesWindow {
    fn from(r: &FetchResponse) -> Self {
        SeriesWindow {
            request_start_time: r.request_start_time,
            start_time: r.start_time,
            stop_time: r.stop_time,
            step_time: r.step_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeEvent {
    StepTimeMismatch {
        name: String,
        base: SeriesWindow,
        discarded: SeriesWindow,
        uuid: String,
    },
    MergeFailed {
        error: ZipperError,
        name: String,
        m1: SeriesWindow,
        m2: SeriesWindow,
        uuid: String,
    },
}

/// Keeps every event in memory. Used by tests and the simulation harness.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<MergeEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MergeEvent> {
        self.events.lock().clone()
    }

    pub fn step_mismatches(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, MergeEvent::StepTimeMismatch { .. }))
            .count()
    }

    pub fn failures(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, MergeEvent::MergeFailed { .. }))
            .count()
    }
}

impl MergeObserver for RecordingObserver {
    fn step_time_mismatch(&self, base: &FetchResponse, discarded: &FetchResponse, uuid: &str) {
        self.events.lock().push(MergeEvent::StepTimeMismatch {
            name: base.name.clone(),
            base: base.into(),
            discarded: discarded.into(),
            uuid: uuid.to_string(),
        });
    }

    fn merge_failed(
        &self,
        err: &ZipperError,
        m1: &FetchResponse,
        m2: &FetchResponse,
        uuid: &str,
    ) {
        self.events.lock().push(MergeEvent::MergeFailed {
            error: err.clone(),
            name: m1.name.clone(),
            m1: m1.into(),
            m2: m2.into(),
            uuid: uuid.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_observer_counts_events() {
        let observer = RecordingObserver::new();
        let fine = FetchResponse::new("a", 0, 10, vec![1.0; 6]);
        let coarse = FetchResponse::new("a", 0, 60, vec![1.0]);

        observer.step_time_mismatch(&fine, &coarse, "req-1");
        assert_eq!(observer.step_mismatches(), 1);
        assert_eq!(observer.failures(), 0);

        match &observer.events()[0] {
            MergeEvent::StepTimeMismatch {
                base,
                discarded,
                uuid,
                ..
            } => {
                assert_eq!(base.step_time, 10);
                assert_eq!(discarded.step_time, 60);
                assert_eq!(uuid, "req-1");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_tracing_observer_is_silent_without_subscriber() {
        let observer = TracingObserver::new(false);
        let a = FetchResponse::new("a", 0, 10, vec![]);
        observer.step_time_mismatch(&a, &a, "req");
        observer.merge_failed(&ZipperError::Other("x".to_string()), &a, &a, "req");
    }
}
