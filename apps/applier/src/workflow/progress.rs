//! Progress reporter, a pure sink fed by the orchestrator.
//!
//! Keeps the latest snapshot in a `watch` channel for polling readers and fans
//! individual events out over a `broadcast` channel for live subscribers.
//! Nothing here influences workflow control flow.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

use crate::models::{ApplyBatchResult, Stage};

/// Orchestrator operation currently holding the in-flight guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ResumeSession,
    StartLogin,
    SubmitCode,
    CancelLogin,
    Logout,
    BulkApply,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    StageChanged {
        from: Stage,
        to: Stage,
    },
    CodeSent {
        message: String,
    },
    OperationFailed {
        operation: Operation,
        code: &'static str,
        message: String,
    },
    ResumeSelected {
        run_id: Uuid,
        filename: String,
    },
    BulkApplyStarted {
        run_id: Uuid,
        job_keyword: String,
        city: String,
        requested_count: u32,
    },
    BulkApplyFinished {
        run_id: Uuid,
        result: ApplyBatchResult,
    },
}

/// Totals across every bulk-apply run completed in this process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunningStats {
    pub runs_completed: u32,
    pub total_succeeded: u64,
    pub total_failed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedError {
    pub operation: Operation,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub stage: Stage,
    pub active_operation: Option<Operation>,
    pub active_run: Option<Uuid>,
    pub last_result: Option<ApplyBatchResult>,
    pub last_error: Option<ReportedError>,
    pub stats: RunningStats,
    pub updated_at: DateTime<Utc>,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            stage: Stage::AwaitingPhone,
            active_operation: None,
            active_run: None,
            last_result: None,
            last_error: None,
            stats: RunningStats::default(),
            updated_at: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct ProgressReporter {
    snapshot: watch::Sender<ProgressSnapshot>,
    events: broadcast::Sender<ProgressEvent>,
}

impl ProgressReporter {
    pub fn new(event_capacity: usize) -> Self {
        let (snapshot, _) = watch::channel(ProgressSnapshot::default());
        let (events, _) = broadcast::channel(event_capacity);
        Self { snapshot, events }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    pub(crate) fn operation_started(&self, operation: Operation) {
        self.snapshot.send_modify(|s| {
            s.active_operation = Some(operation);
            s.updated_at = Utc::now();
        });
    }

    pub(crate) fn operation_finished(&self) {
        self.snapshot.send_modify(|s| {
            s.active_operation = None;
            s.active_run = None;
            s.updated_at = Utc::now();
        });
    }

    pub(crate) fn record(&self, event: ProgressEvent) {
        self.snapshot.send_modify(|s| {
            match &event {
                ProgressEvent::StageChanged { to, .. } => s.stage = *to,
                ProgressEvent::CodeSent { .. } | ProgressEvent::ResumeSelected { .. } => {}
                ProgressEvent::OperationFailed {
                    operation,
                    code,
                    message,
                } => {
                    s.last_error = Some(ReportedError {
                        operation: *operation,
                        code: *code,
                        message: message.clone(),
                    });
                }
                ProgressEvent::BulkApplyStarted { run_id, .. } => {
                    s.active_run = Some(*run_id);
                    s.last_error = None;
                }
                ProgressEvent::BulkApplyFinished { result, .. } => {
                    s.active_run = None;
                    s.stats.runs_completed += 1;
                    s.stats.total_succeeded += u64::from(result.success_count);
                    s.stats.total_failed += u64::from(result.failed_count);
                    s.last_result = Some(result.clone());
                }
            }
            s.updated_at = Utc::now();
        });

        // No subscribers is fine; the snapshot already holds the state.
        let _ = self.events.send(event);
    }
}
