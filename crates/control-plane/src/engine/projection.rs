//! Projection of stored record status and task status into the
//! workflow status shown to users.
//!
//! The task executor owns "did it actually run"; the record only knows how
//! far review got. This function is the single place the two are combined,
//! and it never writes anything back.

use chrono::{DateTime, Utc};

use crate::engine::model::WorkflowRecord;
use crate::engine::state::{RecordStatus, TaskStatus, WorkflowStatus};

/// Compute the visible status from its inputs.
pub fn project_status(
    record_status: RecordStatus,
    scheduled_at: Option<DateTime<Utc>>,
    task_status: TaskStatus,
) -> WorkflowStatus {
    match task_status {
        TaskStatus::Executing => return WorkflowStatus::Executing,
        TaskStatus::ExecSucceeded => return WorkflowStatus::Finished,
        TaskStatus::ExecFailed => return WorkflowStatus::ExecFailed,
        TaskStatus::Initialized | TaskStatus::Audited => {}
    }

    match record_status {
        RecordStatus::Running if scheduled_at.is_some() => WorkflowStatus::ExecScheduled,
        RecordStatus::Running => WorkflowStatus::Running,
        RecordStatus::Rejected => WorkflowStatus::Rejected,
        RecordStatus::Canceled => WorkflowStatus::Canceled,
        // Dispatched, executor has not reported progress yet.
        RecordStatus::Finished => WorkflowStatus::Executing,
    }
}

/// Convenience wrapper over [`project_status`] for a whole record.
pub fn project_record(record: &WorkflowRecord, task_status: TaskStatus) -> WorkflowStatus {
    project_status(record.status, record.scheduled_at, task_status)
}
