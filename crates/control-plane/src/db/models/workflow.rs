//! Workflow, record and step rows.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::parse_label;
use crate::engine::model::{Workflow, WorkflowRecord, WorkflowStep};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub subject: String,
    pub description: String,
    pub creator: String,
    pub created_at: DateTime<Utc>,
    pub version: i64,
    pub current_record_id: Uuid,
}

#[derive(Debug, Clone, FromRow)]
pub struct RecordRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    /// Position in the workflow's record list, oldest first.
    pub seq: i32,
    pub task_id: i64,
    pub status: String,
    pub current_step_id: Option<Uuid>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub scheduled_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct StepRow {
    pub id: Uuid,
    pub record_id: Uuid,
    pub number: i32,
    pub step_type: String,
    pub description: String,
    pub assignees: Vec<String>,
    pub state: String,
    pub operator: Option<String>,
    pub operated_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl TryFrom<StepRow> for WorkflowStep {
    type Error = AppError;

    fn try_from(row: StepRow) -> AppResult<Self> {
        Ok(WorkflowStep {
            id: row.id,
            number: row.number,
            step_type: parse_label("workflow_steps.step_type", &row.step_type)?,
            description: row.description,
            assignees: row.assignees,
            state: parse_label("workflow_steps.state", &row.state)?,
            operator: row.operator,
            operated_at: row.operated_at,
            reason: row.reason,
        })
    }
}

impl RecordRow {
    /// Build the record from its row and its steps, in step order.
    pub fn into_record(self, steps: Vec<StepRow>) -> AppResult<WorkflowRecord> {
        let mut steps = steps
            .into_iter()
            .map(WorkflowStep::try_from)
            .collect::<AppResult<Vec<_>>>()?;
        steps.sort_by_key(|s| s.number);

        Ok(WorkflowRecord {
            id: self.id,
            task_id: self.task_id,
            status: parse_label("workflow_records.status", &self.status)?,
            current_step_id: self.current_step_id,
            scheduled_at: self.scheduled_at,
            scheduled_by: self.scheduled_by,
            created_at: self.created_at,
            steps,
        })
    }
}

impl WorkflowRow {
    /// Assemble the aggregate. `records` must be ordered by `seq`.
    pub fn into_workflow(self, mut records: Vec<WorkflowRecord>) -> AppResult<Workflow> {
        let position = records
            .iter()
            .position(|r| r.id == self.current_record_id)
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "Workflow {} has no active record {}",
                    self.id, self.current_record_id
                ))
            })?;
        let record = records.remove(position);

        Ok(Workflow {
            id: self.id,
            subject: self.subject,
            description: self.description,
            creator: self.creator,
            created_at: self.created_at,
            version: self.version,
            record,
            history: records,
        })
    }
}
