//! Persistence contract for workflow aggregates.
//!
//! Every transition is read, validate, then [`WorkflowStore::save`]. The save
//! is a compare-and-set on the version the aggregate was loaded at, so two
//! callers racing on the same workflow can never both win: the loser gets
//! `AppError::Conflict` and nothing is written.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::model::{UserId, Workflow};
use crate::engine::state::RecordStatus;
use crate::error::AppResult;

/// Filter for listing workflows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowFilter {
    pub creator: Option<UserId>,
    /// Stored status of the active record.
    pub status: Option<RecordStatus>,
    /// Only workflows whose pending step lists this user.
    pub assignee: Option<UserId>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl WorkflowFilter {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Insert a brand-new workflow.
    ///
    /// Fails with `Conflict` if the subject is taken or the task is already
    /// bound to any record.
    async fn insert(&self, workflow: &Workflow) -> AppResult<()>;

    async fn get(&self, id: Uuid) -> AppResult<Option<Workflow>>;

    /// Persist `workflow` if the stored version still equals
    /// `workflow.version`. Returns the new version.
    async fn save(&self, workflow: &Workflow) -> AppResult<i64>;

    async fn subject_exists(&self, subject: &str) -> AppResult<bool>;

    /// Whether any record, active or historical, references the task.
    async fn task_bound(&self, task_id: i64) -> AppResult<bool>;

    /// Newest first.
    async fn list(&self, filter: &WorkflowFilter) -> AppResult<Vec<Workflow>>;

    /// Ids of workflows whose active record is due for scheduled execution.
    async fn due_for_execution(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<Uuid>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_limits() {
        let filter = WorkflowFilter::default();
        assert_eq!(filter.effective_limit(), 50);
        assert_eq!(filter.effective_offset(), 0);

        let filter = WorkflowFilter {
            limit: Some(10_000),
            offset: Some(-3),
            ..Default::default()
        };
        assert_eq!(filter.effective_limit(), 200);
        assert_eq!(filter.effective_offset(), 0);
    }
}
