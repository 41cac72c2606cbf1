//! Workflow read views and transition entry points.
//!
//! Every view carries the projected status, computed from the stored record
//! status and the task's current execution status at read time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::model::{UserId, Workflow, WorkflowRecord};
use crate::engine::orchestrator::{
    BatchCancelOutcome, CreateWorkflowRequest, UpdateWorkflowRequest, WorkflowEngine,
};
use crate::engine::projection::project_record;
use crate::engine::state::{RecordStatus, TaskStatus, WorkflowStatus};
use crate::engine::store::WorkflowFilter;
use crate::error::{AppError, AppResult};

/// Workflow summary for listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: Uuid,
    pub subject: String,
    pub creator: UserId,
    pub created_at: DateTime<Utc>,
    pub task_id: i64,
    pub status: WorkflowStatus,
    pub record_status: RecordStatus,
    /// Number of the pending step, if any.
    pub current_step: Option<i32>,
    pub current_assignees: Vec<UserId>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Detailed workflow information, including superseded records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDetail {
    pub id: Uuid,
    pub subject: String,
    pub description: String,
    pub creator: UserId,
    pub created_at: DateTime<Utc>,
    pub version: i64,
    pub status: WorkflowStatus,
    pub task_status: TaskStatus,
    pub record: WorkflowRecord,
    pub history: Vec<WorkflowRecord>,
}

/// Workflow service.
#[derive(Clone)]
pub struct WorkflowService {
    engine: Arc<WorkflowEngine>,
}

impl WorkflowService {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self { engine }
    }

    pub async fn detail(&self, workflow_id: Uuid) -> AppResult<WorkflowDetail> {
        let workflow = self.engine.get(workflow_id).await?;
        self.to_detail(workflow).await
    }

    pub async fn list(&self, filter: &WorkflowFilter) -> AppResult<Vec<WorkflowSummary>> {
        let workflows = self.engine.list(filter).await?;
        let mut summaries = Vec::with_capacity(workflows.len());

        for workflow in workflows {
            let task_status = self.task_status(workflow.task_id()).await?;
            let current = workflow.record.current_step();
            summaries.push(WorkflowSummary {
                id: workflow.id,
                status: project_record(&workflow.record, task_status),
                record_status: workflow.record.status,
                current_step: current.map(|s| s.number),
                current_assignees: current.map(|s| s.assignees.clone()).unwrap_or_default(),
                task_id: workflow.task_id(),
                scheduled_at: workflow.record.scheduled_at,
                created_at: workflow.created_at,
                subject: workflow.subject,
                creator: workflow.creator,
            });
        }

        Ok(summaries)
    }

    pub async fn create(
        &self,
        user: &str,
        request: CreateWorkflowRequest,
    ) -> AppResult<WorkflowDetail> {
        let workflow = self.engine.create(user, request).await?;
        self.to_detail(workflow).await
    }

    pub async fn approve(
        &self,
        workflow_id: Uuid,
        step_id: Uuid,
        user: &str,
    ) -> AppResult<WorkflowDetail> {
        let workflow = self.engine.approve(workflow_id, step_id, user).await?;
        self.to_detail(workflow).await
    }

    pub async fn reject(
        &self,
        workflow_id: Uuid,
        step_id: Uuid,
        user: &str,
        reason: &str,
    ) -> AppResult<WorkflowDetail> {
        let workflow = self
            .engine
            .reject(workflow_id, step_id, user, reason)
            .await?;
        self.to_detail(workflow).await
    }

    pub async fn update(
        &self,
        workflow_id: Uuid,
        user: &str,
        request: UpdateWorkflowRequest,
    ) -> AppResult<WorkflowDetail> {
        let workflow = self.engine.update(workflow_id, user, request).await?;
        self.to_detail(workflow).await
    }

    pub async fn cancel(&self, workflow_id: Uuid, user: &str) -> AppResult<WorkflowDetail> {
        let workflow = self.engine.cancel(workflow_id, user).await?;
        self.to_detail(workflow).await
    }

    pub async fn cancel_many(&self, workflow_ids: &[Uuid], user: &str) -> BatchCancelOutcome {
        self.engine.cancel_many(workflow_ids, user).await
    }

    pub async fn schedule(
        &self,
        workflow_id: Uuid,
        user: &str,
        at: Option<DateTime<Utc>>,
    ) -> AppResult<WorkflowDetail> {
        let workflow = self.engine.schedule(workflow_id, user, at).await?;
        self.to_detail(workflow).await
    }

    pub async fn execute(&self, workflow_id: Uuid, user: &str) -> AppResult<WorkflowDetail> {
        let workflow = self.engine.execute(workflow_id, user).await?;
        self.to_detail(workflow).await
    }

    async fn to_detail(&self, workflow: Workflow) -> AppResult<WorkflowDetail> {
        let task_status = self.task_status(workflow.task_id()).await?;
        Ok(WorkflowDetail {
            id: workflow.id,
            subject: workflow.subject,
            description: workflow.description,
            creator: workflow.creator,
            created_at: workflow.created_at,
            version: workflow.version,
            status: project_record(&workflow.record, task_status),
            task_status,
            record: workflow.record,
            history: workflow.history,
        })
    }

    /// A task that has since vanished projects as if it never started.
    async fn task_status(&self, task_id: i64) -> AppResult<TaskStatus> {
        match self.engine.task(task_id).await {
            Ok(task) => Ok(task.status),
            Err(AppError::NotFound(_)) => {
                tracing::warn!(task_id, "Task missing while projecting workflow status");
                Ok(TaskStatus::Audited)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{Harness, INSTANCE_TWO_STEP};

    #[tokio::test]
    async fn test_detail_projects_task_status() {
        let h = Harness::new();
        h.add_task(1, INSTANCE_TWO_STEP, "owner");
        let service = WorkflowService::new(h.engine.clone());

        let created = service
            .create("owner", h.create_request("S1", 1))
            .await
            .unwrap();
        assert_eq!(created.status, WorkflowStatus::Running);

        let step1 = created.record.steps[0].id;
        service.approve(created.id, step1, "u1").await.unwrap();
        let executed = service.execute(created.id, "u2").await.unwrap();
        assert_eq!(executed.status, WorkflowStatus::Executing);
        assert_eq!(executed.record.status, RecordStatus::Finished);

        h.tasks.set_status(1, TaskStatus::ExecFailed);
        let detail = service.detail(created.id).await.unwrap();
        assert_eq!(detail.status, WorkflowStatus::ExecFailed);
        assert_eq!(detail.task_status, TaskStatus::ExecFailed);
    }

    #[tokio::test]
    async fn test_list_shows_pending_step() {
        let h = Harness::new();
        h.add_task(1, INSTANCE_TWO_STEP, "owner");
        h.add_task(2, INSTANCE_TWO_STEP, "other");
        let service = WorkflowService::new(h.engine.clone());
        service.create("owner", h.create_request("S1", 1)).await.unwrap();
        service.create("other", h.create_request("S2", 2)).await.unwrap();

        let mine = service
            .list(&WorkflowFilter {
                creator: Some("owner".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].subject, "S1");
        assert_eq!(mine[0].current_step, Some(1));
        assert_eq!(mine[0].current_assignees, vec!["u1".to_string()]);
        assert_eq!(mine[0].status, WorkflowStatus::Running);
    }

    #[tokio::test]
    async fn test_detail_unknown_workflow() {
        let h = Harness::new();
        let service = WorkflowService::new(h.engine.clone());
        assert!(matches!(
            service.detail(Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }
}
