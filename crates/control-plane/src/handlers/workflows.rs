//! Workflow API handlers.
//!
//! Handles creation, review, resubmission, cancellation, scheduling and
//! execution of workflows, plus the list and detail views.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::orchestrator::{
    BatchCancelOutcome, CreateWorkflowRequest, UpdateWorkflowRequest,
};
use crate::engine::state::RecordStatus;
use crate::engine::store::WorkflowFilter;
use crate::error::AppError;
use crate::handlers::caller::Caller;
use crate::services::workflow::{WorkflowDetail, WorkflowService, WorkflowSummary};

/// Query parameters for listing workflows.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListWorkflowsQuery {
    pub creator: Option<String>,
    pub status: Option<String>,
    pub assignee: Option<String>,
    /// Shorthand for `assignee=<caller>`.
    #[serde(default)]
    pub pending_for_me: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListWorkflowsQuery {
    fn into_filter(self, caller: &Caller) -> Result<WorkflowFilter, AppError> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<RecordStatus>)
            .transpose()
            .map_err(AppError::InvalidInput)?;
        let assignee = if self.pending_for_me {
            Some(caller.as_str().to_string())
        } else {
            self.assignee
        };

        Ok(WorkflowFilter {
            creator: self.creator,
            status,
            assignee,
            limit: self.limit,
            offset: self.offset,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRequest {
    /// `null` or absent clears the schedule.
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchCancelRequest {
    pub workflow_ids: Vec<Uuid>,
}

/// List workflows.
///
/// GET /api/workflows
pub async fn list(
    State(service): State<WorkflowService>,
    caller: Caller,
    Query(query): Query<ListWorkflowsQuery>,
) -> Result<Json<Vec<WorkflowSummary>>, AppError> {
    let filter = query.into_filter(&caller)?;
    let workflows = service.list(&filter).await?;
    Ok(Json(workflows))
}

/// Get workflow details with projected status and history.
///
/// GET /api/workflows/{id}
pub async fn get(
    State(service): State<WorkflowService>,
    Path(workflow_id): Path<Uuid>,
) -> Result<Json<WorkflowDetail>, AppError> {
    let workflow = service.detail(workflow_id).await?;
    Ok(Json(workflow))
}

/// Create a workflow for an audited task.
///
/// POST /api/workflows
pub async fn create(
    State(service): State<WorkflowService>,
    caller: Caller,
    Json(request): Json<CreateWorkflowRequest>,
) -> Result<(StatusCode, Json<WorkflowDetail>), AppError> {
    let workflow = service.create(caller.as_str(), request).await?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

/// Approve the pending review step.
///
/// POST /api/workflows/{id}/steps/{step_id}/approve
pub async fn approve(
    State(service): State<WorkflowService>,
    caller: Caller,
    Path((workflow_id, step_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<WorkflowDetail>, AppError> {
    let workflow = service
        .approve(workflow_id, step_id, caller.as_str())
        .await?;
    Ok(Json(workflow))
}

/// Reject the pending step.
///
/// POST /api/workflows/{id}/steps/{step_id}/reject
pub async fn reject(
    State(service): State<WorkflowService>,
    caller: Caller,
    Path((workflow_id, step_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<WorkflowDetail>, AppError> {
    let workflow = service
        .reject(workflow_id, step_id, caller.as_str(), &request.reason)
        .await?;
    Ok(Json(workflow))
}

/// Resubmit a rejected workflow with a new task.
///
/// POST /api/workflows/{id}/update
pub async fn update(
    State(service): State<WorkflowService>,
    caller: Caller,
    Path(workflow_id): Path<Uuid>,
    Json(request): Json<UpdateWorkflowRequest>,
) -> Result<Json<WorkflowDetail>, AppError> {
    let workflow = service
        .update(workflow_id, caller.as_str(), request)
        .await?;
    Ok(Json(workflow))
}

/// Cancel a workflow.
///
/// POST /api/workflows/{id}/cancel
pub async fn cancel(
    State(service): State<WorkflowService>,
    caller: Caller,
    Path(workflow_id): Path<Uuid>,
) -> Result<Json<WorkflowDetail>, AppError> {
    let workflow = service.cancel(workflow_id, caller.as_str()).await?;
    Ok(Json(workflow))
}

/// Cancel several workflows; each succeeds or fails on its own.
///
/// POST /api/workflows/cancel
pub async fn cancel_many(
    State(service): State<WorkflowService>,
    caller: Caller,
    Json(request): Json<BatchCancelRequest>,
) -> Result<Json<BatchCancelOutcome>, AppError> {
    if request.workflow_ids.is_empty() {
        return Err(AppError::InvalidInput(
            "workflow_ids must not be empty".to_string(),
        ));
    }
    let outcome = service
        .cancel_many(&request.workflow_ids, caller.as_str())
        .await;
    Ok(Json(outcome))
}

/// Set or clear the scheduled execution time.
///
/// POST /api/workflows/{id}/schedule
pub async fn schedule(
    State(service): State<WorkflowService>,
    caller: Caller,
    Path(workflow_id): Path<Uuid>,
    Json(request): Json<ScheduleRequest>,
) -> Result<Json<WorkflowDetail>, AppError> {
    let workflow = service
        .schedule(workflow_id, caller.as_str(), request.scheduled_at)
        .await?;
    Ok(Json(workflow))
}

/// Execute the workflow's task now.
///
/// POST /api/workflows/{id}/execute
pub async fn execute(
    State(service): State<WorkflowService>,
    caller: Caller,
    Path(workflow_id): Path<Uuid>,
) -> Result<(StatusCode, Json<WorkflowDetail>), AppError> {
    let workflow = service.execute(workflow_id, caller.as_str()).await?;
    Ok((StatusCode::ACCEPTED, Json(workflow)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_filter() {
        let caller = Caller("alice".to_string());
        let query = ListWorkflowsQuery {
            status: Some("cancelled".to_string()),
            assignee: Some("bob".to_string()),
            pending_for_me: true,
            ..Default::default()
        };
        let filter = query.into_filter(&caller).unwrap();
        assert_eq!(filter.status, Some(RecordStatus::Canceled));
        assert_eq!(filter.assignee.as_deref(), Some("alice"));
    }

    #[test]
    fn test_list_query_rejects_unknown_status() {
        let caller = Caller("alice".to_string());
        let query = ListWorkflowsQuery {
            status: Some("exec_scheduled".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            query.into_filter(&caller),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_schedule_request_null_clears() {
        let request: ScheduleRequest = serde_json::from_str(r#"{"scheduled_at": null}"#).unwrap();
        assert!(request.scheduled_at.is_none());
        let request: ScheduleRequest =
            serde_json::from_str(r#"{"scheduled_at": "2026-05-01T02:00:00Z"}"#).unwrap();
        assert!(request.scheduled_at.is_some());
    }
}
