//! Workflow template API handlers.

use axum::{extract::State, Json};

use crate::engine::model::WorkflowTemplate;
use crate::error::AppError;
use crate::handlers::caller::Caller;
use crate::services::template::{TemplateRequest, TemplateService};

/// List workflow templates.
///
/// GET /api/workflow-templates
pub async fn list(
    State(service): State<TemplateService>,
) -> Result<Json<Vec<WorkflowTemplate>>, AppError> {
    let templates = service.list().await?;
    Ok(Json(templates))
}

/// Create or replace a template by name. Administrators only.
///
/// POST /api/workflow-templates
pub async fn upsert(
    State(service): State<TemplateService>,
    caller: Caller,
    Json(request): Json<TemplateRequest>,
) -> Result<Json<WorkflowTemplate>, AppError> {
    let template = service.upsert(caller.as_str(), request).await?;
    Ok(Json(template))
}
