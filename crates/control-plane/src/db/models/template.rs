//! Workflow template rows. Steps are stored as a JSONB array.

use sqlx::types::Json;
use sqlx::FromRow;

use super::parse_label;
use crate::engine::model::{WorkflowStepTemplate, WorkflowTemplate};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, FromRow)]
pub struct TemplateRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub allowed_audit_level: Option<String>,
    pub steps: Json<Vec<WorkflowStepTemplate>>,
    pub instance_ids: Vec<i64>,
}

impl TryFrom<TemplateRow> for WorkflowTemplate {
    type Error = AppError;

    fn try_from(row: TemplateRow) -> AppResult<Self> {
        let allowed_audit_level = row
            .allowed_audit_level
            .as_deref()
            .map(|level| parse_label("workflow_templates.allowed_audit_level", level))
            .transpose()?;

        Ok(WorkflowTemplate {
            id: row.id,
            name: row.name,
            description: row.description,
            allowed_audit_level,
            steps: row.steps.0,
            instance_ids: row.instance_ids,
        })
    }
}
