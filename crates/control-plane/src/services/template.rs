//! Administrator management of workflow templates.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::PgTemplateProvider;
use crate::engine::model::{WorkflowStepTemplate, WorkflowTemplate};
use crate::engine::ports::PermissionOracle;
use crate::engine::state::AuditLevel;
use crate::error::{AppError, AppResult};

/// Request to create or replace a template by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub allowed_audit_level: Option<AuditLevel>,
    pub steps: Vec<WorkflowStepTemplate>,
    #[serde(default)]
    pub instance_ids: Vec<i64>,
}

impl TemplateRequest {
    /// Build and validate the template this request describes.
    pub fn into_template(self) -> AppResult<WorkflowTemplate> {
        let mut instance_ids = self.instance_ids;
        instance_ids.sort_unstable();
        instance_ids.dedup();

        let template = WorkflowTemplate {
            id: 0,
            name: self.name.trim().to_string(),
            description: self.description,
            allowed_audit_level: self.allowed_audit_level,
            steps: self.steps,
            instance_ids,
        };
        template.validate()?;
        Ok(template)
    }
}

/// Template service.
#[derive(Clone)]
pub struct TemplateService {
    templates: PgTemplateProvider,
    permissions: Arc<dyn PermissionOracle>,
}

impl TemplateService {
    pub fn new(templates: PgTemplateProvider, permissions: Arc<dyn PermissionOracle>) -> Self {
        Self {
            templates,
            permissions,
        }
    }

    pub async fn list(&self) -> AppResult<Vec<WorkflowTemplate>> {
        self.templates.list().await
    }

    /// Create or replace a template. Administrators only.
    pub async fn upsert(&self, user: &str, request: TemplateRequest) -> AppResult<WorkflowTemplate> {
        if !self.permissions.is_admin(user).await? {
            return Err(AppError::Forbidden(
                "Only administrators can manage workflow templates".to_string(),
            ));
        }

        let template = request.into_template()?;
        let id = self.templates.upsert(&template).await?;

        self.templates
            .get(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Template {} vanished after save", id)))
    }
}
