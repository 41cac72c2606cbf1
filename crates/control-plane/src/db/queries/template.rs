//! Workflow template storage and instance bindings.
//!
//! An instance points at its template through
//! `instances.workflow_template_id`; a template's `instance_ids` is the set
//! of instances pointing at it.

use async_trait::async_trait;
use sqlx::types::Json;

use crate::db::models::TemplateRow;
use crate::db::DbPool;
use crate::engine::model::WorkflowTemplate;
use crate::engine::ports::TemplateProvider;
use crate::error::AppResult;

const SELECT_TEMPLATE: &str = r#"
    SELECT tpl.id, tpl.name, tpl.description, tpl.allowed_audit_level, tpl.steps,
           COALESCE(
               ARRAY(SELECT i.id FROM sqlgate.instances i
                     WHERE i.workflow_template_id = tpl.id ORDER BY i.id),
               '{}'
           ) AS instance_ids
    FROM sqlgate.workflow_templates tpl
"#;

#[derive(Clone)]
pub struct PgTemplateProvider {
    db: DbPool,
}

impl PgTemplateProvider {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn get(&self, id: i64) -> AppResult<Option<WorkflowTemplate>> {
        let row = sqlx::query_as::<_, TemplateRow>(&format!("{} WHERE tpl.id = $1", SELECT_TEMPLATE))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        row.map(WorkflowTemplate::try_from).transpose()
    }

    pub async fn list(&self) -> AppResult<Vec<WorkflowTemplate>> {
        let rows = sqlx::query_as::<_, TemplateRow>(&format!("{} ORDER BY tpl.name", SELECT_TEMPLATE))
            .fetch_all(&self.db)
            .await?;
        rows.into_iter().map(WorkflowTemplate::try_from).collect()
    }

    /// Insert or replace the template named `template.name` and rebind its
    /// instances. Workflows already created keep their own step copies.
    pub async fn upsert(&self, template: &WorkflowTemplate) -> AppResult<i64> {
        let mut tx = self.db.begin().await?;

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO sqlgate.workflow_templates (name, description, allowed_audit_level, steps)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE SET
                description = EXCLUDED.description,
                allowed_audit_level = EXCLUDED.allowed_audit_level,
                steps = EXCLUDED.steps,
                updated_at = NOW()
            RETURNING id
            "#,
        )
        .bind(&template.name)
        .bind(&template.description)
        .bind(template.allowed_audit_level.map(|l| l.as_str()))
        .bind(Json(&template.steps))
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE sqlgate.instances
            SET workflow_template_id = NULL
            WHERE workflow_template_id = $1 AND NOT (id = ANY($2))
            "#,
        )
        .bind(id)
        .bind(&template.instance_ids)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO sqlgate.instances (id, workflow_template_id)
            SELECT UNNEST($2::bigint[]), $1
            ON CONFLICT (id) DO UPDATE SET workflow_template_id = EXCLUDED.workflow_template_id
            "#,
        )
        .bind(id)
        .bind(&template.instance_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            template_id = id,
            name = %template.name,
            instances = template.instance_ids.len(),
            "Workflow template saved"
        );

        Ok(id)
    }
}

#[async_trait]
impl TemplateProvider for PgTemplateProvider {
    async fn template_for_instance(
        &self,
        instance_id: i64,
    ) -> AppResult<Option<WorkflowTemplate>> {
        let row = sqlx::query_as::<_, TemplateRow>(&format!(
            "{} JOIN sqlgate.instances bound ON bound.workflow_template_id = tpl.id WHERE bound.id = $1",
            SELECT_TEMPLATE
        ))
        .bind(instance_id)
        .fetch_optional(&self.db)
        .await?;
        row.map(WorkflowTemplate::try_from).transpose()
    }
}
