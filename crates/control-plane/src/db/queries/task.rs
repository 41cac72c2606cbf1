//! Task lookups against the audit subsystem's tables.

use async_trait::async_trait;

use crate::db::models::TaskRow;
use crate::db::DbPool;
use crate::engine::model::Task;
use crate::engine::ports::TaskProvider;
use crate::error::AppResult;

#[derive(Clone)]
pub struct PgTaskProvider {
    db: DbPool,
}

impl PgTaskProvider {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaskProvider for PgTaskProvider {
    async fn get_task(&self, task_id: i64) -> AppResult<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT t.id, t.instance_id, t.owner_id, t.source_kind, t.status,
                   t.audit_level, i.maintenance_periods
            FROM sqlgate.tasks t
            LEFT JOIN sqlgate.instances i ON i.id = t.instance_id
            WHERE t.id = $1
            "#,
        )
        .bind(task_id)
        .fetch_optional(&self.db)
        .await?;

        row.map(Task::try_from).transpose()
    }
}
