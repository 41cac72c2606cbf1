//! Outbox for execution requests, used when no NATS server is configured.
//!
//! The executor polls `sqlgate.task_dispatch_queue`. `record_id` is unique,
//! so a repeated dispatch for the same claim is a no-op. With the outbox
//! enabled on [`PgWorkflowStore`](super::PgWorkflowStore) the row is written
//! in the claim's own transaction and `PgDispatchQueue::dispatch` only
//! confirms it.

use async_trait::async_trait;
use sqlx::PgExecutor;

use crate::db::DbPool;
use crate::engine::ports::{DispatchRequest, TaskExecutor};
use crate::error::AppResult;

/// Queue `request`; returns whether a new row was written.
pub(crate) async fn enqueue<'e>(
    executor: impl PgExecutor<'e>,
    request: &DispatchRequest,
) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO sqlgate.task_dispatch_queue (
            workflow_id, record_id, task_id, triggered_by, scheduled
        )
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (record_id) DO NOTHING
        "#,
    )
    .bind(request.workflow_id)
    .bind(request.record_id)
    .bind(request.task_id)
    .bind(&request.triggered_by)
    .bind(request.scheduled)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[derive(Clone)]
pub struct PgDispatchQueue {
    db: DbPool,
}

impl PgDispatchQueue {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaskExecutor for PgDispatchQueue {
    async fn dispatch(&self, request: &DispatchRequest) -> AppResult<()> {
        if enqueue(&self.db, request).await? {
            tracing::debug!(
                task_id = request.task_id,
                record_id = %request.record_id,
                "Task queued for execution"
            );
        } else {
            tracing::debug!(
                record_id = %request.record_id,
                "Dispatch already queued with the claim"
            );
        }

        Ok(())
    }
}
