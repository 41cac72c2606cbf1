//! Postgres-backed workflow store.
//!
//! `save` bumps `workflows.version` with `WHERE id = $1 AND version = $2`
//! inside a transaction, then upserts the active record and its steps. A
//! zero-row update rolls back and reports `Conflict`; the unique index on
//! `workflow_records.task_id` turns a task bound twice into `Conflict` too.
//!
//! With the dispatch outbox enabled, a save that carries an execution claim
//! also queues the dispatch row before committing, so a crash after the
//! claim cannot leave it unqueued.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::conflict_on_unique;
use super::dispatch::enqueue;
use crate::db::models::{RecordRow, StepRow, WorkflowRow};
use crate::db::DbPool;
use crate::engine::model::{Workflow, WorkflowRecord};
use crate::engine::ports::DispatchRequest;
use crate::engine::store::{WorkflowFilter, WorkflowStore};
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct PgWorkflowStore {
    db: DbPool,
    dispatch_outbox: bool,
}

impl PgWorkflowStore {
    pub fn new(db: DbPool) -> Self {
        Self {
            db,
            dispatch_outbox: false,
        }
    }

    /// Store that writes `task_dispatch_queue` rows together with claims.
    pub fn with_dispatch_outbox(db: DbPool) -> Self {
        Self {
            db,
            dispatch_outbox: true,
        }
    }

    async fn load_many(&self, rows: Vec<WorkflowRow>) -> AppResult<Vec<Workflow>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        let records = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT id, workflow_id, seq, task_id, status, current_step_id,
                   scheduled_at, scheduled_by, created_at
            FROM sqlgate.workflow_records
            WHERE workflow_id = ANY($1)
            ORDER BY workflow_id, seq
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.db)
        .await?;

        let record_ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let steps = sqlx::query_as::<_, StepRow>(
            r#"
            SELECT id, record_id, number, step_type, description, assignees,
                   state, operator, operated_at, reason
            FROM sqlgate.workflow_steps
            WHERE record_id = ANY($1)
            "#,
        )
        .bind(&record_ids)
        .fetch_all(&self.db)
        .await?;

        let mut steps_by_record: HashMap<Uuid, Vec<StepRow>> = HashMap::new();
        for step in steps {
            steps_by_record.entry(step.record_id).or_default().push(step);
        }

        let mut records_by_workflow: HashMap<Uuid, Vec<WorkflowRecord>> = HashMap::new();
        for row in records {
            let workflow_id = row.workflow_id;
            let steps = steps_by_record.remove(&row.id).unwrap_or_default();
            records_by_workflow
                .entry(workflow_id)
                .or_default()
                .push(row.into_record(steps)?);
        }

        rows.into_iter()
            .map(|row| {
                let records = records_by_workflow.remove(&row.id).unwrap_or_default();
                row.into_workflow(records)
            })
            .collect()
    }

    async fn upsert_record(
        tx: &mut Transaction<'_, Postgres>,
        workflow_id: Uuid,
        seq: i32,
        record: &WorkflowRecord,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sqlgate.workflow_records (
                id, workflow_id, seq, task_id, status, current_step_id,
                scheduled_at, scheduled_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                current_step_id = EXCLUDED.current_step_id,
                scheduled_at = EXCLUDED.scheduled_at,
                scheduled_by = EXCLUDED.scheduled_by
            "#,
        )
        .bind(record.id)
        .bind(workflow_id)
        .bind(seq)
        .bind(record.task_id)
        .bind(record.status.as_str())
        .bind(record.current_step_id)
        .bind(record.scheduled_at)
        .bind(&record.scheduled_by)
        .bind(record.created_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            conflict_on_unique(e, format!("Task {} is already bound to a workflow", record.task_id))
        })?;

        for step in &record.steps {
            sqlx::query(
                r#"
                INSERT INTO sqlgate.workflow_steps (
                    id, record_id, number, step_type, description, assignees,
                    state, operator, operated_at, reason
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                ON CONFLICT (id) DO UPDATE SET
                    state = EXCLUDED.state,
                    operator = EXCLUDED.operator,
                    operated_at = EXCLUDED.operated_at,
                    reason = EXCLUDED.reason
                "#,
            )
            .bind(step.id)
            .bind(record.id)
            .bind(step.number)
            .bind(step.step_type.as_str())
            .bind(&step.description)
            .bind(&step.assignees)
            .bind(step.state.as_str())
            .bind(&step.operator)
            .bind(step.operated_at)
            .bind(&step.reason)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn insert(&self, workflow: &Workflow) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sqlgate.workflows (
                id, subject, description, creator, created_at, version, current_record_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(workflow.id)
        .bind(&workflow.subject)
        .bind(&workflow.description)
        .bind(&workflow.creator)
        .bind(workflow.created_at)
        .bind(workflow.version)
        .bind(workflow.record.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            conflict_on_unique(e, format!("Workflow subject already exists: {}", workflow.subject))
        })?;

        for (seq, record) in workflow.all_records().enumerate() {
            Self::upsert_record(&mut tx, workflow.id, seq as i32, record).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Workflow>> {
        let row = sqlx::query_as::<_, WorkflowRow>(
            r#"
            SELECT id, subject, description, creator, created_at, version, current_record_id
            FROM sqlgate.workflows
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => Ok(self.load_many(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn save(&self, workflow: &Workflow) -> AppResult<i64> {
        let mut tx = self.db.begin().await?;

        let updated: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE sqlgate.workflows
            SET description = $3,
                current_record_id = $4,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING version
            "#,
        )
        .bind(workflow.id)
        .bind(workflow.version)
        .bind(&workflow.description)
        .bind(workflow.record.id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((version,)) = updated else {
            tx.rollback().await?;
            let exists: (bool,) =
                sqlx::query_as("SELECT EXISTS (SELECT 1 FROM sqlgate.workflows WHERE id = $1)")
                    .bind(workflow.id)
                    .fetch_one(&self.db)
                    .await?;
            return Err(if exists.0 {
                AppError::Conflict(format!(
                    "Workflow {} was modified concurrently (expected version {})",
                    workflow.id, workflow.version
                ))
            } else {
                AppError::NotFound(format!("Workflow not found: {}", workflow.id))
            });
        };

        // History records are immutable once superseded; only the active
        // record can have changed since the last save.
        let seq = workflow.history.len() as i32;
        Self::upsert_record(&mut tx, workflow.id, seq, &workflow.record).await?;

        if self.dispatch_outbox {
            if let Some(request) = DispatchRequest::for_claim(workflow) {
                enqueue(&mut *tx, &request).await?;
            }
        }

        tx.commit().await?;
        Ok(version)
    }

    async fn subject_exists(&self, subject: &str) -> AppResult<bool> {
        let result: (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM sqlgate.workflows WHERE subject = $1)")
                .bind(subject)
                .fetch_one(&self.db)
                .await?;
        Ok(result.0)
    }

    async fn task_bound(&self, task_id: i64) -> AppResult<bool> {
        let result: (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM sqlgate.workflow_records WHERE task_id = $1)",
        )
        .bind(task_id)
        .fetch_one(&self.db)
        .await?;
        Ok(result.0)
    }

    async fn list(&self, filter: &WorkflowFilter) -> AppResult<Vec<Workflow>> {
        let rows = sqlx::query_as::<_, WorkflowRow>(
            r#"
            SELECT w.id, w.subject, w.description, w.creator, w.created_at,
                   w.version, w.current_record_id
            FROM sqlgate.workflows w
            JOIN sqlgate.workflow_records r ON r.id = w.current_record_id
            LEFT JOIN sqlgate.workflow_steps s ON s.id = r.current_step_id
            WHERE ($1::text IS NULL OR w.creator = $1)
              AND ($2::text IS NULL OR r.status = $2)
              AND ($3::text IS NULL OR $3 = ANY(s.assignees))
            ORDER BY w.created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(&filter.creator)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(&filter.assignee)
        .bind(filter.effective_limit())
        .bind(filter.effective_offset())
        .fetch_all(&self.db)
        .await?;

        self.load_many(rows).await
    }

    async fn due_for_execution(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT w.id
            FROM sqlgate.workflows w
            JOIN sqlgate.workflow_records r ON r.id = w.current_record_id
            JOIN sqlgate.workflow_steps s ON s.id = r.current_step_id
            WHERE r.status = 'running'
              AND s.step_type = 'execute'
              AND r.scheduled_at IS NOT NULL
              AND r.scheduled_at <= $1
            ORDER BY r.scheduled_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit.max(0))
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
