//! Idempotent DDL for the `sqlgate` schema.
//!
//! `workflows`, `workflow_records` and `workflow_steps` belong to the
//! workflow engine. `tasks`, `instances`, `workflow_templates`, `users` and
//! `task_dispatch_queue` are owned by neighbouring subsystems; they are
//! created here too so a standalone deployment has something to read.

use crate::db::DbPool;
use crate::error::AppResult;

const SCHEMA_SQL: &str = r#"
CREATE SCHEMA IF NOT EXISTS sqlgate;

CREATE TABLE IF NOT EXISTS sqlgate.users (
    name        TEXT PRIMARY KEY,
    is_admin    BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE TABLE IF NOT EXISTS sqlgate.workflow_templates (
    id                  BIGSERIAL PRIMARY KEY,
    name                TEXT NOT NULL UNIQUE,
    description         TEXT NOT NULL DEFAULT '',
    allowed_audit_level TEXT,
    steps               JSONB NOT NULL,
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS sqlgate.instances (
    id                   BIGINT PRIMARY KEY,
    name                 TEXT NOT NULL DEFAULT '',
    maintenance_periods  JSONB NOT NULL DEFAULT '[]'::jsonb,
    workflow_template_id BIGINT REFERENCES sqlgate.workflow_templates (id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS sqlgate.tasks (
    id          BIGINT PRIMARY KEY,
    instance_id BIGINT NOT NULL,
    owner_id    TEXT NOT NULL,
    source_kind TEXT NOT NULL DEFAULT 'form',
    status      TEXT NOT NULL DEFAULT 'initialized',
    audit_level TEXT
);

CREATE TABLE IF NOT EXISTS sqlgate.workflows (
    id                UUID PRIMARY KEY,
    subject           TEXT NOT NULL,
    description       TEXT NOT NULL DEFAULT '',
    creator           TEXT NOT NULL,
    created_at        TIMESTAMPTZ NOT NULL,
    version           BIGINT NOT NULL DEFAULT 0,
    current_record_id UUID NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS workflows_subject_key ON sqlgate.workflows (subject);
CREATE INDEX IF NOT EXISTS workflows_creator_idx ON sqlgate.workflows (creator, created_at DESC);

CREATE TABLE IF NOT EXISTS sqlgate.workflow_records (
    id              UUID PRIMARY KEY,
    workflow_id     UUID NOT NULL REFERENCES sqlgate.workflows (id) ON DELETE CASCADE,
    seq             INTEGER NOT NULL,
    task_id         BIGINT NOT NULL,
    status          TEXT NOT NULL,
    current_step_id UUID,
    scheduled_at    TIMESTAMPTZ,
    scheduled_by    TEXT,
    created_at      TIMESTAMPTZ NOT NULL,
    UNIQUE (workflow_id, seq)
);
CREATE UNIQUE INDEX IF NOT EXISTS workflow_records_task_key ON sqlgate.workflow_records (task_id);
CREATE INDEX IF NOT EXISTS workflow_records_due_idx
    ON sqlgate.workflow_records (scheduled_at)
    WHERE status = 'running' AND scheduled_at IS NOT NULL;

CREATE TABLE IF NOT EXISTS sqlgate.workflow_steps (
    id          UUID PRIMARY KEY,
    record_id   UUID NOT NULL REFERENCES sqlgate.workflow_records (id) ON DELETE CASCADE,
    number      INTEGER NOT NULL,
    step_type   TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    assignees   TEXT[] NOT NULL,
    state       TEXT NOT NULL,
    operator    TEXT,
    operated_at TIMESTAMPTZ,
    reason      TEXT,
    UNIQUE (record_id, number)
);

CREATE TABLE IF NOT EXISTS sqlgate.task_dispatch_queue (
    id           BIGSERIAL PRIMARY KEY,
    workflow_id  UUID NOT NULL,
    record_id    UUID NOT NULL UNIQUE,
    task_id      BIGINT NOT NULL,
    triggered_by TEXT NOT NULL,
    scheduled    BOOLEAN NOT NULL,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    picked_at    TIMESTAMPTZ
);
"#;

/// Create the `sqlgate` schema and its tables if they do not exist.
pub async fn init_schema(pool: &DbPool) -> AppResult<()> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;
    tracing::info!("Database schema initialized");
    Ok(())
}
