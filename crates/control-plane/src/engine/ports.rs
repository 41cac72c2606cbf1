//! Contracts the engine consumes from its collaborators.
//!
//! The audit subsystem owns tasks, administrators own templates, the auth
//! layer owns permissions, and the executor owns running SQL. The engine
//! only reads from them, except for the fire-and-forget dispatch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::model::{Task, UserId, Workflow, WorkflowStep, WorkflowTemplate};
use crate::engine::state::{RecordStatus, StepState, StepType, WorkflowEventKind};
use crate::error::AppResult;

/// Source of tasks produced by the audit subsystem.
#[async_trait]
pub trait TaskProvider: Send + Sync {
    async fn get_task(&self, task_id: i64) -> AppResult<Option<Task>>;
}

/// Source of workflow templates bound to database instances.
#[async_trait]
pub trait TemplateProvider: Send + Sync {
    async fn template_for_instance(&self, instance_id: i64)
        -> AppResult<Option<WorkflowTemplate>>;
}

/// Capability checks supplied by the auth layer.
#[async_trait]
pub trait PermissionOracle: Send + Sync {
    async fn is_admin(&self, user: &str) -> AppResult<bool>;

    /// Defaults to membership in the step's own assignee copy.
    async fn can_act_on_step(&self, user: &str, step: &WorkflowStep) -> AppResult<bool> {
        Ok(step.is_assignee(user))
    }
}

/// Event published after a successful transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub workflow_id: Uuid,
    pub kind: WorkflowEventKind,
    pub subject: String,
    pub task_id: i64,
    pub actor: UserId,
    pub at: DateTime<Utc>,
}

/// Best-effort outbound notifications. Errors are logged by the caller.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &WorkflowEvent) -> AppResult<()>;
}

/// Request handed to the task executor after a successful claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub workflow_id: Uuid,
    pub record_id: Uuid,
    pub task_id: i64,
    pub triggered_by: UserId,
    pub scheduled: bool,
}

impl DispatchRequest {
    /// The request owed for the active record's execution claim, if it holds one.
    pub fn for_claim(workflow: &Workflow) -> Option<Self> {
        let record = &workflow.record;
        if record.status != RecordStatus::Finished {
            return None;
        }
        let step = record
            .steps
            .iter()
            .find(|s| s.step_type == StepType::Execute && s.state == StepState::Approved)?;

        Some(Self {
            workflow_id: workflow.id,
            record_id: record.id,
            task_id: record.task_id,
            triggered_by: step.operator.clone()?,
            scheduled: record.scheduled_at.is_some(),
        })
    }
}

/// Asynchronous SQL executor. `dispatch` returns once the task is queued.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn dispatch(&self, request: &DispatchRequest) -> AppResult<()>;
}

/// Notifier that only writes to the log. Used when no broker is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &WorkflowEvent) -> AppResult<()> {
        tracing::info!(
            workflow_id = %event.workflow_id,
            kind = %event.kind,
            task_id = event.task_id,
            actor = %event.actor,
            "Workflow event"
        );
        Ok(())
    }
}
