//! Workflow approval and execution engine.
//!
//! Owns every transition of a workflow aggregate:
//! - create / update instantiate a fresh record from the instance template
//! - approve / reject move the current-step pointer
//! - cancel (single and bulk) stops the pipeline
//! - schedule / execute / fire_scheduled hand the task to the executor
//!
//! Each operation loads the aggregate, checks every precondition, mutates a
//! local copy and saves it with a compare-and-set on the loaded version.
//! Nothing is written when a precondition fails, and a lost race surfaces as
//! `AppError::Conflict`. Notifications and dispatch happen after the save
//! and never fail the operation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::model::{
    within_maintenance, Task, UserId, Workflow, WorkflowRecord, WorkflowStep, WorkflowTemplate,
};
use crate::engine::ports::{
    DispatchRequest, Notifier, PermissionOracle, TaskExecutor, TaskProvider, TemplateProvider,
    WorkflowEvent,
};
use crate::engine::state::{RecordStatus, TaskStatus, WorkflowEventKind};
use crate::engine::store::{WorkflowFilter, WorkflowStore};
use crate::error::{AppError, AppResult};
use crate::result_ext::{OptionResultExt, ResultExt};

/// Longest accepted workflow subject, in characters.
pub const MAX_SUBJECT_LEN: usize = 255;

/// Request to open a new workflow for a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorkflowRequest {
    pub subject: String,
    #[serde(default)]
    pub description: String,
    pub task_id: i64,
}

/// Request to resubmit a rejected workflow with a replacement task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateWorkflowRequest {
    pub task_id: i64,
    #[serde(default)]
    pub description: Option<String>,
}

/// One failed entry of a bulk cancel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCancelFailure {
    pub workflow_id: Uuid,
    pub code: String,
    pub error: String,
}

/// Result of [`WorkflowEngine::cancel_many`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchCancelOutcome {
    pub canceled: Vec<Uuid>,
    pub failed: Vec<BatchCancelFailure>,
}

/// The workflow state machine and its collaborators.
pub struct WorkflowEngine {
    store: Arc<dyn WorkflowStore>,
    tasks: Arc<dyn TaskProvider>,
    templates: Arc<dyn TemplateProvider>,
    permissions: Arc<dyn PermissionOracle>,
    notifier: Arc<dyn Notifier>,
    executor: Arc<dyn TaskExecutor>,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        tasks: Arc<dyn TaskProvider>,
        templates: Arc<dyn TemplateProvider>,
        permissions: Arc<dyn PermissionOracle>,
        notifier: Arc<dyn Notifier>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        Self {
            store,
            tasks,
            templates,
            permissions,
            notifier,
            executor,
        }
    }

    /// Load a workflow or fail with `NotFound`.
    pub async fn get(&self, workflow_id: Uuid) -> AppResult<Workflow> {
        self.store
            .get(workflow_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Workflow not found: {}", workflow_id)))
    }

    pub async fn list(&self, filter: &WorkflowFilter) -> AppResult<Vec<Workflow>> {
        self.store.list(filter).await
    }

    /// Load a task or fail with `NotFound`.
    pub async fn task(&self, task_id: i64) -> AppResult<Task> {
        self.tasks
            .get_task(task_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Task not found: {}", task_id)))
    }

    /// Open a workflow for `request.task_id` using its instance's template.
    pub async fn create(&self, user: &str, request: CreateWorkflowRequest) -> AppResult<Workflow> {
        let subject = validate_subject(&request.subject)?;
        if self.store.subject_exists(&subject).await? {
            return Err(AppError::Conflict(format!(
                "Workflow subject already exists: {}",
                subject
            )));
        }

        let (_task, template) = self.admissible_task(user, request.task_id).await?;

        let now = Utc::now();
        let record = WorkflowRecord::instantiate(request.task_id, &template, now);
        let workflow = Workflow::new(subject, request.description, user.to_string(), record, now);
        self.store.insert(&workflow).await?;

        info!(
            workflow_id = %workflow.id,
            task_id = request.task_id,
            template = %template.name,
            steps = workflow.record.steps.len(),
            user = %user,
            "Workflow created"
        );
        self.notify(&workflow, WorkflowEventKind::Created, user).await;

        Ok(workflow)
    }

    /// Approve the pending review step `step_id`.
    pub async fn approve(&self, workflow_id: Uuid, step_id: Uuid, user: &str) -> AppResult<Workflow> {
        let mut workflow = self.get(workflow_id).await?;
        let step = workflow.record.pending_step(step_id, "approve")?.clone();
        self.authorize_step(user, &step, true).await?;

        workflow.record.approve_step(step_id, user, Utc::now())?;
        let workflow = self.commit(workflow).await?;

        info!(
            workflow_id = %workflow_id,
            step = step.number,
            user = %user,
            "Workflow step approved"
        );
        self.notify(&workflow, WorkflowEventKind::StepApproved, user)
            .await;

        Ok(workflow)
    }

    /// Reject the pending step `step_id`, review or execute.
    pub async fn reject(
        &self,
        workflow_id: Uuid,
        step_id: Uuid,
        user: &str,
        reason: &str,
    ) -> AppResult<Workflow> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::InvalidInput(
                "A rejection reason is required".to_string(),
            ));
        }

        let mut workflow = self.get(workflow_id).await?;
        let step = workflow.record.pending_step(step_id, "reject")?.clone();
        self.authorize_step(user, &step, true).await?;

        workflow
            .record
            .reject_step(step_id, user, reason, Utc::now())?;
        let workflow = self.commit(workflow).await?;

        info!(
            workflow_id = %workflow_id,
            step = step.number,
            user = %user,
            "Workflow rejected"
        );
        self.notify(&workflow, WorkflowEventKind::Rejected, user).await;

        Ok(workflow)
    }

    /// Resubmit a rejected workflow with a replacement task.
    ///
    /// The rejected record moves to history unchanged; the new record starts
    /// again at step 1.
    pub async fn update(
        &self,
        workflow_id: Uuid,
        user: &str,
        request: UpdateWorkflowRequest,
    ) -> AppResult<Workflow> {
        let mut workflow = self.get(workflow_id).await?;
        workflow
            .record
            .ensure_status(&[RecordStatus::Rejected], "update")?;
        if workflow.creator != user {
            return Err(AppError::Forbidden(
                "Only the workflow creator can update it".to_string(),
            ));
        }

        let (_task, template) = self.admissible_task(user, request.task_id).await?;

        let record = WorkflowRecord::instantiate(request.task_id, &template, Utc::now());
        workflow.supersede(record)?;
        if let Some(description) = request.description {
            workflow.description = description;
        }
        let workflow = self.commit(workflow).await?;

        info!(
            workflow_id = %workflow_id,
            task_id = request.task_id,
            history = workflow.history.len(),
            user = %user,
            "Workflow resubmitted"
        );
        self.notify(&workflow, WorkflowEventKind::Updated, user).await;

        Ok(workflow)
    }

    /// Cancel a running or rejected workflow.
    pub async fn cancel(&self, workflow_id: Uuid, user: &str) -> AppResult<Workflow> {
        let mut workflow = self.get(workflow_id).await?;
        workflow
            .record
            .ensure_status(&[RecordStatus::Running, RecordStatus::Rejected], "cancel")?;
        if workflow.creator != user && !self.permissions.is_admin(user).await? {
            return Err(AppError::Forbidden(
                "Only the creator or an administrator can cancel a workflow".to_string(),
            ));
        }

        workflow.record.cancel()?;
        let workflow = self.commit(workflow).await?;

        info!(workflow_id = %workflow_id, user = %user, "Workflow canceled");
        self.notify(&workflow, WorkflowEventKind::Canceled, user).await;

        Ok(workflow)
    }

    /// Cancel each workflow independently; one failure does not undo others.
    pub async fn cancel_many(&self, workflow_ids: &[Uuid], user: &str) -> BatchCancelOutcome {
        let mut outcome = BatchCancelOutcome::default();
        let mut seen: Vec<Uuid> = Vec::with_capacity(workflow_ids.len());

        for &workflow_id in workflow_ids {
            if seen.contains(&workflow_id) {
                continue;
            }
            seen.push(workflow_id);

            match self.cancel(workflow_id, user).await {
                Ok(_) => outcome.canceled.push(workflow_id),
                Err(e) => {
                    debug!(workflow_id = %workflow_id, error = %e, "Bulk cancel entry failed");
                    outcome.failed.push(BatchCancelFailure {
                        workflow_id,
                        code: e.code().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        outcome
    }

    /// Set (or with `None`, clear) the scheduled execution time.
    pub async fn schedule(
        &self,
        workflow_id: Uuid,
        user: &str,
        at: Option<DateTime<Utc>>,
    ) -> AppResult<Workflow> {
        let mut workflow = self.get(workflow_id).await?;
        let step = workflow.record.awaiting_execution_step("schedule")?.clone();
        self.authorize_step(user, &step, false).await?;

        if let Some(at) = at {
            if at <= Utc::now() {
                return Err(AppError::InvalidInput(
                    "Scheduled time must be in the future".to_string(),
                ));
            }
            let task = self.task(workflow.task_id()).await?;
            if !within_maintenance(&task.maintenance_periods, at) {
                return Err(AppError::InvalidInput(format!(
                    "Scheduled time {} is outside the instance maintenance windows",
                    at
                )));
            }
        } else if workflow.record.scheduled_at.is_none() {
            return Ok(workflow);
        }

        workflow.record.set_schedule(at, user)?;
        let workflow = self.commit(workflow).await?;

        let kind = if at.is_some() {
            WorkflowEventKind::Scheduled
        } else {
            WorkflowEventKind::Unscheduled
        };
        info!(
            workflow_id = %workflow_id,
            scheduled_at = ?at,
            user = %user,
            "Workflow schedule changed"
        );
        self.notify(&workflow, kind, user).await;

        Ok(workflow)
    }

    /// Claim the execute step and hand the task to the executor now.
    pub async fn execute(&self, workflow_id: Uuid, user: &str) -> AppResult<Workflow> {
        let mut workflow = self.get(workflow_id).await?;
        let step = workflow.record.awaiting_execution_step("execute")?.clone();
        self.authorize_step(user, &step, false).await?;

        if workflow.record.scheduled_at.is_some() {
            return Err(AppError::InvalidState(
                "Workflow is scheduled; cancel the schedule before executing manually".to_string(),
            ));
        }

        let now = Utc::now();
        let task = self.task(workflow.task_id()).await?;
        if !within_maintenance(&task.maintenance_periods, now) {
            return Err(AppError::InvalidState(
                "Instance is outside its maintenance windows".to_string(),
            ));
        }

        workflow.record.claim_execution(user, now)?;
        let workflow = self.commit(workflow).await?;

        info!(
            workflow_id = %workflow_id,
            task_id = workflow.task_id(),
            user = %user,
            "Workflow execution claimed"
        );
        self.dispatch(&workflow, user).await;

        Ok(workflow)
    }

    /// Fire a scheduled execution if it is still due at `now`.
    ///
    /// Returns `Ok(false)` when the workflow is no longer due or another
    /// trigger won the claim.
    pub async fn fire_scheduled(&self, workflow_id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let Some(mut workflow) = self.store.get(workflow_id).await? else {
            return Ok(false);
        };
        if !workflow.record.is_due(now) {
            return Ok(false);
        }

        let triggered_by: UserId = workflow
            .record
            .scheduled_by
            .clone()
            .log_none("scheduled record without scheduling user")
            .unwrap_or_else(|| workflow.creator.clone());

        workflow.record.claim_execution(&triggered_by, now)?;
        let workflow = match self.commit(workflow).await {
            Ok(workflow) => workflow,
            Err(AppError::Conflict(reason)) => {
                debug!(workflow_id = %workflow_id, reason = %reason, "Scheduled claim lost");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        info!(
            workflow_id = %workflow_id,
            task_id = workflow.task_id(),
            user = %triggered_by,
            "Scheduled workflow execution claimed"
        );
        self.dispatch(&workflow, &triggered_by).await;

        Ok(true)
    }

    /// Ids of workflows whose schedule has come due.
    pub async fn due_for_execution(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<Uuid>> {
        self.store.due_for_execution(now, limit).await
    }

    /// Task checks shared by create and update.
    async fn admissible_task(
        &self,
        user: &str,
        task_id: i64,
    ) -> AppResult<(Task, WorkflowTemplate)> {
        let task = self.task(task_id).await?;

        if task.owner_id != user {
            return Err(AppError::Forbidden(format!(
                "Task {} is not owned by {}",
                task_id, user
            )));
        }
        if task.source_kind.is_raw_xml() {
            return Err(AppError::Conflict(format!(
                "Task {} was built from MyBatis XML and cannot enter a workflow",
                task_id
            )));
        }
        if task.status == TaskStatus::Initialized {
            return Err(AppError::InvalidState(format!(
                "Task {} has not been audited yet",
                task_id
            )));
        }
        if task.status.has_started() {
            return Err(AppError::InvalidState(format!(
                "Task {} has already been executed, status is '{}'",
                task_id, task.status
            )));
        }
        if self.store.task_bound(task_id).await? {
            return Err(AppError::Conflict(format!(
                "Task {} is already bound to a workflow",
                task_id
            )));
        }

        let template = self
            .templates
            .template_for_instance(task.instance_id)
            .await?
            .ok_or_else(|| {
                AppError::InvalidState(format!(
                    "No workflow template is bound to instance {}",
                    task.instance_id
                ))
            })?;
        template.validate().map_err(|e| {
            AppError::InvalidState(format!("Template '{}' is invalid: {}", template.name, e))
        })?;
        if !template.admits_audit_level(task.audit_level) {
            return Err(AppError::InvalidState(format!(
                "Task {} audit level exceeds what template '{}' allows",
                task_id, template.name
            )));
        }

        Ok((task, template))
    }

    /// Assignee check; `allow_admin` lets administrators act on review steps.
    async fn authorize_step(&self, user: &str, step: &WorkflowStep, allow_admin: bool) -> AppResult<()> {
        if self.permissions.can_act_on_step(user, step).await? {
            return Ok(());
        }
        if allow_admin && self.permissions.is_admin(user).await? {
            debug!(step = step.number, user = %user, "Administrator override on step");
            return Ok(());
        }
        Err(AppError::Forbidden(format!(
            "{} is not an assignee of step {}",
            user, step.number
        )))
    }

    async fn commit(&self, mut workflow: Workflow) -> AppResult<Workflow> {
        debug_assert!(workflow.record.is_sequential());
        workflow.version = self.store.save(&workflow).await?;
        Ok(workflow)
    }

    async fn dispatch(&self, workflow: &Workflow, user: &str) {
        let Some(request) = DispatchRequest::for_claim(workflow) else {
            warn!(workflow_id = %workflow.id, "Record holds no execution claim, nothing to dispatch");
            return;
        };
        if self
            .executor
            .dispatch(&request)
            .await
            .swallow("dispatching task to executor")
            .is_none()
        {
            warn!(
                workflow_id = %workflow.id,
                task_id = request.task_id,
                "Task dispatch failed after claim; executor status will report it"
            );
        }
        self.notify(workflow, WorkflowEventKind::ExecutionDispatched, user)
            .await;
    }

    async fn notify(&self, workflow: &Workflow, kind: WorkflowEventKind, actor: &str) {
        let event = WorkflowEvent {
            workflow_id: workflow.id,
            kind,
            subject: workflow.subject.clone(),
            task_id: workflow.task_id(),
            actor: actor.to_string(),
            at: Utc::now(),
        };
        let _ = self
            .notifier
            .notify(&event)
            .await
            .log("notifying workflow event");
    }
}

fn validate_subject(subject: &str) -> AppResult<String> {
    let subject = subject.trim();
    if subject.is_empty() {
        return Err(AppError::InvalidInput(
            "Workflow subject must not be empty".to_string(),
        ));
    }
    if subject.chars().count() > MAX_SUBJECT_LEN {
        return Err(AppError::InvalidInput(format!(
            "Workflow subject must be at most {} characters",
            MAX_SUBJECT_LEN
        )));
    }
    Ok(subject.to_string())
}
