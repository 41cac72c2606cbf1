//! Workflow aggregate: templates, steps, records and workflows.
//!
//! A [`Workflow`] is the unit of mutation. Its active [`WorkflowRecord`]
//! owns value copies of the template steps, so editing a template never
//! changes a workflow that is already in flight. The pure transitions
//! live here; permission checks and persistence are the engine's job.

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::state::{
    AuditLevel, RecordStatus, StepState, StepType, TaskSourceKind, TaskStatus,
};
use crate::error::{AppError, AppResult};

/// User reference as handed over by the authentication layer.
pub type UserId = String;

/// Maximum number of steps in a template.
pub const MAX_TEMPLATE_STEPS: usize = 5;

/// Maximum number of assignees on a single step.
pub const MAX_STEP_ASSIGNEES: usize = 3;

/// Daily window during which an instance accepts SQL execution (UTC).
///
/// A window whose end is before its start wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenancePeriod {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl MaintenancePeriod {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let time = at.time().with_nanosecond(0).unwrap_or_else(|| at.time());
        if self.start <= self.end {
            time >= self.start && time <= self.end
        } else {
            time >= self.start || time <= self.end
        }
    }
}

/// True when `periods` is empty or one of them contains `at`.
pub fn within_maintenance(periods: &[MaintenancePeriod], at: DateTime<Utc>) -> bool {
    periods.is_empty() || periods.iter().any(|p| p.contains(at))
}

/// A unit of SQL work as seen by the engine. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub instance_id: i64,
    pub owner_id: UserId,
    pub source_kind: TaskSourceKind,
    pub status: TaskStatus,
    /// Worst audit finding, `None` when the audit reported nothing.
    pub audit_level: Option<AuditLevel>,
    /// Execution windows of the task's instance.
    #[serde(default)]
    pub maintenance_periods: Vec<MaintenancePeriod>,
}

/// One stage of a reusable workflow template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStepTemplate {
    pub number: i32,
    pub step_type: StepType,
    #[serde(default)]
    pub description: String,
    pub assignees: Vec<UserId>,
}

/// Reusable definition of a review chain, bound to database instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Highest audit level a task may carry and still be submitted.
    #[serde(default)]
    pub allowed_audit_level: Option<AuditLevel>,
    pub steps: Vec<WorkflowStepTemplate>,
    #[serde(default)]
    pub instance_ids: Vec<i64>,
}

impl WorkflowTemplate {
    /// Check the structural rules every template must satisfy.
    ///
    /// 1 to 5 steps, numbered 1..=n in order, 1 to 3 distinct assignees each,
    /// and exactly the last step of type `execute`.
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Template name must not be empty".to_string(),
            ));
        }
        if self.steps.is_empty() || self.steps.len() > MAX_TEMPLATE_STEPS {
            return Err(AppError::InvalidInput(format!(
                "Template '{}' must have between 1 and {} steps, got {}",
                self.name,
                MAX_TEMPLATE_STEPS,
                self.steps.len()
            )));
        }

        let last = self.steps.len() - 1;
        for (index, step) in self.steps.iter().enumerate() {
            let expected_number = index as i32 + 1;
            if step.number != expected_number {
                return Err(AppError::InvalidInput(format!(
                    "Step {} of template '{}' has number {}",
                    expected_number, self.name, step.number
                )));
            }
            if step.assignees.is_empty() || step.assignees.len() > MAX_STEP_ASSIGNEES {
                return Err(AppError::InvalidInput(format!(
                    "Step {} must have between 1 and {} assignees",
                    step.number, MAX_STEP_ASSIGNEES
                )));
            }
            let mut seen: Vec<&str> = Vec::with_capacity(step.assignees.len());
            for assignee in &step.assignees {
                if assignee.trim().is_empty() || seen.contains(&assignee.as_str()) {
                    return Err(AppError::InvalidInput(format!(
                        "Step {} has an empty or duplicate assignee",
                        step.number
                    )));
                }
                seen.push(assignee);
            }

            let is_execute = step.step_type == StepType::Execute;
            if index == last && !is_execute {
                return Err(AppError::InvalidInput(format!(
                    "The last step of template '{}' must be an execute step",
                    self.name
                )));
            }
            if index != last && is_execute {
                return Err(AppError::InvalidInput(format!(
                    "Only the last step of template '{}' may be an execute step",
                    self.name
                )));
            }
        }

        Ok(())
    }

    /// Whether a task with the given audit result may enter this template.
    pub fn admits_audit_level(&self, level: Option<AuditLevel>) -> bool {
        match (self.allowed_audit_level, level) {
            (Some(allowed), Some(actual)) => actual <= allowed,
            _ => true,
        }
    }
}

/// An instantiated step with its own copy of type, description and assignees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: Uuid,
    pub number: i32,
    pub step_type: StepType,
    pub description: String,
    pub assignees: Vec<UserId>,
    pub state: StepState,
    pub operator: Option<UserId>,
    pub operated_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl WorkflowStep {
    pub fn from_template(template: &WorkflowStepTemplate) -> Self {
        Self {
            id: Uuid::new_v4(),
            number: template.number,
            step_type: template.step_type,
            description: template.description.clone(),
            assignees: template.assignees.clone(),
            state: StepState::Initialized,
            operator: None,
            operated_at: None,
            reason: None,
        }
    }

    pub fn is_assignee(&self, user: &str) -> bool {
        self.assignees.iter().any(|a| a == user)
    }

    fn resolve(&mut self, state: StepState, user: &str, at: DateTime<Utc>) {
        self.state = state;
        self.operator = Some(user.to_string());
        self.operated_at = Some(at);
    }
}

/// One attempt at getting a task reviewed and executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: Uuid,
    pub task_id: i64,
    pub status: RecordStatus,
    pub current_step_id: Option<Uuid>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub scheduled_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub steps: Vec<WorkflowStep>,
}

impl WorkflowRecord {
    /// Materialize a fresh record from a validated template.
    pub fn instantiate(task_id: i64, template: &WorkflowTemplate, now: DateTime<Utc>) -> Self {
        let steps: Vec<WorkflowStep> = template
            .steps
            .iter()
            .map(WorkflowStep::from_template)
            .collect();
        let current_step_id = steps.first().map(|s| s.id);

        Self {
            id: Uuid::new_v4(),
            task_id,
            status: RecordStatus::Running,
            current_step_id,
            scheduled_at: None,
            scheduled_by: None,
            created_at: now,
            steps,
        }
    }

    pub fn step(&self, step_id: Uuid) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn current_step(&self) -> Option<&WorkflowStep> {
        self.current_step_id.and_then(|id| self.step(id))
    }

    fn current_step_mut(&mut self) -> Option<&mut WorkflowStep> {
        let id = self.current_step_id?;
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// Id of the earliest step still `initialized`.
    pub fn first_initialized_step_id(&self) -> Option<Uuid> {
        self.steps
            .iter()
            .find(|s| s.state == StepState::Initialized)
            .map(|s| s.id)
    }

    /// Resolved steps form a prefix and the pointer, when set, is the first
    /// `initialized` step.
    pub fn is_sequential(&self) -> bool {
        let resolved = self
            .steps
            .iter()
            .take_while(|s| s.state != StepState::Initialized)
            .count();
        let prefix_ok = self.steps[resolved..]
            .iter()
            .all(|s| s.state == StepState::Initialized);
        let pointer_ok = match self.current_step_id {
            Some(id) => self.first_initialized_step_id() == Some(id),
            None => true,
        };
        prefix_ok && pointer_ok
    }

    pub fn ensure_status(&self, allowed: &[RecordStatus], operation: &str) -> AppResult<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(AppError::InvalidState(format!(
                "Cannot {} a workflow record in status '{}'",
                operation, self.status
            )))
        }
    }

    /// The step a caller wants to act on, provided it is the pending one.
    pub fn pending_step(&self, step_id: Uuid, operation: &str) -> AppResult<&WorkflowStep> {
        self.ensure_status(&[RecordStatus::Running], operation)?;
        let step = self
            .step(step_id)
            .ok_or_else(|| AppError::NotFound(format!("Workflow step not found: {}", step_id)))?;
        if self.current_step_id != Some(step_id) {
            return Err(AppError::Conflict(format!(
                "Step {} is not the current pending step",
                step.number
            )));
        }
        Ok(step)
    }

    /// The final step, provided every review step before it is approved.
    pub fn awaiting_execution_step(&self, operation: &str) -> AppResult<&WorkflowStep> {
        self.ensure_status(&[RecordStatus::Running], operation)?;
        match self.current_step() {
            Some(step) if step.step_type == StepType::Execute => Ok(step),
            _ => Err(AppError::InvalidState(format!(
                "Cannot {} before all review steps are approved",
                operation
            ))),
        }
    }

    /// Approve the pending review step and advance the pointer.
    pub fn approve_step(&mut self, step_id: Uuid, user: &str, now: DateTime<Utc>) -> AppResult<()> {
        let step = self.pending_step(step_id, "approve")?;
        if step.step_type == StepType::Execute {
            return Err(AppError::InvalidState(
                "Execute steps are not approved; execute or schedule the workflow instead"
                    .to_string(),
            ));
        }

        if let Some(step) = self.current_step_mut() {
            step.resolve(StepState::Approved, user, now);
        }
        self.current_step_id = self.first_initialized_step_id();
        Ok(())
    }

    /// Reject the pending step; the record stops and waits for an update.
    pub fn reject_step(
        &mut self,
        step_id: Uuid,
        user: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        self.pending_step(step_id, "reject")?;

        if let Some(step) = self.current_step_mut() {
            step.resolve(StepState::Rejected, user, now);
            step.reason = Some(reason.to_string());
        }
        self.status = RecordStatus::Rejected;
        self.current_step_id = None;
        self.clear_schedule();
        Ok(())
    }

    pub fn cancel(&mut self) -> AppResult<()> {
        self.ensure_status(&[RecordStatus::Running, RecordStatus::Rejected], "cancel")?;
        self.status = RecordStatus::Canceled;
        self.current_step_id = None;
        self.clear_schedule();
        Ok(())
    }

    /// Set or clear the scheduled execution time.
    pub fn set_schedule(&mut self, at: Option<DateTime<Utc>>, user: &str) -> AppResult<()> {
        self.awaiting_execution_step("schedule")?;
        match at {
            Some(at) => {
                self.scheduled_at = Some(at);
                self.scheduled_by = Some(user.to_string());
            }
            None => self.clear_schedule(),
        }
        Ok(())
    }

    fn clear_schedule(&mut self) {
        self.scheduled_at = None;
        self.scheduled_by = None;
    }

    /// Mark the execute step as taken and move the record out of
    /// "execute-pending". Persisting this is the dispatch claim.
    pub fn claim_execution(&mut self, user: &str, now: DateTime<Utc>) -> AppResult<()> {
        self.awaiting_execution_step("execute")?;
        if let Some(step) = self.current_step_mut() {
            step.resolve(StepState::Approved, user, now);
        }
        self.current_step_id = None;
        self.status = RecordStatus::Finished;
        Ok(())
    }

    /// Whether the scheduler should fire this record at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == RecordStatus::Running
            && self
                .current_step()
                .is_some_and(|s| s.step_type == StepType::Execute)
            && self.scheduled_at.is_some_and(|at| at <= now)
    }
}

/// The durable change request a user interacts with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub subject: String,
    pub description: String,
    pub creator: UserId,
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped by every successful save.
    pub version: i64,
    /// The active record.
    pub record: WorkflowRecord,
    /// Superseded records, oldest first.
    pub history: Vec<WorkflowRecord>,
}

impl Workflow {
    pub fn new(
        subject: String,
        description: String,
        creator: UserId,
        record: WorkflowRecord,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject,
            description,
            creator,
            created_at: now,
            version: 0,
            record,
            history: Vec::new(),
        }
    }

    pub fn task_id(&self) -> i64 {
        self.record.task_id
    }

    /// Move the active record into history and install `record`.
    pub fn supersede(&mut self, record: WorkflowRecord) -> AppResult<()> {
        self.record
            .ensure_status(&[RecordStatus::Rejected], "update")?;
        let previous = std::mem::replace(&mut self.record, record);
        self.history.push(previous);
        Ok(())
    }

    /// Every record this workflow has ever had, oldest first.
    pub fn all_records(&self) -> impl Iterator<Item = &WorkflowRecord> {
        self.history.iter().chain(std::iter::once(&self.record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn step_template(number: i32, step_type: StepType, assignees: &[&str]) -> WorkflowStepTemplate {
        WorkflowStepTemplate {
            number,
            step_type,
            description: format!("step {}", number),
            assignees: assignees.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn three_step_template() -> WorkflowTemplate {
        WorkflowTemplate {
            id: 1,
            name: "default".to_string(),
            description: String::new(),
            allowed_audit_level: None,
            steps: vec![
                step_template(1, StepType::Review, &["u1"]),
                step_template(2, StepType::Review, &["u2", "u3"]),
                step_template(3, StepType::Execute, &["u4"]),
            ],
            instance_ids: vec![10],
        }
    }

    #[test]
    fn test_valid_template() {
        assert!(three_step_template().validate().is_ok());
    }

    #[test]
    fn test_template_requires_execute_last() {
        let mut template = three_step_template();
        template.steps[2].step_type = StepType::Review;
        assert!(matches!(template.validate(), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_template_rejects_execute_in_middle() {
        let mut template = three_step_template();
        template.steps[1].step_type = StepType::Execute;
        assert!(matches!(template.validate(), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn test_template_step_count_bounds() {
        let mut template = three_step_template();
        template.steps.clear();
        assert!(template.validate().is_err());

        let mut template = three_step_template();
        template.steps = (1..=6)
            .map(|n| {
                let kind = if n == 6 { StepType::Execute } else { StepType::Review };
                step_template(n, kind, &["u1"])
            })
            .collect();
        assert!(template.validate().is_err());
    }

    #[test]
    fn test_template_assignee_bounds() {
        let mut template = three_step_template();
        template.steps[0].assignees = vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "d".to_string(),
        ];
        assert!(template.validate().is_err());

        let mut template = three_step_template();
        template.steps[1].assignees = vec!["u2".to_string(), "u2".to_string()];
        assert!(template.validate().is_err());
    }

    #[test]
    fn test_audit_level_gate() {
        let mut template = three_step_template();
        assert!(template.admits_audit_level(Some(AuditLevel::Error)));
        template.allowed_audit_level = Some(AuditLevel::Warn);
        assert!(template.admits_audit_level(Some(AuditLevel::Notice)));
        assert!(template.admits_audit_level(None));
        assert!(!template.admits_audit_level(Some(AuditLevel::Error)));
    }

    #[test]
    fn test_instantiate_copies_steps() {
        let mut template = three_step_template();
        let record = WorkflowRecord::instantiate(7, &template, Utc::now());
        assert_eq!(record.steps.len(), 3);
        assert_eq!(record.current_step_id, Some(record.steps[0].id));
        assert_eq!(record.status, RecordStatus::Running);

        template.steps[0].assignees = vec!["someone-else".to_string()];
        assert_eq!(record.steps[0].assignees, vec!["u1".to_string()]);
    }

    #[test]
    fn test_approve_advances_pointer() {
        let now = Utc::now();
        let mut record = WorkflowRecord::instantiate(7, &three_step_template(), now);
        let first = record.steps[0].id;
        record.approve_step(first, "u1", now).unwrap();

        assert_eq!(record.steps[0].state, StepState::Approved);
        assert_eq!(record.steps[0].operator.as_deref(), Some("u1"));
        assert_eq!(record.current_step_id, Some(record.steps[1].id));
        assert!(record.is_sequential());
    }

    #[test]
    fn test_stale_pointer_is_conflict() {
        let now = Utc::now();
        let mut record = WorkflowRecord::instantiate(7, &three_step_template(), now);
        let first = record.steps[0].id;
        record.approve_step(first, "u1", now).unwrap();
        assert!(matches!(
            record.approve_step(first, "u1", now),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn test_unknown_step_is_not_found() {
        let mut record = WorkflowRecord::instantiate(7, &three_step_template(), Utc::now());
        assert!(matches!(
            record.approve_step(Uuid::new_v4(), "u1", Utc::now()),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_execute_step_cannot_be_approved() {
        let now = Utc::now();
        let mut record = WorkflowRecord::instantiate(7, &three_step_template(), now);
        let ids: Vec<Uuid> = record.steps.iter().map(|s| s.id).collect();
        record.approve_step(ids[0], "u1", now).unwrap();
        record.approve_step(ids[1], "u2", now).unwrap();
        assert!(matches!(
            record.approve_step(ids[2], "u4", now),
            Err(AppError::InvalidState(_))
        ));
    }

    #[test]
    fn test_reject_clears_pointer() {
        let now = Utc::now();
        let mut record = WorkflowRecord::instantiate(7, &three_step_template(), now);
        let first = record.steps[0].id;
        record.reject_step(first, "u1", "missing index", now).unwrap();

        assert_eq!(record.status, RecordStatus::Rejected);
        assert_eq!(record.current_step_id, None);
        assert_eq!(record.steps[0].reason.as_deref(), Some("missing index"));
        assert!(record.is_sequential());
    }

    #[test]
    fn test_cancel_rules() {
        let mut record = WorkflowRecord::instantiate(7, &three_step_template(), Utc::now());
        record.cancel().unwrap();
        assert_eq!(record.status, RecordStatus::Canceled);
        assert!(matches!(record.cancel(), Err(AppError::InvalidState(_))));
    }

    #[test]
    fn test_terminal_transitions_drop_schedule() {
        let now = Utc::now();
        let at = now + Duration::hours(1);
        let scheduled = || {
            let mut record = WorkflowRecord::instantiate(7, &three_step_template(), now);
            let ids: Vec<Uuid> = record.steps.iter().map(|s| s.id).collect();
            record.approve_step(ids[0], "u1", now).unwrap();
            record.approve_step(ids[1], "u2", now).unwrap();
            record.set_schedule(Some(at), "u4").unwrap();
            record
        };

        let mut rejected = scheduled();
        let execute_step = rejected.steps[2].id;
        rejected.reject_step(execute_step, "u4", "wrong window", now).unwrap();
        assert_eq!(rejected.scheduled_at, None);
        assert_eq!(rejected.scheduled_by, None);
        assert!(!rejected.is_due(at));

        let mut canceled = scheduled();
        canceled.cancel().unwrap();
        assert_eq!(canceled.scheduled_at, None);
        assert_eq!(canceled.scheduled_by, None);
    }

    #[test]
    fn test_schedule_requires_reviews_done() {
        let now = Utc::now();
        let mut record = WorkflowRecord::instantiate(7, &three_step_template(), now);
        assert!(matches!(
            record.set_schedule(Some(now + Duration::hours(1)), "u4"),
            Err(AppError::InvalidState(_))
        ));
    }

    #[test]
    fn test_claim_execution_finishes_record() {
        let now = Utc::now();
        let mut record = WorkflowRecord::instantiate(7, &three_step_template(), now);
        let ids: Vec<Uuid> = record.steps.iter().map(|s| s.id).collect();
        record.approve_step(ids[0], "u1", now).unwrap();
        record.approve_step(ids[1], "u3", now).unwrap();
        record.claim_execution("u4", now).unwrap();

        assert_eq!(record.status, RecordStatus::Finished);
        assert_eq!(record.current_step_id, None);
        assert!(record.steps.iter().all(|s| s.state == StepState::Approved));
        assert!(matches!(
            record.claim_execution("u4", now),
            Err(AppError::InvalidState(_))
        ));
        assert!(matches!(record.cancel(), Err(AppError::InvalidState(_))));
    }

    #[test]
    fn test_is_due() {
        let now = Utc::now();
        let mut record = WorkflowRecord::instantiate(7, &three_step_template(), now);
        let ids: Vec<Uuid> = record.steps.iter().map(|s| s.id).collect();
        record.approve_step(ids[0], "u1", now).unwrap();
        record.approve_step(ids[1], "u2", now).unwrap();
        assert!(!record.is_due(now));

        record.set_schedule(Some(now + Duration::minutes(5)), "u4").unwrap();
        assert!(!record.is_due(now));
        assert!(record.is_due(now + Duration::minutes(5)));
    }

    #[test]
    fn test_maintenance_period_wraps_midnight() {
        let period = MaintenancePeriod::new(
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
        );
        let at = |h: u32| {
            chrono::NaiveDate::from_ymd_opt(2026, 3, 1)
                .unwrap()
                .and_hms_opt(h, 30, 0)
                .unwrap()
                .and_utc()
        };
        assert!(period.contains(at(23)));
        assert!(period.contains(at(1)));
        assert!(!period.contains(at(12)));
        assert!(within_maintenance(&[], at(12)));
    }

    #[test]
    fn test_supersede_requires_rejected() {
        let now = Utc::now();
        let template = three_step_template();
        let record = WorkflowRecord::instantiate(7, &template, now);
        let mut workflow = Workflow::new(
            "S1".to_string(),
            String::new(),
            "owner".to_string(),
            record,
            now,
        );
        let replacement = WorkflowRecord::instantiate(8, &template, now);
        assert!(workflow.supersede(replacement.clone()).is_err());

        let first = workflow.record.steps[0].id;
        workflow.record.reject_step(first, "u1", "no", now).unwrap();
        workflow.supersede(replacement).unwrap();
        assert_eq!(workflow.history.len(), 1);
        assert_eq!(workflow.task_id(), 8);
        assert_eq!(workflow.all_records().count(), 2);
    }
}
