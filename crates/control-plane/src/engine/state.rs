//! State enums for workflows, records, steps and the tasks they carry.
//!
//! All enums serialize as snake_case and round-trip through `as_str` /
//! `FromStr` so the Postgres store can keep them in TEXT columns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a workflow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// Reviewers approve or reject the change.
    Review,
    /// Assignees trigger (or schedule) execution of the task.
    Execute,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::Execute => "execute",
        }
    }
}

impl FromStr for StepType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "review" => Ok(Self::Review),
            "execute" => Ok(Self::Execute),
            _ => Err(format!("Unknown step type: {}", s)),
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime state of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Initialized,
    Approved,
    Rejected,
}

impl StepState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for StepState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initialized" => Ok(Self::Initialized),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown step state: {}", s)),
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored status of a workflow record.
///
/// `exec_scheduled`, `executing` and `exec_failed` are never stored; they
/// are derived by [`crate::engine::projection::project_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Review in progress, or waiting for execution to be triggered.
    Running,
    /// A reviewer rejected a step; the workflow may be updated.
    Rejected,
    /// Terminal.
    Canceled,
    /// Execution has been claimed and handed to the executor.
    Finished,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Rejected => "rejected",
            Self::Canceled => "canceled",
            Self::Finished => "finished",
        }
    }
}

impl FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "rejected" => Ok(Self::Rejected),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            "finished" => Ok(Self::Finished),
            _ => Err(format!("Unknown record status: {}", s)),
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution status of a task, owned by the task executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created but not yet audited.
    Initialized,
    /// Audit finished; ready to enter a workflow.
    Audited,
    Executing,
    ExecSucceeded,
    ExecFailed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Audited => "audited",
            Self::Executing => "executing",
            Self::ExecSucceeded => "exec_succeeded",
            Self::ExecFailed => "exec_failed",
        }
    }

    /// Whether the executor has picked the task up.
    pub fn has_started(&self) -> bool {
        matches!(
            self,
            Self::Executing | Self::ExecSucceeded | Self::ExecFailed
        )
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initialized" => Ok(Self::Initialized),
            "audited" => Ok(Self::Audited),
            "executing" => Ok(Self::Executing),
            "exec_succeeded" | "exec_success" => Ok(Self::ExecSucceeded),
            "exec_failed" => Ok(Self::ExecFailed),
            _ => Err(format!("Unknown task status: {}", s)),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the SQL of a task came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSourceKind {
    /// Typed into the submission form.
    Form,
    /// Uploaded SQL file.
    SqlFile,
    /// Extracted from a MyBatis XML mapper. Never allowed in a workflow.
    MybatisXml,
}

impl TaskSourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Form => "form",
            Self::SqlFile => "sql_file",
            Self::MybatisXml => "mybatis_xml",
        }
    }

    pub fn is_raw_xml(&self) -> bool {
        matches!(self, Self::MybatisXml)
    }
}

impl FromStr for TaskSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "form" => Ok(Self::Form),
            "sql_file" => Ok(Self::SqlFile),
            "mybatis_xml" => Ok(Self::MybatisXml),
            _ => Err(format!("Unknown task source kind: {}", s)),
        }
    }
}

/// Worst audit finding on a task. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    Normal,
    Notice,
    Warn,
    Error,
}

impl AuditLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Notice => "notice",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for AuditLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "notice" => Ok(Self::Notice),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown audit level: {}", s)),
        }
    }
}

impl fmt::Display for AuditLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally visible workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    ExecScheduled,
    Executing,
    Finished,
    ExecFailed,
    Rejected,
    Canceled,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::ExecScheduled => "exec_scheduled",
            Self::Executing => "executing",
            Self::Finished => "finished",
            Self::ExecFailed => "exec_failed",
            Self::Rejected => "rejected",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event kinds published to the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEventKind {
    Created,
    StepApproved,
    Rejected,
    Updated,
    Canceled,
    Scheduled,
    Unscheduled,
    ExecutionDispatched,
}

impl WorkflowEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::StepApproved => "step_approved",
            Self::Rejected => "rejected",
            Self::Updated => "updated",
            Self::Canceled => "canceled",
            Self::Scheduled => "scheduled",
            Self::Unscheduled => "unscheduled",
            Self::ExecutionDispatched => "execution_dispatched",
        }
    }
}

impl fmt::Display for WorkflowEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
