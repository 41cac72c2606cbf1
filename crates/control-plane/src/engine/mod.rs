//! Workflow approval engine.
//!
//! - **Model**: templates, steps, records and the workflow aggregate
//! - **Orchestrator**: every user-facing transition, with permission checks
//! - **Projection**: derived status from record status and task status
//! - **Scheduler**: fires scheduled executions
//! - **Store**: version-checked persistence contract

pub mod memory;
pub mod model;
pub mod orchestrator;
pub mod ports;
pub mod projection;
pub mod scheduler;
pub mod state;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryWorkflowStore;
pub use model::{Task, Workflow, WorkflowRecord, WorkflowStep, WorkflowTemplate};
pub use orchestrator::{
    BatchCancelOutcome, CreateWorkflowRequest, UpdateWorkflowRequest, WorkflowEngine,
};
pub use ports::{
    DispatchRequest, LogNotifier, Notifier, PermissionOracle, TaskExecutor, TaskProvider,
    TemplateProvider, WorkflowEvent,
};
pub use projection::{project_record, project_status};
pub use scheduler::Scheduler;
pub use state::{RecordStatus, StepState, StepType, TaskStatus, WorkflowStatus};
pub use store::{WorkflowFilter, WorkflowStore};
