//! Service layer for the SQLGate control plane.
//!
//! Services sit between the HTTP handlers and the engine: they shape
//! read views and guard the admin-only template operations.

pub mod template;
pub mod workflow;

pub use template::{TemplateRequest, TemplateService};
pub use workflow::{WorkflowDetail, WorkflowService, WorkflowSummary};
