//! SQLGate Control Plane Library
//!
//! Approval workflow engine for SQL change requests:
//!
//! - **Workflows**: audited tasks pass through an ordered chain of review
//!   steps and a final execute step before reaching the database
//! - **Templates**: per-instance review chains managed by administrators
//! - **Scheduling**: execution at a chosen time inside maintenance windows
//! - **Dispatch**: exactly-once handoff to the SQL executor
//!
//! ## Architecture
//!
//! Each workflow is one aggregate persisted with a version column; every
//! transition is a compare-and-set on that version. Tasks, templates and
//! permissions are read through traits so the engine runs the same against
//! Postgres or the in-memory store. NATS JetStream carries workflow events
//! and execution requests when configured.
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading from environment variables
//! - [`db`]: Postgres schema, rows and trait implementations
//! - [`engine`]: Workflow model, transitions, projection and scheduler
//! - [`error`]: Error taxonomy with Axum integration
//! - [`handlers`]: HTTP route handlers
//! - [`nats`]: JetStream notifier and dispatcher
//! - [`services`]: Read views and template administration
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sqlgate_control_plane::engine::{LogNotifier, MemoryWorkflowStore, WorkflowEngine};
//!
//! let engine = WorkflowEngine::new(
//!     Arc::new(MemoryWorkflowStore::new()),
//!     tasks,
//!     templates,
//!     permissions,
//!     Arc::new(LogNotifier),
//!     executor,
//! );
//! let workflow = engine.create("alice", request).await?;
//! ```

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod nats;
pub mod result_ext;
pub mod services;
pub mod state;

pub use error::{AppError, AppResult};
pub use result_ext::ResultExt;
