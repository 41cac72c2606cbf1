//! HTTP handlers for the SQLGate control plane API.
//!
//! Handlers are thin: they extract the caller and request body, call a
//! service and let `AppError` pick the status code.

pub mod caller;
pub mod health;
pub mod templates;
pub mod workflows;

pub use caller::{Caller, CALLER_HEADER};
pub use health::{api_health, health_check};
