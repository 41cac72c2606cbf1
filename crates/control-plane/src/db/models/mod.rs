//! Row types for the SQLGate tables.
//!
//! Each row converts into its engine model with `TryFrom`; a column holding
//! an unknown enum label fails the conversion with `AppError::Internal`.

pub mod task;
pub mod template;
pub mod workflow;

pub use task::TaskRow;
pub use template::TemplateRow;
pub use workflow::{RecordRow, StepRow, WorkflowRow};

use crate::error::AppError;

/// Parse a stored enum label, naming the column on failure.
pub(crate) fn parse_label<T: std::str::FromStr<Err = String>>(
    column: &str,
    value: &str,
) -> Result<T, AppError> {
    value
        .parse()
        .map_err(|e: String| AppError::Internal(format!("Bad value in {}: {}", column, e)))
}
