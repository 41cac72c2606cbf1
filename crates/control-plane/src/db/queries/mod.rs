//! Postgres implementations of the engine's store and collaborator traits.

pub mod dispatch;
pub mod task;
pub mod template;
pub mod user;
pub mod workflow;

pub use dispatch::PgDispatchQueue;
pub use task::PgTaskProvider;
pub use template::PgTemplateProvider;
pub use user::PgPermissionOracle;
pub use workflow::PgWorkflowStore;

use crate::error::AppError;

/// Map a unique-constraint violation to `Conflict`, anything else to `Database`.
pub(crate) fn conflict_on_unique(err: sqlx::Error, message: String) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(message),
        _ => AppError::Database(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_pass_through() {
        let err = conflict_on_unique(sqlx::Error::RowNotFound, "dup".to_string());
        assert!(matches!(err, AppError::Database(sqlx::Error::RowNotFound)));
    }
}
