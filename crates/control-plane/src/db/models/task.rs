//! Task rows, joined with their instance's maintenance windows.

use sqlx::types::Json;
use sqlx::FromRow;

use super::parse_label;
use crate::engine::model::{MaintenancePeriod, Task};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    pub id: i64,
    pub instance_id: i64,
    pub owner_id: String,
    pub source_kind: String,
    pub status: String,
    pub audit_level: Option<String>,
    pub maintenance_periods: Option<Json<Vec<MaintenancePeriod>>>,
}

impl TryFrom<TaskRow> for Task {
    type Error = AppError;

    fn try_from(row: TaskRow) -> AppResult<Self> {
        let audit_level = row
            .audit_level
            .as_deref()
            .map(|level| parse_label("tasks.audit_level", level))
            .transpose()?;

        Ok(Task {
            id: row.id,
            instance_id: row.instance_id,
            owner_id: row.owner_id,
            source_kind: parse_label("tasks.source_kind", &row.source_kind)?,
            status: parse_label("tasks.status", &row.status)?,
            audit_level,
            maintenance_periods: row.maintenance_periods.map(|p| p.0).unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::state::{AuditLevel, TaskSourceKind, TaskStatus};
    use chrono::NaiveTime;

    #[test]
    fn test_task_row_conversion() {
        let periods: Vec<MaintenancePeriod> =
            serde_json::from_str(r#"[{"start": "22:00:00", "end": "02:00:00"}]"#).unwrap();
        let row = TaskRow {
            id: 7,
            instance_id: 3,
            owner_id: "owner".to_string(),
            source_kind: "sql_file".to_string(),
            status: "audited".to_string(),
            audit_level: Some("warn".to_string()),
            maintenance_periods: Some(Json(periods)),
        };

        let task = Task::try_from(row).unwrap();
        assert_eq!(task.source_kind, TaskSourceKind::SqlFile);
        assert_eq!(task.status, TaskStatus::Audited);
        assert_eq!(task.audit_level, Some(AuditLevel::Warn));
        assert_eq!(
            task.maintenance_periods[0].start,
            NaiveTime::from_hms_opt(22, 0, 0).unwrap()
        );
    }
}
