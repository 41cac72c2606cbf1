//! In-memory workflow store.
//!
//! Keeps aggregates in a `HashMap` behind a tokio `RwLock`. The version
//! check and the write happen under the same write guard, which gives the
//! same compare-and-set behaviour as the Postgres store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::engine::model::Workflow;
use crate::engine::store::{WorkflowFilter, WorkflowStore};
use crate::error::{AppError, AppResult};

#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
    workflows: RwLock<HashMap<Uuid, Workflow>>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.workflows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workflows.read().await.is_empty()
    }
}

fn task_bound_elsewhere(
    workflows: &HashMap<Uuid, Workflow>,
    workflow_id: Uuid,
    task_id: i64,
) -> bool {
    workflows
        .values()
        .filter(|w| w.id != workflow_id)
        .any(|w| w.all_records().any(|r| r.task_id == task_id))
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn insert(&self, workflow: &Workflow) -> AppResult<()> {
        let mut workflows = self.workflows.write().await;

        if workflows.values().any(|w| w.subject == workflow.subject) {
            return Err(AppError::Conflict(format!(
                "Workflow subject already exists: {}",
                workflow.subject
            )));
        }
        if task_bound_elsewhere(&workflows, workflow.id, workflow.task_id()) {
            return Err(AppError::Conflict(format!(
                "Task {} is already bound to a workflow",
                workflow.task_id()
            )));
        }
        if workflows.contains_key(&workflow.id) {
            return Err(AppError::Conflict(format!(
                "Workflow already exists: {}",
                workflow.id
            )));
        }

        workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Workflow>> {
        Ok(self.workflows.read().await.get(&id).cloned())
    }

    async fn save(&self, workflow: &Workflow) -> AppResult<i64> {
        let mut workflows = self.workflows.write().await;

        let stored_version = workflows
            .get(&workflow.id)
            .map(|w| w.version)
            .ok_or_else(|| AppError::NotFound(format!("Workflow not found: {}", workflow.id)))?;
        if stored_version != workflow.version {
            return Err(AppError::Conflict(format!(
                "Workflow {} was modified concurrently (expected version {}, found {})",
                workflow.id, workflow.version, stored_version
            )));
        }
        if task_bound_elsewhere(&workflows, workflow.id, workflow.task_id()) {
            return Err(AppError::Conflict(format!(
                "Task {} is already bound to a workflow",
                workflow.task_id()
            )));
        }

        let mut next = workflow.clone();
        next.version = stored_version + 1;
        let version = next.version;
        workflows.insert(next.id, next);
        Ok(version)
    }

    async fn subject_exists(&self, subject: &str) -> AppResult<bool> {
        Ok(self
            .workflows
            .read()
            .await
            .values()
            .any(|w| w.subject == subject))
    }

    async fn task_bound(&self, task_id: i64) -> AppResult<bool> {
        Ok(self
            .workflows
            .read()
            .await
            .values()
            .any(|w| w.all_records().any(|r| r.task_id == task_id)))
    }

    async fn list(&self, filter: &WorkflowFilter) -> AppResult<Vec<Workflow>> {
        let workflows = self.workflows.read().await;
        let mut matches: Vec<&Workflow> = workflows
            .values()
            .filter(|w| filter.creator.as_ref().map_or(true, |c| &w.creator == c))
            .filter(|w| filter.status.map_or(true, |s| w.record.status == s))
            .filter(|w| {
                filter.assignee.as_ref().map_or(true, |a| {
                    w.record
                        .current_step()
                        .is_some_and(|step| step.is_assignee(a))
                })
            })
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(matches
            .into_iter()
            .skip(filter.effective_offset() as usize)
            .take(filter.effective_limit() as usize)
            .cloned()
            .collect())
    }

    async fn due_for_execution(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<Uuid>> {
        let workflows = self.workflows.read().await;
        let mut due: Vec<(DateTime<Utc>, Uuid)> = workflows
            .values()
            .filter(|w| w.record.is_due(now))
            .filter_map(|w| w.record.scheduled_at.map(|at| (at, w.id)))
            .collect();
        due.sort();

        Ok(due
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(_, id)| id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::{WorkflowRecord, WorkflowStepTemplate, WorkflowTemplate};
    use crate::engine::state::{RecordStatus, StepType};

    fn template() -> WorkflowTemplate {
        WorkflowTemplate {
            id: 1,
            name: "t".to_string(),
            description: String::new(),
            allowed_audit_level: None,
            steps: vec![
                WorkflowStepTemplate {
                    number: 1,
                    step_type: StepType::Review,
                    description: String::new(),
                    assignees: vec!["u1".to_string()],
                },
                WorkflowStepTemplate {
                    number: 2,
                    step_type: StepType::Execute,
                    description: String::new(),
                    assignees: vec!["u2".to_string()],
                },
            ],
            instance_ids: vec![1],
        }
    }

    fn workflow(subject: &str, task_id: i64) -> Workflow {
        let now = Utc::now();
        Workflow::new(
            subject.to_string(),
            String::new(),
            "owner".to_string(),
            WorkflowRecord::instantiate(task_id, &template(), now),
            now,
        )
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates() {
        let store = MemoryWorkflowStore::new();
        store.insert(&workflow("S1", 1)).await.unwrap();

        assert!(matches!(
            store.insert(&workflow("S1", 2)).await,
            Err(AppError::Conflict(_))
        ));
        assert!(matches!(
            store.insert(&workflow("S2", 1)).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(store.len().await, 1);
        assert!(store.subject_exists("S1").await.unwrap());
        assert!(store.task_bound(1).await.unwrap());
        assert!(!store.task_bound(2).await.unwrap());
    }

    #[tokio::test]
    async fn test_save_is_compare_and_set() {
        let store = MemoryWorkflowStore::new();
        let original = workflow("S1", 1);
        store.insert(&original).await.unwrap();

        let mut first = store.get(original.id).await.unwrap().unwrap();
        let mut second = first.clone();

        first.record.cancel().unwrap();
        assert_eq!(store.save(&first).await.unwrap(), 1);

        second.record.status = RecordStatus::Rejected;
        assert!(matches!(
            store.save(&second).await,
            Err(AppError::Conflict(_))
        ));

        let stored = store.get(original.id).await.unwrap().unwrap();
        assert_eq!(stored.record.status, RecordStatus::Canceled);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let store = MemoryWorkflowStore::new();
        let mut older = workflow("older", 1);
        older.created_at = Utc::now() - chrono::Duration::hours(1);
        store.insert(&older).await.unwrap();
        store.insert(&workflow("newer", 2)).await.unwrap();

        let all = store.list(&WorkflowFilter::default()).await.unwrap();
        assert_eq!(all[0].subject, "newer");
        assert_eq!(all.len(), 2);

        let for_u1 = store
            .list(&WorkflowFilter {
                assignee: Some("u1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(for_u1.len(), 2);

        let for_u2 = store
            .list(&WorkflowFilter {
                assignee: Some("u2".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(for_u2.is_empty());
    }
}
