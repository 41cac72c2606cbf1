//! In-memory collaborators for engine tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::engine::memory::MemoryWorkflowStore;
use crate::engine::model::{Task, Workflow, WorkflowStepTemplate, WorkflowTemplate};
use crate::engine::orchestrator::{CreateWorkflowRequest, WorkflowEngine};
use crate::engine::ports::{
    DispatchRequest, Notifier, PermissionOracle, TaskExecutor, TaskProvider, TemplateProvider,
    WorkflowEvent,
};
use crate::engine::state::{AuditLevel, StepType, TaskSourceKind, TaskStatus};
use crate::engine::store::{WorkflowFilter, WorkflowStore};
use crate::error::{AppError, AppResult};

/// Instance bound to `[review {u1}, execute {u2}]`.
pub const INSTANCE_TWO_STEP: i64 = 1;

/// Instance bound to `[review {u1}, review {u2,u3}, execute {u4}]`,
/// admitting audit levels up to `warn`.
pub const INSTANCE_THREE_STEP: i64 = 2;

/// Memory store that yields after every `get`, so futures joined on the
/// same workflow all load the same version before any of them saves.
#[derive(Default)]
pub struct YieldingStore {
    inner: MemoryWorkflowStore,
    conflicts: AtomicUsize,
}

impl YieldingStore {
    pub async fn len(&self) -> usize {
        self.inner.len().await
    }

    /// Saves rejected by the version check.
    pub fn conflicts(&self) -> usize {
        self.conflicts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkflowStore for YieldingStore {
    async fn insert(&self, workflow: &Workflow) -> AppResult<()> {
        self.inner.insert(workflow).await
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Workflow>> {
        let workflow = self.inner.get(id).await;
        tokio::task::yield_now().await;
        workflow
    }

    async fn save(&self, workflow: &Workflow) -> AppResult<i64> {
        let result = self.inner.save(workflow).await;
        if matches!(result, Err(AppError::Conflict(_))) {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    async fn subject_exists(&self, subject: &str) -> AppResult<bool> {
        self.inner.subject_exists(subject).await
    }

    async fn task_bound(&self, task_id: i64) -> AppResult<bool> {
        self.inner.task_bound(task_id).await
    }

    async fn list(&self, filter: &WorkflowFilter) -> AppResult<Vec<Workflow>> {
        self.inner.list(filter).await
    }

    async fn due_for_execution(&self, now: DateTime<Utc>, limit: i64) -> AppResult<Vec<Uuid>> {
        self.inner.due_for_execution(now, limit).await
    }
}

#[derive(Default)]
pub struct FakeTasks {
    tasks: Mutex<HashMap<i64, Task>>,
}

impl FakeTasks {
    pub fn insert(&self, task: Task) {
        self.tasks.lock().unwrap().insert(task.id, task);
    }

    pub fn set_status(&self, task_id: i64, status: TaskStatus) {
        if let Some(task) = self.tasks.lock().unwrap().get_mut(&task_id) {
            task.status = status;
        }
    }
}

#[async_trait]
impl TaskProvider for FakeTasks {
    async fn get_task(&self, task_id: i64) -> AppResult<Option<Task>> {
        Ok(self.tasks.lock().unwrap().get(&task_id).cloned())
    }
}

#[derive(Default)]
pub struct FakeTemplates {
    by_instance: Mutex<HashMap<i64, WorkflowTemplate>>,
}

impl FakeTemplates {
    pub fn bind(&self, instance_id: i64, template: WorkflowTemplate) {
        self.by_instance
            .lock()
            .unwrap()
            .insert(instance_id, template);
    }

    pub fn replace_assignees(&self, instance_id: i64, step_index: usize, assignees: &[&str]) {
        if let Some(template) = self.by_instance.lock().unwrap().get_mut(&instance_id) {
            template.steps[step_index].assignees =
                assignees.iter().map(|a| a.to_string()).collect();
        }
    }
}

#[async_trait]
impl TemplateProvider for FakeTemplates {
    async fn template_for_instance(
        &self,
        instance_id: i64,
    ) -> AppResult<Option<WorkflowTemplate>> {
        Ok(self.by_instance.lock().unwrap().get(&instance_id).cloned())
    }
}

pub struct StaticPermissions {
    admins: Vec<String>,
}

#[async_trait]
impl PermissionOracle for StaticPermissions {
    async fn is_admin(&self, user: &str) -> AppResult<bool> {
        Ok(self.admins.iter().any(|a| a == user))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<WorkflowEvent>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &WorkflowEvent) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::ExternalService("mail relay down".to_string()));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingExecutor {
    requests: Mutex<Vec<DispatchRequest>>,
    failing: AtomicBool,
}

impl RecordingExecutor {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<DispatchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskExecutor for RecordingExecutor {
    async fn dispatch(&self, request: &DispatchRequest) -> AppResult<()> {
        // Count attempts even when failing; the claim already happened.
        self.requests.lock().unwrap().push(request.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::ExternalService("executor unavailable".to_string()));
        }
        Ok(())
    }
}

fn step(number: i32, step_type: StepType, assignees: &[&str]) -> WorkflowStepTemplate {
    WorkflowStepTemplate {
        number,
        step_type,
        description: String::new(),
        assignees: assignees.iter().map(|a| a.to_string()).collect(),
    }
}

pub fn two_step_template() -> WorkflowTemplate {
    WorkflowTemplate {
        id: 1,
        name: "two-step".to_string(),
        description: String::new(),
        allowed_audit_level: None,
        steps: vec![
            step(1, StepType::Review, &["u1"]),
            step(2, StepType::Execute, &["u2"]),
        ],
        instance_ids: vec![INSTANCE_TWO_STEP],
    }
}

pub fn three_step_template() -> WorkflowTemplate {
    WorkflowTemplate {
        id: 2,
        name: "three-step".to_string(),
        description: String::new(),
        allowed_audit_level: Some(AuditLevel::Warn),
        steps: vec![
            step(1, StepType::Review, &["u1"]),
            step(2, StepType::Review, &["u2", "u3"]),
            step(3, StepType::Execute, &["u4"]),
        ],
        instance_ids: vec![INSTANCE_THREE_STEP],
    }
}

/// Engine wired to in-memory fakes, with handles to inspect them.
pub struct Harness {
    pub engine: Arc<WorkflowEngine>,
    pub store: Arc<YieldingStore>,
    pub tasks: Arc<FakeTasks>,
    pub templates: Arc<FakeTemplates>,
    pub notifier: Arc<RecordingNotifier>,
    pub executor: Arc<RecordingExecutor>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(YieldingStore::default());
        let tasks = Arc::new(FakeTasks::default());
        let templates = Arc::new(FakeTemplates::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let executor = Arc::new(RecordingExecutor::default());
        let permissions = Arc::new(StaticPermissions {
            admins: vec!["admin".to_string()],
        });

        templates.bind(INSTANCE_TWO_STEP, two_step_template());
        templates.bind(INSTANCE_THREE_STEP, three_step_template());

        let engine = Arc::new(WorkflowEngine::new(
            store.clone(),
            tasks.clone(),
            templates.clone(),
            permissions,
            notifier.clone(),
            executor.clone(),
        ));

        Self {
            engine,
            store,
            tasks,
            templates,
            notifier,
            executor,
        }
    }

    /// An audited form task with no findings and no maintenance windows.
    pub fn task(&self, id: i64, instance_id: i64, owner: &str) -> Task {
        Task {
            id,
            instance_id,
            owner_id: owner.to_string(),
            source_kind: TaskSourceKind::Form,
            status: TaskStatus::Audited,
            audit_level: Some(AuditLevel::Notice),
            maintenance_periods: Vec::new(),
        }
    }

    pub fn add_task(&self, id: i64, instance_id: i64, owner: &str) {
        self.tasks.insert(self.task(id, instance_id, owner));
    }

    pub fn create_request(&self, subject: &str, task_id: i64) -> CreateWorkflowRequest {
        CreateWorkflowRequest {
            subject: subject.to_string(),
            description: String::new(),
            task_id,
        }
    }
}
