#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;
use taskdeck::api::TaskApi;
use taskdeck::error::AppError;
use taskdeck::models::{Priority, StatusFilter, Task, TaskDraft, TaskId, TaskPatch};
use tokio::sync::oneshot;

/// In-memory stand-in for the task endpoints.
pub struct FakeTaskApi {
    pub server: Mutex<Vec<Task>>,
    next_id: AtomicI64,
    fail_mutations: Mutex<Option<String>>,
    failing_lists: AtomicUsize,
    hold: Mutex<Option<oneshot::Receiver<()>>>,
    pub list_calls: AtomicUsize,
    pub mutation_calls: AtomicUsize,
}

impl FakeTaskApi {
    pub fn new() -> Self {
        Self::with_tasks(Vec::new())
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        Self {
            server: Mutex::new(tasks),
            next_id: AtomicI64::new(42),
            fail_mutations: Mutex::new(None),
            failing_lists: AtomicUsize::new(0),
            hold: Mutex::new(None),
            list_calls: AtomicUsize::new(0),
            mutation_calls: AtomicUsize::new(0),
        }
    }

    /// Every create/update/toggle/delete fails with `detail` until cleared.
    pub fn fail_mutations(&self, detail: &str) {
        *self.fail_mutations.lock().unwrap() = Some(detail.to_string());
    }

    /// The next `n` list calls fail.
    pub fn fail_lists(&self, n: usize) {
        self.failing_lists.store(n, Ordering::SeqCst);
    }

    /// The next mutation waits until the returned sender fires.
    pub fn hold_next_mutation(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.hold.lock().unwrap() = Some(rx);
        tx
    }

    pub fn server_tasks(&self) -> Vec<Task> {
        self.server.lock().unwrap().clone()
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn mutations(&self) -> usize {
        self.mutation_calls.load(Ordering::SeqCst)
    }

    async fn begin_mutation(&self) -> Result<(), AppError> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        let hold = self.hold.lock().unwrap().take();
        if let Some(rx) = hold {
            let _ = rx.await;
        }
        match self.fail_mutations.lock().unwrap().clone() {
            Some(message) => Err(AppError::Server { status: 500, message }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TaskApi for FakeTaskApi {
    async fn list_tasks(&self, filter: StatusFilter) -> Result<Vec<Task>, AppError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_lists.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_lists.store(failing - 1, Ordering::SeqCst);
            return Err(AppError::Network("connection refused".to_string()));
        }
        Ok(self
            .server_tasks()
            .into_iter()
            .filter(|t| filter.matches(t))
            .collect())
    }

    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, AppError> {
        self.begin_mutation().await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let task = Task {
            id: TaskId::from(id),
            title: draft.title.clone(),
            description: draft.description.clone(),
            due_at: draft.due_at,
            priority: draft.priority.unwrap_or_default(),
            completed: false,
            tags: draft.tags.clone(),
            created_at: None,
            updated_at: None,
        };
        self.server.lock().unwrap().push(task.clone());
        Ok(task)
    }

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, AppError> {
        self.begin_mutation().await?;
        let mut server = self.server.lock().unwrap();
        let task = server
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| AppError::Server { status: 404, message: "Task not found".to_string() })?;
        task.apply_patch(patch);
        // Mimic server-side normalization.
        task.title = task.title.trim().to_string();
        Ok(task.clone())
    }

    async fn toggle_task(&self, id: &TaskId) -> Result<Task, AppError> {
        self.begin_mutation().await?;
        let mut server = self.server.lock().unwrap();
        let task = server
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| AppError::Server { status: 404, message: "Task not found".to_string() })?;
        task.completed = !task.completed;
        Ok(task.clone())
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), AppError> {
        self.begin_mutation().await?;
        self.server.lock().unwrap().retain(|t| &t.id != id);
        Ok(())
    }
}

pub fn task(id: i64, title: &str) -> Task {
    serde_json::from_value(json!({
        "id": id,
        "title": title,
        "completed": false,
        "priority": "medium"
    }))
    .unwrap()
}

pub fn task_with_priority(id: i64, title: &str, priority: Priority) -> Task {
    let mut t = task(id, title);
    t.priority = priority;
    t
}
