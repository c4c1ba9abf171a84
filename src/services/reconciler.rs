use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::api::TaskApi;
use crate::error::AppError;
use crate::models::{StatusFilter, Task, TaskDraft, TaskId, TaskPatch};

/// Keeps the local task list in step with the server under optimistic updates.
///
/// Every mutation changes the local list first, then asks the server. A
/// confirmed response replaces the local copy; a failure restores the
/// snapshot taken before the change (or re-fetches, for deletes).
///
/// The list lock is never held across a network call, so mutations on
/// different tasks interleave freely. Two mutations on the same task are not
/// serialized: whichever response lands last wins.
pub struct TaskReconciler {
    api: Arc<dyn TaskApi>,
    tasks: Mutex<Vec<Task>>,
}

impl TaskReconciler {
    pub fn new(api: Arc<dyn TaskApi>) -> Self {
        Self {
            api,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the local list with everything the server has.
    pub async fn load(&self) -> Result<usize, AppError> {
        let fetched = self.api.list_tasks(StatusFilter::All).await?;
        let count = fetched.len();
        *self.tasks.lock().await = fetched;
        info!("Loaded {} tasks", count);
        Ok(count)
    }

    pub async fn tasks(&self) -> Vec<Task> {
        self.tasks.lock().await.clone()
    }

    pub async fn filtered(&self, filter: StatusFilter) -> Vec<Task> {
        self.tasks
            .lock()
            .await
            .iter()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect()
    }

    pub async fn get(&self, id: &TaskId) -> Option<Task> {
        self.tasks.lock().await.iter().find(|t| &t.id == id).cloned()
    }

    /// Creates a task. Nothing is inserted until the server returns an id.
    pub async fn create(&self, draft: TaskDraft) -> Result<Task, AppError> {
        draft.validate()?;

        let created = self.api.create_task(&draft).await?;
        self.tasks.lock().await.push(created.clone());
        info!("Created task {}", created.id);
        Ok(created)
    }

    pub async fn update(&self, id: &TaskId, patch: TaskPatch) -> Result<Task, AppError> {
        patch.validate()?;

        let snapshot = {
            let mut tasks = self.tasks.lock().await;
            let task = find_mut(&mut tasks, id)?;
            let snapshot = task.clone();
            task.apply_patch(&patch);
            snapshot
        };

        match self.api.update_task(id, &patch).await {
            Ok(updated) => {
                self.replace(id, updated.clone()).await;
                Ok(updated)
            }
            Err(e) => {
                warn!("Failed to update task {}, restoring previous state: {}", id, e);
                self.replace(id, snapshot).await;
                Err(e)
            }
        }
    }

    pub async fn toggle_completion(&self, id: &TaskId) -> Result<Task, AppError> {
        let previous = {
            let mut tasks = self.tasks.lock().await;
            let task = find_mut(&mut tasks, id)?;
            let previous = task.completed;
            task.completed = !previous;
            previous
        };

        match self.api.toggle_task(id).await {
            Ok(toggled) => {
                self.replace(id, toggled.clone()).await;
                Ok(toggled)
            }
            Err(e) => {
                warn!("Failed to toggle task {}, restoring completed={}: {}", id, previous, e);
                let mut tasks = self.tasks.lock().await;
                if let Some(task) = tasks.iter_mut().find(|t| &t.id == id) {
                    task.completed = previous;
                }
                Err(e)
            }
        }
    }

    /// Removes a task. On failure the evicted task is not put back by hand;
    /// the whole list is re-fetched instead.
    pub async fn delete(&self, id: &TaskId) -> Result<(), AppError> {
        {
            let mut tasks = self.tasks.lock().await;
            let before = tasks.len();
            tasks.retain(|t| &t.id != id);
            if tasks.len() == before {
                return Err(AppError::NotFound(format!("task {}", id)));
            }
        }

        match self.api.delete_task(id).await {
            Ok(()) => {
                info!("Deleted task {}", id);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to delete task {}, re-fetching: {}", id, e);
                if let Err(refetch) = self.load().await {
                    warn!("Re-fetch after failed delete also failed: {}", refetch);
                }
                Err(e)
            }
        }
    }

    /// Swaps in `task` at the position of `id`, if it is still in the list.
    async fn replace(&self, id: &TaskId, task: Task) {
        let mut tasks = self.tasks.lock().await;
        if let Some(slot) = tasks.iter_mut().find(|t| &t.id == id) {
            *slot = task;
        }
    }
}

fn find_mut<'a>(tasks: &'a mut [Task], id: &TaskId) -> Result<&'a mut Task, AppError> {
    tasks
        .iter_mut()
        .find(|t| &t.id == id)
        .ok_or_else(|| AppError::NotFound(format!("task {}", id)))
}
