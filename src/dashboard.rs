//! The dashboard view's controller: filter, displayed list and task details.
//!
//! Loads are issued as [`LoadTicket`]s carrying the generation they were
//! issued in. A ticket's result is applied only while that generation is
//! still current, so a slow response for an old filter (or for a view the
//! user has left) never overwrites what is on screen.

use std::sync::Arc;

use tracing::debug;

use crate::cache::Read;
use crate::error::AppError;
use crate::filter::FilterState;
use crate::models::{Category, NewTask, Task, TaskPatch, TaskQuery, TaskStatus};
use crate::services::TaskService;

#[derive(Debug, Clone, Default)]
pub struct TaskListView {
    pub query: TaskQuery,
    /// Last data received for `query`; may be stale while `loading`.
    pub tasks: Option<Arc<Vec<Task>>>,
    pub loading: bool,
    pub error: Option<String>,
}

pub struct LoadTicket {
    generation: u64,
    tasks: TaskService,
    read: Read<Vec<Task>>,
}

impl LoadTicket {
    pub fn is_pending(&self) -> bool {
        self.read.is_pending()
    }

    pub async fn resolve(self) -> LoadOutcome {
        LoadOutcome {
            generation: self.generation,
            result: self.tasks.resolve(self.read).await,
        }
    }
}

pub struct LoadOutcome {
    generation: u64,
    result: Result<Arc<Vec<Task>>, AppError>,
}

#[derive(Debug, Clone)]
pub enum DetailOutcome {
    Loaded(Arc<Task>),
    NotFound,
    Failed(String),
}

pub struct Dashboard {
    tasks: TaskService,
    filter: FilterState,
    generation: u64,
    view: TaskListView,
}

impl Dashboard {
    pub fn new(tasks: TaskService) -> Self {
        let filter = FilterState::default();
        Self {
            tasks,
            view: TaskListView {
                query: filter.query(),
                ..Default::default()
            },
            filter,
            generation: 0,
        }
    }

    pub fn view(&self) -> &TaskListView {
        &self.view
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    /// Changes the filter without loading; call [`load`](Self::load) after.
    pub fn filter_mut(&mut self) -> &mut FilterState {
        &mut self.filter
    }

    pub fn set_status(&mut self, status: Option<TaskStatus>) -> LoadTicket {
        self.filter.set_status(status);
        self.load()
    }

    pub fn set_category(&mut self, category: Option<Category>) -> LoadTicket {
        self.filter.set_category(category);
        self.load()
    }

    /// Starts loading the list for the current filter. Cached data is
    /// applied immediately; otherwise the view shows `loading` (with any
    /// stale data) until the ticket's outcome is applied.
    pub fn load(&mut self) -> LoadTicket {
        self.issue(false)
    }

    /// Like [`load`](Self::load) but always asks the service.
    pub fn reload(&mut self) -> LoadTicket {
        self.issue(true)
    }

    /// Applies a load outcome. Returns `false` if the outcome was superseded
    /// and discarded.
    pub fn apply(&mut self, outcome: LoadOutcome) -> bool {
        if outcome.generation != self.generation {
            debug!(
                generation = outcome.generation,
                current = self.generation,
                "discarding superseded list load"
            );
            return false;
        }
        self.view.loading = false;
        match outcome.result {
            Ok(tasks) => {
                self.view.tasks = Some(tasks);
                self.view.error = None;
            }
            Err(e) => self.view.error = Some(e.user_message("Failed to load tasks")),
        }
        true
    }

    /// Loads the current filter and applies the result.
    pub async fn refresh(&mut self) -> bool {
        let ticket = self.load();
        let outcome = ticket.resolve().await;
        self.apply(outcome)
    }

    /// Leaving the view: results of loads still in flight are discarded.
    pub fn leave(&mut self) {
        self.generation += 1;
        self.view.loading = false;
    }

    pub async fn create(&mut self, task: NewTask) -> Option<Task> {
        let result = self.tasks.create_task(task).await;
        self.after_mutation(result, "Failed to create task").await
    }

    pub async fn update(&mut self, id: &str, patch: TaskPatch) -> Option<Task> {
        let result = self.tasks.update_task(id, patch).await;
        self.after_mutation(result, "Failed to update task").await
    }

    pub async fn set_task_status(&mut self, id: &str, status: TaskStatus) -> Option<Task> {
        self.update(id, TaskPatch::status(status)).await
    }

    pub async fn delete(&mut self, id: &str) -> bool {
        let result = self.tasks.delete_task(id).await;
        self.after_mutation(result, "Failed to delete task").await.is_some()
    }

    pub async fn details(&self, id: &str) -> DetailOutcome {
        match self.tasks.get_task(id).await {
            Ok(task) => DetailOutcome::Loaded(task),
            Err(AppError::NotFound) => DetailOutcome::NotFound,
            Err(e) => DetailOutcome::Failed(e.user_message("Failed to load task")),
        }
    }

    fn issue(&mut self, force: bool) -> LoadTicket {
        self.generation += 1;
        let query = self.filter.query();
        let read = if force {
            self.tasks.refresh(query)
        } else {
            self.tasks.list(query)
        };

        if self.view.query != query {
            self.view.tasks = None;
        }
        self.view.query = query;
        match &read {
            Read::Ready(tasks) => {
                self.view.tasks = Some(Arc::clone(tasks));
                self.view.loading = false;
                self.view.error = None;
            }
            Read::Pending(pending) => {
                if pending.previous.is_some() {
                    self.view.tasks = pending.previous.clone();
                }
                self.view.loading = true;
            }
        }

        LoadTicket {
            generation: self.generation,
            tasks: self.tasks.clone(),
            read,
        }
    }

    async fn after_mutation<T>(&mut self, result: Result<T, AppError>, fallback: &str) -> Option<T> {
        match result {
            Ok(value) => {
                self.view.error = None;
                self.refresh().await;
                Some(value)
            }
            Err(e) => {
                self.view.error = Some(e.user_message(fallback));
                None
            }
        }
    }
}
