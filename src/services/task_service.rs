use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::{Read, TaskCache};
use crate::error::AppError;
use crate::gateway::TaskGateway;
use crate::models::{NewTask, Task, TaskPatch, TaskQuery};
use crate::session::SessionStore;

/// Task operations for the signed-in user: reads go through the cache,
/// mutations go to the service and then invalidate the cache.
#[derive(Clone)]
pub struct TaskService {
    gateway: Arc<dyn TaskGateway>,
    cache: TaskCache,
    session: SessionStore,
}

impl TaskService {
    pub fn new(gateway: Arc<dyn TaskGateway>, cache: TaskCache, session: SessionStore) -> Self {
        Self {
            gateway,
            cache,
            session,
        }
    }

    pub fn cache(&self) -> &TaskCache {
        &self.cache
    }

    /// Non-blocking read: served from cache when populated, otherwise a
    /// pending fetch (shared with any other reader of the same filter).
    pub fn list(&self, query: TaskQuery) -> Read<Vec<Task>> {
        self.scope_cache();
        let gateway = Arc::clone(&self.gateway);
        let credential = self.session.credential();
        self.cache.read_list(query, move || async move {
            gateway.list_tasks(credential.as_ref(), &query).await
        })
    }

    /// Refetches the list for `query` regardless of its cache state.
    pub fn refresh(&self, query: TaskQuery) -> Read<Vec<Task>> {
        self.scope_cache();
        let gateway = Arc::clone(&self.gateway);
        let credential = self.session.credential();
        self.cache.refresh_list(query, move || async move {
            gateway.list_tasks(credential.as_ref(), &query).await
        })
    }

    pub fn task(&self, id: &str) -> Read<Task> {
        self.scope_cache();
        let gateway = Arc::clone(&self.gateway);
        let credential = self.session.credential();
        let task_id = id.to_string();
        self.cache.read_task(id, move || async move {
            gateway.get_task(credential.as_ref(), &task_id).await
        })
    }

    pub async fn list_tasks(&self, query: TaskQuery) -> Result<Arc<Vec<Task>>, AppError> {
        let read = self.list(query);
        self.resolve(read).await
    }

    pub async fn get_task(&self, id: &str) -> Result<Arc<Task>, AppError> {
        let read = self.task(id);
        self.resolve(read).await
    }

    /// Awaits a read, re-checking the session if the service refused the
    /// credential.
    pub async fn resolve<V>(&self, read: Read<V>) -> Result<Arc<V>, AppError> {
        let result = read.resolve().await;
        self.observe(result).await
    }

    /// Creates a task. Never re-sent automatically; on a transport failure
    /// the caller decides whether to try again.
    pub async fn create_task(&self, task: NewTask) -> Result<Task, AppError> {
        task.validate()?;
        self.scope_cache();
        let credential = self.session.credential();
        let result = self.gateway.create_task(credential.as_ref(), &task).await;
        match &result {
            Ok(created) => {
                self.cache.invalidate_after_mutation(&created.id);
                info!(id = %created.id, "task created");
            }
            Err(e) if e.is_transient() => {
                // The service may have applied it anyway.
                self.cache.invalidate_lists();
            }
            Err(_) => {}
        }
        self.observe(result).await
    }

    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task, AppError> {
        patch.validate()?;
        self.scope_cache();
        let credential = self.session.credential();
        let result = self.gateway.update_task(credential.as_ref(), id, &patch).await;
        self.settle_mutation(id, &result);
        if result.is_ok() {
            info!(id, "task updated");
        }
        self.observe(result).await
    }

    pub async fn delete_task(&self, id: &str) -> Result<(), AppError> {
        self.scope_cache();
        let credential = self.session.credential();
        let result = self.gateway.delete_task(credential.as_ref(), id).await;
        self.settle_mutation(id, &result);
        if result.is_ok() {
            info!(id, "task deleted");
        }
        self.observe(result).await
    }

    /// Invalidates for a mutation whose outcome is known or unknowable.
    /// Not-found also invalidates, since the cached task is evidently gone.
    fn settle_mutation<T>(&self, id: &str, result: &Result<T, AppError>) {
        match result {
            Ok(_) | Err(AppError::NotFound) => self.cache.invalidate_after_mutation(id),
            Err(e) if e.is_transient() => self.cache.invalidate_after_mutation(id),
            Err(_) => {}
        }
    }

    fn scope_cache(&self) {
        let user = self.session.snapshot().user.map(|u| u.id);
        self.cache.scope_to(user.as_deref());
    }

    async fn observe<T>(&self, result: Result<T, AppError>) -> Result<T, AppError> {
        if let Err(e) = &result {
            if e.is_auth_failure() {
                warn!("service refused the credential, re-checking session");
                self.session.check_auth().await;
            }
        }
        result
    }
}
