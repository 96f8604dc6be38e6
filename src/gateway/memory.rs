use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use super::TaskGateway;
use crate::error::AppError;
use crate::models::{AuthResponse, Credential, LoginRequest, NewTask, RegisterRequest, Task, TaskPatch, TaskQuery, User};

/// Names of the operations counted by [`InMemoryService::calls`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Login,
    Register,
    CheckAuth,
    List,
    Get,
    Create,
    Update,
    Delete,
}

#[derive(Default)]
struct ServiceState {
    /// email -> (user, password)
    accounts: HashMap<String, (User, String)>,
    /// token -> user id
    sessions: HashMap<String, String>,
    /// Insertion order is list order.
    tasks: Vec<Task>,
    calls: HashMap<Op, usize>,
    failures: HashMap<Op, VecDeque<AppError>>,
}

/// In-process stand-in for the remote task/auth service.
///
/// Honors the same contract as the HTTP service: bearer-scoped task
/// ownership, server-assigned ids and timestamps, 401 for unknown tokens and
/// not-found for foreign or deleted tasks.
#[derive(Default)]
pub struct InMemoryService {
    state: Mutex<ServiceState>,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, name: &str, email: &str, password: &str) -> Self {
        {
            let mut state = self.state.lock();
            let user = User {
                id: Uuid::new_v4().to_string(),
                email: email.to_string(),
                name: name.to_string(),
            };
            state
                .accounts
                .insert(email.to_string(), (user, password.to_string()));
        }
        self
    }

    /// Delays every call, which keeps requests observably in flight.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Makes the next call of `op` fail with `error` without touching state.
    /// Repeated calls queue up and fire in the order they were added.
    pub fn fail_next(&self, op: Op, error: AppError) {
        self.state.lock().failures.entry(op).or_default().push_back(error);
    }

    /// Invalidates every issued token, as a server-side expiry would.
    pub fn revoke_all(&self) {
        self.state.lock().sessions.clear();
    }

    pub fn calls(&self, op: Op) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn task_count(&self) -> usize {
        self.state.lock().tasks.len()
    }

    async fn enter(&self, op: Op) -> Result<(), AppError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.state.lock();
        *state.calls.entry(op).or_default() += 1;
        match state.failures.get_mut(&op).and_then(|queue| queue.pop_front()) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn issue_token(state: &mut ServiceState, user: &User) -> Credential {
        let token = Uuid::new_v4().simple().to_string();
        state.sessions.insert(token.clone(), user.id.clone());
        Credential::new(token)
    }

    fn owner_of(state: &ServiceState, credential: Option<&Credential>) -> Result<String, AppError> {
        credential
            .and_then(|c| state.sessions.get(c.expose()))
            .cloned()
            .ok_or_else(|| AppError::Unauthorized {
                message: Some("Not authorized, token failed".to_string()),
            })
    }
}

#[async_trait]
impl TaskGateway for InMemoryService {
    async fn login(&self, req: &LoginRequest) -> Result<AuthResponse, AppError> {
        self.enter(Op::Login).await?;
        let mut state = self.state.lock();
        let user = match state.accounts.get(&req.email) {
            Some((user, password)) if *password == req.password => user.clone(),
            _ => {
                return Err(AppError::Unauthorized {
                    message: Some("Invalid email or password".to_string()),
                });
            }
        };
        let token = Self::issue_token(&mut state, &user);
        Ok(AuthResponse { token, user })
    }

    async fn register(&self, req: &RegisterRequest) -> Result<AuthResponse, AppError> {
        self.enter(Op::Register).await?;
        let mut state = self.state.lock();
        if state.accounts.contains_key(&req.email) {
            return Err(AppError::Rejected {
                status: 400,
                message: Some("User already exists".to_string()),
            });
        }
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: req.email.clone(),
            name: req.name.clone(),
        };
        state
            .accounts
            .insert(req.email.clone(), (user.clone(), req.password.clone()));
        let token = Self::issue_token(&mut state, &user);
        Ok(AuthResponse { token, user })
    }

    async fn check_auth(&self, credential: &Credential) -> Result<(), AppError> {
        self.enter(Op::CheckAuth).await?;
        let state = self.state.lock();
        Self::owner_of(&state, Some(credential)).map(|_| ())
    }

    async fn list_tasks(
        &self,
        credential: Option<&Credential>,
        query: &TaskQuery,
    ) -> Result<Vec<Task>, AppError> {
        self.enter(Op::List).await?;
        let state = self.state.lock();
        let owner = Self::owner_of(&state, credential)?;
        Ok(state
            .tasks
            .iter()
            .filter(|t| t.owner == owner && t.matches(query))
            .cloned()
            .collect())
    }

    async fn get_task(&self, credential: Option<&Credential>, id: &str) -> Result<Task, AppError> {
        self.enter(Op::Get).await?;
        let state = self.state.lock();
        let owner = Self::owner_of(&state, credential)?;
        state
            .tasks
            .iter()
            .find(|t| t.id == id && t.owner == owner)
            .cloned()
            .ok_or(AppError::NotFound)
    }

    async fn create_task(&self, credential: Option<&Credential>, task: &NewTask) -> Result<Task, AppError> {
        self.enter(Op::Create).await?;
        let mut state = self.state.lock();
        let owner = Self::owner_of(&state, credential)?;
        if task.title.trim().is_empty() {
            return Err(AppError::Rejected {
                status: 400,
                message: Some("Title is required".to_string()),
            });
        }
        let now = Utc::now();
        let created = Task {
            id: Uuid::new_v4().to_string(),
            owner,
            title: task.title.clone(),
            description: task.description.clone(),
            status: task.status.unwrap_or_default(),
            priority: task.priority.unwrap_or_default(),
            category: task.category.unwrap_or_default(),
            is_collaborative: task.is_collaborative.unwrap_or(false),
            collaborators: task.collaborators.clone().unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        state.tasks.push(created.clone());
        Ok(created)
    }

    async fn update_task(
        &self,
        credential: Option<&Credential>,
        id: &str,
        patch: &TaskPatch,
    ) -> Result<Task, AppError> {
        self.enter(Op::Update).await?;
        let mut state = self.state.lock();
        let owner = Self::owner_of(&state, credential)?;
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id && t.owner == owner)
            .ok_or(AppError::NotFound)?;
        task.apply_patch(patch);
        task.updated_at = Utc::now().max(task.updated_at);
        Ok(task.clone())
    }

    async fn delete_task(&self, credential: Option<&Credential>, id: &str) -> Result<(), AppError> {
        self.enter(Op::Delete).await?;
        let mut state = self.state.lock();
        let owner = Self::owner_of(&state, credential)?;
        let before = state.tasks.len();
        state.tasks.retain(|t| !(t.id == id && t.owner == owner));
        if state.tasks.len() == before {
            return Err(AppError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, TaskStatus};

    async fn logged_in() -> (InMemoryService, Credential) {
        let service = InMemoryService::new().with_account("Ann", "a@b.com", "secret1");
        let resp = service
            .login(&LoginRequest {
                email: "a@b.com".to_string(),
                password: "secret1".to_string(),
            })
            .await
            .expect("login");
        (service, resp.token)
    }

    #[tokio::test]
    async fn test_login_rejects_wrong_password() {
        let service = InMemoryService::new().with_account("Ann", "a@b.com", "secret1");
        let err = service
            .login(&LoginRequest {
                email: "a@b.com".to_string(),
                password: "nope".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.service_message(), Some("Invalid email or password"));
    }

    #[tokio::test]
    async fn test_tasks_require_credential() {
        let service = InMemoryService::new();
        let err = service.list_tasks(None, &TaskQuery::all()).await.unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[tokio::test]
    async fn test_crud_and_filter() {
        let (service, token) = logged_in().await;
        let created = service
            .create_task(
                Some(&token),
                &NewTask::new("Read")
                    .with_category(Category::Nature)
                    .with_status(TaskStatus::Todo),
            )
            .await
            .unwrap();
        assert_eq!(created.created_at, created.updated_at);

        let query = TaskQuery {
            status: Some(TaskStatus::Todo),
            category: None,
        };
        assert_eq!(service.list_tasks(Some(&token), &query).await.unwrap().len(), 1);

        let updated = service
            .update_task(Some(&token), &created.id, &TaskPatch::status(TaskStatus::Completed))
            .await
            .unwrap();
        assert!(updated.updated_at >= updated.created_at);
        assert!(service.list_tasks(Some(&token), &query).await.unwrap().is_empty());

        service.delete_task(Some(&token), &created.id).await.unwrap();
        assert!(matches!(
            service.get_task(Some(&token), &created.id).await,
            Err(AppError::NotFound)
        ));
        assert!(matches!(
            service.delete_task(Some(&token), &created.id).await,
            Err(AppError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_revoked_tokens_fail_health_check() {
        let (service, token) = logged_in().await;
        assert!(service.check_auth(&token).await.is_ok());
        service.revoke_all();
        assert!(service.check_auth(&token).await.unwrap_err().is_auth_failure());
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let (service, token) = logged_in().await;
        service.fail_next(Op::List, AppError::Network("reset".to_string()));
        assert!(service.list_tasks(Some(&token), &TaskQuery::all()).await.is_err());
        assert!(service.list_tasks(Some(&token), &TaskQuery::all()).await.is_ok());
        assert_eq!(service.calls(Op::List), 2);
    }

    #[tokio::test]
    async fn test_queued_failures_fire_in_order() {
        let (service, token) = logged_in().await;
        service.fail_next(Op::List, AppError::Network("reset".to_string()));
        service.fail_next(Op::List, AppError::Timeout(Duration::from_secs(1)));

        let first = service.list_tasks(Some(&token), &TaskQuery::all()).await.unwrap_err();
        assert!(matches!(first, AppError::Network(_)), "unexpected error: {first:?}");
        let second = service.list_tasks(Some(&token), &TaskQuery::all()).await.unwrap_err();
        assert!(matches!(second, AppError::Timeout(_)), "unexpected error: {second:?}");
        assert!(service.list_tasks(Some(&token), &TaskQuery::all()).await.is_ok());
    }
}
