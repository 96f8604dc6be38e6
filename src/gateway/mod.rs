pub mod dto;
pub mod http;
pub mod memory;

use async_trait::async_trait;

use crate::error::AppError;
use crate::models::{AuthResponse, Credential, LoginRequest, NewTask, RegisterRequest, Task, TaskPatch, TaskQuery};

pub use http::HttpGateway;
pub use memory::InMemoryService;

/// Typed boundary to the remote auth/task service.
///
/// Every call is one request/response round trip. `credential`, when
/// present, is sent as `Authorization: Bearer <token>`. Implementations may
/// retry reads, updates and deletes on transport failure, but never
/// `create_task`: a failed create is reported and retrying is the caller's
/// decision.
#[async_trait]
pub trait TaskGateway: Send + Sync {
    async fn login(&self, req: &LoginRequest) -> Result<AuthResponse, AppError>;
    async fn register(&self, req: &RegisterRequest) -> Result<AuthResponse, AppError>;
    async fn check_auth(&self, credential: &Credential) -> Result<(), AppError>;

    async fn list_tasks(
        &self,
        credential: Option<&Credential>,
        query: &TaskQuery,
    ) -> Result<Vec<Task>, AppError>;
    async fn get_task(&self, credential: Option<&Credential>, id: &str) -> Result<Task, AppError>;
    async fn create_task(&self, credential: Option<&Credential>, task: &NewTask) -> Result<Task, AppError>;
    async fn update_task(
        &self,
        credential: Option<&Credential>,
        id: &str,
        patch: &TaskPatch,
    ) -> Result<Task, AppError>;
    async fn delete_task(&self, credential: Option<&Credential>, id: &str) -> Result<(), AppError>;
}
