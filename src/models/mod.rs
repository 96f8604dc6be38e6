pub mod task;
pub mod user;

pub use task::{Category, Collaborator, NewTask, Priority, Task, TaskId, TaskPatch, TaskQuery, TaskStatus};
pub use user::{AuthResponse, Credential, LoginRequest, RegisterRequest, User};
