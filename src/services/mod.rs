pub mod auth_monitor;
pub mod task_service;
pub mod wheel;

pub use auth_monitor::AuthMonitor;
pub use task_service::TaskService;
