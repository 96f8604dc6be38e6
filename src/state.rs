use std::sync::Arc;

use tracing::info;

use crate::cache::TaskCache;
use crate::config::ClientConfig;
use crate::dashboard::Dashboard;
use crate::db::{CredentialStore, MemoryCredentialStore, SqliteCredentialStore};
use crate::error::AppError;
use crate::gateway::{HttpGateway, InMemoryService, TaskGateway};
use crate::guard::Navigator;
use crate::services::{AuthMonitor, TaskService};
use crate::session::SessionStore;

/// Everything the views need, owned in one place and passed down explicitly.
#[derive(Clone)]
pub struct AppContext {
    pub config: ClientConfig,
    pub session: SessionStore,
    pub tasks: TaskService,
}

impl AppContext {
    pub fn new(config: ClientConfig, gateway: Arc<dyn TaskGateway>, store: Arc<dyn CredentialStore>) -> Self {
        let session = SessionStore::new(gateway.clone(), store);
        let cache = TaskCache::new(config.fetch_timeout());
        let tasks = TaskService::new(gateway, cache, session.clone());
        Self {
            config,
            session,
            tasks,
        }
    }

    /// Talks to the remote service and keeps the credential in SQLite.
    pub async fn connect(config: ClientConfig) -> Result<Self, AppError> {
        let gateway = Arc::new(HttpGateway::new(config.clone())?);
        let store = Arc::new(SqliteCredentialStore::open(&config.database_url).await?);
        info!("using task service at {}", config.api_base_url);
        Ok(Self::new(config, gateway, store))
    }

    /// Runs against an in-process service with nothing persisted.
    pub fn offline(config: ClientConfig, service: Arc<InMemoryService>) -> Self {
        info!("running against the in-memory task service");
        Self::new(config, service, Arc::new(MemoryCredentialStore::new()))
    }

    pub fn navigator(&self) -> Navigator {
        Navigator::new(self.session.subscribe())
    }

    pub fn dashboard(&self) -> Dashboard {
        Dashboard::new(self.tasks.clone())
    }

    pub fn auth_monitor(&self) -> AuthMonitor {
        AuthMonitor::new(self.session.clone(), self.config.auth_check_interval)
    }
}
