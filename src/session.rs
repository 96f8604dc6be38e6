//! Authentication state and the bearer credential's lifetime.
//!
//! Every operation settles into a [`SessionSnapshot`]; failures are recorded
//! as `error` strings and never escape. Snapshots are published on a watch
//! channel so the route guard can re-evaluate whenever the session changes.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::db::{CredentialStore, StoredCredential};
use crate::error::AppError;
use crate::gateway::TaskGateway;
use crate::models::{AuthResponse, Credential, LoginRequest, RegisterRequest, User};

const SESSION_EXPIRED: &str = "Your session has expired, please sign in again";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub is_authenticated: bool,
    pub user: Option<User>,
    pub error: Option<String>,
}

#[derive(Default)]
struct SessionData {
    stored: Option<StoredCredential>,
    /// Bumped by login, register and logout so a health probe issued
    /// against an older credential cannot overwrite newer state.
    epoch: u64,
}

struct SessionInner {
    gateway: Arc<dyn TaskGateway>,
    store: Arc<dyn CredentialStore>,
    data: Mutex<SessionData>,
    state: watch::Sender<SessionSnapshot>,
}

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

impl SessionStore {
    pub fn new(gateway: Arc<dyn TaskGateway>, store: Arc<dyn CredentialStore>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Self {
            inner: Arc::new(SessionInner {
                gateway,
                store,
                data: Mutex::new(SessionData::default()),
                state,
            }),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    /// The credential to attach to outgoing requests, if one is held.
    pub fn credential(&self) -> Option<Credential> {
        self.inner
            .data
            .lock()
            .stored
            .as_ref()
            .map(|s| s.credential.clone())
    }

    /// Loads the persisted credential (if any) and confirms it with the
    /// service.
    pub async fn restore(&self) -> SessionSnapshot {
        match self.inner.store.load().await {
            Ok(Some(stored)) => {
                info!("restored persisted credential for {}", stored.user.email);
                let mut data = self.inner.data.lock();
                data.stored = Some(stored);
                data.epoch += 1;
            }
            Ok(None) => {}
            Err(e) => warn!("failed to load persisted credential: {}", e),
        }
        self.check_auth().await;
        self.snapshot()
    }

    pub async fn login(&self, email: &str, password: &str) -> bool {
        self.clear_error();
        let req = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let result = self.inner.gateway.login(&req).await;
        self.settle_auth(result, "Login failed").await
    }

    /// Registers a new account. Mismatched passwords fail before any
    /// request is made.
    pub async fn register(&self, name: &str, email: &str, password: &str, confirm_password: &str) -> bool {
        self.clear_error();
        if let Err(e) = validate_registration(name, email, password, confirm_password) {
            self.record_error(e.user_message("Registration failed"));
            return false;
        }
        let req = RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let result = self.inner.gateway.register(&req).await;
        self.settle_auth(result, "Registration failed").await
    }

    pub async fn logout(&self) {
        {
            let mut data = self.inner.data.lock();
            data.stored = None;
            data.epoch += 1;
            self.inner.state.send_modify(|s| {
                s.is_authenticated = false;
                s.user = None;
                s.error = None;
            });
        }
        if let Err(e) = self.inner.store.clear().await {
            warn!("failed to clear persisted credential: {}", e);
        }
        info!("logged out");
    }

    /// Probes the service with the held credential. Any 4xx answer drops
    /// the credential; a transport or server failure only marks the session
    /// unauthenticated so a later probe can restore it.
    pub async fn check_auth(&self) -> bool {
        let (credential, epoch) = {
            let data = self.inner.data.lock();
            (data.stored.as_ref().map(|s| s.credential.clone()), data.epoch)
        };

        let Some(credential) = credential else {
            self.inner.state.send_modify(|s| {
                s.is_authenticated = false;
                s.user = None;
            });
            return false;
        };

        let result = self.inner.gateway.check_auth(&credential).await;

        let rejected = {
            let mut data = self.inner.data.lock();
            if data.epoch != epoch {
                info!("discarding superseded credential check");
                return self.is_authenticated();
            }

            match &result {
                Ok(()) => {
                    let user = data.stored.as_ref().map(|s| s.user.clone());
                    self.inner.state.send_modify(|s| {
                        s.is_authenticated = user.is_some();
                        s.user = user;
                    });
                    false
                }
                Err(e) => {
                    warn!("credential check failed: {}", e);
                    let rejected = e.is_client_rejection();
                    if rejected {
                        data.stored = None;
                        data.epoch += 1;
                    }
                    let message = if rejected {
                        SESSION_EXPIRED.to_string()
                    } else {
                        e.user_message("Could not verify session")
                    };
                    self.inner.state.send_modify(|s| {
                        s.is_authenticated = false;
                        s.user = None;
                        s.error = Some(message);
                    });
                    rejected
                }
            }
        };

        if rejected {
            if let Err(e) = self.inner.store.clear().await {
                warn!("failed to clear persisted credential: {}", e);
            }
        }
        result.is_ok()
    }

    async fn settle_auth(
        &self,
        result: Result<AuthResponse, AppError>,
        fallback: &str,
    ) -> bool {
        match result {
            Ok(resp) => {
                let stored = StoredCredential {
                    credential: resp.token,
                    user: resp.user,
                };
                {
                    let mut data = self.inner.data.lock();
                    data.stored = Some(stored.clone());
                    data.epoch += 1;
                    self.inner.state.send_modify(|s| {
                        s.is_authenticated = true;
                        s.user = Some(stored.user.clone());
                        s.error = None;
                    });
                }
                if let Err(e) = self.inner.store.save(&stored).await {
                    warn!("failed to persist credential: {}", e);
                }
                info!("authenticated as {}", stored.user.email);
                true
            }
            Err(e) => {
                warn!("{}: {}", fallback, e);
                self.record_error(e.user_message(fallback));
                false
            }
        }
    }

    fn clear_error(&self) {
        self.inner.state.send_modify(|s| s.error = None);
    }

    fn record_error(&self, message: String) {
        self.inner.state.send_modify(|s| s.error = Some(message));
    }
}

fn validate_registration(name: &str, email: &str, password: &str, confirm_password: &str) -> Result<(), AppError> {
    if name.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
        return Err(AppError::Validation("Name, email and password are required".to_string()));
    }
    if password != confirm_password {
        return Err(AppError::Validation("Passwords do not match".to_string()));
    }
    Ok(())
}
