use std::time::Duration;

use tracing::{info, warn};

use crate::session::SessionStore;

/// Periodically re-validates the held credential so that a server-side
/// revocation ends the session without waiting for user action.
pub struct AuthMonitor {
    session: SessionStore,
    interval: Duration,
}

impl AuthMonitor {
    pub fn new(session: SessionStore, interval: Duration) -> Self {
        Self { session, interval }
    }

    /// Runs forever; spawn it.
    pub async fn start(self) {
        info!("Starting credential monitor (interval: {:?})", self.interval);

        loop {
            tokio::time::sleep(self.interval).await;
            self.tick().await;
        }
    }

    /// One probe. Skipped when no credential is held.
    pub async fn tick(&self) -> bool {
        if self.session.credential().is_none() {
            return false;
        }
        let valid = self.session.check_auth().await;
        if !valid {
            warn!("credential check failed, session is no longer authenticated");
        }
        valid
    }
}
