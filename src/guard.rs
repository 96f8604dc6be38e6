//! Route gating on the session's authentication state.

use std::fmt;

use tokio::sync::watch;
use tracing::info;

use crate::models::TaskId;
use crate::session::SessionSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Login,
    Register,
    Dashboard,
    Spin,
    TaskDetails(TaskId),
}

impl Route {
    pub fn is_protected(&self) -> bool {
        !matches!(self, Route::Login | Route::Register)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Login => write!(f, "/login"),
            Route::Register => write!(f, "/register"),
            Route::Dashboard => write!(f, "/dashboard"),
            Route::Spin => write!(f, "/dashboard/spin"),
            Route::TaskDetails(id) => write!(f, "/dashboard/tasks/{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Redirect(Route),
}

pub struct RouteGuard;

impl RouteGuard {
    pub fn evaluate(session: &SessionSnapshot, route: &Route) -> Decision {
        if route.is_protected() && !session.is_authenticated {
            Decision::Redirect(Route::Login)
        } else {
            Decision::Allow
        }
    }
}

/// Tracks the current route and re-applies the guard on every navigation and
/// every session change.
pub struct Navigator {
    session: watch::Receiver<SessionSnapshot>,
    current: Route,
}

impl Navigator {
    pub fn new(session: watch::Receiver<SessionSnapshot>) -> Self {
        Self {
            session,
            current: Route::Login,
        }
    }

    pub fn current(&self) -> &Route {
        &self.current
    }

    /// Navigates to `route`, or to the login view if the guard refuses it.
    pub fn navigate(&mut self, route: Route) -> Decision {
        let decision = RouteGuard::evaluate(&self.session.borrow_and_update(), &route);
        self.current = match &decision {
            Decision::Allow => route,
            Decision::Redirect(to) => {
                info!("redirecting {} -> {}", route, to);
                to.clone()
            }
        };
        decision
    }

    /// Re-evaluates the current route if the session changed since the last
    /// evaluation. Returns the redirect, if one happened.
    pub fn sync(&mut self) -> Option<Route> {
        if !self.session.has_changed().unwrap_or(false) {
            return None;
        }
        self.reevaluate()
    }

    /// Waits for the next session change and re-evaluates the current route.
    /// Returns `None` once the session store is gone.
    pub async fn changed(&mut self) -> Option<Decision> {
        self.session.changed().await.ok()?;
        Some(match self.reevaluate() {
            Some(to) => Decision::Redirect(to),
            None => Decision::Allow,
        })
    }

    fn reevaluate(&mut self) -> Option<Route> {
        let route = self.current.clone();
        match self.navigate(route) {
            Decision::Allow => None,
            Decision::Redirect(to) => Some(to),
        }
    }
}
