use std::sync::Arc;
use std::time::Duration;

use taskso::AppContext;
use taskso::config::ClientConfig;
use taskso::gateway::InMemoryService;
use taskso::gateway::memory::Op;
use taskso::guard::{Decision, Route};

fn context() -> (Arc<InMemoryService>, AppContext) {
    let service = Arc::new(InMemoryService::new().with_account("Ann", "a@b.com", "secret1"));
    let mut config = ClientConfig::new("http://localhost:5000/api").unwrap();
    config.auth_check_interval = Duration::from_secs(10);
    let ctx = AppContext::offline(config, service.clone());
    (service, ctx)
}

#[tokio::test]
async fn test_monitor_skips_probe_without_credential() {
    let (service, ctx) = context();
    let monitor = ctx.auth_monitor();
    assert!(!monitor.tick().await);
    assert_eq!(service.calls(Op::CheckAuth), 0);
}

#[tokio::test]
async fn test_monitor_tick_confirms_valid_credential() {
    let (service, ctx) = context();
    assert!(ctx.session.login("a@b.com", "secret1").await);
    assert!(ctx.auth_monitor().tick().await);
    assert_eq!(service.calls(Op::CheckAuth), 1);
    assert!(ctx.session.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn test_revoked_credential_redirects_within_one_interval() {
    let (service, ctx) = context();
    assert!(ctx.session.login("a@b.com", "secret1").await);
    let mut nav = ctx.navigator();
    assert_eq!(nav.navigate(Route::Dashboard), Decision::Allow);

    let handle = tokio::spawn(ctx.auth_monitor().start());
    service.revoke_all();

    let decision = tokio::time::timeout(Duration::from_secs(15), nav.changed())
        .await
        .expect("monitor should have probed within one interval");
    assert_eq!(decision, Some(Decision::Redirect(Route::Login)));
    assert!(!ctx.session.is_authenticated());
    assert!(ctx.session.credential().is_none());

    handle.abort();
}
