/*!
 * End-to-end scenarios through the public API
 */

use authgate::{
    AccessEngine, AuditSink, Clock, EngineConfig, ManualClock, MemorySink, MemoryStore,
    PermissionContext, RateLimitConfig, RateLimiter, SecurityEventKind,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use time::macros::datetime;

fn in_hours() -> SystemTime {
    // A Wednesday morning, inside the 06:00-22:00 window
    SystemTime::from(datetime!(2024-03-13 10:00 UTC))
}

fn browser_ctx(actor: &str, resource: &str, action: &str) -> PermissionContext {
    PermissionContext::new(actor, resource, action)
        .with_timestamp(in_hours())
        .with_ip("10.0.0.5".parse().unwrap())
        .with_user_agent("Mozilla/5.0 (X11; Linux x86_64) Firefox/121.0")
}

struct World {
    store: Arc<MemoryStore>,
    sink: Arc<MemorySink>,
    clock: Arc<ManualClock>,
    engine: AccessEngine,
}

fn world() -> World {
    let store = Arc::new(MemoryStore::new());
    store.define_role("r-agent", "Agent", ["leads.view", "leads.edit"]);
    store.assign_role("u1", "r-agent", None);

    let sink = Arc::new(MemorySink::new());
    let clock = Arc::new(ManualClock::new(in_hours()));
    let engine = AccessEngine::with_config(
        store.clone(),
        store.clone(),
        sink.clone(),
        clock.clone(),
        EngineConfig::default(),
    );

    World {
        store,
        sink,
        clock,
        engine,
    }
}

#[test]
fn test_cache_walk_across_the_ttl() {
    let w = world();
    let ctx = browser_ctx("u1", "leads", "view");

    // Cold: one miss per bucket, then the pipeline's second permission read
    // hits
    w.engine.authorize(&ctx, &["leads.view"]).unwrap();
    assert_eq!(w.engine.cache_stats().misses, 2);

    // 100 seconds in, everything is still fresh
    w.clock.advance(Duration::from_secs(100));
    let later = ctx.clone().with_timestamp(w.clock.now());
    w.engine.authorize(&later, &["leads.view"]).unwrap();
    assert_eq!(w.engine.cache_stats().misses, 2);

    // Past the 15 minute TTL both buckets reload
    w.clock.advance(Duration::from_secs(900));
    let much_later = ctx.with_timestamp(w.clock.now());
    w.engine.authorize(&much_later, &["leads.view"]).unwrap();
    assert_eq!(w.engine.cache_stats().misses, 4);
}

#[test]
fn test_login_burst_blocks_then_recovers() {
    let sink = Arc::new(MemorySink::new());
    let clock = Arc::new(ManualClock::new(in_hours()));
    let limiter = RateLimiter::new(
        RateLimitConfig::default(),
        sink.clone() as Arc<dyn AuditSink>,
        clock.clone(),
    );

    // Five attempts pass with a decreasing budget
    for expected_remaining in [4, 3, 2, 1, 0] {
        let decision = limiter.check_and_increment("u1", "auth:login").unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, expected_remaining);
    }

    // The sixth is denied and starts the 5 minute block
    let denied = limiter.check_and_increment("u1", "auth:login").unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.retry_after, Some(Duration::from_secs(300)));
    assert_eq!(
        sink.security_count_of(SecurityEventKind::RateLimitExceeded),
        1
    );

    // Attempts under the block do not disturb the window snapshot
    let before = limiter.status("u1", "auth:login").unwrap();
    let blocked = limiter.check_and_increment("u1", "auth:login").unwrap();
    assert!(!blocked.allowed);
    let after = limiter.status("u1", "auth:login").unwrap();
    assert_eq!(before, after);
    assert_eq!(after.count, 5);

    // Once both the block and the 15 minute window lapse, a fresh window
    // opens
    clock.advance(Duration::from_secs(1000));
    let fresh = limiter.check_and_increment("u1", "auth:login").unwrap();
    assert!(fresh.allowed);
    assert_eq!(fresh.remaining, 4);
}

#[test]
fn test_manager_override_accumulates_into_high_risk() {
    let w = world();
    w.store.define_role("r-mgr", "Manager", ["leads.view"]);
    w.store.assign_role("boss", "r-mgr", None);
    w.store.grant_direct("boss", "system.remote_access", None);
    w.store.set_owner("leads", "lead-9", "u1");

    // Manager read of someone else's lead from an untrusted network:
    // granted with override (10) + untrusted network (30) flags
    let ctx = browser_ctx("boss", "leads", "view")
        .with_resource_id("lead-9")
        .with_ip("203.0.113.7".parse().unwrap());
    let decision = w.engine.authorize(&ctx, &["leads.view"]).unwrap();
    assert!(decision.granted);
    assert_eq!(decision.risk_score, 40);
    assert_eq!(decision.restrictions.len(), 2);
    assert_eq!(
        w.sink.security_count_of(SecurityEventKind::HighRiskAccess),
        0
    );

    // The same request from an automated client (25 more) crosses the
    // high-risk threshold and raises the security event
    let scripted = ctx.with_user_agent("python-requests/2.31");
    let decision = w.engine.authorize(&scripted, &["leads.view"]).unwrap();
    assert!(decision.granted);
    assert_eq!(decision.risk_score, 65);
    assert_eq!(
        w.sink.security_count_of(SecurityEventKind::HighRiskAccess),
        1
    );
}

#[test]
fn test_role_edit_visible_after_invalidation() {
    let w = world();
    let ctx = browser_ctx("u1", "leads", "delete");

    let denied = w.engine.authorize(&ctx, &["leads.delete"]).unwrap();
    assert!(!denied.granted);

    // The grant lands in the store but the cached set is still served
    w.store.grant_role_permission("r-agent", "leads.delete", None);
    let stale = w.engine.authorize(&ctx, &["leads.delete"]).unwrap();
    assert!(!stale.granted);

    // Explicit fan-out makes it visible immediately, well inside the TTL
    w.engine.role_changed("r-agent", "grant added").unwrap();
    let fresh = w.engine.authorize(&ctx, &["leads.delete"]).unwrap();
    assert!(fresh.granted);
}

#[test]
fn test_non_owner_write_denied_end_to_end() {
    let w = world();
    w.store.assign_role("u2", "r-agent", None);
    w.store.set_owner("leads", "lead-1", "u1");

    let ctx = browser_ctx("u2", "leads", "edit").with_resource_id("lead-1");
    let decision = w.engine.authorize(&ctx, &["leads.edit"]).unwrap();
    assert!(!decision.granted);

    let owner_ctx = browser_ctx("u1", "leads", "edit").with_resource_id("lead-1");
    let decision = w.engine.authorize(&owner_ctx, &["leads.edit"]).unwrap();
    assert!(decision.granted);
}

#[test]
fn test_every_evaluation_leaves_an_audit_record() {
    let w = world();
    w.engine
        .authorize(&browser_ctx("u1", "leads", "view"), &["leads.view"])
        .unwrap();
    w.engine
        .authorize(&browser_ctx("u1", "leads", "delete"), &["leads.delete"])
        .unwrap();

    assert_eq!(w.sink.audit_count(), 2);
    let recent = w.sink.recent_audit(2);
    assert!(!recent[0].success);
    assert!(recent[1].success);
}
