/*!
 * Access Engine
 * One front door over the cache, limiter, and dynamic pipeline
 *
 * Call order per request: static grant check, rate limit, contextual
 * pipeline. A static or rate-limit failure is a denied decision with its
 * audit trail, never an error; errors are reserved for caller misuse.
 */

use crate::audit::{AuditEvent, AuditSink};
use crate::authorizer::DynamicAuthorizer;
use crate::cache::{CacheStats, PermissionCache};
use crate::core::clock::{Clock, SystemClock};
use crate::core::config::EngineConfig;
use crate::core::errors::AuthResult;
use crate::core::types::{DynamicDecision, PermissionContext};
use crate::ratelimit::RateLimiter;
use crate::store::{OwnershipResolver, PermissionStore};
use log::info;
use serde_json::json;
use std::sync::Arc;

/// Facade wiring the evaluation layers together
pub struct AccessEngine {
    cache: Arc<PermissionCache>,
    limiter: RateLimiter,
    authorizer: DynamicAuthorizer,
    audit: Arc<dyn AuditSink>,
}

impl AccessEngine {
    /// Build with default configuration and the wall clock, for a store that
    /// also resolves ownership
    pub fn new<S>(store: Arc<S>, audit: Arc<dyn AuditSink>) -> Self
    where
        S: PermissionStore + OwnershipResolver + 'static,
    {
        Self::with_config(
            store.clone(),
            store,
            audit,
            Arc::new(SystemClock),
            EngineConfig::default(),
        )
    }

    pub fn with_config(
        store: Arc<dyn PermissionStore>,
        ownership: Arc<dyn OwnershipResolver>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let cache = Arc::new(PermissionCache::new(
            store,
            audit.clone(),
            clock.clone(),
            config.cache,
        ));
        let limiter = RateLimiter::new(config.rate_limit, audit.clone(), clock);
        let authorizer = DynamicAuthorizer::with_config(
            cache.clone(),
            ownership,
            audit.clone(),
            config.authorizer,
        );

        Self {
            cache,
            limiter,
            authorizer,
            audit,
        }
    }

    /// Full evaluation of one request
    ///
    /// `required_codes` are the permission codes the endpoint demands; the
    /// wildcard grant satisfies all of them. The rate table is keyed by the
    /// context's qualified `resource:action` name.
    pub fn authorize(
        &self,
        ctx: &PermissionContext,
        required_codes: &[&str],
    ) -> AuthResult<DynamicDecision> {
        let permissions = self.cache.get_permissions(&ctx.actor_id)?;
        let has_static = permissions.contains_all(required_codes);

        // Only requests that clear the static gate consume rate budget
        if has_static {
            let action = ctx.qualified_action();
            let rate = self.limiter.check_and_increment(&ctx.actor_id, &action)?;
            if !rate.allowed {
                // The limiter already raised its security event; record the
                // denied operation in the audit trail and stop here
                let mut event = AuditEvent::new(&ctx.action, &ctx.resource, false)
                    .with_actor(&ctx.actor_id)
                    .with_details(json!({
                        "reason": "rate limited",
                        "retry_after_secs": rate.retry_after.map(|d| d.as_secs()),
                    }));
                if let Some(resource_id) = &ctx.resource_id {
                    event = event.with_resource_id(resource_id);
                }
                self.audit.audit_event(event);

                return Ok(DynamicDecision::denied(
                    "rate limit exceeded",
                    Vec::new(),
                    0,
                ));
            }
        }

        self.authorizer.evaluate(ctx, has_static)
    }

    /// Invalidation hook for a role mutation; returns holders invalidated
    pub fn role_changed(&self, role_id: &str, reason: &str) -> AuthResult<usize> {
        info!("role {role_id} changed: {reason}");
        self.cache.invalidate_for_role(role_id, reason)
    }

    /// Invalidation hook for a permission mutation
    pub fn permission_changed(&self, permission_id: &str, reason: &str) -> AuthResult<usize> {
        info!("permission {permission_id} changed: {reason}");
        self.cache.invalidate_for_permission(permission_id, reason)
    }

    /// Invalidation hook for a grant or assignment mutation on one actor
    pub fn actor_changed(&self, actor_id: &str, reason: &str) -> AuthResult<()> {
        self.cache.invalidate(actor_id, reason)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache(&self) -> &PermissionCache {
        &self.cache
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn authorizer(&self) -> &DynamicAuthorizer {
        &self.authorizer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use crate::core::clock::ManualClock;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;
    use std::time::SystemTime;
    use time::macros::datetime;

    fn in_hours() -> SystemTime {
        SystemTime::from(datetime!(2024-03-13 10:00 UTC))
    }

    fn engine() -> (Arc<MemoryStore>, Arc<MemorySink>, AccessEngine) {
        let store = Arc::new(MemoryStore::new());
        store.define_role("r-agent", "Agent", ["leads.view", "leads.edit"]);
        store.assign_role("u1", "r-agent", None);

        let sink = Arc::new(MemorySink::new());
        let engine = AccessEngine::with_config(
            store.clone(),
            store.clone(),
            sink.clone(),
            Arc::new(ManualClock::new(in_hours())),
            EngineConfig::default(),
        );
        (store, sink, engine)
    }

    fn ctx(actor: &str, action: &str) -> PermissionContext {
        PermissionContext::new(actor, "leads", action)
            .with_timestamp(in_hours())
            .with_ip("10.0.0.5".parse().unwrap())
            .with_user_agent("Mozilla/5.0 (X11; Linux x86_64) Firefox/121.0")
    }

    #[test]
    fn test_granted_end_to_end() {
        let (_store, _sink, engine) = engine();
        let decision = engine.authorize(&ctx("u1", "view"), &["leads.view"]).unwrap();
        assert!(decision.granted);
        assert_eq!(decision.risk_score, 0);
    }

    #[test]
    fn test_missing_grant_denied() {
        let (_store, _sink, engine) = engine();
        let decision = engine
            .authorize(&ctx("u1", "delete"), &["leads.delete"])
            .unwrap();
        assert!(!decision.granted);
        assert!(decision.reason.contains("permission"));
    }

    #[test]
    fn test_rate_limit_denies_with_audit() {
        let (_store, sink, engine) = engine();
        // "leads:view" is unconfigured and falls back to the 100/minute rule
        for _ in 0..100 {
            let decision = engine.authorize(&ctx("u1", "view"), &["leads.view"]).unwrap();
            assert!(decision.granted);
        }

        let decision = engine.authorize(&ctx("u1", "view"), &["leads.view"]).unwrap();
        assert!(!decision.granted);
        assert!(decision.reason.contains("rate limit"));
        // 100 grants + 1 rate-limited denial, one audit record each
        assert_eq!(sink.audit_count(), 101);
    }

    #[test]
    fn test_role_change_invalidates_holders() {
        let (store, _sink, engine) = engine();
        store.assign_role("u2", "r-agent", None);
        engine.authorize(&ctx("u1", "view"), &["leads.view"]).unwrap();
        engine.authorize(&ctx("u2", "view"), &["leads.view"]).unwrap();

        let count = engine.role_changed("r-agent", "permissions edited").unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_wildcard_satisfies_all_required_codes() {
        let (store, _sink, engine) = engine();
        store.define_role("r-root", "SuperAdmin", ["admin.panel"]);
        store.assign_role("root", "r-root", None);

        let decision = engine
            .authorize(&ctx("root", "view"), &["leads.view", "exports.create"])
            .unwrap();
        assert!(decision.granted);
    }

    #[test]
    fn test_cache_stats_exposed() {
        let (_store, _sink, engine) = engine();
        engine.authorize(&ctx("u1", "view"), &["leads.view"]).unwrap();
        engine.authorize(&ctx("u1", "view"), &["leads.view"]).unwrap();

        let stats = engine.cache_stats();
        // One cold miss per bucket (permissions and roles), hits after
        assert_eq!(stats.misses, 2);
        assert!(stats.hits >= 3);
    }
}
