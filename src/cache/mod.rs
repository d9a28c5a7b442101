/*!
 * Permission Cache
 * Actor-keyed cache of effective permission and role sets with TTL expiry
 * and explicit fan-out invalidation
 *
 * TTL expiry bounds staleness for passive drift; the explicit invalidation
 * paths bound it to "immediately" for role/permission/grant mutations.
 * Expired entries are dropped lazily on the next read; there is no sweeper.
 */

use crate::audit::{AuditEvent, AuditSeverity, AuditSink, SecurityEvent, SecurityEventKind};
use crate::core::clock::Clock;
use crate::core::config::CacheConfig;
use crate::core::errors::{require_non_empty, AuthResult};
use crate::core::types::{PermissionSet, RoleSet, WILDCARD};
use crate::store::{ActorAuthorization, PermissionStore};
use ahash::RandomState;
use dashmap::DashMap;
use log::{debug, warn};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// A cached value with its freshness bounds
#[derive(Debug, Clone)]
struct CachedEntry<T> {
    value: T,
    expires_at: SystemTime,
}

impl<T> CachedEntry<T> {
    fn new(value: T, now: SystemTime, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: now + ttl,
        }
    }

    fn is_fresh(&self, now: SystemTime) -> bool {
        now < self.expires_at
    }
}

/// Cache statistics accumulated since process start
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub approx_size: usize,
    pub avg_load_latency: Duration,
}

/// Actor-keyed permission/role cache over a `PermissionStore`
///
/// Reads fail toward availability: a store outage degrades to a direct
/// uncached read, and if that also fails the actor resolves to the empty
/// set, which denies everything downstream. Loads racing on the same key are
/// acceptable; the last write wins and correctness relies only on TTL-bounded
/// eventual consistency.
pub struct PermissionCache {
    store: Arc<dyn PermissionStore>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    permissions: DashMap<String, CachedEntry<PermissionSet>, RandomState>,
    roles: DashMap<String, CachedEntry<RoleSet>, RandomState>,
    permission_ttl: Duration,
    role_ttl: Duration,
    super_admin_roles: HashSet<String>,
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_micros: AtomicU64,
}

impl PermissionCache {
    pub fn new(
        store: Arc<dyn PermissionStore>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        config: CacheConfig,
    ) -> Self {
        Self {
            store,
            audit,
            clock,
            permissions: DashMap::with_hasher(RandomState::new()),
            roles: DashMap::with_hasher(RandomState::new()),
            permission_ttl: config.permission_ttl,
            role_ttl: config.role_ttl,
            super_admin_roles: config.super_admin_roles,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            loads: AtomicU64::new(0),
            load_micros: AtomicU64::new(0),
        }
    }

    /// Resolve an actor's effective permission codes
    ///
    /// Cache hit returns the stored set; miss or expiry loads from the store
    /// and writes back with the configured TTL. Super-admin roles add the
    /// wildcard alongside their specific codes.
    pub fn get_permissions(&self, actor_id: &str) -> AuthResult<PermissionSet> {
        require_non_empty(actor_id, "actor_id")?;
        let now = self.clock.now();

        {
            if let Some(entry) = self.permissions.get(actor_id) {
                if entry.is_fresh(now) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(entry.value.clone());
                }
            }
        }
        // Stale entries are removed on the read that observes them
        self.permissions.remove(actor_id);
        self.misses.fetch_add(1, Ordering::Relaxed);

        let (authorization, cacheable) = self.load_with_fallback(actor_id);
        let set = match authorization {
            Some(auth) => self.build_permission_set(&auth, now),
            None => PermissionSet::new(),
        };

        if cacheable {
            self.permissions.insert(
                actor_id.to_string(),
                CachedEntry::new(set.clone(), now, self.permission_ttl),
            );
        }
        Ok(set)
    }

    /// Resolve an actor's active role names; independent TTL bucket from
    /// permissions
    pub fn get_roles(&self, actor_id: &str) -> AuthResult<RoleSet> {
        require_non_empty(actor_id, "actor_id")?;
        let now = self.clock.now();

        {
            if let Some(entry) = self.roles.get(actor_id) {
                if entry.is_fresh(now) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(entry.value.clone());
                }
            }
        }
        self.roles.remove(actor_id);
        self.misses.fetch_add(1, Ordering::Relaxed);

        let (authorization, cacheable) = self.load_with_fallback(actor_id);
        let set = match authorization {
            Some(auth) => auth
                .roles
                .iter()
                .filter(|r| r.is_active(now))
                .map(|r| r.role_name.clone())
                .collect(),
            None => RoleSet::new(),
        };

        if cacheable {
            self.roles.insert(
                actor_id.to_string(),
                CachedEntry::new(set.clone(), now, self.role_ttl),
            );
        }
        Ok(set)
    }

    /// Drop both cache entries for an actor; idempotent
    pub fn invalidate(&self, actor_id: &str, reason: &str) -> AuthResult<()> {
        require_non_empty(actor_id, "actor_id")?;
        self.remove_entries(actor_id);
        debug!("invalidated cache for actor {actor_id}: {reason}");
        self.audit.audit_event(
            AuditEvent::new("cache.invalidate", "permission_cache", true)
                .with_actor(actor_id)
                .with_details(json!({ "reason": reason })),
        );
        Ok(())
    }

    /// Batch invalidation; best-effort, bad ids are logged and skipped
    pub fn invalidate_many(&self, actor_ids: &[String], reason: &str) -> AuthResult<usize> {
        let mut invalidated = 0;
        for actor_id in actor_ids {
            if actor_id.trim().is_empty() {
                warn!("skipping empty actor id in batch invalidation");
                continue;
            }
            self.remove_entries(actor_id);
            invalidated += 1;
        }
        self.audit.audit_event(
            AuditEvent::new("cache.invalidate_many", "permission_cache", true).with_details(
                json!({ "reason": reason, "count": invalidated }),
            ),
        );
        Ok(invalidated)
    }

    /// Invalidate every holder of a role; the fan-out required because a role
    /// edit affects every holder's cached set
    pub fn invalidate_for_role(&self, role_id: &str, reason: &str) -> AuthResult<usize> {
        require_non_empty(role_id, "role_id")?;
        let actors = match self.store.actors_with_role(role_id) {
            Ok(actors) => actors,
            Err(err) => {
                // Holders cannot be resolved; TTL expiry bounds the staleness
                warn!("role fan-out lookup failed for {role_id}: {err}");
                return Ok(0);
            }
        };
        self.invalidate_many(&actors, reason)
    }

    /// Invalidate every actor reachable through any role granting the
    /// permission, deduplicated
    pub fn invalidate_for_permission(&self, permission_id: &str, reason: &str) -> AuthResult<usize> {
        require_non_empty(permission_id, "permission_id")?;
        let role_ids = match self.store.roles_with_permission(permission_id) {
            Ok(roles) => roles,
            Err(err) => {
                warn!("permission fan-out lookup failed for {permission_id}: {err}");
                return Ok(0);
            }
        };

        let mut actors: HashSet<String> = HashSet::new();
        for role_id in &role_ids {
            match self.store.actors_with_role(role_id) {
                Ok(holders) => actors.extend(holders),
                Err(err) => warn!("role fan-out lookup failed for {role_id}: {err}"),
            }
        }

        let actors: Vec<String> = actors.into_iter().collect();
        self.invalidate_many(&actors, reason)
    }

    /// Drop every cached entry; administrative emergencies only
    ///
    /// Emits a warning-level event because every subsequent read becomes a
    /// store load (cache-stampede risk).
    pub fn clear_all(&self) {
        let dropped = self.permissions.len() + self.roles.len();
        self.permissions.clear();
        self.roles.clear();
        warn!("permission cache cleared, {dropped} entries dropped");
        self.audit.security_event(
            SecurityEvent::new(SecurityEventKind::CacheCleared, AuditSeverity::Warning)
                .with_details(json!({ "entries_dropped": dropped })),
        );
    }

    /// The clock cache reads are judged against; shared with collaborators
    /// so the whole engine observes one time source
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };
        let loads = self.loads.load(Ordering::Relaxed);
        let avg_load_latency = if loads > 0 {
            Duration::from_micros(self.load_micros.load(Ordering::Relaxed) / loads)
        } else {
            Duration::ZERO
        };

        CacheStats {
            hits,
            misses,
            hit_rate,
            approx_size: self.permissions.len() + self.roles.len(),
            avg_load_latency,
        }
    }

    fn remove_entries(&self, actor_id: &str) {
        self.permissions.remove(actor_id);
        self.roles.remove(actor_id);
    }

    /// Load from the store, retrying once as a direct read on failure.
    /// Returns the authorization (None when both attempts fail) and whether
    /// the result may be written back to the cache.
    fn load_with_fallback(&self, actor_id: &str) -> (Option<ActorAuthorization>, bool) {
        let started = Instant::now();
        let result = match self.store.load_authorization(actor_id) {
            Ok(auth) => (Some(auth), true),
            Err(err) => {
                warn!("cached load failed for {actor_id}, retrying direct: {err}");
                match self.store.load_authorization(actor_id) {
                    // Direct-read results are served but not cached
                    Ok(auth) => (Some(auth), false),
                    Err(err) => {
                        warn!("direct load failed for {actor_id}, treating as no permissions: {err}");
                        (None, false)
                    }
                }
            }
        };

        self.loads.fetch_add(1, Ordering::Relaxed);
        self.load_micros
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
        result
    }

    fn build_permission_set(&self, auth: &ActorAuthorization, now: SystemTime) -> PermissionSet {
        let mut set = PermissionSet::new();

        for role in auth.roles.iter().filter(|r| r.is_active(now)) {
            if self.super_admin_roles.contains(&role.role_name) {
                set.insert(WILDCARD);
            }
            for grant in role.permissions.iter().filter(|g| g.is_active(now)) {
                set.insert(grant.code.clone());
            }
        }
        for grant in auth.direct_grants.iter().filter(|g| g.is_active(now)) {
            set.insert(grant.code.clone());
        }

        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use crate::core::clock::ManualClock;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn start_time() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        sink: Arc<MemorySink>,
        clock: Arc<ManualClock>,
        cache: PermissionCache,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let cache = PermissionCache::new(
            store.clone(),
            sink.clone(),
            clock.clone(),
            CacheConfig::default(),
        );
        Fixture {
            store,
            sink,
            clock,
            cache,
        }
    }

    #[test]
    fn test_miss_then_hit() {
        let f = fixture();
        f.store.define_role("r1", "Agent", ["calls.view"]);
        f.store.assign_role("u1", "r1", None);

        let first = f.cache.get_permissions("u1").unwrap();
        let second = f.cache.get_permissions("u1").unwrap();
        assert_eq!(first, second);

        let stats = f.cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert!(stats.hit_rate > 0.49 && stats.hit_rate < 0.51);
    }

    #[test]
    fn test_exact_permission_set() {
        let f = fixture();
        f.store.define_role("r1", "Agent", ["accounts.view"]);
        f.store.assign_role("u1", "r1", None);

        let set = f.cache.get_permissions("u1").unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains("accounts.view"));
        assert!(!set.contains("accounts.edit"));
    }

    #[test]
    fn test_super_admin_gets_wildcard_plus_codes() {
        let f = fixture();
        f.store.define_role("r9", "SuperAdmin", ["admin.panel"]);
        f.store.assign_role("u1", "r9", None);

        let set = f.cache.get_permissions("u1").unwrap();
        assert!(set.has_wildcard());
        assert!(set.contains("admin.panel"));
        assert!(set.contains("anything.else"));
    }

    #[test]
    fn test_union_of_roles_and_direct_grants() {
        let f = fixture();
        f.store.define_role("r1", "Agent", ["calls.view"]);
        f.store.define_role("r2", "Reporter", ["reports.view"]);
        f.store.assign_role("u1", "r1", None);
        f.store.assign_role("u1", "r2", None);
        f.store.grant_direct("u1", "exports.create", None);

        let set = f.cache.get_permissions("u1").unwrap();
        assert_eq!(set.len(), 3);
        assert!(set.contains("calls.view"));
        assert!(set.contains("reports.view"));
        assert!(set.contains("exports.create"));
    }

    #[test]
    fn test_expired_assignments_and_grants_filtered() {
        let f = fixture();
        let past = start_time() - Duration::from_secs(10);
        let future = start_time() + Duration::from_secs(3600);

        f.store.define_role("r1", "Agent", ["calls.view"]);
        f.store.define_role("r2", "Temp", ["temp.access"]);
        f.store.assign_role("u1", "r1", Some(future));
        f.store.assign_role("u1", "r2", Some(past));
        f.store.grant_direct("u1", "old.grant", Some(past));

        let set = f.cache.get_permissions("u1").unwrap();
        assert!(set.contains("calls.view"));
        assert!(!set.contains("temp.access"));
        assert!(!set.contains("old.grant"));
    }

    #[test]
    fn test_ttl_expiry_forces_reload() {
        let f = fixture();
        f.store.define_role("r1", "Agent", ["calls.view"]);
        f.store.assign_role("u1", "r1", None);

        f.cache.get_permissions("u1").unwrap();
        f.clock.advance(Duration::from_secs(100));
        f.cache.get_permissions("u1").unwrap();
        assert_eq!(f.cache.stats().hits, 1);

        // Past the 15 minute TTL
        f.clock.advance(Duration::from_secs(900));
        f.cache.get_permissions("u1").unwrap();
        assert_eq!(f.cache.stats().misses, 2);
    }

    #[test]
    fn test_invalidate_forces_reload_within_ttl() {
        let f = fixture();
        f.store.define_role("r1", "Agent", ["calls.view"]);
        f.store.assign_role("u1", "r1", None);

        f.cache.get_permissions("u1").unwrap();
        f.cache.invalidate("u1", "role edited").unwrap();
        f.cache.get_permissions("u1").unwrap();

        let stats = f.cache.stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 0);
        assert_eq!(f.sink.audit_count(), 1);
    }

    #[test]
    fn test_invalidate_absent_entry_is_noop() {
        let f = fixture();
        assert!(f.cache.invalidate("nobody", "cleanup").is_ok());
    }

    #[test]
    fn test_invalidation_picks_up_new_grants() {
        // Documented bounded-staleness contract: a revoked or added grant is
        // visible immediately after explicit invalidation, and within one TTL
        // otherwise. A read racing the invalidation may still observe the old
        // value once; that window is accepted, not a bug.
        let f = fixture();
        f.store.define_role("r1", "Agent", ["calls.view"]);
        f.store.assign_role("u1", "r1", None);

        let before = f.cache.get_permissions("u1").unwrap();
        assert!(!before.contains("calls.delete"));

        f.store.grant_role_permission("r1", "calls.delete", None);
        let stale = f.cache.get_permissions("u1").unwrap();
        assert!(!stale.contains("calls.delete"));

        f.cache.invalidate_for_role("r1", "permission added").unwrap();
        let fresh = f.cache.get_permissions("u1").unwrap();
        assert!(fresh.contains("calls.delete"));
    }

    #[test]
    fn test_role_fan_out_hits_every_holder() {
        let f = fixture();
        f.store.define_role("r1", "Agent", ["calls.view"]);
        f.store.assign_role("u1", "r1", None);
        f.store.assign_role("u2", "r1", None);
        f.cache.get_permissions("u1").unwrap();
        f.cache.get_permissions("u2").unwrap();

        let count = f.cache.invalidate_for_role("r1", "role edited").unwrap();
        assert_eq!(count, 2);

        f.cache.get_permissions("u1").unwrap();
        f.cache.get_permissions("u2").unwrap();
        assert_eq!(f.cache.stats().misses, 4);
    }

    #[test]
    fn test_permission_fan_out_deduplicates() {
        let f = fixture();
        f.store.define_role("r1", "Agent", ["calls.view"]);
        f.store.define_role("r2", "Auditor", ["calls.view"]);
        // u1 holds both roles and must be invalidated once
        f.store.assign_role("u1", "r1", None);
        f.store.assign_role("u1", "r2", None);
        f.store.assign_role("u2", "r2", None);

        let count = f
            .cache
            .invalidate_for_permission("calls.view", "permission edited")
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_clear_all_emits_warning_event() {
        let f = fixture();
        f.store.define_role("r1", "Agent", ["calls.view"]);
        f.store.assign_role("u1", "r1", None);
        f.cache.get_permissions("u1").unwrap();

        f.cache.clear_all();
        assert_eq!(f.cache.stats().approx_size, 0);

        let events = f.sink.recent_security(1);
        assert_eq!(events[0].kind, SecurityEventKind::CacheCleared);
        assert_eq!(events[0].severity, AuditSeverity::Warning);
    }

    #[test]
    fn test_store_outage_fails_open_to_empty_set() {
        let f = fixture();
        f.store.define_role("r1", "Agent", ["calls.view"]);
        f.store.assign_role("u1", "r1", None);

        f.store.set_unavailable(true);
        let set = f.cache.get_permissions("u1").unwrap();
        assert!(set.is_empty());

        // The empty fallback must not be cached; recovery is immediate
        f.store.set_unavailable(false);
        let set = f.cache.get_permissions("u1").unwrap();
        assert!(set.contains("calls.view"));
    }

    #[test]
    fn test_empty_actor_id_rejected() {
        let f = fixture();
        assert!(f.cache.get_permissions("").is_err());
        assert!(f.cache.get_roles("  ").is_err());
        assert!(f.cache.invalidate("", "x").is_err());
    }

    #[test]
    fn test_roles_bucket_independent() {
        let f = fixture();
        f.store.define_role("r1", "Agent", ["calls.view"]);
        f.store.assign_role("u1", "r1", None);

        let roles = f.cache.get_roles("u1").unwrap();
        assert!(roles.contains("Agent"));

        // One permission miss and one role miss, no cross-bucket hits
        f.cache.get_permissions("u1").unwrap();
        let stats = f.cache.stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 0);
    }
}
