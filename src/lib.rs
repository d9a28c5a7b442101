/*!
 * AuthGate
 * Permission and risk evaluation for a multi-tenant business platform
 *
 * Three cooperating layers gate every request: a TTL-bounded cache of static
 * grants, per-action sliding-window rate limits, and a contextual risk
 * pipeline (ownership, time of day, network, device, behavioral anomaly).
 * Every evaluation leaves an audit record through a pluggable sink.
 */

pub mod audit;
pub mod authorizer;
pub mod cache;
pub mod core;
pub mod engine;
pub mod ratelimit;
pub mod store;

pub use crate::audit::{
    ActivityTracker, AuditEvent, AuditSeverity, AuditSink, LogSink, MemorySink, SecurityEvent,
    SecurityEventKind,
};
pub use crate::authorizer::DynamicAuthorizer;
pub use crate::cache::{CacheStats, PermissionCache};
pub use crate::core::{
    AuthError, AuthResult, AuthorizerConfig, CacheConfig, Clock, DynamicDecision, EngineConfig,
    ManualClock, PermissionContext, PermissionSet, RateLimitConfig, RateLimitRule, RoleSet,
    StoreError, SystemClock, WILDCARD,
};
pub use crate::engine::AccessEngine;
pub use crate::ratelimit::{RateLimitDecision, RateLimiter, RateWindow};
pub use crate::store::{
    ActorAuthorization, MemoryStore, OwnershipResolver, PermissionGrant, PermissionStore,
    RoleAssignment,
};
