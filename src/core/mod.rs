/*!
 * Core Module
 * Shared types, errors, configuration, and centralized limits
 */

pub mod clock;
pub mod config;
pub mod errors;
pub mod limits;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AnomalyThresholds, AuthorizerConfig, BusinessHours, CacheConfig, EngineConfig,
    RateLimitConfig, RateLimitRule, RiskWeights,
};
pub use errors::{AuthError, AuthResult, StoreError};
pub use types::{ActorId, DynamicDecision, PermissionContext, PermissionSet, RoleSet, WILDCARD};
