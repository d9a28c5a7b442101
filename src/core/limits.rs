/*!
 * Engine Limits and Defaults
 *
 * Centralized location for every default, threshold, and weight used by the
 * engine. Values here are configurable defaults, not validated constants;
 * deployments override them through `EngineConfig`.
 *
 * Security-critical values are marked with [SECURITY].
 */

use std::time::Duration;

// =============================================================================
// PERMISSION CACHE
// =============================================================================

/// Default TTL for cached permission sets (15 minutes)
/// [SECURITY] Upper bound on staleness when no explicit invalidation fires
pub const DEFAULT_PERMISSION_TTL: Duration = Duration::from_secs(900);

/// Default TTL for cached role sets (15 minutes)
/// Independent bucket from permissions so either can be tuned alone
pub const DEFAULT_ROLE_TTL: Duration = Duration::from_secs(900);

// =============================================================================
// RATE LIMITING
// =============================================================================

/// General-purpose fallback for actions without an explicit rule
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(60);
pub const DEFAULT_RATE_MAX_REQUESTS: u32 = 100;

/// Login attempts: 5 per 15 minutes, 5 minute block on violation
/// [SECURITY] Slows credential stuffing without locking out fat-fingered users
pub const LOGIN_RATE_WINDOW: Duration = Duration::from_secs(900);
pub const LOGIN_RATE_MAX_REQUESTS: u32 = 5;
pub const LOGIN_BLOCK_DURATION: Duration = Duration::from_secs(300);

/// Administrative role/permission mutations: 5 per minute, 5 minute block
pub const ADMIN_RATE_WINDOW: Duration = Duration::from_secs(60);
pub const ADMIN_RATE_MAX_REQUESTS: u32 = 5;
pub const ADMIN_BLOCK_DURATION: Duration = Duration::from_secs(300);

/// Generic reads: 100 per minute
pub const READ_RATE_MAX_REQUESTS: u32 = 100;

/// Generic writes: 50 per minute
pub const WRITE_RATE_MAX_REQUESTS: u32 = 50;

// =============================================================================
// CONTEXTUAL AUTHORIZATION
// =============================================================================

/// Business hours window (06:00-22:00, weekdays)
pub const BUSINESS_HOURS_START: u8 = 6;
pub const BUSINESS_HOURS_END: u8 = 22;

/// Risk score ceiling; accumulated flags clamp here
pub const MAX_RISK_SCORE: u8 = 100;

/// Decisions scoring above this emit a high-risk security event even when granted
/// [SECURITY] Keeps elevated-risk successful access visible to monitoring
pub const HIGH_RISK_THRESHOLD: u8 = 50;

/// Risk weight: manager-tier read of a resource owned by someone else
pub const OWNERSHIP_OVERRIDE_RISK: u8 = 10;

/// Risk weight: critical action performed outside business hours
pub const AFTER_HOURS_CRITICAL_RISK: u8 = 20;

/// Risk weight: request from outside the trusted network ranges
pub const UNTRUSTED_NETWORK_RISK: u8 = 30;

/// Risk weight: a contextual check could not run for lack of a context field
pub const MISSING_CONTEXT_RISK: u8 = 10;

/// Risk weight: client signature matches no known browser pattern
pub const UNKNOWN_DEVICE_RISK: u8 = 15;

/// Risk weight: client signature looks automated (bots, scripts, CLI tools)
pub const AUTOMATED_CLIENT_RISK: u8 = 25;

/// Risk weight: actor exceeded the hourly event-count threshold
pub const HIGH_FREQUENCY_RISK: u8 = 20;

/// Risk weight: actor seen from multiple distinct addresses within the window
pub const MULTI_LOCATION_RISK: u8 = 25;

/// Risk weight: actor accumulated repeated failures within the window
pub const REPEATED_FAILURE_RISK: u8 = 30;

// =============================================================================
// ANOMALY DETECTION
// =============================================================================

/// Lookback window for behavioral signals (1 hour)
pub const ACTIVITY_WINDOW: Duration = Duration::from_secs(3600);

/// Events per window above which an actor is considered high-frequency
pub const ANOMALY_MAX_EVENTS: usize = 30;

/// Distinct source addresses per window above which an actor is multi-location
pub const ANOMALY_MAX_ADDRESSES: usize = 2;

/// Failures per window above which an actor is considered suspicious
pub const ANOMALY_MAX_FAILURES: usize = 5;

/// Per-actor cap on retained activity records
/// [SECURITY] Bounds tracker memory regardless of request volume
pub const MAX_ACTIVITY_RECORDS_PER_ACTOR: usize = 256;

// =============================================================================
// AUDIT
// =============================================================================

/// Maximum events retained by the in-memory audit sink
/// [SECURITY] Prevents the ring buffer from consuming unbounded memory
pub const MAX_AUDIT_EVENTS: usize = 10_000;
