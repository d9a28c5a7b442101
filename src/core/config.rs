/*!
 * Engine Configuration
 *
 * Read once at construction, never re-read per request. Scoring policy lives
 * here as data (named weights and thresholds) rather than scattered literals.
 */

use crate::core::limits;
use ipnetwork::IpNetwork;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::time::Duration;
use time::Weekday;

/// Permission cache tuning
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub permission_ttl: Duration,
    pub role_ttl: Duration,
    /// Role names that grant the wildcard permission alongside their codes
    pub super_admin_roles: HashSet<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            permission_ttl: limits::DEFAULT_PERMISSION_TTL,
            role_ttl: limits::DEFAULT_ROLE_TTL,
            super_admin_roles: ["SuperAdmin".to_string()].into_iter().collect(),
        }
    }
}

/// Limit for one action: window size, request budget, optional block
#[derive(Debug, Clone, Copy)]
pub struct RateLimitRule {
    pub window: Duration,
    pub max_requests: u32,
    pub block_duration: Option<Duration>,
}

impl RateLimitRule {
    pub const fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            block_duration: None,
        }
    }

    pub const fn with_block(mut self, duration: Duration) -> Self {
        self.block_duration = Some(duration);
        self
    }
}

/// Per-action rate-limit table with a general-purpose fallback
///
/// An unrecognized action name falls back to `default_rule` rather than
/// erroring.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub rules: HashMap<String, RateLimitRule>,
    pub default_rule: RateLimitRule,
}

impl RateLimitConfig {
    pub fn rule_for(&self, action: &str) -> RateLimitRule {
        self.rules.get(action).copied().unwrap_or(self.default_rule)
    }

    pub fn set_rule(&mut self, action: impl Into<String>, rule: RateLimitRule) {
        self.rules.insert(action.into(), rule);
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut rules = HashMap::new();
        rules.insert(
            "auth:login".to_string(),
            RateLimitRule::new(limits::LOGIN_RATE_WINDOW, limits::LOGIN_RATE_MAX_REQUESTS)
                .with_block(limits::LOGIN_BLOCK_DURATION),
        );
        rules.insert(
            "roles:create".to_string(),
            RateLimitRule::new(limits::ADMIN_RATE_WINDOW, limits::ADMIN_RATE_MAX_REQUESTS)
                .with_block(limits::ADMIN_BLOCK_DURATION),
        );
        rules.insert(
            "permissions:create".to_string(),
            RateLimitRule::new(limits::ADMIN_RATE_WINDOW, limits::ADMIN_RATE_MAX_REQUESTS)
                .with_block(limits::ADMIN_BLOCK_DURATION),
        );
        rules.insert(
            "generic:read".to_string(),
            RateLimitRule::new(limits::DEFAULT_RATE_WINDOW, limits::READ_RATE_MAX_REQUESTS),
        );
        rules.insert(
            "generic:write".to_string(),
            RateLimitRule::new(limits::DEFAULT_RATE_WINDOW, limits::WRITE_RATE_MAX_REQUESTS),
        );

        Self {
            rules,
            default_rule: RateLimitRule::new(
                limits::DEFAULT_RATE_WINDOW,
                limits::DEFAULT_RATE_MAX_REQUESTS,
            ),
        }
    }
}

/// Weekday business-hours window; hours are [start, end) in UTC
#[derive(Debug, Clone, Copy)]
pub struct BusinessHours {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl BusinessHours {
    pub fn contains_hour(&self, hour: u8) -> bool {
        hour >= self.start_hour && hour < self.end_hour
    }

    pub fn is_business_day(&self, weekday: Weekday) -> bool {
        !matches!(weekday, Weekday::Saturday | Weekday::Sunday)
    }
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            start_hour: limits::BUSINESS_HOURS_START,
            end_hour: limits::BUSINESS_HOURS_END,
        }
    }
}

/// Named risk weights for every soft flag the pipeline can raise
#[derive(Debug, Clone, Copy)]
pub struct RiskWeights {
    pub ownership_override: u8,
    pub after_hours_critical: u8,
    pub untrusted_network: u8,
    pub missing_context: u8,
    pub unknown_device: u8,
    pub automated_client: u8,
    pub high_frequency: u8,
    pub multi_location: u8,
    pub repeated_failures: u8,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            ownership_override: limits::OWNERSHIP_OVERRIDE_RISK,
            after_hours_critical: limits::AFTER_HOURS_CRITICAL_RISK,
            untrusted_network: limits::UNTRUSTED_NETWORK_RISK,
            missing_context: limits::MISSING_CONTEXT_RISK,
            unknown_device: limits::UNKNOWN_DEVICE_RISK,
            automated_client: limits::AUTOMATED_CLIENT_RISK,
            high_frequency: limits::HIGH_FREQUENCY_RISK,
            multi_location: limits::MULTI_LOCATION_RISK,
            repeated_failures: limits::REPEATED_FAILURE_RISK,
        }
    }
}

/// Behavioral-anomaly thresholds; configurable defaults, not validated values
#[derive(Debug, Clone, Copy)]
pub struct AnomalyThresholds {
    pub max_events_per_window: usize,
    pub max_distinct_addresses: usize,
    pub max_failures: usize,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            max_events_per_window: limits::ANOMALY_MAX_EVENTS,
            max_distinct_addresses: limits::ANOMALY_MAX_ADDRESSES,
            max_failures: limits::ANOMALY_MAX_FAILURES,
        }
    }
}

/// Policy inputs for the contextual check pipeline
#[derive(Debug, Clone)]
pub struct AuthorizerConfig {
    pub business_hours: BusinessHours,
    /// Roles exempt from the business-hours window
    pub around_clock_roles: HashSet<String>,
    /// Qualified `resource:action` names the time-of-day check skips
    pub time_exempt_actions: HashSet<String>,
    /// Qualified names permitted after hours with a soft flag instead of a
    /// denial
    pub critical_actions: HashSet<String>,
    /// Roles fully exempt from the ownership check
    pub elevated_roles: HashSet<String>,
    /// Roles allowed to read resources they do not own, at a logged override
    pub manager_roles: HashSet<String>,
    /// Bare action verbs classified as read-only for the ownership override
    pub read_actions: HashSet<String>,
    pub trusted_networks: Vec<IpNetwork>,
    /// Permission code required to proceed from an untrusted network
    pub remote_access_code: String,
    pub weights: RiskWeights,
    pub anomaly: AnomalyThresholds,
    pub high_risk_threshold: u8,
}

impl AuthorizerConfig {
    pub fn is_trusted_address(&self, ip: IpAddr) -> bool {
        self.trusted_networks.iter().any(|net| net.contains(ip))
    }

    pub fn is_read_action(&self, action: &str) -> bool {
        self.read_actions.contains(action)
    }
}

impl Default for AuthorizerConfig {
    fn default() -> Self {
        let trusted_networks = ["10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16", "127.0.0.0/8"]
            .iter()
            .map(|s| s.parse().expect("static CIDR literal"))
            .collect();

        Self {
            business_hours: BusinessHours::default(),
            around_clock_roles: ["SuperAdmin".to_string(), "Admin".to_string()]
                .into_iter()
                .collect(),
            time_exempt_actions: ["auth:logout".to_string()].into_iter().collect(),
            critical_actions: ["incidents:respond".to_string(), "security:lockdown".to_string()]
                .into_iter()
                .collect(),
            elevated_roles: ["SuperAdmin".to_string(), "Admin".to_string()]
                .into_iter()
                .collect(),
            manager_roles: ["Manager".to_string(), "Supervisor".to_string()]
                .into_iter()
                .collect(),
            read_actions: ["view".to_string(), "read".to_string(), "list".to_string()]
                .into_iter()
                .collect(),
            trusted_networks,
            remote_access_code: "system.remote_access".to_string(),
            weights: RiskWeights::default(),
            anomaly: AnomalyThresholds::default(),
            high_risk_threshold: limits::HIGH_RISK_THRESHOLD,
        }
    }
}

/// Top-level configuration for the whole engine
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub authorizer: AuthorizerConfig,
}
