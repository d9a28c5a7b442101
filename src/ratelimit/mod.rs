/*!
 * Rate Limiter
 * Sliding-window counters with temporary blocking per (identifier, action)
 *
 * The identifier is any caller-supplied string: an actor id for
 * authenticated limits, an address for IP-scoped ones. Window updates are
 * atomic per key (the map's entry lock covers the read-modify-write), so two
 * concurrent requests cannot both slip past the limit.
 */

use crate::audit::{AuditEvent, AuditSeverity, AuditSink, SecurityEvent, SecurityEventKind};
use crate::core::clock::Clock;
use crate::core::config::{RateLimitConfig, RateLimitRule};
use crate::core::errors::{require_non_empty, AuthResult};
use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::json;
use serde_with::{serde_as, TimestampSeconds};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Key for one limited pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PairKey {
    identifier: String,
    action: String,
}

/// One counting window; replaced, never incremented, once it elapses
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateWindow {
    pub count: u32,
    #[serde_as(as = "TimestampSeconds<i64>")]
    pub window_start: SystemTime,
    #[serde_as(as = "TimestampSeconds<i64>")]
    pub window_end: SystemTime,
}

impl RateWindow {
    fn open(now: SystemTime, rule: &RateLimitRule) -> Self {
        Self {
            count: 1,
            window_start: now,
            window_end: now + rule.window,
        }
    }

    fn is_elapsed(&self, now: SystemTime) -> bool {
        now >= self.window_end
    }
}

/// Temporary block on a pair that exceeded its limit
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Block {
    #[serde_as(as = "TimestampSeconds<i64>")]
    pub blocked_until: SystemTime,
    pub reason: String,
}

/// Outcome of one `check_and_increment` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: SystemTime,
    pub retry_after: Option<Duration>,
}

enum Outcome {
    Allowed { remaining: u32, reset_at: SystemTime },
    Exhausted { reset_at: SystemTime },
}

/// Sliding-window limiter over in-process keyed state
///
/// Rate limiting is defense in depth, not the primary authorization gate: a
/// backing store that cannot be reached fails open (the request proceeds)
/// rather than turning an outage into a total outage of traffic.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<PairKey, RateWindow, RandomState>,
    blocks: DashMap<PairKey, Block, RandomState>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, audit: Arc<dyn AuditSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            windows: DashMap::with_hasher(RandomState::new()),
            blocks: DashMap::with_hasher(RandomState::new()),
            audit,
            clock,
        }
    }

    /// Count one request against the pair's window
    ///
    /// An unexpired block denies before the window is consulted. Exhausting
    /// the window denies and, when the action configures a block duration,
    /// installs a block and emits a high-severity security event.
    pub fn check_and_increment(&self, identifier: &str, action: &str) -> AuthResult<RateLimitDecision> {
        require_non_empty(identifier, "identifier")?;
        require_non_empty(action, "action")?;

        let rule = self.config.rule_for(action);
        let now = self.clock.now();
        let key = PairKey {
            identifier: identifier.to_string(),
            action: action.to_string(),
        };

        if let Some(blocked_until) = self.active_block(&key, now) {
            let retry_after = blocked_until
                .duration_since(now)
                .unwrap_or(Duration::ZERO);
            self.audit.security_event(
                SecurityEvent::new(SecurityEventKind::RequestBlocked, AuditSeverity::High)
                    .with_actor(identifier)
                    .with_details(json!({
                        "action": action,
                        "retry_after_secs": retry_after.as_secs(),
                    })),
            );
            return Ok(RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at: blocked_until,
                retry_after: Some(retry_after),
            });
        }

        let outcome = match self.windows.entry(key.clone()) {
            Entry::Vacant(vacant) => {
                let window = RateWindow::open(now, &rule);
                let reset_at = window.window_end;
                vacant.insert(window);
                Outcome::Allowed {
                    remaining: rule.max_requests.saturating_sub(1),
                    reset_at,
                }
            }
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_elapsed(now) {
                    // Elapsed windows are replaced, not incremented
                    let window = RateWindow::open(now, &rule);
                    let reset_at = window.window_end;
                    occupied.insert(window);
                    Outcome::Allowed {
                        remaining: rule.max_requests.saturating_sub(1),
                        reset_at,
                    }
                } else if occupied.get().count < rule.max_requests {
                    let window = occupied.get_mut();
                    window.count += 1;
                    Outcome::Allowed {
                        remaining: rule.max_requests - window.count,
                        reset_at: window.window_end,
                    }
                } else {
                    Outcome::Exhausted {
                        reset_at: occupied.get().window_end,
                    }
                }
            }
        };

        match outcome {
            Outcome::Allowed { remaining, reset_at } => Ok(RateLimitDecision {
                allowed: true,
                remaining,
                reset_at,
                retry_after: None,
            }),
            Outcome::Exhausted { reset_at } => Ok(self.deny_exhausted(&key, &rule, now, reset_at)),
        }
    }

    /// Read-only window snapshot; never increments
    pub fn status(&self, identifier: &str, action: &str) -> Option<RateWindow> {
        let key = PairKey {
            identifier: identifier.to_string(),
            action: action.to_string(),
        };
        self.windows.get(&key).map(|w| w.clone())
    }

    /// Administrative override: clear the window and any block for one pair
    pub fn reset(&self, identifier: &str, action: &str, reason: &str) -> AuthResult<()> {
        require_non_empty(identifier, "identifier")?;
        require_non_empty(action, "action")?;

        let key = PairKey {
            identifier: identifier.to_string(),
            action: action.to_string(),
        };
        self.windows.remove(&key);
        self.blocks.remove(&key);
        debug!("rate limit reset for {identifier}/{action}: {reason}");
        self.audit.audit_event(
            AuditEvent::new("ratelimit.reset", "rate_limiter", true)
                .with_actor(identifier)
                .with_details(json!({ "action": action, "reason": reason })),
        );
        Ok(())
    }

    /// Clear every window and block held for an identifier
    pub fn reset_all(&self, identifier: &str, reason: &str) -> AuthResult<usize> {
        require_non_empty(identifier, "identifier")?;

        let window_keys: Vec<PairKey> = self
            .windows
            .iter()
            .filter(|e| e.key().identifier == identifier)
            .map(|e| e.key().clone())
            .collect();
        let block_keys: Vec<PairKey> = self
            .blocks
            .iter()
            .filter(|e| e.key().identifier == identifier)
            .map(|e| e.key().clone())
            .collect();

        let cleared = window_keys.len();
        for key in window_keys {
            self.windows.remove(&key);
        }
        for key in block_keys {
            self.blocks.remove(&key);
        }

        self.audit.audit_event(
            AuditEvent::new("ratelimit.reset_all", "rate_limiter", true)
                .with_actor(identifier)
                .with_details(json!({ "reason": reason, "windows_cleared": cleared })),
        );
        Ok(cleared)
    }

    /// Unexpired block for the pair, dropping an expired one lazily
    fn active_block(&self, key: &PairKey, now: SystemTime) -> Option<SystemTime> {
        let expired = {
            match self.blocks.get(key) {
                Some(block) if now < block.blocked_until => return Some(block.blocked_until),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.blocks.remove(key);
        }
        None
    }

    fn deny_exhausted(
        &self,
        key: &PairKey,
        rule: &RateLimitRule,
        now: SystemTime,
        window_end: SystemTime,
    ) -> RateLimitDecision {
        let (retry_after, reset_at) = match rule.block_duration {
            Some(duration) => {
                let blocked_until = now + duration;
                self.blocks.insert(
                    key.clone(),
                    Block {
                        blocked_until,
                        reason: format!("exceeded {} requests for {}", rule.max_requests, key.action),
                    },
                );
                (duration, blocked_until)
            }
            None => (
                window_end.duration_since(now).unwrap_or(Duration::ZERO),
                window_end,
            ),
        };

        self.audit.security_event(
            SecurityEvent::new(SecurityEventKind::RateLimitExceeded, AuditSeverity::High)
                .with_actor(&key.identifier)
                .with_details(json!({
                    "action": key.action,
                    "max_requests": rule.max_requests,
                    "blocked": rule.block_duration.is_some(),
                    "retry_after_secs": retry_after.as_secs(),
                })),
        );

        RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset_at,
            retry_after: Some(retry_after),
        }
    }
}
