/*!
 * Core Types
 * Actor identity, permission sets, request context, and decisions
 */

use crate::core::limits::MAX_RISK_SCORE;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampSeconds};
use std::collections::HashSet;
use std::net::IpAddr;
use std::time::SystemTime;

/// Stable identity of an actor; owned upstream, referenced here by id only
pub type ActorId = String;

/// Wildcard permission code; satisfies every static check
pub const WILDCARD: &str = "*";

/// An actor's effective permission codes
///
/// Codes are opaque strings compared by exact match, except the wildcard
/// which short-circuits every lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PermissionSet {
    codes: HashSet<String>,
}

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: impl Into<String>) {
        self.codes.insert(code.into());
    }

    /// Exact-match lookup, with the wildcard satisfying any code
    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains(WILDCARD) || self.codes.contains(code)
    }

    pub fn contains_all<I, S>(&self, codes: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        codes.into_iter().all(|c| self.contains(c.as_ref()))
    }

    pub fn has_wildcard(&self) -> bool {
        self.codes.contains(WILDCARD)
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.codes.iter().map(String::as_str)
    }
}

impl FromIterator<String> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            codes: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<&'a str> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self {
            codes: iter.into_iter().map(String::from).collect(),
        }
    }
}

/// An actor's active role names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RoleSet {
    names: HashSet<String>,
}

impl RoleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// True when any held role appears in the given set
    pub fn intersects(&self, other: &HashSet<String>) -> bool {
        self.names.iter().any(|n| other.contains(n))
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl FromIterator<String> for RoleSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<&'a str> for RoleSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(String::from).collect(),
        }
    }
}

/// Per-request context consumed by the dynamic authorizer
///
/// Constructed fresh by the caller for every request and never persisted.
/// Optional fields degrade the corresponding check to a soft flag when absent.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PermissionContext {
    pub actor_id: ActorId,
    pub resource: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde_as(as = "TimestampSeconds<i64>")]
    pub timestamp: SystemTime,
}

impl PermissionContext {
    pub fn new(
        actor_id: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            resource: resource.into(),
            action: action.into(),
            resource_id: None,
            ip_address: None,
            user_agent: None,
            timestamp: SystemTime::now(),
        }
    }

    /// `resource:action` form, the key used by the rate table and the
    /// time-of-day action sets
    pub fn qualified_action(&self) -> String {
        format!("{}:{}", self.resource, self.action)
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip_address = Some(ip);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Outcome of one dynamic evaluation
///
/// Produced fresh per request; never cached because the context changes on
/// every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DynamicDecision {
    pub granted: bool,
    pub reason: String,
    /// Soft-flag messages in pipeline order
    pub restrictions: Vec<String>,
    /// Accumulated contextual risk, clamped to [0, 100]
    pub risk_score: u8,
}

impl DynamicDecision {
    pub fn granted(reason: impl Into<String>, restrictions: Vec<String>, risk_score: u8) -> Self {
        Self {
            granted: true,
            reason: reason.into(),
            restrictions,
            risk_score: risk_score.min(MAX_RISK_SCORE),
        }
    }

    pub fn denied(reason: impl Into<String>, restrictions: Vec<String>, risk_score: u8) -> Self {
        Self {
            granted: false,
            reason: reason.into(),
            restrictions,
            risk_score: risk_score.min(MAX_RISK_SCORE),
        }
    }

    pub fn is_granted(&self) -> bool {
        self.granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_permission_set_exact_match() {
        let set: PermissionSet = ["accounts.view", "accounts.edit"].into_iter().collect();
        assert!(set.contains("accounts.view"));
        assert!(!set.contains("accounts.delete"));
        assert!(!set.contains("accounts"));
    }

    #[test]
    fn test_wildcard_satisfies_everything() {
        let set: PermissionSet = [WILDCARD, "calls.view"].into_iter().collect();
        assert!(set.has_wildcard());
        assert!(set.contains("anything.at.all"));
        assert!(set.contains_all(["a", "b", "c"]));
    }

    #[test]
    fn test_contains_all() {
        let set: PermissionSet = ["a", "b"].into_iter().collect();
        assert!(set.contains_all(["a", "b"]));
        assert!(!set.contains_all(["a", "c"]));
        assert!(set.contains_all(Vec::<&str>::new()));
    }

    #[test]
    fn test_role_set_intersects() {
        let roles: RoleSet = ["Agent", "Manager"].into_iter().collect();
        let elevated: HashSet<String> = ["Admin".to_string()].into_iter().collect();
        let managers: HashSet<String> = ["Manager".to_string()].into_iter().collect();
        assert!(!roles.intersects(&elevated));
        assert!(roles.intersects(&managers));
    }

    #[test]
    fn test_context_builder() {
        let ctx = PermissionContext::new("u1", "leads", "edit")
            .with_resource_id("lead-7")
            .with_ip("10.1.2.3".parse().unwrap())
            .with_user_agent("Mozilla/5.0");

        assert_eq!(ctx.actor_id, "u1");
        assert_eq!(ctx.resource_id.as_deref(), Some("lead-7"));
        assert!(ctx.ip_address.is_some());
        assert_eq!(ctx.qualified_action(), "leads:edit");
    }

    #[test]
    fn test_decision_risk_clamped() {
        let decision = DynamicDecision::denied("too risky", vec![], 250);
        assert_eq!(decision.risk_score, 100);
        assert!(!decision.is_granted());
    }
}
