/*!
 * Contextual Checks
 * The five checks the dynamic pipeline runs, in its fixed order
 *
 * Each check either hard-denies, raises a named soft flag, or passes. A
 * missing context field degrades the check to a soft flag; it is never a
 * hard error.
 */

use crate::audit::ActivitySummary;
use crate::core::config::AuthorizerConfig;
use crate::core::errors::StoreError;
use crate::core::types::{PermissionContext, PermissionSet, RoleSet};
use crate::store::OwnershipResolver;
use time::OffsetDateTime;

/// One check's contribution to the decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CheckOutcome {
    Pass,
    Flag { restriction: String, weight: u8 },
    Deny { reason: String },
}

impl CheckOutcome {
    fn flag(restriction: impl Into<String>, weight: u8) -> Self {
        CheckOutcome::Flag {
            restriction: restriction.into(),
            weight,
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        CheckOutcome::Deny {
            reason: reason.into(),
        }
    }
}

/// Ownership: non-owners are denied unless exempted by an elevated role, or
/// reading with a manager-tier role at a logged override
///
/// Resources without an owner (system-level, or no instance id in context)
/// always pass. A missing resource is a denial, not an error; only store
/// unavailability propagates (the pipeline fails closed on it).
pub(crate) fn ownership(
    resolver: &dyn OwnershipResolver,
    config: &AuthorizerConfig,
    ctx: &PermissionContext,
    roles: &RoleSet,
) -> Result<CheckOutcome, StoreError> {
    let Some(resource_id) = ctx.resource_id.as_deref() else {
        return Ok(CheckOutcome::Pass);
    };

    let owner = match resolver.owner_of(&ctx.resource, resource_id) {
        Ok(owner) => owner,
        Err(StoreError::NotFound { .. }) => {
            return Ok(CheckOutcome::deny(format!(
                "{}/{resource_id} not found",
                ctx.resource
            )));
        }
        Err(err) => return Err(err),
    };

    match owner {
        None => Ok(CheckOutcome::Pass),
        Some(owner) if owner == ctx.actor_id => Ok(CheckOutcome::Pass),
        Some(_) if roles.intersects(&config.elevated_roles) => Ok(CheckOutcome::Pass),
        Some(_) if config.is_read_action(&ctx.action) && roles.intersects(&config.manager_roles) => {
            Ok(CheckOutcome::flag(
                "ownership override: manager-tier read of another actor's resource",
                config.weights.ownership_override,
            ))
        }
        Some(_) => Ok(CheckOutcome::deny("actor does not own the resource")),
    }
}

/// Time of day: outside the weekday business-hours window, only 24/7 roles,
/// exempt actions, or (with a flag) critical actions proceed
pub(crate) fn time_of_day(
    config: &AuthorizerConfig,
    ctx: &PermissionContext,
    roles: &RoleSet,
) -> CheckOutcome {
    let at = OffsetDateTime::from(ctx.timestamp);
    let in_hours = config.business_hours.is_business_day(at.weekday())
        && config.business_hours.contains_hour(at.hour());

    if in_hours {
        return CheckOutcome::Pass;
    }
    if roles.intersects(&config.around_clock_roles) {
        return CheckOutcome::Pass;
    }
    let qualified = ctx.qualified_action();
    if config.time_exempt_actions.contains(&qualified) {
        return CheckOutcome::Pass;
    }
    if config.critical_actions.contains(&qualified) {
        return CheckOutcome::flag(
            "critical action outside business hours",
            config.weights.after_hours_critical,
        );
    }
    CheckOutcome::deny("action attempted outside business hours")
}

/// Network: untrusted addresses raise risk, and deny outright when the actor
/// holds no remote-access grant
///
/// The untrusted-network flag is registered before the denial so a denied
/// decision still carries the signal in its restrictions.
pub(crate) fn network(
    config: &AuthorizerConfig,
    ctx: &PermissionContext,
    permissions: &PermissionSet,
) -> Vec<CheckOutcome> {
    let Some(ip) = ctx.ip_address else {
        return vec![CheckOutcome::flag(
            "network address missing from context",
            config.weights.missing_context,
        )];
    };

    if config.is_trusted_address(ip) {
        return Vec::new();
    }
    let mut outcomes = vec![CheckOutcome::flag(
        "request from outside trusted network ranges",
        config.weights.untrusted_network,
    )];
    if !permissions.contains(&config.remote_access_code) {
        outcomes.push(CheckOutcome::deny(
            "untrusted network and no remote-access grant",
        ));
    }
    outcomes
}

const AUTOMATED_MARKERS: &[&str] = &[
    "bot", "crawler", "spider", "curl", "wget", "python", "script", "headless", "scraper",
];

const BROWSER_MARKERS: &[&str] = &["mozilla", "chrome", "safari", "firefox", "edg", "opera"];

const MOBILE_MARKERS: &[&str] = &["mobile", "android", "iphone", "ipad"];

/// Device trust: never denies, only raises risk for automated-looking or
/// unrecognized client signatures
pub(crate) fn device_trust(config: &AuthorizerConfig, ctx: &PermissionContext) -> CheckOutcome {
    let Some(user_agent) = ctx.user_agent.as_deref() else {
        return CheckOutcome::flag(
            "client signature missing from context",
            config.weights.missing_context,
        );
    };

    let ua = user_agent.to_ascii_lowercase();
    if AUTOMATED_MARKERS.iter().any(|m| ua.contains(m)) {
        return CheckOutcome::flag(
            "client signature looks automated",
            config.weights.automated_client,
        );
    }
    let recognized = BROWSER_MARKERS.iter().any(|m| ua.contains(m))
        || MOBILE_MARKERS.iter().any(|m| ua.contains(m));
    if recognized {
        return CheckOutcome::Pass;
    }
    CheckOutcome::flag(
        "unrecognized client signature",
        config.weights.unknown_device,
    )
}

/// Anomaly: never denies, raises risk per exceeded behavioral threshold
pub(crate) fn anomaly(config: &AuthorizerConfig, summary: &ActivitySummary) -> Vec<CheckOutcome> {
    let thresholds = &config.anomaly;
    let mut outcomes = Vec::new();

    if summary.total_events > thresholds.max_events_per_window {
        outcomes.push(CheckOutcome::flag(
            format!(
                "high-frequency activity: {} recent events",
                summary.total_events
            ),
            config.weights.high_frequency,
        ));
    }
    if summary.distinct_addresses > thresholds.max_distinct_addresses {
        outcomes.push(CheckOutcome::flag(
            format!(
                "activity from {} distinct addresses",
                summary.distinct_addresses
            ),
            config.weights.multi_location,
        ));
    }
    if summary.failures > thresholds.max_failures {
        outcomes.push(CheckOutcome::flag(
            format!("{} recent failures", summary.failures),
            config.weights.repeated_failures,
        ));
    }

    outcomes
}
