/*!
 * Dynamic Authorization
 * Context-sensitive evaluation layered on top of static permission grants
 *
 * The pipeline runs a fixed sequence of checks (ownership, time of day,
 * network, device trust, behavioral anomaly). A hard deny short-circuits;
 * soft flags accumulate named restrictions and add their risk weight. Any
 * internal failure during evaluation produces a denial, never a grant.
 */

mod checks;

use crate::audit::{
    ActivityRecord, ActivityTracker, AuditEvent, AuditSeverity, AuditSink, SecurityEvent,
    SecurityEventKind,
};
use crate::cache::PermissionCache;
use crate::core::clock::Clock;
use crate::core::config::AuthorizerConfig;
use crate::core::errors::{require_non_empty, AuthResult};
use crate::core::limits::MAX_RISK_SCORE;
use crate::core::types::{DynamicDecision, PermissionContext};
use crate::store::OwnershipResolver;
use checks::CheckOutcome;
use log::{debug, error};
use serde_json::json;
use std::sync::Arc;

/// Risk and restrictions gathered as the pipeline advances
#[derive(Default)]
struct Accumulator {
    restrictions: Vec<String>,
    risk: u32,
}

impl Accumulator {
    /// Fold one outcome in; a deny yields the final decision immediately
    fn apply(&mut self, outcome: CheckOutcome) -> Option<DynamicDecision> {
        match outcome {
            CheckOutcome::Pass => None,
            CheckOutcome::Flag {
                restriction,
                weight,
            } => {
                self.restrictions.push(restriction);
                self.risk += u32::from(weight);
                None
            }
            CheckOutcome::Deny { reason } => Some(DynamicDecision::denied(
                reason,
                std::mem::take(&mut self.restrictions),
                self.score(),
            )),
        }
    }

    fn score(&self) -> u8 {
        self.risk.min(u32::from(MAX_RISK_SCORE)) as u8
    }
}

/// Context-sensitive authorizer
///
/// Reads effective grants through the cache, resolves resource ownership
/// through the store, and consults per-actor activity history. Every
/// evaluation emits exactly one audit event; high-risk outcomes additionally
/// raise a security event.
pub struct DynamicAuthorizer {
    cache: Arc<PermissionCache>,
    ownership: Arc<dyn OwnershipResolver>,
    activity: Arc<ActivityTracker>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    config: AuthorizerConfig,
}

impl DynamicAuthorizer {
    pub fn new(
        cache: Arc<PermissionCache>,
        ownership: Arc<dyn OwnershipResolver>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self::with_config(cache, ownership, audit, AuthorizerConfig::default())
    }

    pub fn with_config(
        cache: Arc<PermissionCache>,
        ownership: Arc<dyn OwnershipResolver>,
        audit: Arc<dyn AuditSink>,
        config: AuthorizerConfig,
    ) -> Self {
        let clock = cache.clock();
        Self {
            cache,
            ownership,
            activity: Arc::new(ActivityTracker::new()),
            audit,
            clock,
            config,
        }
    }

    pub fn with_activity(mut self, activity: Arc<ActivityTracker>) -> Self {
        self.activity = activity;
        self
    }

    /// Evaluate the contextual pipeline for one request
    ///
    /// `has_static_permission` is the outcome of the static grant check the
    /// caller already performed; without it the evaluation is a denial
    /// before any contextual check runs. Errors surface only for invalid
    /// input; internal failures are converted into a fail-closed denial.
    pub fn evaluate(
        &self,
        ctx: &PermissionContext,
        has_static_permission: bool,
    ) -> AuthResult<DynamicDecision> {
        require_non_empty(&ctx.actor_id, "actor_id")?;
        require_non_empty(&ctx.resource, "resource")?;
        require_non_empty(&ctx.action, "action")?;

        let decision = match self.run_pipeline(ctx, has_static_permission) {
            Ok(decision) => decision,
            Err(err) => {
                error!(
                    "authorization evaluation failed for {} on {}:{}: {err}",
                    ctx.actor_id, ctx.resource, ctx.action
                );
                self.audit.security_event(
                    SecurityEvent::new(
                        SecurityEventKind::EvaluationFailed,
                        AuditSeverity::Critical,
                    )
                    .with_actor(&ctx.actor_id)
                    .with_details(json!({
                        "resource": ctx.resource,
                        "action": ctx.action,
                        "error": err.to_string(),
                    })),
                );
                DynamicDecision::denied(
                    "authorization evaluation failed",
                    Vec::new(),
                    MAX_RISK_SCORE,
                )
            }
        };

        self.finish(ctx, &decision);
        Ok(decision)
    }

    fn run_pipeline(
        &self,
        ctx: &PermissionContext,
        has_static_permission: bool,
    ) -> AuthResult<DynamicDecision> {
        if !has_static_permission {
            return Ok(DynamicDecision::denied(
                "required permission not held",
                Vec::new(),
                0,
            ));
        }

        let roles = self.cache.get_roles(&ctx.actor_id)?;
        let permissions = self.cache.get_permissions(&ctx.actor_id)?;

        let mut acc = Accumulator::default();

        let outcome = checks::ownership(self.ownership.as_ref(), &self.config, ctx, &roles)?;
        if let Some(denied) = acc.apply(outcome) {
            return Ok(denied);
        }
        if let Some(denied) = acc.apply(checks::time_of_day(&self.config, ctx, &roles)) {
            return Ok(denied);
        }
        for outcome in checks::network(&self.config, ctx, &permissions) {
            if let Some(denied) = acc.apply(outcome) {
                return Ok(denied);
            }
        }
        if let Some(denied) = acc.apply(checks::device_trust(&self.config, ctx)) {
            return Ok(denied);
        }
        let summary = self.activity.summary(&ctx.actor_id, self.clock.now());
        for outcome in checks::anomaly(&self.config, &summary) {
            if let Some(denied) = acc.apply(outcome) {
                return Ok(denied);
            }
        }

        let score = acc.score();
        debug!(
            "granted {} on {}:{} (risk {score}, {} restriction(s))",
            ctx.actor_id,
            ctx.resource,
            ctx.action,
            acc.restrictions.len()
        );
        Ok(DynamicDecision::granted(
            "all contextual checks passed",
            acc.restrictions,
            score,
        ))
    }

    /// Record the evaluation and emit its audit trail
    fn finish(&self, ctx: &PermissionContext, decision: &DynamicDecision) {
        self.activity.record(
            &ctx.actor_id,
            ActivityRecord {
                timestamp: self.clock.now(),
                ip_address: ctx.ip_address,
                success: decision.granted,
            },
        );

        let mut event = AuditEvent::new(&ctx.action, &ctx.resource, decision.granted)
            .with_actor(&ctx.actor_id)
            .with_details(json!({
                "reason": decision.reason,
                "risk_score": decision.risk_score,
                "restrictions": decision.restrictions,
            }));
        if let Some(resource_id) = &ctx.resource_id {
            event = event.with_resource_id(resource_id);
        }
        self.audit.audit_event(event);

        if decision.risk_score > self.config.high_risk_threshold {
            let mut event = SecurityEvent::new(
                SecurityEventKind::HighRiskAccess,
                AuditSeverity::High,
            )
            .with_actor(&ctx.actor_id)
            .with_details(json!({
                "resource": ctx.resource,
                "action": ctx.action,
                "granted": decision.granted,
                "risk_score": decision.risk_score,
                "restrictions": decision.restrictions,
            }));
            if let Some(ip) = ctx.ip_address {
                event = event.with_ip(ip);
            }
            if let Some(user_agent) = &ctx.user_agent {
                event = event.with_user_agent(user_agent);
            }
            self.audit.security_event(event);
        }
    }
}
