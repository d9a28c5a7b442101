/*!
 * Audit Emission
 * Structured security/audit events emitted to an external sink
 *
 * Emission is fire-and-forget: a sink must never fail or delay the decision
 * that produced the event, so the trait is infallible and implementations
 * swallow their own errors.
 */

pub mod activity;

pub use activity::{ActivityRecord, ActivitySummary, ActivityTracker};

use crate::core::limits::MAX_AUDIT_EVENTS;
use log::{info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampSeconds};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::SystemTime;
use uuid::Uuid;

/// Event severity for filtering and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
    High,
    Critical,
}

/// What kind of security signal fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    RateLimitExceeded,
    RequestBlocked,
    CacheCleared,
    HighRiskAccess,
    EvaluationFailed,
}

/// Security event: something worth a monitoring alert
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SecurityEvent {
    pub id: Uuid,
    pub kind: SecurityEventKind,
    pub severity: AuditSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<IpAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub details: serde_json::Value,
    #[serde_as(as = "TimestampSeconds<i64>")]
    pub timestamp: SystemTime,
}

impl SecurityEvent {
    pub fn new(kind: SecurityEventKind, severity: AuditSeverity) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            severity,
            actor_id: None,
            ip_address: None,
            user_agent: None,
            details: serde_json::Value::Null,
            timestamp: SystemTime::now(),
        }
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
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

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Audit event: the who/what/outcome record of one operation
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AuditEvent {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    pub action: String,
    pub resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    pub details: serde_json::Value,
    pub success: bool,
    #[serde_as(as = "TimestampSeconds<i64>")]
    pub timestamp: SystemTime,
}

impl AuditEvent {
    pub fn new(action: impl Into<String>, resource: impl Into<String>, success: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor_id: None,
            action: action.into(),
            resource: resource.into(),
            resource_id: None,
            details: serde_json::Value::Null,
            success,
            timestamp: SystemTime::now(),
        }
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Destination for emitted events; external collaborator
pub trait AuditSink: Send + Sync {
    fn security_event(&self, event: SecurityEvent);
    fn audit_event(&self, event: AuditEvent);
}

/// Sink that writes events to the process log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl AuditSink for LogSink {
    fn security_event(&self, event: SecurityEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => match event.severity {
                AuditSeverity::Info => info!(target: "authgate::security", "{json}"),
                _ => warn!(target: "authgate::security", "{json}"),
            },
            Err(err) => warn!("failed to serialize security event: {err}"),
        }
    }

    fn audit_event(&self, event: AuditEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => info!(target: "authgate::audit", "{json}"),
            Err(err) => warn!("failed to serialize audit event: {err}"),
        }
    }
}

/// In-memory sink with bounded ring buffers, for embedding and tests
pub struct MemorySink {
    security: RwLock<VecDeque<SecurityEvent>>,
    audit: RwLock<VecDeque<AuditEvent>>,
    capacity: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::with_capacity(MAX_AUDIT_EVENTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            security: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            audit: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn recent_security(&self, limit: usize) -> Vec<SecurityEvent> {
        self.security.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn recent_audit(&self, limit: usize) -> Vec<AuditEvent> {
        self.audit.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn security_count(&self) -> usize {
        self.security.read().len()
    }

    pub fn audit_count(&self) -> usize {
        self.audit.read().len()
    }

    pub fn security_count_of(&self, kind: SecurityEventKind) -> usize {
        self.security.read().iter().filter(|e| e.kind == kind).count()
    }

    pub fn clear(&self) {
        self.security.write().clear();
        self.audit.write().clear();
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for MemorySink {
    fn security_event(&self, event: SecurityEvent) {
        let mut events = self.security.write();
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    fn audit_event(&self, event: AuditEvent) {
        let mut events = self.audit.write();
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }
}
