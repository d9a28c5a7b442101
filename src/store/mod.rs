/*!
 * Permission Store Interface
 *
 * Read-only view of the relational source of truth for roles, grants, and
 * resource ownership. The engine never writes through these traits; it is
 * told about mutations via the cache invalidation hooks.
 */

use crate::core::errors::StoreError;
use crate::core::types::ActorId;
use ahash::RandomState;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampSeconds};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

/// One permission code attached to a role or granted directly, with optional
/// expiry. Expiry filtering is the caller's job (the cache), per contract.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PermissionGrant {
    pub code: String,
    #[serde_as(as = "Option<TimestampSeconds<i64>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<SystemTime>,
}

impl PermissionGrant {
    pub fn permanent(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            expires_at: None,
        }
    }

    pub fn expiring(code: impl Into<String>, expires_at: SystemTime) -> Self {
        Self {
            code: code.into(),
            expires_at: Some(expires_at),
        }
    }

    pub fn is_active(&self, now: SystemTime) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// A role assigned to an actor, carrying the role's permission grants
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RoleAssignment {
    pub role_id: String,
    pub role_name: String,
    #[serde_as(as = "Option<TimestampSeconds<i64>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<SystemTime>,
    pub permissions: Vec<PermissionGrant>,
}

impl RoleAssignment {
    pub fn is_active(&self, now: SystemTime) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Everything the store knows about one actor's authorization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ActorAuthorization {
    pub roles: Vec<RoleAssignment>,
    pub direct_grants: Vec<PermissionGrant>,
}

/// Relational source of truth for roles and grants
pub trait PermissionStore: Send + Sync {
    /// Load an actor's role assignments and direct grants, expiry included.
    /// Items are returned raw; the caller filters to currently-valid ones.
    fn load_authorization(&self, actor_id: &str) -> Result<ActorAuthorization, StoreError>;

    /// Every actor currently holding the role; drives invalidation fan-out
    fn actors_with_role(&self, role_id: &str) -> Result<Vec<ActorId>, StoreError>;

    /// Every role granting the permission; drives invalidation fan-out
    fn roles_with_permission(&self, permission_id: &str) -> Result<Vec<String>, StoreError>;
}

/// Resolves who owns a resource instance
///
/// `Ok(None)` means the resource has no owner concept (system-level) and the
/// ownership check passes unconditionally.
pub trait OwnershipResolver: Send + Sync {
    fn owner_of(&self, resource: &str, resource_id: &str) -> Result<Option<ActorId>, StoreError>;
}

struct StoredRole {
    name: String,
    permissions: Vec<PermissionGrant>,
}

#[derive(Clone)]
struct StoredAssignment {
    role_id: String,
    expires_at: Option<SystemTime>,
}

/// In-memory store for embedding and tests
///
/// Outages are simulated with `set_unavailable`, which makes every read
/// return `StoreError::Unavailable` until cleared.
#[derive(Default)]
pub struct MemoryStore {
    roles: DashMap<String, StoredRole, RandomState>,
    assignments: DashMap<String, Vec<StoredAssignment>, RandomState>,
    direct_grants: DashMap<String, Vec<PermissionGrant>, RandomState>,
    owners: DashMap<(String, String), ActorId, RandomState>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define (or redefine) a role and its permission codes
    pub fn define_role<I, S>(&self, role_id: impl Into<String>, name: impl Into<String>, codes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.insert(
            role_id.into(),
            StoredRole {
                name: name.into(),
                permissions: codes
                    .into_iter()
                    .map(|c| PermissionGrant::permanent(c))
                    .collect(),
            },
        );
    }

    /// Attach an expiring permission grant to an existing role
    pub fn grant_role_permission(
        &self,
        role_id: &str,
        code: impl Into<String>,
        expires_at: Option<SystemTime>,
    ) {
        if let Some(mut role) = self.roles.get_mut(role_id) {
            role.permissions.push(PermissionGrant {
                code: code.into(),
                expires_at,
            });
        }
    }

    pub fn assign_role(
        &self,
        actor_id: impl Into<String>,
        role_id: impl Into<String>,
        expires_at: Option<SystemTime>,
    ) {
        self.assignments
            .entry(actor_id.into())
            .or_default()
            .push(StoredAssignment {
                role_id: role_id.into(),
                expires_at,
            });
    }

    pub fn grant_direct(
        &self,
        actor_id: impl Into<String>,
        code: impl Into<String>,
        expires_at: Option<SystemTime>,
    ) {
        self.direct_grants
            .entry(actor_id.into())
            .or_default()
            .push(PermissionGrant {
                code: code.into(),
                expires_at,
            });
    }

    pub fn set_owner(
        &self,
        resource: impl Into<String>,
        resource_id: impl Into<String>,
        owner: impl Into<String>,
    ) {
        self.owners
            .insert((resource.into(), resource_id.into()), owner.into());
    }

    /// Simulate a store outage
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }
}

impl PermissionStore for MemoryStore {
    fn load_authorization(&self, actor_id: &str) -> Result<ActorAuthorization, StoreError> {
        self.check_available()?;

        let roles = self
            .assignments
            .get(actor_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|a| {
                        self.roles.get(&a.role_id).map(|role| RoleAssignment {
                            role_id: a.role_id.clone(),
                            role_name: role.name.clone(),
                            expires_at: a.expires_at,
                            permissions: role.permissions.clone(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let direct_grants = self
            .direct_grants
            .get(actor_id)
            .map(|g| g.clone())
            .unwrap_or_default();

        Ok(ActorAuthorization {
            roles,
            direct_grants,
        })
    }

    fn actors_with_role(&self, role_id: &str) -> Result<Vec<ActorId>, StoreError> {
        self.check_available()?;

        Ok(self
            .assignments
            .iter()
            .filter(|entry| entry.value().iter().any(|a| a.role_id == role_id))
            .map(|entry| entry.key().clone())
            .collect())
    }

    fn roles_with_permission(&self, permission_id: &str) -> Result<Vec<String>, StoreError> {
        self.check_available()?;

        Ok(self
            .roles
            .iter()
            .filter(|entry| entry.value().permissions.iter().any(|p| p.code == permission_id))
            .map(|entry| entry.key().clone())
            .collect())
    }
}

impl OwnershipResolver for MemoryStore {
    fn owner_of(&self, resource: &str, resource_id: &str) -> Result<Option<ActorId>, StoreError> {
        self.check_available()?;

        Ok(self
            .owners
            .get(&(resource.to_string(), resource_id.to_string()))
            .map(|o| o.clone()))
    }
}
