//! Principal resolution and access control.
//!
//! The acting principal is passed explicitly through the service call chain;
//! there is no ambient (thread-local) security context. Permission checks go
//! through the `AccessController` trait so callers can plug in their own
//! policy engine.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The identity on whose behalf a service operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal name (user name or system account)
    pub name: String,

    /// Groups the principal belongs to
    #[serde(default)]
    pub groups: Vec<String>,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
        }
    }

    pub fn with_groups(name: impl Into<String>, groups: Vec<String>) -> Self {
        Self {
            name: name.into(),
            groups,
        }
    }

    /// The internal service account used for reads that must bypass
    /// caller-level permission checks (change detection, repair passes).
    pub fn service() -> Self {
        Self::new("service")
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Actions that can be checked against the template resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TemplateAction {
    /// Read registered templates
    AccessTemplates,
    /// Register, update, delete and reorder templates
    EditTemplates,
    /// Enable and disable templates
    AdminTemplates,
    /// Change role memberships on a template entity
    ChangePermissions,
}

impl TemplateAction {
    pub fn system_name(&self) -> &'static str {
        match self {
            TemplateAction::AccessTemplates => "accessTemplates",
            TemplateAction::EditTemplates => "editTemplates",
            TemplateAction::AdminTemplates => "adminTemplates",
            TemplateAction::ChangePermissions => "changePermissions",
        }
    }
}

impl std::fmt::Display for TemplateAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.system_name())
    }
}

/// How a role membership change is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipAction {
    Add,
    Remove,
    Replace,
}

/// A requested change to the role memberships of a template entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleMembershipChange {
    /// Role name the change applies to
    pub role: String,

    /// How the listed members are applied
    pub action: MembershipAction,

    /// User members
    #[serde(default)]
    pub users: Vec<String>,

    /// Group members
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Access-control error type
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("principal `{principal}` is not permitted to perform `{action}`")]
    Denied {
        principal: String,
        action: TemplateAction,
    },
}

/// Permission checks and role-membership updates.
///
/// A denial is an error, not a boolean: callers use `?` and let the denial
/// abort the enclosing transaction.
#[async_trait]
pub trait AccessController: Send + Sync {
    /// Check that the principal may perform the given action on the
    /// template resource.
    async fn check_permission(
        &self,
        principal: &Principal,
        action: TemplateAction,
    ) -> Result<(), AccessError>;

    /// Whether per-entity access control is enabled. When disabled, role
    /// membership changes carried on a template are ignored.
    fn is_entity_access_controlled(&self) -> bool;

    /// Apply a role membership change to a template entity.
    async fn update_role_memberships(
        &self,
        template_id: &str,
        change: &RoleMembershipChange,
    ) -> Result<(), AccessError>;
}

/// Access controller that permits every action.
///
/// Intended for embedding contexts that enforce permissions upstream, and
/// for tests. Membership changes are recorded so tests can observe them.
pub struct AllowAllAccessController {
    entity_access_control: bool,
    membership_changes: Mutex<Vec<(String, RoleMembershipChange)>>,
}

impl AllowAllAccessController {
    pub fn new() -> Self {
        Self {
            entity_access_control: false,
            membership_changes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_entity_access_control() -> Self {
        Self {
            entity_access_control: true,
            membership_changes: Mutex::new(Vec::new()),
        }
    }

    /// Membership changes applied so far, in application order.
    pub fn recorded_membership_changes(&self) -> Vec<(String, RoleMembershipChange)> {
        self.membership_changes.lock().unwrap().clone()
    }
}

impl Default for AllowAllAccessController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccessController for AllowAllAccessController {
    async fn check_permission(
        &self,
        _principal: &Principal,
        _action: TemplateAction,
    ) -> Result<(), AccessError> {
        Ok(())
    }

    fn is_entity_access_controlled(&self) -> bool {
        self.entity_access_control
    }

    async fn update_role_memberships(
        &self,
        template_id: &str,
        change: &RoleMembershipChange,
    ) -> Result<(), AccessError> {
        tracing::debug!(
            template_id = %template_id,
            role = %change.role,
            action = ?change.action,
            "Recording role membership change"
        );
        self.membership_changes
            .lock()
            .unwrap()
            .push((template_id.to_string(), change.clone()));
        Ok(())
    }
}

/// Access controller with a static group-to-action grant table.
pub struct StaticAccessController {
    grants: HashMap<String, HashSet<TemplateAction>>,
    entity_access_control: bool,
}

impl StaticAccessController {
    pub fn new(grants: HashMap<String, HashSet<TemplateAction>>) -> Self {
        Self {
            grants,
            entity_access_control: false,
        }
    }

    fn is_granted(&self, principal: &Principal, action: TemplateAction) -> bool {
        principal
            .groups
            .iter()
            .any(|group| self.grants.get(group).is_some_and(|a| a.contains(&action)))
    }
}

#[async_trait]
impl AccessController for StaticAccessController {
    async fn check_permission(
        &self,
        principal: &Principal,
        action: TemplateAction,
    ) -> Result<(), AccessError> {
        if self.is_granted(principal, action) {
            Ok(())
        } else {
            tracing::warn!(
                principal = %principal,
                action = %action,
                "Permission denied"
            );
            Err(AccessError::Denied {
                principal: principal.name.clone(),
                action,
            })
        }
    }

    fn is_entity_access_controlled(&self) -> bool {
        self.entity_access_control
    }

    async fn update_role_memberships(
        &self,
        _template_id: &str,
        _change: &RoleMembershipChange,
    ) -> Result<(), AccessError> {
        Ok(())
    }
}
