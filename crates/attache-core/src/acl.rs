//! Access-control consultation points.
//!
//! The upload core never decides permissions itself; it asks an [`AccessControl`]
//! implementation. [`PolicyAccessControl`] is a static, JSON-configured implementation suitable
//! for running the service behind an authenticating proxy.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const ANY_ENTITY: &str = "*";

/// The caller on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorContext {
    pub id: String,
    pub is_admin: bool,
}

impl ActorContext {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_admin: false,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_admin: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Edit,
}

#[async_trait]
pub trait AccessControl: Send + Sync {
    async fn has_capability(&self, actor: &ActorContext, entity_type: &str, action: Action)
        -> bool;

    /// Fields of `entity_type` the actor may not touch with `action`.
    async fn forbidden_fields(
        &self,
        actor: &ActorContext,
        entity_type: &str,
        action: Action,
    ) -> HashSet<String>;
}

/// Capabilities granted to one actor (or to everyone, as the default).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorPolicy {
    /// Entity type (or `*`) to granted actions.
    #[serde(default)]
    pub capabilities: HashMap<String, HashSet<Action>>,
    /// Entity type to action to forbidden field names.
    #[serde(default)]
    pub forbidden_fields: HashMap<String, HashMap<Action, HashSet<String>>>,
}

impl ActorPolicy {
    fn allows(&self, entity_type: &str, action: Action) -> bool {
        [entity_type, ANY_ENTITY].iter().any(|key| {
            self.capabilities
                .get(*key)
                .is_some_and(|actions| actions.contains(&action))
        })
    }
}

/// Static access policy document.
///
/// ```json
/// {
///   "default": { "capabilities": { "Attachment": ["create", "read"], "Account": ["edit"] } },
///   "actors": { "42": { "forbiddenFields": { "Account": { "edit": ["logo"] } } } }
/// }
/// ```
///
/// A per-actor entry replaces the default for that actor. Administrators are granted every
/// capability and have no forbidden fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    #[serde(default)]
    pub default: ActorPolicy,
    #[serde(default)]
    pub actors: HashMap<String, ActorPolicy>,
}

impl AccessPolicy {
    /// Every actor may create, read and edit everything.
    pub fn allow_all() -> Self {
        let actions: HashSet<Action> = [Action::Create, Action::Read, Action::Edit].into();
        Self {
            default: ActorPolicy {
                capabilities: HashMap::from([(ANY_ENTITY.to_string(), actions)]),
                forbidden_fields: HashMap::new(),
            },
            actors: HashMap::new(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read access policy from {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Invalid access policy JSON in {}", path.display()))
    }

    fn for_actor(&self, actor: &ActorContext) -> &ActorPolicy {
        self.actors.get(&actor.id).unwrap_or(&self.default)
    }
}

/// [`AccessControl`] backed by an [`AccessPolicy`].
#[derive(Debug, Clone)]
pub struct PolicyAccessControl {
    policy: AccessPolicy,
}

impl PolicyAccessControl {
    pub fn new(policy: AccessPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl AccessControl for PolicyAccessControl {
    async fn has_capability(
        &self,
        actor: &ActorContext,
        entity_type: &str,
        action: Action,
    ) -> bool {
        actor.is_admin || self.policy.for_actor(actor).allows(entity_type, action)
    }

    async fn forbidden_fields(
        &self,
        actor: &ActorContext,
        entity_type: &str,
        action: Action,
    ) -> HashSet<String> {
        if actor.is_admin {
            return HashSet::new();
        }
        self.policy
            .for_actor(actor)
            .forbidden_fields
            .get(entity_type)
            .and_then(|by_action| by_action.get(&action))
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AccessPolicy {
        serde_json::from_value(serde_json::json!({
            "default": {
                "capabilities": { "Attachment": ["create", "read"], "Account": ["edit"] },
                "forbiddenFields": { "Account": { "edit": ["logo"] } }
            },
            "actors": {
                "guest": { "capabilities": { "Attachment": ["read"] } }
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_default_policy_applies_to_unknown_actor() {
        let acl = PolicyAccessControl::new(policy());
        let actor = ActorContext::user("u1");
        assert!(acl.has_capability(&actor, "Attachment", Action::Create).await);
        assert!(acl.has_capability(&actor, "Account", Action::Edit).await);
        assert!(!acl.has_capability(&actor, "Account", Action::Create).await);
        assert!(acl
            .forbidden_fields(&actor, "Account", Action::Edit)
            .await
            .contains("logo"));
    }

    #[tokio::test]
    async fn test_actor_entry_replaces_default() {
        let acl = PolicyAccessControl::new(policy());
        let guest = ActorContext::user("guest");
        assert!(!acl.has_capability(&guest, "Attachment", Action::Create).await);
        assert!(acl
            .forbidden_fields(&guest, "Account", Action::Edit)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_admin_is_unrestricted() {
        let acl = PolicyAccessControl::new(AccessPolicy::default());
        let admin = ActorContext::admin("root");
        assert!(acl.has_capability(&admin, "Lead", Action::Edit).await);
        assert!(acl
            .forbidden_fields(&admin, "Lead", Action::Edit)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_allow_all_uses_wildcard() {
        let acl = PolicyAccessControl::new(AccessPolicy::allow_all());
        let actor = ActorContext::user("anyone");
        assert!(acl.has_capability(&actor, "Opportunity", Action::Create).await);
    }
}
