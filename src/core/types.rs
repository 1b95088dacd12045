/*!
 * Core Model Types
 * Namespaced values, policy objects, targets and the query/result shapes
 */

use crate::core::errors::ModelError;
use ahash::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Opaque attribute bag attached to actors and targets
pub type Attributes = HashMap<String, Value>;

/// Split an `"app:namespace:name"` triple, requiring exactly three parts.
fn split_triple(input: &str) -> Option<(&str, &str, &str)> {
    let mut parts = input.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(app), Some(ns), Some(name)) => Some((app, ns, name)),
        _ => None,
    }
}

/// A permission, identified by its `(app, namespace, name)` triple
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Permission {
    pub app_name: String,
    pub namespace_name: String,
    pub name: String,
}

impl Permission {
    pub fn new(
        app_name: impl Into<String>,
        namespace_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            namespace_name: namespace_name.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.app_name, self.namespace_name, self.name)
    }
}

impl std::str::FromStr for Permission {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (app, ns, name) = split_triple(s)
            .ok_or_else(|| ModelError::MalformedPermission(s.to_string()))?;
        Ok(Self::new(app, ns, name))
    }
}

/// A context, identified by its `(app, namespace, name)` triple
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Context {
    pub app_name: String,
    pub namespace_name: String,
    pub name: String,
}

impl Context {
    pub fn new(
        app_name: impl Into<String>,
        namespace_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            namespace_name: namespace_name.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.app_name, self.namespace_name, self.name)
    }
}

impl std::str::FromStr for Context {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (app, ns, name) =
            split_triple(s).ok_or_else(|| ModelError::MalformedRole(s.to_string()))?;
        Ok(Self::new(app, ns, name))
    }
}

/// A role, optionally scoped to a context.
///
/// Wire encoding is `"app:namespace:name"`, with an attached context
/// serialized as `"app:namespace:name&ctxapp:ctxnamespace:ctxname"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Role {
    pub app_name: String,
    pub namespace_name: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
}

impl Role {
    pub fn new(
        app_name: impl Into<String>,
        namespace_name: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            namespace_name: namespace_name.into(),
            name: name.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }

    /// The `"app:namespace:name"` string without any context suffix.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}:{}", self.app_name, self.namespace_name, self.name)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{}&{}", self.qualified_name(), context),
            None => write!(f, "{}", self.qualified_name()),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ModelError::MalformedRole(s.to_string());
        let (base, context) = match s.split_once('&') {
            Some((base, context)) => (base, Some(context)),
            None => (s, None),
        };
        let (app, ns, name) = split_triple(base).ok_or_else(malformed)?;
        let mut role = Role::new(app, ns, name);
        // A role string ending in a bare '&' carries no context.
        if let Some(context) = context.filter(|c| !c.is_empty()) {
            let (capp, cns, cname) = split_triple(context).ok_or_else(malformed)?;
            role.context = Some(Context::new(capp, cns, cname));
        }
        Ok(role)
    }
}

/// A namespace filter unit, encoded as `"app:name"`
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Namespace {
    pub app_name: String,
    pub name: String,
}

impl Namespace {
    pub fn new(app_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.app_name, self.name)
    }
}

impl std::str::FromStr for Namespace {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((app, name)) => Ok(Self::new(app, name)),
            None => Err(ModelError::MalformedNamespace(s.to_string())),
        }
    }
}

/// An actor, or one side of a target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyObject {
    pub id: String,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl PolicyObject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: Vec::new(),
            attributes: Attributes::default(),
        }
    }

    pub fn with_roles(mut self, roles: Vec<Role>) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// The canonical empty object substituted for absent target sides.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A mutation target: the object before and after the change.
///
/// Both sides absent means "no specific target" and is used when
/// computing general permissions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub old_target: Option<PolicyObject>,
    #[serde(default)]
    pub new_target: Option<PolicyObject>,
}

impl Target {
    pub fn new(old_target: Option<PolicyObject>, new_target: Option<PolicyObject>) -> Self {
        Self {
            old_target,
            new_target,
        }
    }

    /// The canonical empty target: both sides present but blank.
    pub fn empty() -> Self {
        Self {
            old_target: Some(PolicyObject::empty()),
            new_target: Some(PolicyObject::empty()),
        }
    }

    pub fn is_unset(&self) -> bool {
        self.old_target.is_none() && self.new_target.is_none()
    }

    /// Target identity: the new side's id if non-empty, else the old side's.
    pub fn id(&self) -> &str {
        self.new_target
            .as_ref()
            .map(|t| t.id.as_str())
            .filter(|id| !id.is_empty())
            .or_else(|| self.old_target.as_ref().map(|t| t.id.as_str()))
            .unwrap_or("")
    }
}

/// Permissions granted for one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPermissions {
    pub target_id: String,
    pub permissions: BTreeSet<Permission>,
}

/// Subset-check outcome for one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub target_id: String,
    pub actor_has_permissions: bool,
}

/// Query for `get_permissions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPermissionsQuery {
    pub actor: PolicyObject,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub namespaces: Vec<Namespace>,
    #[serde(default)]
    pub contexts: Vec<Context>,
    #[serde(default)]
    pub extra_args: Attributes,
    #[serde(default)]
    pub include_general_permissions: bool,
}

impl GetPermissionsQuery {
    pub fn new(actor: PolicyObject) -> Self {
        Self {
            actor,
            targets: Vec::new(),
            namespaces: Vec::new(),
            contexts: Vec::new(),
            extra_args: Attributes::default(),
            include_general_permissions: false,
        }
    }

    pub fn with_targets(mut self, targets: Vec<Target>) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_namespaces(mut self, namespaces: Vec<Namespace>) -> Self {
        self.namespaces = namespaces;
        self
    }

    pub fn with_contexts(mut self, contexts: Vec<Context>) -> Self {
        self.contexts = contexts;
        self
    }

    pub fn with_extra_args(mut self, extra_args: Attributes) -> Self {
        self.extra_args = extra_args;
        self
    }

    pub fn include_general(mut self, include: bool) -> Self {
        self.include_general_permissions = include;
        self
    }
}

/// Query for `check_permissions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckPermissionsQuery {
    pub actor: PolicyObject,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub namespaces: Vec<Namespace>,
    #[serde(default)]
    pub contexts: Vec<Context>,
    #[serde(default)]
    pub extra_args: Attributes,
    #[serde(default)]
    pub targeted_permissions_to_check: Vec<Permission>,
    #[serde(default)]
    pub general_permissions_to_check: Vec<Permission>,
}

impl CheckPermissionsQuery {
    pub fn new(actor: PolicyObject) -> Self {
        Self {
            actor,
            targets: Vec::new(),
            namespaces: Vec::new(),
            contexts: Vec::new(),
            extra_args: Attributes::default(),
            targeted_permissions_to_check: Vec::new(),
            general_permissions_to_check: Vec::new(),
        }
    }

    pub fn with_targets(mut self, targets: Vec<Target>) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_namespaces(mut self, namespaces: Vec<Namespace>) -> Self {
        self.namespaces = namespaces;
        self
    }

    pub fn with_contexts(mut self, contexts: Vec<Context>) -> Self {
        self.contexts = contexts;
        self
    }

    pub fn with_extra_args(mut self, extra_args: Attributes) -> Self {
        self.extra_args = extra_args;
        self
    }

    pub fn with_targeted_permissions(mut self, permissions: Vec<Permission>) -> Self {
        self.targeted_permissions_to_check = permissions;
        self
    }

    pub fn with_general_permissions(mut self, permissions: Vec<Permission>) -> Self {
        self.general_permissions_to_check = permissions;
        self
    }
}

/// Result of `get_permissions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetPermissionsResult {
    pub actor_id: String,
    pub general_permissions: BTreeSet<Permission>,
    pub target_permissions: Vec<TargetPermissions>,
}

/// Result of `check_permissions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckPermissionsResult {
    pub actor_id: String,
    pub permissions_check_results: Vec<CheckResult>,
    pub actor_has_all_targeted_permissions: bool,
    pub actor_has_all_general_permissions: bool,
    pub general_permissions: BTreeSet<Permission>,
    pub target_permissions: Vec<TargetPermissions>,
}

/// Truthiness of an attribute value, matching the conventions the
/// condition predicates were written against: `null`, `false`, `0`,
/// `""`, `[]` and `{}` are all falsy.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
