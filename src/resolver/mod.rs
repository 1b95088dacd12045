/*!
 * Capability Resolver
 * Filters capabilities by role and namespace, then resolves the
 * permission sets they grant per target
 */

use crate::bundle::{Bundle, Capability, Relation};
use crate::conditions::{self, ConditionContext};
use crate::core::errors::ConditionError;
use crate::core::types::{Attributes, Context, Namespace, PolicyObject, Target, TargetPermissions};

/// The actor's roles as `"app:namespace:name"` strings, context
/// suffixes stripped.
pub fn extract_roles(actor: &PolicyObject) -> Vec<String> {
    actor.roles.iter().map(|role| role.qualified_name()).collect()
}

/// The actor's roles split into the role part and the serialized
/// context segment, as conditions consume them.
fn role_pairs(actor: &PolicyObject) -> Vec<(String, Option<String>)> {
    actor
        .roles
        .iter()
        .map(|role| {
            (
                role.qualified_name(),
                role.context.as_ref().map(|c| c.to_string()),
            )
        })
        .collect()
}

/// Capabilities attached to one of the actor's roles, optionally
/// narrowed to the given namespaces.
pub fn capabilities_for(
    bundle: &Bundle,
    actor_roles: &[String],
    namespaces: &[Namespace],
) -> Vec<Capability> {
    bundle
        .capabilities
        .iter()
        .filter(|cap| actor_roles.iter().any(|role| *role == cap.role))
        .filter(|cap| {
            namespaces.is_empty()
                || namespaces.iter().any(|ns| {
                    cap.fullname
                        .starts_with(&format!("{}:{}:", ns.app_name, ns.name))
                })
        })
        .cloned()
        .collect()
}

/// Resolve the permission set each target is granted under the given
/// capabilities.
///
/// A target with neither side set is evaluated as a pair of empty
/// objects, so conditions that only inspect the actor still apply.
/// Permission sets are unions, so the outcome does not depend on
/// capability order.
pub fn resolve(
    actor: &PolicyObject,
    targets: &[Target],
    contexts: &[Context],
    namespaces: &[Namespace],
    extra_args: &Attributes,
    capabilities: &[Capability],
) -> Result<Vec<TargetPermissions>, ConditionError> {
    let actor_role = role_pairs(actor);
    let empty = Target::empty();

    let mut target_permissions = Vec::with_capacity(targets.len());
    for target in targets {
        let target = if target.is_unset() { &empty } else { target };
        let ctx = ConditionContext {
            actor,
            actor_role: &actor_role,
            target,
            contexts,
            namespaces,
            extra_args,
        };
        let mut result = TargetPermissions {
            target_id: target.id().to_string(),
            permissions: Default::default(),
        };
        for capability in capabilities {
            if grants(capability, &ctx)? {
                result
                    .permissions
                    .extend(capability.permissions.iter().cloned());
            }
        }
        target_permissions.push(result);
    }
    Ok(target_permissions)
}

/// Whether a capability's conditions hold under its relation. A
/// capability without conditions always grants.
fn grants(
    capability: &Capability,
    ctx: &ConditionContext<'_>,
) -> Result<bool, ConditionError> {
    if capability.conditions.is_empty() {
        return Ok(true);
    }
    for condition in &capability.conditions {
        let holds = conditions::evaluate(&condition.name, &condition.params, ctx)?;
        match capability.relation {
            Relation::And if !holds => return Ok(false),
            Relation::Or if holds => return Ok(true),
            _ => {}
        }
    }
    Ok(capability.relation == Relation::And)
}
