/*!
 * Authorization Manager
 * Front door tying bundle loading, capability filtering and
 * permission resolution together, with bounded caches in between
 */

use crate::bundle::{self, Bundle, Capability};
use crate::cache::{CacheStats, LruCache};
use crate::core::errors::{AuthzResult, LookupError};
use crate::core::types::{
    CheckPermissionsQuery, CheckPermissionsResult, CheckResult, GetPermissionsQuery,
    GetPermissionsResult, Namespace, Permission, PolicyObject, Target, TargetPermissions,
};
use crate::lookup::{ObjectLookup, ObjectType};
use crate::resolver;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

/// One loaded bundle is kept around; reload points elsewhere rarely.
const BUNDLE_CACHE_CAPACITY: usize = 1;
/// Filtered capability lists per (roles, namespaces) combination.
const CAPABILITY_CACHE_CAPACITY: usize = 20;

#[derive(Clone, PartialEq, Eq, Hash)]
struct CapabilityKey {
    base_path: PathBuf,
    actor_roles: Vec<String>,
    namespaces: Vec<String>,
}

/// Evaluates authorization queries against an on-disk capability
/// bundle.
///
/// Cheap to clone; clones share the caches.
#[derive(Clone)]
pub struct AuthorizationManager {
    base_path: PathBuf,
    bundle_cache: Arc<LruCache<PathBuf, Arc<Bundle>>>,
    capability_cache: Arc<LruCache<CapabilityKey, Arc<Vec<Capability>>>>,
    lookup: Option<Arc<dyn ObjectLookup>>,
}

impl AuthorizationManager {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            bundle_cache: Arc::new(LruCache::new(BUNDLE_CACHE_CAPACITY)),
            capability_cache: Arc::new(LruCache::new(CAPABILITY_CACHE_CAPACITY)),
            lookup: None,
        }
    }

    /// Attach an object store for the `*_with_lookup` flows.
    pub fn with_lookup(mut self, lookup: Arc<dyn ObjectLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Drop all cached bundle state so the next query reloads from
    /// disk.
    pub fn reload(&self) {
        log::debug!("Invalidating bundle caches for {:?}", self.base_path);
        self.bundle_cache.invalidate();
        self.capability_cache.invalidate();
    }

    pub fn bundle_cache_stats(&self) -> CacheStats {
        self.bundle_cache.stats()
    }

    pub fn capability_cache_stats(&self) -> CacheStats {
        self.capability_cache.stats()
    }

    /// The loaded bundle, from cache when possible.
    pub fn bundle(&self) -> AuthzResult<Arc<Bundle>> {
        if let Some(bundle) = self.bundle_cache.get(&self.base_path) {
            return Ok(bundle);
        }
        let bundle = Arc::new(bundle::load_bundle(&self.base_path)?);
        self.bundle_cache.insert(self.base_path.clone(), bundle.clone());
        Ok(bundle)
    }

    /// Capabilities filtered to the actor's roles and the namespace
    /// selection, from cache when possible.
    fn capabilities(
        &self,
        actor_roles: &[String],
        namespaces: &[Namespace],
    ) -> AuthzResult<Arc<Vec<Capability>>> {
        let key = CapabilityKey {
            base_path: self.base_path.clone(),
            actor_roles: actor_roles.to_vec(),
            namespaces: namespaces.iter().map(|ns| ns.to_string()).collect(),
        };
        if let Some(capabilities) = self.capability_cache.get(&key) {
            return Ok(capabilities);
        }
        let bundle = self.bundle()?;
        let capabilities = Arc::new(resolver::capabilities_for(
            &bundle,
            actor_roles,
            namespaces,
        ));
        log::debug!(
            "Filtered {} of {} capabilities for roles {:?}",
            capabilities.len(),
            bundle.capabilities.len(),
            actor_roles
        );
        self.capability_cache.insert(key, capabilities.clone());
        Ok(capabilities)
    }

    /// Resolve the permissions the actor holds on each target, plus
    /// the general permissions when requested.
    pub fn get_permissions(&self, query: &GetPermissionsQuery) -> AuthzResult<GetPermissionsResult> {
        let (general_permissions, target_permissions) = self.resolve_permissions(
            &query.actor,
            &query.targets,
            query,
            query.include_general_permissions,
        )?;
        Ok(GetPermissionsResult {
            actor_id: query.actor.id.clone(),
            general_permissions,
            target_permissions,
        })
    }

    /// Resolve permissions and test them against the requested
    /// permission sets.
    pub fn check_permissions(
        &self,
        query: &CheckPermissionsQuery,
    ) -> AuthzResult<CheckPermissionsResult> {
        self.check_resolved(&query.actor, &query.targets, query)
    }

    /// Like [`get_permissions`](Self::get_permissions), but the actor
    /// and each target's old side are first resolved through the
    /// attached object store.
    pub fn get_permissions_with_lookup(
        &self,
        query: &GetPermissionsQuery,
    ) -> AuthzResult<GetPermissionsResult> {
        let (actor, targets) = self.lookup_actor_and_targets(&query.actor, &query.targets)?;
        let (general_permissions, target_permissions) =
            self.resolve_permissions(&actor, &targets, query, query.include_general_permissions)?;
        Ok(GetPermissionsResult {
            actor_id: actor.id.clone(),
            general_permissions,
            target_permissions,
        })
    }

    /// Like [`check_permissions`](Self::check_permissions), with the
    /// same object-store resolution as
    /// [`get_permissions_with_lookup`](Self::get_permissions_with_lookup).
    pub fn check_permissions_with_lookup(
        &self,
        query: &CheckPermissionsQuery,
    ) -> AuthzResult<CheckPermissionsResult> {
        let (actor, targets) = self.lookup_actor_and_targets(&query.actor, &query.targets)?;
        self.check_resolved(&actor, &targets, query)
    }

    fn lookup_actor_and_targets(
        &self,
        actor: &PolicyObject,
        targets: &[Target],
    ) -> AuthzResult<(PolicyObject, Vec<Target>)> {
        let lookup = self.lookup.as_deref().ok_or_else(|| {
            LookupError::Persistence("No object lookup is configured.".to_string())
        })?;
        let resolve = |identifier: &str| -> AuthzResult<PolicyObject> {
            log::debug!("Resolving object {identifier:?} through the lookup port");
            let object = lookup.get_object(identifier, ObjectType::User)?;
            Ok(PolicyObject::from_persistence(object)?)
        };
        let actor = resolve(&actor.id)?;
        let targets = targets
            .iter()
            .map(|target| {
                let old_id = target
                    .old_target
                    .as_ref()
                    .map(|t| t.id.as_str())
                    .unwrap_or("");
                Ok(Target::new(
                    Some(resolve(old_id)?),
                    target.new_target.clone(),
                ))
            })
            .collect::<AuthzResult<Vec<_>>>()?;
        Ok((actor, targets))
    }

    fn resolve_permissions(
        &self,
        actor: &PolicyObject,
        targets: &[Target],
        query: &impl QueryContext,
        include_general: bool,
    ) -> AuthzResult<(BTreeSet<Permission>, Vec<TargetPermissions>)> {
        let actor_roles = resolver::extract_roles(actor);
        let capabilities = self.capabilities(&actor_roles, query.namespaces())?;

        let general_permissions = if include_general {
            let mut general = resolver::resolve(
                actor,
                &[Target::new(None, None)],
                query.contexts(),
                query.namespaces(),
                query.extra_args(),
                &capabilities,
            )?;
            general.pop().map(|tp| tp.permissions).unwrap_or_default()
        } else {
            BTreeSet::new()
        };

        let target_permissions = resolver::resolve(
            actor,
            targets,
            query.contexts(),
            query.namespaces(),
            query.extra_args(),
            &capabilities,
        )?;
        Ok((general_permissions, target_permissions))
    }

    fn check_resolved(
        &self,
        actor: &PolicyObject,
        targets: &[Target],
        query: &CheckPermissionsQuery,
    ) -> AuthzResult<CheckPermissionsResult> {
        let include_general = !query.general_permissions_to_check.is_empty();
        let (general_permissions, target_permissions) =
            self.resolve_permissions(actor, targets, query, include_general)?;

        // An empty targeted check list never passes; callers must name
        // what they are checking for.
        let mut actor_has_all_targeted_permissions = false;
        let mut permissions_check_results = Vec::new();
        if !query.targeted_permissions_to_check.is_empty() {
            actor_has_all_targeted_permissions = true;
            for target_perms in &target_permissions {
                let actor_has_permissions = query
                    .targeted_permissions_to_check
                    .iter()
                    .all(|p| target_perms.permissions.contains(p));
                if !actor_has_permissions {
                    actor_has_all_targeted_permissions = false;
                }
                permissions_check_results.push(CheckResult {
                    target_id: target_perms.target_id.clone(),
                    actor_has_permissions,
                });
            }
        }

        let actor_has_all_general_permissions = include_general
            && query
                .general_permissions_to_check
                .iter()
                .all(|p| general_permissions.contains(p));

        Ok(CheckPermissionsResult {
            actor_id: actor.id.clone(),
            permissions_check_results,
            actor_has_all_targeted_permissions,
            actor_has_all_general_permissions,
            general_permissions,
            target_permissions,
        })
    }
}

/// The request fields shared by both query types.
trait QueryContext {
    fn contexts(&self) -> &[crate::core::types::Context];
    fn namespaces(&self) -> &[Namespace];
    fn extra_args(&self) -> &crate::core::types::Attributes;
}

impl QueryContext for GetPermissionsQuery {
    fn contexts(&self) -> &[crate::core::types::Context] {
        &self.contexts
    }
    fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }
    fn extra_args(&self) -> &crate::core::types::Attributes {
        &self.extra_args
    }
}

impl QueryContext for CheckPermissionsQuery {
    fn contexts(&self) -> &[crate::core::types::Context] {
        &self.contexts
    }
    fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }
    fn extra_args(&self) -> &crate::core::types::Attributes {
        &self.extra_args
    }
}
