/*!
 * Attribute- and role-based authorization engine.
 *
 * Capabilities loaded from an on-disk bundle attach permission sets to
 * roles, optionally guarded by conditions over the actor, the target
 * and the request context. The [`AuthorizationManager`] is the entry
 * point: it loads and caches the bundle, filters capabilities by the
 * actor's roles, and resolves or checks permissions per target.
 *
 * # Example
 *
 * ```no_run
 * use authz_engine::{AuthorizationManager, GetPermissionsQuery, PolicyObject, Role, Target};
 *
 * let manager = AuthorizationManager::new("/etc/authz/bundle");
 * let actor = PolicyObject::new("uid=fbest,dc=base")
 *     .with_roles(vec![Role::new("ucsschool", "users", "teacher")]);
 * let query = GetPermissionsQuery::new(actor)
 *     .with_targets(vec![Target::empty()])
 *     .include_general(true);
 * let result = manager.get_permissions(&query)?;
 * for granted in &result.target_permissions {
 *     println!("{}: {:?}", granted.target_id, granted.permissions);
 * }
 * # Ok::<(), authz_engine::AuthzError>(())
 * ```
 */

pub mod bundle;
pub mod cache;
pub mod conditions;
pub mod core;
pub mod dn;
pub mod lookup;
pub mod manager;
pub mod resolver;

pub use crate::core::errors::{
    AuthzError, AuthzResult, BundleError, ConditionError, DnError, LookupError, ModelError,
};
pub use crate::core::types::{
    Attributes, CheckPermissionsQuery, CheckPermissionsResult, CheckResult, Context,
    GetPermissionsQuery, GetPermissionsResult, Namespace, Permission, PolicyObject, Role, Target,
    TargetPermissions,
};
pub use bundle::{Bundle, Capability, ParametrizedCondition, Relation};
pub use cache::CacheStats;
pub use dn::{Dn, Scope};
pub use lookup::{ObjectLookup, ObjectType, PersistenceObject, StaticObjectLookup};
pub use manager::AuthorizationManager;
