/*!
 * Core Module
 * Shared model types and the error taxonomy
 */

pub mod errors;
pub mod types;

pub use errors::{
    AuthzError, AuthzResult, BundleError, ConditionError, DnError, LookupError, ModelError,
};
pub use types::{
    Attributes, CheckPermissionsQuery, CheckPermissionsResult, CheckResult, Context,
    GetPermissionsQuery, GetPermissionsResult, Namespace, Permission, PolicyObject, Role, Target,
    TargetPermissions,
};
