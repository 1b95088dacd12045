/*!
 * Error Types
 * Centralized error handling with thiserror and miette
 */

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for engine operations
pub type AuthzResult<T> = Result<T, AuthzError>;

/// Errors from parsing wire-encoded model values
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ModelError {
    #[error("Malformed role string: {0:?}")]
    #[diagnostic(
        code(authz::model::malformed_role),
        help("Roles are encoded as 'app:namespace:name', optionally suffixed '&app:namespace:name' for a context.")
    )]
    MalformedRole(String),

    #[error("Malformed permission string: {0:?}")]
    #[diagnostic(
        code(authz::model::malformed_permission),
        help("Permissions are encoded as 'app:namespace:name'.")
    )]
    MalformedPermission(String),

    #[error("Malformed namespace string: {0:?}")]
    #[diagnostic(
        code(authz::model::malformed_namespace),
        help("Namespaces are encoded as 'app:name'.")
    )]
    MalformedNamespace(String),
}

/// Errors from parsing distinguished names
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum DnError {
    #[error("Invalid distinguished name {input:?}: {reason}")]
    #[diagnostic(
        code(authz::dn::invalid),
        help("Distinguished names are comma-separated 'attribute=value' components.")
    )]
    Invalid { input: String, reason: &'static str },
}

/// Errors from condition evaluation
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ConditionError {
    #[error("Unknown condition: {name:?}")]
    #[diagnostic(
        code(authz::condition::unknown),
        help("Condition names must be one of the built-in predicates.")
    )]
    UnknownCondition { name: String },

    #[error("Unsupported scope: {scope:?}")]
    #[diagnostic(
        code(authz::condition::unsupported_scope),
        help("Supported scopes are 'base', 'one' and 'subtree'.")
    )]
    UnsupportedScope { scope: String },

    #[error("Condition {condition:?} is missing required parameter {parameter:?}")]
    #[diagnostic(
        code(authz::condition::missing_parameter),
        help("Check the capability definition in the bundle for this condition.")
    )]
    MissingParameter {
        condition: &'static str,
        parameter: &'static str,
    },

    #[error("Invalid regular expression {pattern:?}: {reason}")]
    #[diagnostic(
        code(authz::condition::invalid_pattern),
        help("The 'values' of a regex comparison must be valid regular expressions.")
    )]
    InvalidPattern { pattern: String, reason: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Dn(#[from] DnError),
}

/// Errors from loading the capability bundle from disk
#[derive(Error, Debug, Diagnostic)]
pub enum BundleError {
    #[error("Failed to read bundle file {path:?}")]
    #[diagnostic(
        code(authz::bundle::io),
        help("Check that the bundle directory exists and is readable.")
    )]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed bundle file {path:?}")]
    #[diagnostic(
        code(authz::bundle::malformed),
        help("Bundle files must be JSON objects matching the capability/permission/role schema.")
    )]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Bundle file {path:?} is not nested under app and namespace directories")]
    #[diagnostic(
        code(authz::bundle::layout),
        help("Bundle files live at '<tree>/<app>/<namespace>/<file>.json'.")
    )]
    Layout { path: PathBuf },
}

/// Errors from the external object-lookup collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum LookupError {
    #[error("Could not find object of type '{object_type}' with identifier '{identifier}'.")]
    #[diagnostic(
        code(authz::lookup::object_not_found),
        help("The actor or target identifier does not resolve to a stored object.")
    )]
    ObjectNotFound {
        object_type: String,
        identifier: String,
    },

    #[error("Persistence error: {0}")]
    #[diagnostic(
        code(authz::lookup::persistence),
        help("The external data store failed or returned malformed data.")
    )]
    Persistence(String),
}

/// Top-level engine error, aggregating the per-concern taxonomies
#[derive(Error, Debug, Diagnostic)]
pub enum AuthzError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Condition(#[from] ConditionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Lookup(#[from] LookupError),
}

impl From<DnError> for AuthzError {
    fn from(err: DnError) -> Self {
        AuthzError::Condition(ConditionError::Dn(err))
    }
}
