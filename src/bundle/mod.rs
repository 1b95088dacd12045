/*!
 * Capability Bundle
 * Loads capabilities, permissions and roles from an on-disk tree
 */

use crate::conditions::Params;
use crate::core::errors::BundleError;
use crate::core::types::Permission;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// How a capability combines its conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Relation {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

#[derive(Debug, Clone, Deserialize)]
struct NamespacedName {
    app_name: String,
    namespace_name: String,
    name: String,
}

impl NamespacedName {
    fn fullname(&self) -> String {
        format!("{}:{}:{}", self.app_name, self.namespace_name, self.name)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ParameterFile {
    name: String,
    value: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct ConditionFile {
    app_name: String,
    namespace_name: String,
    name: String,
    #[serde(default)]
    parameters: Vec<ParameterFile>,
}

#[derive(Debug, Clone, Deserialize)]
struct CapabilityFile {
    name: String,
    role: NamespacedName,
    relation: Relation,
    #[serde(default)]
    conditions: Vec<ConditionFile>,
    #[serde(default)]
    permissions: Vec<NamespacedName>,
    #[serde(default)]
    displayname: Option<String>,
}

/// A file that only contributes its fully-qualified name, like
/// permission and role definitions.
#[derive(Debug, Clone, Deserialize)]
struct NamedFile {
    name: String,
}

/// One condition attached to a capability, with its parameters
/// resolved to a name/value map.
#[derive(Debug, Clone)]
pub struct ParametrizedCondition {
    pub name: String,
    pub params: Params,
}

/// A capability as resolved from the bundle tree
#[derive(Debug, Clone)]
pub struct Capability {
    pub name: String,
    /// `app:namespace:name`, with app and namespace taken from the
    /// file's position in the tree
    pub fullname: String,
    /// Fully-qualified role this capability attaches to
    pub role: String,
    pub relation: Relation,
    pub conditions: Vec<ParametrizedCondition>,
    pub permissions: Vec<Permission>,
    pub displayname: Option<String>,
}

/// The fully loaded bundle
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    pub capabilities: Vec<Capability>,
    /// Fully-qualified permission names known to the bundle
    pub permissions: Vec<String>,
    /// Fully-qualified role names known to the bundle
    pub roles: Vec<String>,
}

/// Load a bundle from `<base_path>/{capabilities,permissions,roles}`.
///
/// Each tree nests files as `<app>/<namespace>/<file>.json`; a missing
/// tree contributes nothing. Files are visited in path order so the
/// bundle contents are deterministic.
pub fn load_bundle(base_path: &Path) -> Result<Bundle, BundleError> {
    let mut bundle = Bundle::default();

    let capabilities_tree = base_path.join("capabilities");
    for path in json_files(&capabilities_tree) {
        let file: CapabilityFile = read_json(&path)?;
        bundle
            .capabilities
            .push(into_capability(&capabilities_tree, &path, file)?);
    }
    let permissions_tree = base_path.join("permissions");
    for path in json_files(&permissions_tree) {
        let file: NamedFile = read_json(&path)?;
        bundle
            .permissions
            .push(fullname(&permissions_tree, &path, &file.name)?);
    }
    let roles_tree = base_path.join("roles");
    for path in json_files(&roles_tree) {
        let file: NamedFile = read_json(&path)?;
        bundle.roles.push(fullname(&roles_tree, &path, &file.name)?);
    }

    log::debug!(
        "Loaded bundle from {:?}: {} capabilities, {} permissions, {} roles",
        base_path,
        bundle.capabilities.len(),
        bundle.permissions.len(),
        bundle.roles.len()
    );
    Ok(bundle)
}

fn json_files(tree: &Path) -> Vec<PathBuf> {
    if !tree.is_dir() {
        return Vec::new();
    }
    WalkDir::new(tree)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect()
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, BundleError> {
    let bytes = std::fs::read(path).map_err(|source| BundleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| BundleError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

/// `app:namespace:name` with app and namespace read off the file's
/// two parent directories. A file not nested at least two levels below
/// the tree root has no app/namespace to derive.
fn fullname(tree: &Path, path: &Path, name: &str) -> Result<String, BundleError> {
    let layout = || BundleError::Layout {
        path: path.to_path_buf(),
    };
    let relative = path.strip_prefix(tree).map_err(|_| layout())?;
    if relative.components().count() < 3 {
        return Err(layout());
    }
    let namespace = path
        .parent()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .ok_or_else(layout)?;
    let app = path
        .parent()
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .ok_or_else(layout)?;
    Ok(format!("{app}:{namespace}:{name}"))
}

fn into_capability(
    tree: &Path,
    path: &Path,
    file: CapabilityFile,
) -> Result<Capability, BundleError> {
    Ok(Capability {
        fullname: fullname(tree, path, &file.name)?,
        name: file.name,
        role: file.role.fullname(),
        relation: file.relation,
        conditions: file
            .conditions
            .into_iter()
            .map(|c| ParametrizedCondition {
                name: format!("{}:{}:{}", c.app_name, c.namespace_name, c.name),
                params: c.parameters.into_iter().map(|p| (p.name, p.value)).collect(),
            })
            .collect(),
        permissions: file
            .permissions
            .into_iter()
            .map(|p| Permission::new(p.app_name, p.namespace_name, p.name))
            .collect(),
        displayname: file.displayname,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn write_file(base: &Path, rel: &str, content: &Value) {
        let path = base.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_vec(content).unwrap()).unwrap();
    }

    fn capability_json() -> Value {
        json!({
            "name": "read_students",
            "displayname": "Read students",
            "role": {
                "app_name": "ucsschool",
                "namespace_name": "users",
                "name": "teacher"
            },
            "relation": "AND",
            "conditions": [
                {
                    "app_name": "udm",
                    "namespace_name": "conditions",
                    "name": "target_position_in",
                    "parameters": [
                        {"name": "position", "value": "cn=users,dc=base"},
                        {"name": "scope", "value": "subtree"}
                    ]
                }
            ],
            "permissions": [
                {"app_name": "ucsschool", "namespace_name": "users", "name": "read"}
            ]
        })
    }

    #[test]
    fn test_load_full_bundle() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "capabilities/ucsschool/users/cap1.json",
            &capability_json(),
        );
        write_file(
            dir.path(),
            "permissions/ucsschool/users/read.json",
            &json!({"name": "read"}),
        );
        write_file(
            dir.path(),
            "roles/ucsschool/users/teacher.json",
            &json!({"name": "teacher"}),
        );

        let bundle = load_bundle(dir.path()).unwrap();
        assert_eq!(bundle.permissions, vec!["ucsschool:users:read"]);
        assert_eq!(bundle.roles, vec!["ucsschool:users:teacher"]);

        assert_eq!(bundle.capabilities.len(), 1);
        let cap = &bundle.capabilities[0];
        assert_eq!(cap.fullname, "ucsschool:users:read_students");
        assert_eq!(cap.role, "ucsschool:users:teacher");
        assert_eq!(cap.relation, Relation::And);
        assert_eq!(cap.displayname.as_deref(), Some("Read students"));
        assert_eq!(cap.conditions.len(), 1);
        assert_eq!(cap.conditions[0].name, "udm:conditions:target_position_in");
        assert_eq!(
            cap.conditions[0].params.get("scope"),
            Some(&json!("subtree"))
        );
        assert_eq!(cap.permissions.len(), 1);
        assert_eq!(cap.permissions[0].to_string(), "ucsschool:users:read");
    }

    #[test]
    fn test_missing_trees_load_empty() {
        let dir = TempDir::new().unwrap();
        let bundle = load_bundle(dir.path()).unwrap();
        assert!(bundle.capabilities.is_empty());
        assert!(bundle.permissions.is_empty());
        assert!(bundle.roles.is_empty());
    }

    #[test]
    fn test_conditionless_capability() {
        let dir = TempDir::new().unwrap();
        write_file(
            dir.path(),
            "capabilities/app/ns/open.json",
            &json!({
                "name": "open",
                "role": {"app_name": "app", "namespace_name": "ns", "name": "user"},
                "relation": "AND",
                "permissions": [
                    {"app_name": "app", "namespace_name": "ns", "name": "use"}
                ]
            }),
        );
        let bundle = load_bundle(dir.path()).unwrap();
        assert!(bundle.capabilities[0].conditions.is_empty());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capabilities/app/ns/bad.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            load_bundle(dir.path()),
            Err(BundleError::Malformed { .. })
        ));
    }

    #[test]
    fn test_file_at_tree_root_is_a_layout_error() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "roles/orphan.json", &json!({"name": "orphan"}));
        assert!(matches!(
            load_bundle(dir.path()),
            Err(BundleError::Layout { .. })
        ));
    }

    #[test]
    fn test_non_json_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capabilities/app/ns/README.md");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"docs").unwrap();
        let bundle = load_bundle(dir.path()).unwrap();
        assert!(bundle.capabilities.is_empty());
    }

    #[test]
    fn test_files_load_in_path_order() {
        let dir = TempDir::new().unwrap();
        for name in ["b", "a", "c"] {
            write_file(
                dir.path(),
                &format!("roles/app/ns/{name}.json"),
                &json!({ "name": name }),
            );
        }
        let bundle = load_bundle(dir.path()).unwrap();
        assert_eq!(bundle.roles, vec!["app:ns:a", "app:ns:b", "app:ns:c"]);
    }
}
