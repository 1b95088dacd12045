/*!
 * Object Lookup
 * Port for resolving actor and target identifiers against an external
 * data store, plus a JSON-seeded in-memory adapter
 */

use crate::core::errors::{LookupError, ModelError};
use crate::core::types::{Attributes, PolicyObject, Role};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Kinds of objects a data store can resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    User,
    Group,
    Unknown,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectType::User => "USER",
            ObjectType::Group => "GROUP",
            ObjectType::Unknown => "UNKNOWN",
        };
        write!(f, "{name}")
    }
}

/// A raw object as returned by a data store, before it becomes a
/// [`PolicyObject`]
#[derive(Debug, Clone, PartialEq)]
pub struct PersistenceObject {
    pub id: String,
    pub object_type: ObjectType,
    pub attributes: Attributes,
    /// Serialized role strings as stored on the object
    pub roles: Vec<String>,
}

/// Resolves identifiers to stored objects
pub trait ObjectLookup: Send + Sync {
    fn get_object(
        &self,
        identifier: &str,
        object_type: ObjectType,
    ) -> Result<PersistenceObject, LookupError>;
}

/// Attribute keys that carry role assignments rather than object data
const ROLE_ATTRIBUTES: [&str; 2] = ["guardianRole", "roles"];

impl PolicyObject {
    /// Convert a stored object into the evaluation model: role strings
    /// are parsed, and the attribute keys that carried them are
    /// dropped.
    pub fn from_persistence(object: PersistenceObject) -> Result<Self, ModelError> {
        let roles = object
            .roles
            .iter()
            .map(|role| role.parse::<Role>())
            .collect::<Result<Vec<_>, _>>()?;
        let mut attributes = object.attributes;
        for key in ROLE_ATTRIBUTES {
            attributes.remove(key);
        }
        Ok(Self {
            id: object.id,
            roles,
            attributes,
        })
    }
}

/// In-memory lookup seeded from a JSON document of the shape
/// `{"users": {<id>: {"attributes": {...}}}, "groups": {...}}`.
///
/// Meant for tests and development setups, not production data.
#[derive(Debug)]
pub struct StaticObjectLookup {
    users: HashMap<String, Value>,
    groups: HashMap<String, Value>,
}

impl StaticObjectLookup {
    pub fn from_file(path: &Path) -> Result<Self, LookupError> {
        let bytes = std::fs::read(path).map_err(|err| {
            LookupError::Persistence(format!("Could not read data file {path:?}: {err}"))
        })?;
        let data: Value = serde_json::from_slice(&bytes).map_err(|err| {
            LookupError::Persistence(format!("Could not parse data file {path:?}: {err}"))
        })?;
        Self::from_value(data)
    }

    pub fn from_value(data: Value) -> Result<Self, LookupError> {
        let section = |name: &str| -> Result<HashMap<String, Value>, LookupError> {
            match data.get(name) {
                None => Ok(HashMap::new()),
                Some(Value::Object(map)) => {
                    Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                }
                Some(_) => Err(LookupError::Persistence(
                    "The data file did not contain the correct data.".to_string(),
                )),
            }
        };
        Ok(Self {
            users: section("users")?,
            groups: section("groups")?,
        })
    }
}

impl ObjectLookup for StaticObjectLookup {
    fn get_object(
        &self,
        identifier: &str,
        object_type: ObjectType,
    ) -> Result<PersistenceObject, LookupError> {
        let store = match object_type {
            ObjectType::User => &self.users,
            ObjectType::Group => &self.groups,
            ObjectType::Unknown => {
                return Err(LookupError::Persistence(format!(
                    "The object type '{object_type}' is not supported by this store."
                )))
            }
        };
        let raw = store
            .get(identifier)
            .ok_or_else(|| LookupError::ObjectNotFound {
                object_type: object_type.to_string(),
                identifier: identifier.to_string(),
            })?;
        let attributes = match raw.get("attributes") {
            None => Attributes::default(),
            Some(Value::Object(map)) => {
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            }
            Some(_) => {
                return Err(LookupError::Persistence(format!(
                    "The data of the object with type '{object_type}' and identifier \
                     '{identifier}' is malformed and could not be loaded."
                )))
            }
        };
        let roles = attributes
            .get("roles")
            .and_then(Value::as_array)
            .map(|roles| {
                roles
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(PersistenceObject {
            id: identifier.to_string(),
            object_type,
            attributes,
            roles,
        })
    }
}
