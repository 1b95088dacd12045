/*!
 * Condition Evaluator
 * Named boolean predicates over actor, target and request context
 */

use crate::core::errors::ConditionError;
use crate::core::types::{is_truthy, Attributes, Context, Namespace, PolicyObject, Target};
use crate::dn::{Dn, Scope};
use ahash::HashMap;
use regex::RegexBuilder;
use serde_json::Value;

/// Named parameters of one condition instance
pub type Params = HashMap<String, Value>;

/// The closed set of condition predicates.
///
/// Bundle files refer to conditions by their fully-qualified name; the
/// name is resolved here at evaluation time, so a bundle carrying an
/// unknown condition loads fine and only fails if that capability is
/// actually evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionKind {
    TargetPositionFromContext,
    TargetPositionIn,
    TargetObjectTypeEquals,
    TargetPropertyValuesCompares,
    TargetIsSelf,
}

impl ConditionKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "udm:conditions:target_position_from_context" => {
                Some(Self::TargetPositionFromContext)
            }
            "udm:conditions:target_position_in" => Some(Self::TargetPositionIn),
            "udm:conditions:target_object_type_equals" => Some(Self::TargetObjectTypeEquals),
            "udm:conditions:target_property_values_compares" => {
                Some(Self::TargetPropertyValuesCompares)
            }
            "guardian:builtin:target_is_self" => Some(Self::TargetIsSelf),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::TargetPositionFromContext => "udm:conditions:target_position_from_context",
            Self::TargetPositionIn => "udm:conditions:target_position_in",
            Self::TargetObjectTypeEquals => "udm:conditions:target_object_type_equals",
            Self::TargetPropertyValuesCompares => {
                "udm:conditions:target_property_values_compares"
            }
            Self::TargetIsSelf => "guardian:builtin:target_is_self",
        }
    }
}

/// Everything a predicate may inspect besides its own parameters.
pub struct ConditionContext<'a> {
    pub actor: &'a PolicyObject,
    /// The actor's serialized roles split once on `&` into the role
    /// part and the optional context segment.
    pub actor_role: &'a [(String, Option<String>)],
    pub target: &'a Target,
    pub contexts: &'a [Context],
    pub namespaces: &'a [Namespace],
    pub extra_args: &'a Attributes,
}

impl<'a> ConditionContext<'a> {
    fn new_attributes(&self) -> Option<&'a Attributes> {
        self.target.new_target.as_ref().map(|t| &t.attributes)
    }

    fn old_attributes(&self) -> Option<&'a Attributes> {
        self.target.old_target.as_ref().map(|t| &t.attributes)
    }

    /// The new side's attributes unless that bag is empty, else the
    /// old side's.
    fn preferred_attributes(&self) -> Option<&'a Attributes> {
        match self.new_attributes() {
            Some(attrs) if !attrs.is_empty() => Some(attrs),
            _ => self.old_attributes(),
        }
    }
}

/// Evaluate a condition by name. Unknown names are a lookup error,
/// never a silent false.
pub fn evaluate(
    name: &str,
    params: &Params,
    ctx: &ConditionContext<'_>,
) -> Result<bool, ConditionError> {
    let kind = ConditionKind::from_name(name).ok_or_else(|| ConditionError::UnknownCondition {
        name: name.to_string(),
    })?;
    match kind {
        ConditionKind::TargetPositionFromContext => target_position_from_context(params, ctx),
        ConditionKind::TargetPositionIn => target_position_in(params, ctx),
        ConditionKind::TargetObjectTypeEquals => target_object_type_equals(params, ctx),
        ConditionKind::TargetPropertyValuesCompares => {
            target_property_values_compares(params, ctx)
        }
        ConditionKind::TargetIsSelf => Ok(target_is_self(params, ctx)),
    }
}

fn require<'p>(
    params: &'p Params,
    condition: &'static str,
    parameter: &'static str,
) -> Result<&'p Value, ConditionError> {
    params.get(parameter).ok_or(ConditionError::MissingParameter {
        condition,
        parameter,
    })
}

/// Positions from the actor's role contexts, delegated to the
/// position scope test.
fn target_position_from_context(
    params: &Params,
    ctx: &ConditionContext<'_>,
) -> Result<bool, ConditionError> {
    const NAME: &str = "target_position_from_context";
    let context_name = require(params, NAME, "context")?
        .as_str()
        .ok_or(ConditionError::MissingParameter {
            condition: NAME,
            parameter: "context",
        })?;
    let marker = format!("{context_name}=");
    let positions: Vec<Value> = ctx
        .actor_role
        .iter()
        .filter_map(|(_, context)| context.as_deref())
        .filter(|context| context.starts_with(context_name))
        .map(|context| {
            // Everything after the first "<context>=", or the whole
            // segment when that marker is absent.
            let position = context.splitn(2, marker.as_str()).last().unwrap_or(context);
            Value::String(position.to_string())
        })
        .collect();

    let mut delegated = Params::default();
    delegated.insert("position".to_string(), Value::Array(positions));
    delegated.insert(
        "scope".to_string(),
        require(params, NAME, "scope")?.clone(),
    );
    target_position_in(&delegated, ctx)
}

/// Scope test of the target's `dn` attribute against the condition
/// positions. A side without a `dn` counts as false; a side whose `dn`
/// fails the test makes the whole condition false; the condition holds
/// if any remaining side passed.
fn target_position_in(
    params: &Params,
    ctx: &ConditionContext<'_>,
) -> Result<bool, ConditionError> {
    const NAME: &str = "target_position_in";
    let position = require(params, NAME, "position")?;
    let positions: Vec<&str> = match position {
        Value::Array(values) => values.iter().filter_map(Value::as_str).collect(),
        value => value.as_str().into_iter().collect(),
    };
    let scope_name = params
        .get("scope")
        .and_then(Value::as_str)
        .unwrap_or("base");
    // Validate eagerly so a bad scope always surfaces, even when no
    // target side carries a dn.
    let scope = Scope::from_name(scope_name)?;

    let mut any_side_passed = false;
    for attributes in [ctx.new_attributes(), ctx.old_attributes()] {
        let target_dn = attributes
            .and_then(|attrs| attrs.get("dn"))
            .and_then(Value::as_str);
        let Some(target_dn) = target_dn else {
            continue;
        };
        let position_dn = Dn::parse(target_dn)?;
        let candidates = positions
            .iter()
            .map(|p| Dn::parse(p))
            .collect::<Result<Vec<_>, _>>()?;
        if !scope.matches(&position_dn, &candidates) {
            return Ok(false);
        }
        any_side_passed = true;
    }
    Ok(any_side_passed)
}

/// Compare the target's `objectType` attribute with the parameter.
/// Both absent compares equal.
fn target_object_type_equals(
    params: &Params,
    ctx: &ConditionContext<'_>,
) -> Result<bool, ConditionError> {
    let object_type = ctx
        .preferred_attributes()
        .and_then(|attrs| attrs.get("objectType"));
    Ok(object_type == params.get("objectType"))
}

/// Compare a named property of either target side against the given
/// values with the given operator.
fn target_property_values_compares(
    params: &Params,
    ctx: &ConditionContext<'_>,
) -> Result<bool, ConditionError> {
    const NAME: &str = "target_property_values_compares";
    let property = require(params, NAME, "property")?
        .as_str()
        .ok_or(ConditionError::MissingParameter {
            condition: NAME,
            parameter: "property",
        })?;
    let operator = require(params, NAME, "operator")?
        .as_str()
        .ok_or(ConditionError::MissingParameter {
            condition: NAME,
            parameter: "operator",
        })?;
    let values = require(params, NAME, "values")?;
    let values: Vec<&Value> = match values {
        Value::Array(values) => values.iter().collect(),
        value => vec![value],
    };

    for attributes in [ctx.new_attributes(), ctx.old_attributes()] {
        let property_value = attributes
            .and_then(|attrs| attrs.get("properties"))
            .and_then(|props| props.get(property));
        let Some(property_value) = property_value.filter(|v| is_truthy(v)) else {
            continue;
        };
        // FIXME: only the first value of a multivalued property is
        // compared.
        let property_value = match property_value {
            Value::Array(values) => match values.first() {
                Some(value) => value,
                None => continue,
            },
            value => value,
        };
        for value in &values {
            if compare(operator, value, property_value)? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn compare(operator: &str, value: &Value, data: &Value) -> Result<bool, ConditionError> {
    match operator {
        "==" => Ok(value == data),
        "!=" => Ok(value != data),
        "==-i" | "!=-i" => {
            let (Some(value), Some(data)) = (value.as_str(), data.as_str()) else {
                return Ok(false);
            };
            let equal = value.to_lowercase() == data.to_lowercase();
            Ok(if operator == "==-i" { equal } else { !equal })
        }
        op if op.starts_with("regex") => {
            let (op, case_insensitive) = match op.strip_suffix("-i") {
                Some(op) => (op, true),
                None => (op, false),
            };
            let (Some(pattern), Some(data)) = (value.as_str(), data.as_str()) else {
                return Ok(false);
            };
            let re = RegexBuilder::new(pattern)
                .case_insensitive(case_insensitive)
                .build()
                .map_err(|err| ConditionError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: err.to_string(),
                })?;
            // Match anchored at the start of the data.
            let matched = re.find(data).is_some_and(|m| m.start() == 0);
            Ok(if op == "regex-match" { matched } else { !matched })
        }
        op if op.starts_with("dn") => {
            let scope = match op.splitn(2, '-').nth(1) {
                None | Some("") | Some("base") => Scope::Base,
                Some("one") => Scope::One,
                Some("subtree") => Scope::Subtree,
                Some(other) => {
                    return Err(ConditionError::UnsupportedScope {
                        scope: other.to_string(),
                    })
                }
            };
            let (Some(value), Some(data)) = (value.as_str(), data.as_str()) else {
                return Ok(false);
            };
            Ok(scope.matches(&Dn::parse(value)?, &[Dn::parse(data)?]))
        }
        // Unknown operators compare as "no match".
        _ => Ok(false),
    }
}

/// True when the target is the actor itself, either by a shared
/// attribute field or by object id. Missing data is false, never an
/// error.
fn target_is_self(params: &Params, ctx: &ConditionContext<'_>) -> bool {
    let field = params
        .get("field")
        .and_then(Value::as_str)
        .filter(|f| !f.is_empty());
    if let Some(field) = field {
        let target_value = ctx
            .preferred_attributes()
            .and_then(|attrs| attrs.get(field));
        return match (ctx.actor.attributes.get(field), target_value) {
            (Some(actor_value), Some(target_value)) => actor_value == target_value,
            _ => false,
        };
    }
    let target_id = ctx.target.id();
    !ctx.actor.id.is_empty() && ctx.actor.id == target_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, Value)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn object_with_attrs(id: &str, attrs: &[(&str, Value)]) -> PolicyObject {
        let mut obj = PolicyObject::new(id);
        for (k, v) in attrs {
            obj.attributes.insert(k.to_string(), v.clone());
        }
        obj
    }

    struct Fixture {
        actor: PolicyObject,
        actor_role: Vec<(String, Option<String>)>,
        target: Target,
        extra_args: Attributes,
    }

    impl Fixture {
        fn new(actor: PolicyObject, target: Target) -> Self {
            Self {
                actor,
                actor_role: Vec::new(),
                target,
                extra_args: Attributes::default(),
            }
        }

        fn with_actor_role(mut self, roles: &[(&str, Option<&str>)]) -> Self {
            self.actor_role = roles
                .iter()
                .map(|(r, c)| (r.to_string(), c.map(str::to_string)))
                .collect();
            self
        }

        fn ctx(&self) -> ConditionContext<'_> {
            ConditionContext {
                actor: &self.actor,
                actor_role: &self.actor_role,
                target: &self.target,
                contexts: &[],
                namespaces: &[],
                extra_args: &self.extra_args,
            }
        }
    }

    fn target_with_dn(dn: &str) -> Target {
        Target::new(
            Some(PolicyObject::empty()),
            Some(object_with_attrs("t1", &[("dn", json!(dn))])),
        )
    }

    #[test]
    fn test_unknown_condition_is_an_error() {
        let fixture = Fixture::new(PolicyObject::empty(), Target::empty());
        let err = evaluate("udm:conditions:does_not_exist", &Params::default(), &fixture.ctx());
        assert!(matches!(
            err,
            Err(ConditionError::UnknownCondition { name }) if name.contains("does_not_exist")
        ));
    }

    #[test]
    fn test_position_in_subtree() {
        let fixture = Fixture::new(
            PolicyObject::empty(),
            target_with_dn("uid=fbest,cn=users,dc=base"),
        );
        let p = params(&[
            ("position", json!("cn=users,dc=base")),
            ("scope", json!("subtree")),
        ]);
        assert!(target_position_in(&p, &fixture.ctx()).unwrap());

        let fixture = Fixture::new(PolicyObject::empty(), target_with_dn("dc=base"));
        assert!(!target_position_in(&p, &fixture.ctx()).unwrap());
    }

    #[test]
    fn test_position_in_accepts_position_list() {
        let fixture = Fixture::new(
            PolicyObject::empty(),
            target_with_dn("uid=a,ou=one,dc=base"),
        );
        let p = params(&[
            ("position", json!(["ou=two,dc=base", "ou=one,dc=base"])),
            ("scope", json!("one")),
        ]);
        assert!(target_position_in(&p, &fixture.ctx()).unwrap());
    }

    #[test]
    fn test_position_in_no_dn_is_false() {
        let fixture = Fixture::new(PolicyObject::empty(), Target::empty());
        let p = params(&[("position", json!("dc=base")), ("scope", json!("subtree"))]);
        assert!(!target_position_in(&p, &fixture.ctx()).unwrap());
    }

    #[test]
    fn test_position_in_failing_side_wins_over_passing_side() {
        // The new side's dn fails the test, so the condition is false
        // even though the old side's dn would pass.
        let target = Target::new(
            Some(object_with_attrs("t", &[("dn", json!("uid=a,cn=users,dc=base"))])),
            Some(object_with_attrs("t", &[("dn", json!("uid=a,cn=elsewhere,dc=other"))])),
        );
        let fixture = Fixture::new(PolicyObject::empty(), target);
        let p = params(&[
            ("position", json!("cn=users,dc=base")),
            ("scope", json!("subtree")),
        ]);
        assert!(!target_position_in(&p, &fixture.ctx()).unwrap());
    }

    #[test]
    fn test_position_in_unsupported_scope() {
        let fixture = Fixture::new(PolicyObject::empty(), Target::empty());
        let p = params(&[("position", json!("dc=base")), ("scope", json!("children"))]);
        assert!(matches!(
            target_position_in(&p, &fixture.ctx()),
            Err(ConditionError::UnsupportedScope { .. })
        ));
    }

    #[test]
    fn test_position_in_default_scope_is_base() {
        let fixture = Fixture::new(PolicyObject::empty(), target_with_dn("cn=users,dc=base"));
        let p = params(&[("position", json!("cn = users,dc=base"))]);
        assert!(target_position_in(&p, &fixture.ctx()).unwrap());
    }

    #[test]
    fn test_position_from_context() {
        let fixture = Fixture::new(
            PolicyObject::empty(),
            target_with_dn("uid=fbest,ou=school1,dc=base"),
        )
        .with_actor_role(&[
            ("ucsschool:users:teacher", Some("school=ou=school1,dc=base")),
            ("other:app:role", None),
        ]);
        let p = params(&[("context", json!("school")), ("scope", json!("subtree"))]);
        assert!(target_position_from_context(&p, &fixture.ctx()).unwrap());
    }

    #[test]
    fn test_position_from_context_no_matching_context() {
        let fixture = Fixture::new(
            PolicyObject::empty(),
            target_with_dn("uid=fbest,ou=school1,dc=base"),
        )
        .with_actor_role(&[("ucsschool:users:teacher", Some("class=ou=x,dc=base"))]);
        let p = params(&[("context", json!("school")), ("scope", json!("subtree"))]);
        // No positions extracted, so the dn-bearing side fails the test.
        assert!(!target_position_from_context(&p, &fixture.ctx()).unwrap());
    }

    #[test]
    fn test_object_type_equals() {
        let target = Target::new(
            None,
            Some(object_with_attrs("t", &[("objectType", json!("users/user"))])),
        );
        let fixture = Fixture::new(PolicyObject::empty(), target);
        let p = params(&[("objectType", json!("users/user"))]);
        assert!(target_object_type_equals(&p, &fixture.ctx()).unwrap());

        let p = params(&[("objectType", json!("groups/group"))]);
        assert!(!target_object_type_equals(&p, &fixture.ctx()).unwrap());
    }

    #[test]
    fn test_object_type_falls_back_to_old_side() {
        let target = Target::new(
            Some(object_with_attrs("t", &[("objectType", json!("users/user"))])),
            Some(PolicyObject::empty()),
        );
        let fixture = Fixture::new(PolicyObject::empty(), target);
        let p = params(&[("objectType", json!("users/user"))]);
        assert!(target_object_type_equals(&p, &fixture.ctx()).unwrap());
    }

    #[test]
    fn test_object_type_both_absent_compares_equal() {
        let fixture = Fixture::new(PolicyObject::empty(), Target::empty());
        assert!(target_object_type_equals(&Params::default(), &fixture.ctx()).unwrap());
    }

    fn target_with_property(value: Value) -> Target {
        Target::new(
            None,
            Some(object_with_attrs(
                "t",
                &[("properties", json!({ "school": value }))],
            )),
        )
    }

    #[test]
    fn test_property_compares_equality() {
        let fixture = Fixture::new(PolicyObject::empty(), target_with_property(json!("alpha")));
        let p = params(&[
            ("property", json!("school")),
            ("operator", json!("==")),
            ("values", json!(["beta", "alpha"])),
        ]);
        assert!(target_property_values_compares(&p, &fixture.ctx()).unwrap());

        let p = params(&[
            ("property", json!("school")),
            ("operator", json!("!=")),
            ("values", json!(["beta"])),
        ]);
        assert!(target_property_values_compares(&p, &fixture.ctx()).unwrap());
    }

    #[test]
    fn test_property_compares_case_insensitive() {
        let fixture = Fixture::new(PolicyObject::empty(), target_with_property(json!("Alpha")));
        let p = params(&[
            ("property", json!("school")),
            ("operator", json!("==-i")),
            ("values", json!(["ALPHA"])),
        ]);
        assert!(target_property_values_compares(&p, &fixture.ctx()).unwrap());
    }

    #[test]
    fn test_property_compares_regex() {
        let fixture = Fixture::new(PolicyObject::empty(), target_with_property(json!("alpha42")));
        let p = params(&[
            ("property", json!("school")),
            ("operator", json!("regex-match")),
            ("values", json!(["alpha[0-9]+"])),
        ]);
        assert!(target_property_values_compares(&p, &fixture.ctx()).unwrap());

        // Matching is anchored at the start.
        let p = params(&[
            ("property", json!("school")),
            ("operator", json!("regex-match")),
            ("values", json!(["[0-9]+"])),
        ]);
        assert!(!target_property_values_compares(&p, &fixture.ctx()).unwrap());

        let p = params(&[
            ("property", json!("school")),
            ("operator", json!("regex-nomatch")),
            ("values", json!(["beta.*"])),
        ]);
        assert!(target_property_values_compares(&p, &fixture.ctx()).unwrap());

        let p = params(&[
            ("property", json!("school")),
            ("operator", json!("regex-match-i")),
            ("values", json!(["ALPHA.*"])),
        ]);
        assert!(target_property_values_compares(&p, &fixture.ctx()).unwrap());
    }

    #[test]
    fn test_property_compares_invalid_regex_is_an_error() {
        let fixture = Fixture::new(PolicyObject::empty(), target_with_property(json!("alpha")));
        let p = params(&[
            ("property", json!("school")),
            ("operator", json!("regex-match")),
            ("values", json!(["["])),
        ]);
        assert!(matches!(
            target_property_values_compares(&p, &fixture.ctx()),
            Err(ConditionError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_property_compares_dn_scope() {
        let fixture = Fixture::new(
            PolicyObject::empty(),
            target_with_property(json!("cn=users,dc=base")),
        );
        // The condition value is tested against the property value as
        // the position.
        let p = params(&[
            ("property", json!("school")),
            ("operator", json!("dn-subtree")),
            ("values", json!(["uid=x,cn=users,dc=base"])),
        ]);
        assert!(target_property_values_compares(&p, &fixture.ctx()).unwrap());

        let p = params(&[
            ("property", json!("school")),
            ("operator", json!("dn")),
            ("values", json!(["cn = users,dc=base"])),
        ]);
        assert!(target_property_values_compares(&p, &fixture.ctx()).unwrap());
    }

    #[test]
    fn test_property_compares_multivalued_reads_first_value_only() {
        let fixture = Fixture::new(
            PolicyObject::empty(),
            target_with_property(json!(["alpha", "beta"])),
        );
        let p = params(&[
            ("property", json!("school")),
            ("operator", json!("==")),
            ("values", json!(["alpha"])),
        ]);
        assert!(target_property_values_compares(&p, &fixture.ctx()).unwrap());

        let p = params(&[
            ("property", json!("school")),
            ("operator", json!("==")),
            ("values", json!(["beta"])),
        ]);
        assert!(!target_property_values_compares(&p, &fixture.ctx()).unwrap());
    }

    #[test]
    fn test_property_compares_falsy_property_skipped() {
        let fixture = Fixture::new(PolicyObject::empty(), target_with_property(json!("")));
        let p = params(&[
            ("property", json!("school")),
            ("operator", json!("==")),
            ("values", json!([""])),
        ]);
        assert!(!target_property_values_compares(&p, &fixture.ctx()).unwrap());
    }

    #[test]
    fn test_is_self_by_id() {
        let target = Target::new(None, Some(PolicyObject::new("uid=self")));
        let fixture = Fixture::new(PolicyObject::new("uid=self"), target);
        assert!(target_is_self(&Params::default(), &fixture.ctx()));

        let target = Target::new(None, Some(PolicyObject::new("uid=other")));
        let fixture = Fixture::new(PolicyObject::new("uid=self"), target);
        assert!(!target_is_self(&Params::default(), &fixture.ctx()));
    }

    #[test]
    fn test_is_self_empty_actor_id_is_false() {
        let target = Target::new(None, Some(PolicyObject::new("")));
        let fixture = Fixture::new(PolicyObject::new(""), target);
        assert!(!target_is_self(&Params::default(), &fixture.ctx()));
    }

    #[test]
    fn test_is_self_by_field() {
        let actor = object_with_attrs("a", &[("uuid", json!("123"))]);
        let target = Target::new(None, Some(object_with_attrs("t", &[("uuid", json!("123"))])));
        let fixture = Fixture::new(actor, target);
        let p = params(&[("field", json!("uuid"))]);
        assert!(target_is_self(&p, &fixture.ctx()));

        let actor = object_with_attrs("a", &[("uuid", json!("456"))]);
        let target = Target::new(None, Some(object_with_attrs("t", &[("uuid", json!("123"))])));
        let fixture = Fixture::new(actor, target);
        assert!(!target_is_self(&p, &fixture.ctx()));
    }

    #[test]
    fn test_is_self_missing_field_is_false() {
        let fixture = Fixture::new(PolicyObject::new("a"), Target::empty());
        let p = params(&[("field", json!("uuid"))]);
        assert!(!target_is_self(&p, &fixture.ctx()));
    }
}
