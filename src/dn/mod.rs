/*!
 * Distinguished Names
 * Parsing, normalization and containment tests for LDAP-style names
 */

use crate::core::errors::{ConditionError, DnError};
use std::fmt;
use std::hash::{Hash, Hasher};

/// One attribute-value assertion inside an RDN.
///
/// `flag` is the wire encoding tag of the assertion. All values parsed
/// from the string grammar use the string encoding (0); the flag still
/// participates in normalization ordering.
#[derive(Debug, Clone)]
pub struct Ava {
    pub attribute: String,
    pub value: String,
    pub flag: u8,
}

type NormalizedRdn = Vec<(String, String, u8)>;

/// An LDAP-style distinguished name: an ordered sequence of RDNs,
/// leaf first. Each RDN is a set of attribute-value assertions, so
/// multi-valued RDNs compare order-independently.
#[derive(Debug, Clone)]
pub struct Dn {
    rdns: Vec<Vec<Ava>>,
    normalized: Vec<NormalizedRdn>,
}

impl Dn {
    /// Parse a DN string into its component RDNs.
    ///
    /// Accepts optional whitespace around `=` and around separators,
    /// backslash escapes (single character or two hex digits) and
    /// quoted values. The empty string parses to the empty DN.
    pub fn parse(input: &str) -> Result<Self, DnError> {
        let invalid = |reason: &'static str| DnError::Invalid {
            input: input.to_string(),
            reason,
        };

        if input.trim().is_empty() {
            return Ok(Self::from_rdns(Vec::new()));
        }

        let mut rdns: Vec<Vec<Ava>> = Vec::new();
        let mut rdn: Vec<Ava> = Vec::new();
        // Buffers hold (char, escaped) so unescaped whitespace can be
        // trimmed without touching escaped spaces.
        let mut attr: Vec<(char, bool)> = Vec::new();
        let mut value: Vec<(char, bool)> = Vec::new();
        let mut in_value = false;
        let mut in_quotes = false;

        fn finish_ava(
            attr: &mut Vec<(char, bool)>,
            value: &mut Vec<(char, bool)>,
            in_value: &mut bool,
            rdn: &mut Vec<Ava>,
        ) -> Result<(), &'static str> {
            if !*in_value {
                return Err("component is missing '='");
            }
            let attribute: String = trimmed(attr);
            if attribute.is_empty() {
                return Err("component has an empty attribute name");
            }
            rdn.push(Ava {
                attribute,
                value: trimmed(value),
                flag: 0,
            });
            attr.clear();
            value.clear();
            *in_value = false;
            Ok(())
        }

        fn trimmed(buf: &[(char, bool)]) -> String {
            let start = buf
                .iter()
                .position(|&(c, escaped)| escaped || !c.is_whitespace())
                .unwrap_or(buf.len());
            let end = buf
                .iter()
                .rposition(|&(c, escaped)| escaped || !c.is_whitespace())
                .map(|i| i + 1)
                .unwrap_or(start);
            buf[start..end].iter().map(|&(c, _)| c).collect()
        }

        let mut chars = input.chars().peekable();
        while let Some(c) = chars.next() {
            let buf = if in_value { &mut value } else { &mut attr };
            match c {
                '\\' => {
                    let escaped = chars.next().ok_or_else(|| invalid("trailing escape"))?;
                    if escaped.is_ascii_hexdigit()
                        && chars.peek().is_some_and(|p| p.is_ascii_hexdigit())
                    {
                        let second = chars.next().ok_or_else(|| invalid("trailing escape"))?;
                        let byte = u8::from_str_radix(&format!("{escaped}{second}"), 16)
                            .map_err(|_| invalid("invalid hex escape"))?;
                        buf.push((byte as char, true));
                    } else {
                        buf.push((escaped, true));
                    }
                }
                '"' if in_value => in_quotes = !in_quotes,
                '=' if !in_value && !in_quotes => in_value = true,
                ',' | ';' if !in_quotes => {
                    finish_ava(&mut attr, &mut value, &mut in_value, &mut rdn)
                        .map_err(invalid)?;
                    rdns.push(std::mem::take(&mut rdn));
                }
                '+' if !in_quotes => {
                    finish_ava(&mut attr, &mut value, &mut in_value, &mut rdn)
                        .map_err(invalid)?;
                }
                c => buf.push((c, false)),
            }
        }
        if in_quotes {
            return Err(invalid("unterminated quoted value"));
        }
        finish_ava(&mut attr, &mut value, &mut in_value, &mut rdn).map_err(invalid)?;
        rdns.push(rdn);

        Ok(Self::from_rdns(rdns))
    }

    fn from_rdns(rdns: Vec<Vec<Ava>>) -> Self {
        let normalized = rdns
            .iter()
            .map(|rdn| {
                let mut avas: NormalizedRdn = rdn
                    .iter()
                    .map(|ava| (ava.attribute.to_lowercase(), ava.value.clone(), ava.flag))
                    .collect();
                avas.sort();
                avas
            })
            .collect();
        Self { rdns, normalized }
    }

    /// Number of RDNs (depth of the name).
    pub fn len(&self) -> usize {
        self.rdns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }

    /// The normalized tuple-of-tuples form equality and hashing are
    /// defined on.
    pub fn normalized(&self) -> &[NormalizedRdn] {
        &self.normalized
    }

    /// The parent DN: all RDNs except the leaf. The parent of a
    /// single-RDN name is the empty DN.
    pub fn parent(&self) -> Dn {
        if self.rdns.len() <= 1 {
            return Self::from_rdns(Vec::new());
        }
        Self::from_rdns(self.rdns[1..].to_vec())
    }

    /// True iff `other`'s RDN sequence is a suffix of this one, i.e.
    /// this name lies in `other`'s subtree (or equals it).
    pub fn ends_with(&self, other: &Dn) -> bool {
        let suffix = other.normalized();
        if suffix.len() > self.normalized.len() {
            return false;
        }
        self.normalized[self.normalized.len() - suffix.len()..] == *suffix
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized.hash(state);
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            for (j, ava) in rdn.iter().enumerate() {
                if j > 0 {
                    f.write_str("+")?;
                }
                write!(f, "{}={}", ava.attribute, escape_value(&ava.value))?;
            }
        }
        Ok(())
    }
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        let leading = i == 0 && (c == ' ' || c == '#');
        let trailing = i == last && c == ' ';
        if leading || trailing || matches!(c, ',' | '+' | '"' | '\\' | ';' | '<' | '>') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// The three LDAP-style containment tests used by position conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Position equals a condition position.
    Base,
    /// Position's parent equals a condition position (onelevel).
    One,
    /// Position lies in a condition position's subtree.
    Subtree,
}

impl Scope {
    /// Resolve a scope name from a condition parameter. Any value
    /// other than the three supported scopes is an error, never a
    /// silent false.
    pub fn from_name(name: &str) -> Result<Self, ConditionError> {
        match name {
            "base" => Ok(Scope::Base),
            "one" => Ok(Scope::One),
            "subtree" => Ok(Scope::Subtree),
            other => Err(ConditionError::UnsupportedScope {
                scope: other.to_string(),
            }),
        }
    }

    /// Run the containment test of `position` against any of the
    /// `condition_positions`.
    pub fn matches(self, position: &Dn, condition_positions: &[Dn]) -> bool {
        match self {
            Scope::Base => condition_positions.iter().any(|c| c == position),
            Scope::One => {
                let parent = position.parent();
                condition_positions.iter().any(|c| *c == parent)
            }
            Scope::Subtree => condition_positions.iter().any(|c| position.ends_with(c)),
        }
    }
}
