//! Constraints: which objects of a type a grant applies to.
//!
//! A constraint payload is stored as JSON: `null`, one filter object, or an
//! array of filter objects. An object matches the payload if it matches any
//! of the filter sets, and it matches a filter set if every parameter in the
//! set holds.
//!
//! Filter keys follow the `field__subfield__lookup` convention:
//!
//! ```text
//! {"status": "active"}                  status == "active"
//! {"site__region__slug__in": ["eu"]}    site.region.slug in ["eu"]
//! {"vid__gte": 100, "vid__lt": 200}     100 <= vid < 200
//! {"tenant__isnull": true}              tenant missing or null
//! {"owner": "$user"}                    owner == id of the requesting user
//! ```

use std::cmp::Ordering;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use strum::{Display, EnumString};

use crate::constants::USER_TOKEN;
use crate::error::{ObjpermError, Result};
use crate::model::User;

/// One set of filter parameters, combined with AND
pub type FilterSet = Map<String, Value>;

/// Separates path segments and the trailing lookup in a filter key
const LOOKUP_SEP: &str = "__";

/// The constraint payload of a grant
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Constraints {
    /// Every object of the type
    #[default]
    None,
    Single(FilterSet),
    /// Objects matching any of the sets
    Union(Vec<FilterSet>),
}

impl Constraints {
    /// Build from the stored JSON form.
    ///
    /// Empty objects and empty arrays collapse to [`Constraints::None`].
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Constraints::None),
            Value::Object(m) if m.is_empty() => Ok(Constraints::None),
            Value::Object(m) => Ok(Constraints::Single(m)),
            Value::Array(items) if items.is_empty() => Ok(Constraints::None),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(m) => Ok(m),
                    other => Err(ObjpermError::validation(
                        "constraints",
                        format!("expected a filter object, got {}", other),
                    )),
                })
                .collect::<Result<Vec<_>>>()
                .map(Constraints::Union),
            other => Err(ObjpermError::validation(
                "constraints",
                format!("expected null, an object or a list of objects, got {}", other),
            )),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Constraints::None => Value::Null,
            Constraints::Single(m) => Value::Object(m.clone()),
            Constraints::Union(v) => Value::Array(v.iter().cloned().map(Value::Object).collect()),
        }
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, Constraints::None)
    }

    /// All filter sets as a list.
    ///
    /// A single set becomes a one-element list and a union is returned as
    /// is. No constraints yields one empty set, which matches everything.
    pub fn list_constraints(&self) -> Vec<FilterSet> {
        match self {
            Constraints::None => vec![FilterSet::new()],
            Constraints::Single(m) => vec![m.clone()],
            Constraints::Union(v) => v.clone(),
        }
    }

    /// Check every filter key and the shape of values that need one
    pub fn validate(&self) -> Result<()> {
        for set in self.list_constraints() {
            validate_filter(&set)?;
        }
        Ok(())
    }

    /// Whether `object` satisfies any of the filter sets
    pub fn matches(&self, object: &Value, user: &User) -> Result<bool> {
        for set in self.list_constraints() {
            if filter_matches(&set, object, user)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl From<FilterSet> for Constraints {
    fn from(m: FilterSet) -> Self {
        if m.is_empty() { Constraints::None } else { Constraints::Single(m) }
    }
}

impl Serialize for Constraints {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Constraints {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Constraints::from_value(value).map_err(serde::de::Error::custom)
    }
}

/// Comparison applied to the field a filter key points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Lookup {
    Exact,
    IExact,
    In,
    Contains,
    IContains,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    Gt,
    Gte,
    Lt,
    Lte,
    IsNull,
}

/// A parsed filter key: field path plus lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterKey<'a> {
    pub path: Vec<&'a str>,
    pub lookup: Lookup,
}

/// Parse `field__subfield__lookup`; without a known trailing lookup the
/// whole key is the path and the lookup is `exact`.
pub fn parse_filter_key(key: &str) -> Result<FilterKey<'_>> {
    let mut path: Vec<&str> = key.split(LOOKUP_SEP).collect();
    if path.iter().any(|p| p.is_empty()) {
        return Err(ObjpermError::InvalidArgument(format!("Invalid filter key: '{}'", key)));
    }
    let mut lookup = Lookup::Exact;
    if path.len() > 1 {
        if let Some(l) = path.last().and_then(|last| last.parse::<Lookup>().ok()) {
            lookup = l;
            path.pop();
        }
    }
    Ok(FilterKey { path, lookup })
}

fn validate_filter(set: &FilterSet) -> Result<()> {
    for (key, value) in set {
        let fk = parse_filter_key(key)?;
        match fk.lookup {
            Lookup::In if !value.is_array() => {
                return Err(ObjpermError::validation(
                    "constraints",
                    format!("'{}' needs a list value", key),
                ));
            }
            Lookup::IsNull if !value.is_boolean() => {
                return Err(ObjpermError::validation(
                    "constraints",
                    format!("'{}' needs a boolean value", key),
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Whether `object` satisfies every parameter of `set`
pub fn filter_matches(set: &FilterSet, object: &Value, user: &User) -> Result<bool> {
    for (key, expected) in set {
        let fk = parse_filter_key(key)?;
        let expected = substitute_user(expected, user);
        if !field_matches(object, &fk.path, fk.lookup, &expected)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Replace every `"$user"` string with the user's id
fn substitute_user(value: &Value, user: &User) -> Value {
    match value {
        Value::String(s) if s == USER_TOKEN => Value::from(user.id),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute_user(v, user)).collect()),
        Value::Object(m) => Value::Object(
            m.iter().map(|(k, v)| (k.clone(), substitute_user(v, user))).collect(),
        ),
        other => other.clone(),
    }
}

fn field_matches(value: &Value, path: &[&str], lookup: Lookup, expected: &Value) -> Result<bool> {
    let Some((head, rest)) = path.split_first() else {
        return compare(value, lookup, expected);
    };
    match value {
        // related collections match if any member does
        Value::Array(items) => {
            for item in items {
                if field_matches(item, path, lookup, expected)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Object(m) => field_matches(m.get(*head).unwrap_or(&Value::Null), rest, lookup, expected),
        _ => field_matches(&Value::Null, rest, lookup, expected),
    }
}

fn compare(actual: &Value, lookup: Lookup, expected: &Value) -> Result<bool> {
    if let Value::Array(items) = actual {
        if lookup != Lookup::IsNull && (lookup == Lookup::In || !expected.is_array()) {
            for item in items {
                if compare(item, lookup, expected)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }
    }

    Ok(match lookup {
        Lookup::Exact => values_equal(actual, expected),
        Lookup::IExact => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(e)) => a.to_lowercase() == e.to_lowercase(),
            _ => values_equal(actual, expected),
        },
        Lookup::In => {
            let options = expected.as_array().ok_or_else(|| {
                ObjpermError::InvalidArgument("'in' lookup needs a list value".into())
            })?;
            options.iter().any(|o| values_equal(actual, o))
        }
        Lookup::Contains => text_test(actual, expected, false, |a, e| a.contains(e)),
        Lookup::IContains => text_test(actual, expected, true, |a, e| a.contains(e)),
        Lookup::StartsWith => text_test(actual, expected, false, |a, e| a.starts_with(e)),
        Lookup::IStartsWith => text_test(actual, expected, true, |a, e| a.starts_with(e)),
        Lookup::EndsWith => text_test(actual, expected, false, |a, e| a.ends_with(e)),
        Lookup::IEndsWith => text_test(actual, expected, true, |a, e| a.ends_with(e)),
        Lookup::Gt => order(actual, expected) == Some(Ordering::Greater),
        Lookup::Gte => matches!(order(actual, expected), Some(Ordering::Greater | Ordering::Equal)),
        Lookup::Lt => order(actual, expected) == Some(Ordering::Less),
        Lookup::Lte => matches!(order(actual, expected), Some(Ordering::Less | Ordering::Equal)),
        Lookup::IsNull => {
            let want = expected.as_bool().ok_or_else(|| {
                ObjpermError::InvalidArgument("'isnull' lookup needs a boolean value".into())
            })?;
            actual.is_null() == want
        }
    })
}

/// Equality with numbers compared by value (`1 == 1.0`)
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_order(x, y) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn text_test(actual: &Value, expected: &Value, fold: bool, f: fn(&str, &str) -> bool) -> bool {
    match (actual.as_str(), expected.as_str()) {
        (Some(a), Some(e)) if fold => f(&a.to_lowercase(), &e.to_lowercase()),
        (Some(a), Some(e)) => f(a, e),
        _ => false,
    }
}

/// Numbers order numerically, strings lexically; anything else is unordered
fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_order(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Integers compare exactly; floats only when one side is a float
fn number_order(x: &Number, y: &Number) -> Option<Ordering> {
    match (integer(x), integer(y)) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
    }
}

fn integer(n: &Number) -> Option<i128> {
    n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from))
}
