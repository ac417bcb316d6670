//! Core value types shared by sheets, encoders and records.
//!
//! A [`Value`] is what a spreadsheet cell, a docket `Values` entry, or an encoded record field
//! holds. Records are nested: objects are [`Value::Map`]s and group instances are
//! [`Value::List`]s of maps.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::ci_map::CiMap;

/// A single loosely-typed value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Missing/empty value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float. May hold NaN, which is a value in its own right (never null).
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Ordered list, used for group instances.
    List(Vec<Value>),
    /// Case-insensitive mapping, used for objects and records.
    Map(CiMap<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Self::Float(f) if f.is_nan())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&CiMap<Value>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Short name of the variant, used in warnings.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Equality by value: NaN equals NaN, and an integral float equals the same integer.
    pub fn same_as(&self, other: &Value) -> bool {
        key_eq(self, other)
    }

    /// Convert a JSON value (docket `Values`, literal schema values) into a [`Value`].
    pub fn from_json(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::Str(s.clone()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(obj) => {
                Self::Map(obj.iter().map(|(k, v)| (k.clone(), Self::from_json(v))).collect())
            }
        }
    }

    /// Convert into JSON for the REST boundary. Non-finite floats become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.to_string(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Text form of a float: `123.0`, `0.1`, `nan`, `inf`, `1e+16`, `1.5e-05`.
pub(crate) fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let abs = f.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let s = format!("{f:e}");
        let (mantissa, exp) = s.split_once('e').unwrap_or((s.as_str(), "0"));
        let exp: i32 = exp.parse().unwrap_or(0);
        let sign = if exp < 0 { '-' } else { '+' };
        return format!("{mantissa}e{sign}{:02}", exp.abs());
    }
    if f.fract() == 0.0 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

fn fmt_nested(v: &Value, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match v {
        Value::Str(s) => write!(f, "'{s}'"),
        other => write!(f, "{other}"),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("None"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => f.write_str(&float_repr(*x)),
            Self::Str(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    fmt_nested(item, f)?;
                }
                f.write_str("]")
            }
            Self::Map(m) => {
                f.write_str("{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "'{k}': ")?;
                    fmt_nested(v, f)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Self::Float(_) => serializer.serialize_none(),
            Self::Str(s) => serializer.serialize_str(s),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(m) => m.serialize(serializer),
        }
    }
}

/// A [`Value`] usable as a hash key, compared by value.
///
/// Floats compare by bit pattern after normalizing `-0.0` and NaN, and integral floats are
/// the same key as the equal integer, so `("2024-01-01", 1)` and `("2024-01-01", 1.0)` land in
/// the same group.
#[derive(Debug, Clone)]
pub struct ValueKey(pub Value);

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn key_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => integral(*y) == Some(*x),
        (Value::Float(x), Value::Float(y)) => (x.is_nan() && y.is_nan()) || x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => x.len() == y.len() && x.iter().zip(y).all(|(a, b)| key_eq(a, b)),
        (Value::Map(x), Value::Map(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, va)| y.get(k).is_some_and(|vb| key_eq(va, vb)))
        }
        _ => false,
    }
}

fn key_hash<H: Hasher>(v: &Value, state: &mut H) {
    match v {
        Value::Null => 0u8.hash(state),
        Value::Bool(b) => {
            1u8.hash(state);
            b.hash(state);
        }
        Value::Int(i) => {
            2u8.hash(state);
            i.hash(state);
        }
        Value::Float(f) => match integral(*f) {
            Some(i) => {
                2u8.hash(state);
                i.hash(state);
            }
            None => {
                3u8.hash(state);
                let bits = if f.is_nan() { f64::NAN.to_bits() } else { f.to_bits() };
                bits.hash(state);
            }
        },
        Value::Str(s) => {
            4u8.hash(state);
            s.hash(state);
        }
        Value::List(items) => {
            5u8.hash(state);
            items.len().hash(state);
            for item in items {
                key_hash(item, state);
            }
        }
        Value::Map(m) => {
            // Entry order does not take part in equality, so only the size is hashed.
            6u8.hash(state);
            m.len().hash(state);
        }
    }
}

impl PartialEq for ValueKey {
    fn eq(&self, other: &Self) -> bool {
        key_eq(&self.0, &other.0)
    }
}

impl Eq for ValueKey {}

impl Hash for ValueKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        key_hash(&self.0, state);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{float_repr, Value, ValueKey};

    #[test]
    fn display_uses_spreadsheet_text_forms() {
        assert_eq!(Value::Int(123).to_string(), "123");
        assert_eq!(Value::Float(123.0).to_string(), "123.0");
        assert_eq!(Value::Float(0.25).to_string(), "0.25");
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::Null.to_string(), "None");
        assert_eq!(Value::Float(f64::NAN).to_string(), "nan");
        assert_eq!(
            Value::List(vec![Value::from("a"), Value::Int(1)]).to_string(),
            "['a', 1]"
        );
    }

    #[test]
    fn float_repr_switches_to_exponent_form() {
        assert_eq!(float_repr(1e16), "1e+16");
        assert_eq!(float_repr(1.5e-5), "1.5e-05");
        assert_eq!(float_repr(-0.0), "-0.0");
        assert_eq!(float_repr(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn keys_compare_by_value() {
        let mut set = HashSet::new();
        set.insert(ValueKey(Value::Int(1)));
        assert!(set.contains(&ValueKey(Value::Float(1.0))));
        set.insert(ValueKey(Value::Float(f64::NAN)));
        assert!(set.contains(&ValueKey(Value::Float(f64::NAN))));
        assert!(!set.contains(&ValueKey(Value::from("1"))));
    }

    #[test]
    fn nan_serializes_as_null() {
        let json = serde_json::to_string(&Value::List(vec![Value::Float(f64::NAN), Value::Float(2.5)])).unwrap();
        assert_eq!(json, "[null,2.5]");
        assert_eq!(Value::Float(f64::INFINITY).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn from_json_keeps_integers_integral() {
        let v = Value::from_json(&serde_json::json!({"a": 1, "b": 1.5, "c": [true, null]}));
        let m = v.as_map().unwrap();
        assert_eq!(m.get("A"), Some(&Value::Int(1)));
        assert_eq!(m.get("b"), Some(&Value::Float(1.5)));
        assert_eq!(m.get("c"), Some(&Value::List(vec![Value::Bool(true), Value::Null])));
    }
}
