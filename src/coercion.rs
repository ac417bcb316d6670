//! Permissive type coercion for spreadsheet values.
//!
//! [`cast`] converts a raw value to a [`DeclaredType`]. It never fails: when a value cannot be
//! converted it is returned unchanged together with a warning, so a human reviewer can judge
//! the plan before anything is submitted.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::{HwdbError, HwdbResult};
use crate::types::Value;

/// Declared type of a schema field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredType {
    Any,
    Str,
    Int,
    Float,
    Bool,
    /// Unix timestamp in seconds.
    UnixTime,
    Obj,
    Group,
    /// `null,<type>`: null and empty text pass through as null.
    Nullable(Box<DeclaredType>),
}

impl DeclaredType {
    pub fn is_nullable(&self) -> bool {
        matches!(self, Self::Nullable(_))
    }

    fn parse_base(name: &str) -> Option<Self> {
        let ty = match name.to_ascii_lowercase().as_str() {
            "any" => Self::Any,
            "str" | "string" => Self::Str,
            "int" | "integer" => Self::Int,
            "float" | "number" => Self::Float,
            "bool" | "boolean" => Self::Bool,
            "unixtime" => Self::UnixTime,
            "obj" | "object" => Self::Obj,
            "group" => Self::Group,
            _ => return None,
        };
        Some(ty)
    }
}

impl FromStr for DeclaredType {
    type Err = HwdbError;

    fn from_str(s: &str) -> HwdbResult<Self> {
        let unknown = || HwdbError::invalid_encoder(format!("unknown type '{s}'"));
        match s.split_once(',') {
            Some((head, inner)) if head.trim().eq_ignore_ascii_case("null") => {
                let inner = Self::parse_base(inner.trim()).ok_or_else(unknown)?;
                Ok(Self::Nullable(Box::new(inner)))
            }
            Some(_) => Err(unknown()),
            None => Self::parse_base(s.trim()).ok_or_else(unknown),
        }
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any"),
            Self::Str => f.write_str("str"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Bool => f.write_str("bool"),
            Self::UnixTime => f.write_str("unixtime"),
            Self::Obj => f.write_str("obj"),
            Self::Group => f.write_str("group"),
            Self::Nullable(inner) => write!(f, "null,{inner}"),
        }
    }
}

/// Result of a cast: the (possibly unchanged) value plus any warnings.
#[derive(Debug, Clone, PartialEq)]
pub struct Cast {
    pub value: Value,
    pub warnings: Vec<String>,
}

impl Cast {
    fn ok(value: Value) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    fn flagged(value: Value, expected: &DeclaredType) -> Self {
        let message = format!(
            "expected {expected}, got {} '{}'; value left unchanged",
            value.type_name(),
            value
        );
        Self {
            value,
            warnings: vec![message],
        }
    }
}

/// A coercion warning attached to an encoded record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastWarning {
    /// Dotted path of the field inside the record (e.g. `Specifications.Weight`).
    pub field: String,
    /// 1-based spreadsheet row the value came from, if it came from a cell.
    pub row: Option<usize>,
    pub message: String,
}

impl fmt::Display for CastWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.row {
            Some(row) => write!(f, "{} (row {row}): {}", self.field, self.message),
            None => write!(f, "{}: {}", self.field, self.message),
        }
    }
}

/// Cast `value` to `ty`.
pub fn cast(value: Value, ty: &DeclaredType) -> Cast {
    match ty {
        DeclaredType::Any => Cast::ok(value),
        DeclaredType::Str => match value {
            Value::Str(_) => Cast::ok(value),
            other => Cast::ok(Value::Str(other.to_string())),
        },
        DeclaredType::Int => cast_int(value, ty),
        DeclaredType::Float => cast_float(value, ty),
        DeclaredType::Bool => cast_bool(value, ty),
        DeclaredType::UnixTime => cast_unixtime(value, ty),
        DeclaredType::Obj => match value {
            Value::Map(_) => Cast::ok(value),
            other => Cast::flagged(other, ty),
        },
        DeclaredType::Group => match value {
            Value::List(_) => Cast::ok(value),
            other => Cast::flagged(other, ty),
        },
        DeclaredType::Nullable(inner) => match &value {
            Value::Null => Cast::ok(Value::Null),
            Value::Str(s) if s.trim().is_empty() => Cast::ok(Value::Null),
            _ => cast(value, inner),
        },
    }
}

fn integral_float(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn cast_int(value: Value, ty: &DeclaredType) -> Cast {
    match value {
        Value::Int(_) => Cast::ok(value),
        Value::Float(f) => match integral_float(f) {
            Some(i) => Cast::ok(Value::Int(i)),
            None => Cast::flagged(value, ty),
        },
        Value::Str(ref s) => match s.trim().parse::<i64>() {
            Ok(i) => Cast::ok(Value::Int(i)),
            Err(_) => Cast::flagged(value, ty),
        },
        other => Cast::flagged(other, ty),
    }
}

fn cast_float(value: Value, ty: &DeclaredType) -> Cast {
    match value {
        Value::Int(i) => Cast::ok(Value::Float(i as f64)),
        Value::Float(f) if f.is_finite() => Cast::ok(value),
        Value::Str(ref s) => match s.trim().parse::<f64>() {
            Ok(f) if f.is_finite() => Cast::ok(Value::Float(f)),
            _ => Cast::flagged(value, ty),
        },
        other => Cast::flagged(other, ty),
    }
}

fn cast_bool(value: Value, ty: &DeclaredType) -> Cast {
    match value {
        Value::Bool(_) => Cast::ok(value),
        Value::Int(0) => Cast::ok(Value::Bool(false)),
        Value::Int(1) => Cast::ok(Value::Bool(true)),
        Value::Str(ref s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" | "y" => Cast::ok(Value::Bool(true)),
            "false" | "f" | "0" | "no" | "n" => Cast::ok(Value::Bool(false)),
            _ => Cast::flagged(value, ty),
        },
        other => Cast::flagged(other, ty),
    }
}

fn cast_unixtime(value: Value, ty: &DeclaredType) -> Cast {
    match value {
        Value::Int(_) => Cast::ok(value),
        Value::Float(f) => match integral_float(f) {
            Some(i) => Cast::ok(Value::Int(i)),
            None => Cast::flagged(value, ty),
        },
        Value::Str(ref s) => match parse_timestamp(s.trim()) {
            Some(ts) => Cast::ok(Value::Int(ts)),
            None => Cast::flagged(value, ty),
        },
        other => Cast::flagged(other, ty),
    }
}

/// Parse integer seconds, RFC 3339, or `YYYY-MM-DD[ HH:MM:SS]` (UTC) into a Unix timestamp.
pub(crate) fn parse_timestamp(s: &str) -> Option<i64> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(i);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc().timestamp());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}
