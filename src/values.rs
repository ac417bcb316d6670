//! Scoped values and the `coalesce` precedence chain.
//!
//! Values are set at four scopes, broadest first: docket, source, sheet configuration, and the
//! sheet-local header block. A cell in the data table beats all of them.
//!
//! - [`merge_scoped`] layers a narrower scope over a broader one and rejects a redefinition with
//!   a different value.
//! - [`ValueResolver::coalesce`] looks a column up through cell → local → outer values.

use crate::ci_map::CiMap;
use crate::error::{HwdbError, HwdbResult};
use crate::types::Value;

/// A scope's key/value defaults.
pub type Values = CiMap<Value>;

static NULL: Value = Value::Null;

/// Layer `narrower` over `broader`.
///
/// Re-stating a key with the same value is allowed; a different value is a
/// [`HwdbError::ValueConflict`] naming `scope`.
pub fn merge_scoped(broader: &Values, narrower: &Values, scope: &str) -> HwdbResult<Values> {
    let mut out = broader.clone();
    for (key, value) in narrower.iter() {
        if let Some(existing) = broader.get(key) {
            if !existing.same_as(value) {
                return Err(HwdbError::ValueConflict {
                    key: key.to_string(),
                    scope: scope.to_string(),
                    existing: existing.to_string(),
                    new: value.to_string(),
                });
            }
        }
        out.insert(key, value.clone());
    }
    Ok(out)
}

/// Parse a docket `Values` object.
pub fn values_from_json(v: &serde_json::Value, context: &str) -> HwdbResult<Values> {
    match v {
        serde_json::Value::Null => Ok(Values::new()),
        serde_json::Value::Object(obj) => Ok(obj
            .iter()
            .map(|(k, v)| (k.clone(), Value::from_json(v)))
            .collect()),
        other => Err(HwdbError::invalid_docket(format!(
            "{context}: 'Values' must be a mapping, got {other}"
        ))),
    }
}

/// Where a coalesced value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOrigin {
    Cell,
    Local,
    Outer,
    Missing,
}

/// Resolves a column through cell → sheet-local → outer (sheet/source/docket) values.
#[derive(Debug, Clone, Copy)]
pub struct ValueResolver<'a> {
    columns: &'a CiMap<usize>,
    rows: &'a [Vec<Value>],
    local: &'a Values,
    outer: &'a Values,
}

impl<'a> ValueResolver<'a> {
    pub fn new(
        columns: &'a CiMap<usize>,
        rows: &'a [Vec<Value>],
        local: &'a Values,
        outer: &'a Values,
    ) -> Self {
        Self {
            columns,
            rows,
            local,
            outer,
        }
    }

    /// Resolve `column`, returning the value and its origin.
    ///
    /// With `row = None` only the local and outer scopes are consulted.
    pub fn resolve(&self, column: &str, row: Option<usize>) -> (&'a Value, ValueOrigin) {
        if let Some(row) = row {
            let cell = self
                .columns
                .get(column)
                .and_then(|&idx| self.rows.get(row).and_then(|r| r.get(idx)));
            if let Some(v) = cell.filter(|v| !v.is_null()) {
                return (v, ValueOrigin::Cell);
            }
        }
        if let Some(v) = self.local.get(column) {
            return (v, ValueOrigin::Local);
        }
        if let Some(v) = self.outer.get(column) {
            return (v, ValueOrigin::Outer);
        }
        (&NULL, ValueOrigin::Missing)
    }

    /// Resolve `column` to a value, `Null` if no scope has it.
    pub fn coalesce(&self, column: &str, row: Option<usize>) -> &'a Value {
        self.resolve(column, row).0
    }

    /// Whether any scope (table header, local block, outer values) knows `column`.
    pub fn knows(&self, column: &str) -> bool {
        self.columns.contains_key(column) || self.local.contains_key(column) || self.outer.contains_key(column)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{merge_scoped, values_from_json, ValueOrigin, ValueResolver, Values};
    use crate::ci_map::CiMap;
    use crate::error::HwdbError;
    use crate::types::Value;

    fn values(pairs: &[(&str, Value)]) -> Values {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn restating_same_value_is_allowed() {
        let global = values(&[("X", Value::Int(1))]);
        let source = values(&[("x", Value::Int(1)), ("Y", Value::from("b"))]);
        let merged = merge_scoped(&global, &source, "source 'S'").unwrap();
        assert_eq!(merged.get("X"), Some(&Value::Int(1)));
        assert_eq!(merged.get("y"), Some(&Value::from("b")));
    }

    #[test]
    fn values_keep_document_order() {
        let parsed = values_from_json(&json!({"Zone": "B", "Operator": "Kim", "Batch": 7}), "docket").unwrap();
        let keys: Vec<&str> = parsed.keys().collect();
        assert_eq!(keys, vec!["Zone", "Operator", "Batch"]);
    }

    #[test]
    fn integral_float_restatement_is_not_a_conflict() {
        let global = values(&[("X", Value::Int(1))]);
        let source = values(&[("X", Value::Float(1.0))]);
        assert!(merge_scoped(&global, &source, "source").is_ok());
    }

    #[test]
    fn different_value_is_a_conflict() {
        let global = values(&[("X", Value::Int(1))]);
        let source = values(&[("X", Value::Int(2))]);
        let err = merge_scoped(&global, &source, "source 'S'").unwrap_err();
        match err {
            HwdbError::ValueConflict { key, scope, existing, new } => {
                assert_eq!(key, "X");
                assert_eq!(scope, "source 'S'");
                assert_eq!(existing, "1");
                assert_eq!(new, "2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn coalesce_precedence() {
        let columns: CiMap<usize> = [("Serial Number", 0), ("Mass", 1)].into_iter().collect();
        let rows = vec![
            vec![Value::from("A1"), Value::Float(2.5)],
            vec![Value::from("A2"), Value::Null],
        ];
        let local = values(&[("Mass", Value::Float(9.0)), ("Lab", Value::from("L1"))]);
        let outer = values(&[("Lab", Value::from("outer")), ("Site", Value::from("CERN"))]);
        let r = ValueResolver::new(&columns, &rows, &local, &outer);

        assert_eq!(r.resolve("mass", Some(0)), (&Value::Float(2.5), ValueOrigin::Cell));
        assert_eq!(r.resolve("mass", Some(1)), (&Value::Float(9.0), ValueOrigin::Local));
        assert_eq!(r.coalesce("Lab", Some(0)), &Value::from("L1"));
        assert_eq!(r.resolve("site", Some(1)), (&Value::from("CERN"), ValueOrigin::Outer));
        assert_eq!(r.resolve("nothing", Some(0)), (&Value::Null, ValueOrigin::Missing));

        // Without a row only local/outer scopes apply.
        assert_eq!(r.coalesce("Serial Number", None), &Value::Null);
        assert_eq!(r.coalesce("Mass", None), &Value::Float(9.0));
        assert!(r.knows("serial number"));
        assert!(!r.knows("nothing"));
    }
}
