//! The schema interpreter: walks an encoder's schema over a sheet and emits records.

use std::path::PathBuf;

use indexmap::IndexMap;

use crate::ci_map::CiMap;
use crate::coercion::{cast, CastWarning};
use crate::error::{HwdbError, HwdbResult};
use crate::sheet::SheetModel;
use crate::types::{Value, ValueKey};
use crate::values::{ValueOrigin, ValueResolver};

use super::schema::{GroupField, ScalarField, Schema, SchemaNode};
use super::{Encoder, RecordType};

/// Where a record came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLocation {
    pub file: PathBuf,
    pub sheet: String,
    /// 1-based spreadsheet rows that contributed to the record (empty for a sheet without a
    /// data table).
    pub rows: Vec<usize>,
}

/// One encoded record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// `Record Type`, `Part Type ID`, `Part Type Name`, optional `Test Name`, then the schema
    /// fields in schema order.
    pub fields: CiMap<Value>,
    pub location: RecordLocation,
    pub warnings: Vec<CastWarning>,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// `Item` or `Test`.
    pub fn record_type(&self) -> Option<RecordType> {
        self.get("Record Type")?.as_str()?.parse().ok()
    }

    /// A top-level field as text, `None` when absent or null.
    pub fn text(&self, field: &str) -> Option<String> {
        self.get(field).filter(|v| !v.is_null()).map(Value::to_string)
    }
}

struct Walker<'a> {
    sheet: &'a SheetModel,
    resolver: ValueResolver<'a>,
    warnings: Vec<CastWarning>,
}

/// Encode every record of `sheet` with `encoder`.
///
/// Rows are first split into record buckets (see [`Encoder::bucket_key`]); each bucket is
/// encoded into one record by walking the schema tree.
pub fn encode(encoder: &Encoder, sheet: &SheetModel) -> HwdbResult<Vec<Record>> {
    let resolver = sheet.resolver();
    let header = record_header(encoder, sheet, &resolver)?;

    let all_rows: Vec<usize> = (0..sheet.row_count()).collect();
    let buckets: Vec<Vec<usize>> = match encoder.bucket_key() {
        None => all_rows.into_iter().map(|r| vec![r]).collect(),
        Some(keys) => {
            let mut buckets: IndexMap<Vec<ValueKey>, Vec<usize>> = IndexMap::new();
            for row in all_rows {
                let key = keys
                    .iter()
                    .map(|k| ValueKey(resolver.coalesce(k, Some(row)).clone()))
                    .collect();
                buckets.entry(key).or_default().push(row);
            }
            buckets.into_values().collect()
        }
    };

    let mut records = Vec::with_capacity(buckets.len());
    for rows in buckets {
        let mut walker = Walker {
            sheet,
            resolver,
            warnings: Vec::new(),
        };
        let mut fields = header.clone();
        for (name, value) in walker.walk(&encoder.schema, &rows, "")? {
            fields.insert(name, value);
        }
        records.push(Record {
            fields,
            location: RecordLocation {
                file: sheet.path().to_path_buf(),
                sheet: sheet.sheet_name().to_string(),
                rows: rows.iter().filter_map(|&r| sheet.row_number(r)).collect(),
            },
            warnings: walker.warnings,
        });
    }

    tracing::debug!(
        encoder = encoder.name.as_str(),
        path = %sheet.path().display(),
        sheet = sheet.sheet_name(),
        records = records.len(),
        "sheet encoded"
    );
    Ok(records)
}

/// Top-level identity fields shared by every record of the sheet.
fn record_header(encoder: &Encoder, sheet: &SheetModel, resolver: &ValueResolver<'_>) -> HwdbResult<CiMap<Value>> {
    let ctx = || format!("encoder '{}' on {} [{}]", encoder.name, sheet.path().display(), sheet.sheet_name());

    let sheet_id = non_null(resolver.coalesce("Part Type ID", None));
    let part_type_id = match (sheet_id, encoder.part_type_id.as_deref()) {
        (Some(id), Some(own)) if !id.to_string().eq_ignore_ascii_case(own) => {
            return Err(HwdbError::invalid_encoder(format!(
                "{}: sheet part type '{id}' does not match the encoder's '{own}'",
                ctx()
            )));
        }
        (Some(id), _) => id.clone(),
        (None, Some(own)) => Value::from(own),
        (None, None) => {
            return Err(HwdbError::invalid_encoder(format!("{}: no part type ID", ctx())));
        }
    };
    let part_type_name = non_null(resolver.coalesce("Part Type Name", None))
        .cloned()
        .or_else(|| encoder.part_type_name.as_deref().map(Value::from))
        .unwrap_or_default();

    let mut header = CiMap::new();
    header.insert("Record Type", Value::from(encoder.record_type.to_string()));
    header.insert("Part Type ID", part_type_id);
    header.insert("Part Type Name", part_type_name);
    if encoder.record_type == RecordType::Test {
        let test_name = non_null(resolver.coalesce("Test Name", None))
            .cloned()
            .or_else(|| encoder.test_name.as_deref().map(Value::from))
            .unwrap_or_default();
        header.insert("Test Name", test_name);
    }
    Ok(header)
}

fn non_null(v: &Value) -> Option<&Value> {
    (!v.is_null()).then_some(v)
}

impl Walker<'_> {
    fn walk(&mut self, schema: &Schema, rows: &[usize], prefix: &str) -> HwdbResult<CiMap<Value>> {
        let mut out = CiMap::new();
        for (name, node) in &schema.fields {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            let value = match node {
                SchemaNode::Scalar(field) => self.scalar(name, field, rows, &path)?,
                SchemaNode::Literal(v) => v.clone(),
                SchemaNode::Object(children) => Value::Map(self.walk(children, rows, &path)?),
                SchemaNode::Group(group) => self.group(group, rows, &path)?,
            };
            out.insert(name.clone(), value);
        }
        Ok(out)
    }

    /// The first non-null cell across the bucket's rows, else the sheet-local or outer value,
    /// defaulted and cast.
    fn scalar(&mut self, name: &str, field: &ScalarField, rows: &[usize], path: &str) -> HwdbResult<Value> {
        let column = field.column.as_deref().unwrap_or(name);
        let mut found = rows.iter().find_map(|&row| match self.resolver.resolve(column, Some(row)) {
            (value, ValueOrigin::Cell) if !value.is_null() => Some((value.clone(), ValueOrigin::Cell, row)),
            _ => None,
        });
        if found.is_none() {
            let (value, origin) = self.resolver.resolve(column, None);
            found = Some((value.clone(), origin, 0)).filter(|(v, _, _)| !v.is_null());
        }

        let (value, origin, row) = match found {
            Some(found) => found,
            None => match &field.default {
                Some(default) => (default.clone(), ValueOrigin::Missing, 0),
                None => (Value::Null, ValueOrigin::Missing, 0),
            },
        };

        if value.is_null() && field.required {
            return Err(HwdbError::MissingField {
                field: path.to_string(),
                file: self.sheet.path().to_path_buf(),
                sheet: self.sheet.sheet_name().to_string(),
                row: rows.first().and_then(|&r| self.sheet.row_number(r)).unwrap_or(0),
            });
        }

        let result = cast(value, &field.ty);
        let warn_row = match origin {
            ValueOrigin::Cell => self.sheet.row_number(row),
            _ => None,
        };
        self.warnings.extend(result.warnings.into_iter().map(|message| CastWarning {
            field: path.to_string(),
            row: warn_row,
            message,
        }));
        Ok(result.value)
    }

    /// One member map per distinct key tuple, in order of first appearance.
    fn group(&mut self, group: &GroupField, rows: &[usize], path: &str) -> HwdbResult<Value> {
        let mut instances: IndexMap<Vec<ValueKey>, Vec<usize>> = IndexMap::new();
        for &row in rows {
            let key: Option<Vec<ValueKey>> = group
                .keys
                .iter()
                .map(|k| non_null(self.resolver.coalesce(k, Some(row))).map(|v| ValueKey(v.clone())))
                .collect();
            if let Some(key) = key {
                instances.entry(key).or_default().push(row);
            }
        }

        let mut members = Vec::with_capacity(instances.len());
        for (idx, sub_rows) in instances.values().enumerate() {
            let member_path = format!("{path}[{idx}]");
            members.push(Value::Map(self.walk(&group.members, sub_rows, &member_path)?));
        }
        Ok(Value::List(members))
    }
}
