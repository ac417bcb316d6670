//! Encoders: named schemas that turn sheet rows into records.
//!
//! An [`Encoder`] pairs a [`Schema`] with the identity of the records it produces
//! (record type, part type, test name). [`EncoderRef::Auto`] stands for an encoder inferred
//! from a sheet's header row when a source names none.

mod encode;
pub mod schema;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::ci_map::CiMap;
use crate::coercion::DeclaredType;
use crate::error::{HwdbError, HwdbResult};
use crate::sheet::SheetModel;

pub use encode::{encode, Record, RecordLocation};
pub use schema::{GroupField, ScalarField, Schema, SchemaNode};

/// Columns that identify a hardware item; grouped schemas bucket rows by them by default.
pub const ITEM_KEY_COLUMNS: [&str; 2] = ["External ID", "Serial Number"];

/// What kind of HWDB record an encoder produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    Item,
    Test,
}

impl FromStr for RecordType {
    type Err = HwdbError;

    fn from_str(s: &str) -> HwdbResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "item" => Ok(Self::Item),
            "test" => Ok(Self::Test),
            _ => Err(HwdbError::invalid_encoder(format!(
                "unknown record type '{s}' (expected 'Item' or 'Test')"
            ))),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Item => f.write_str("Item"),
            Self::Test => f.write_str("Test"),
        }
    }
}

/// A named record schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoder {
    pub name: String,
    pub record_type: RecordType,
    pub part_type_id: Option<String>,
    pub part_type_name: Option<String>,
    /// Required for [`RecordType::Test`].
    pub test_name: Option<String>,
    /// Columns whose value tuple identifies one record.
    pub record_key: Option<Vec<String>>,
    pub schema: Schema,
}

impl Encoder {
    /// Parse an encoder object.
    ///
    /// `fallback_name` is used when the object has no `Encoder Name` (the key of a
    /// name-keyed `Encoders` mapping).
    pub fn from_json(v: &serde_json::Value, fallback_name: Option<&str>) -> HwdbResult<Self> {
        let obj = v
            .as_object()
            .ok_or_else(|| HwdbError::invalid_encoder(format!("encoder must be a mapping, got {v}")))?;
        let attrs: CiMap<&serde_json::Value> = obj.iter().map(|(k, v)| (k.as_str(), v)).collect();

        let name = match text_attr(&attrs, "Encoder Name", "encoder")? {
            Some(name) => name,
            None => fallback_name
                .map(str::to_string)
                .ok_or_else(|| HwdbError::invalid_encoder("encoder has no 'Encoder Name'"))?,
        };
        let ctx = format!("encoder '{name}'");

        let record_type = match text_attr(&attrs, "Record Type", &ctx)? {
            Some(t) => t.parse().map_err(|e| contextualize(&ctx, e))?,
            None => RecordType::Item,
        };
        let part_type_id = text_attr(&attrs, "Part Type ID", &ctx)?;
        let part_type_name = text_attr(&attrs, "Part Type Name", &ctx)?;
        let test_name = text_attr(&attrs, "Test Name", &ctx)?;
        if record_type == RecordType::Test && test_name.is_none() {
            return Err(HwdbError::invalid_encoder(format!(
                "{ctx}: 'Test Name' is required for Test encoders"
            )));
        }
        let record_key = match attrs.get("Record Key") {
            None | Some(serde_json::Value::Null) => None,
            Some(key) => Some(schema::parse_keys(Some(key), &format!("{ctx}.Record Key"))?),
        };
        let schema = match attrs.get("Schema") {
            Some(s) => Schema::from_json(s, &format!("{ctx}.Schema"))?,
            None => return Err(HwdbError::invalid_encoder(format!("{ctx}: missing 'Schema'"))),
        };

        Ok(Self {
            name,
            record_type,
            part_type_id,
            part_type_name,
            test_name,
            record_key,
            schema,
        })
    }

    /// The encoder used when none is named: an Item record with every header column as a
    /// nullable text field.
    pub fn auto<'a>(headers: impl IntoIterator<Item = &'a str>) -> Self {
        let fields = headers
            .into_iter()
            .map(|h| {
                (
                    h.to_string(),
                    SchemaNode::Scalar(ScalarField::new(DeclaredType::Nullable(Box::new(DeclaredType::Str)))),
                )
            })
            .collect();
        Self {
            name: "Auto".to_string(),
            record_type: RecordType::Item,
            part_type_id: None,
            part_type_name: None,
            test_name: None,
            record_key: None,
            schema: Schema { fields },
        }
    }

    /// Encode every record of `sheet`.
    pub fn encode(&self, sheet: &SheetModel) -> HwdbResult<Vec<Record>> {
        encode(self, sheet)
    }

    /// Key columns used to bucket rows into records; `None` means one record per row.
    pub fn bucket_key(&self) -> Option<Vec<String>> {
        match &self.record_key {
            Some(keys) => Some(keys.clone()),
            None if self.schema.has_groups() => Some(ITEM_KEY_COLUMNS.iter().map(|s| s.to_string()).collect()),
            None => None,
        }
    }
}

/// The encoder a sheet job uses.
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderRef {
    Named(Arc<Encoder>),
    /// Inferred from the sheet's header row at encode time.
    Auto,
}

impl EncoderRef {
    pub const AUTO: EncoderRef = EncoderRef::Auto;

    pub fn name(&self) -> &str {
        match self {
            Self::Named(e) => &e.name,
            Self::Auto => "Auto",
        }
    }

    pub fn encode(&self, sheet: &SheetModel) -> HwdbResult<Vec<Record>> {
        match self {
            Self::Named(encoder) => encoder.encode(sheet),
            Self::Auto => Encoder::auto(sheet.table().headers()).encode(sheet),
        }
    }
}

fn text_attr(attrs: &CiMap<&serde_json::Value>, key: &str, ctx: &str) -> HwdbResult<Option<String>> {
    match attrs.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(HwdbError::invalid_encoder(format!(
            "{ctx}: '{key}' must be text, got {other}"
        ))),
    }
}

fn contextualize(ctx: &str, err: HwdbError) -> HwdbError {
    match err {
        HwdbError::InvalidEncoder { message } => HwdbError::invalid_encoder(format!("{ctx}: {message}")),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Encoder, RecordType, SchemaNode};
    use crate::coercion::DeclaredType;

    #[test]
    fn parses_test_encoder() {
        let enc = Encoder::from_json(
            &json!({
                "Encoder Name": "Cable Test",
                "record type": "test",
                "Part Type ID": "Z00100300001",
                "Test Name": "Continuity",
                "Record Key": "Serial Number",
                "Schema": {"Serial Number": "str", "Resistance": "float"}
            }),
            None,
        )
        .unwrap();
        assert_eq!(enc.name, "Cable Test");
        assert_eq!(enc.record_type, RecordType::Test);
        assert_eq!(enc.part_type_id.as_deref(), Some("Z00100300001"));
        assert_eq!(enc.record_key, Some(vec!["Serial Number".to_string()]));
        assert_eq!(enc.bucket_key(), Some(vec!["Serial Number".to_string()]));
        assert_eq!(enc.schema.len(), 2);
    }

    #[test]
    fn test_encoder_needs_test_name() {
        let err = Encoder::from_json(
            &json!({"Encoder Name": "T", "Record Type": "Test", "Schema": {}}),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Test Name"), "{err}");
    }

    #[test]
    fn name_falls_back_to_mapping_key() {
        let enc = Encoder::from_json(&json!({"Schema": {"A": "int"}}), Some("Widgets")).unwrap();
        assert_eq!(enc.name, "Widgets");
        assert_eq!(enc.record_type, RecordType::Item);
        assert_eq!(enc.bucket_key(), None);
        assert!(Encoder::from_json(&json!({"Schema": {}}), None).is_err());
    }

    #[test]
    fn grouped_schemas_bucket_by_item_columns() {
        let enc = Encoder::from_json(
            &json!({"Schema": {"Runs": {"type": "group", "key": "Date", "members": {"T": "float"}}}}),
            Some("G"),
        )
        .unwrap();
        assert_eq!(
            enc.bucket_key(),
            Some(vec!["External ID".to_string(), "Serial Number".to_string()])
        );
    }

    #[test]
    fn auto_encoder_uses_nullable_text_fields() {
        let enc = Encoder::auto(["Serial Number", "Mass"]);
        assert_eq!(enc.record_type, RecordType::Item);
        assert_eq!(enc.schema.len(), 2);
        match &enc.schema.fields[1].1 {
            SchemaNode::Scalar(f) => {
                assert_eq!(f.ty, DeclaredType::Nullable(Box::new(DeclaredType::Str)));
                assert!(f.column.is_none());
            }
            other => panic!("unexpected node {other:?}"),
        }
    }
}
