//! The upload plan: encoded records sorted into HWDB operations, with REST payloads.

use std::fmt;

use serde_json::{json, Map};

use crate::encoder::{Record, RecordType};
use crate::lookup::{LookupService, LookupTable};
use crate::types::Value;

/// Record fields that map onto named payload keys; everything else is a specification or
/// test datum.
const CLAIMED_FIELDS: [&str; 18] = [
    "Record Type",
    "Part Type ID",
    "Part Type Name",
    "Test Name",
    "External ID",
    "Serial Number",
    "Comments",
    "Institution",
    "Institution ID",
    "Institution Name",
    "Country",
    "Country Code",
    "Country Name",
    "Manufacturer",
    "Manufacturer ID",
    "Manufacturer Name",
    "Specifications",
    "Test Data",
];

/// A record and the JSON body that will be sent for it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRecord {
    pub record: Record,
    pub payload: serde_json::Value,
}

impl PlannedRecord {
    pub fn part_type_id(&self) -> Option<String> {
        self.record.text("Part Type ID")
    }

    pub fn external_id(&self) -> Option<String> {
        self.record.text("External ID")
    }

    pub fn serial_number(&self) -> Option<String> {
        self.record.text("Serial Number")
    }
}

/// Everything a docket would upload, grouped by operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadPlan {
    pub new_items: Vec<PlannedRecord>,
    pub update_items: Vec<PlannedRecord>,
    pub new_tests: Vec<PlannedRecord>,
}

impl UploadPlan {
    /// Sort records into operations and build their payloads.
    ///
    /// Items with a non-null `External ID` are updates; other items are new. Tests are
    /// always new.
    pub fn from_records(records: impl IntoIterator<Item = Record>, lookup: &LookupService) -> Self {
        let mut plan = Self::default();
        for record in records {
            match record.record_type() {
                Some(RecordType::Test) => {
                    let payload = test_payload(&record);
                    plan.new_tests.push(PlannedRecord { record, payload });
                }
                _ => {
                    let mut payload = item_payload(&record, lookup);
                    match record.text("External ID") {
                        Some(part_id) => {
                            if let Some(obj) = payload.as_object_mut() {
                                obj.insert("part_id".to_string(), json!(part_id));
                            }
                            plan.update_items.push(PlannedRecord { record, payload });
                        }
                        None => plan.new_items.push(PlannedRecord { record, payload }),
                    }
                }
            }
        }
        plan
    }

    pub fn len(&self) -> usize {
        self.new_items.len() + self.update_items.len() + self.new_tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every planned record, in submission order.
    pub fn iter(&self) -> impl Iterator<Item = &PlannedRecord> {
        self.new_items
            .iter()
            .chain(self.update_items.iter())
            .chain(self.new_tests.iter())
    }

    pub fn warning_count(&self) -> usize {
        self.iter().map(|p| p.record.warnings.len()).sum()
    }

    /// The plan as one JSON document, for display.
    pub fn to_json(&self) -> serde_json::Value {
        let section = |items: &[PlannedRecord]| {
            items
                .iter()
                .map(|p| p.payload.clone())
                .collect::<Vec<_>>()
        };
        json!({
            "New Items": section(&self.new_items),
            "Update Items": section(&self.update_items),
            "New Tests": section(&self.new_tests),
        })
    }
}

impl fmt::Display for UploadPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} new item(s), {} item update(s), {} new test(s)",
            self.new_items.len(),
            self.update_items.len(),
            self.new_tests.len()
        )?;
        for (label, items) in [
            ("new item", &self.new_items),
            ("update", &self.update_items),
            ("new test", &self.new_tests),
        ] {
            for p in items {
                let loc = &p.record.location;
                writeln!(
                    f,
                    "  {label}: part type {} serial {} ({} [{}] rows {:?})",
                    p.part_type_id().unwrap_or_default(),
                    p.serial_number().unwrap_or_else(|| "-".to_string()),
                    loc.file.display(),
                    loc.sheet,
                    loc.rows
                )?;
                for w in &p.record.warnings {
                    writeln!(f, "    warning: {w}")?;
                }
            }
        }
        Ok(())
    }
}

fn field_json(record: &Record, field: &str) -> serde_json::Value {
    record.get(field).map(Value::to_json).unwrap_or(serde_json::Value::Null)
}

/// Fields no named payload key claims.
fn unclaimed(record: &Record) -> serde_json::Value {
    let mut out = Map::new();
    for (key, value) in record.fields.iter() {
        if !CLAIMED_FIELDS.iter().any(|c| c.eq_ignore_ascii_case(key)) {
            out.insert(key.to_string(), value.to_json());
        }
    }
    serde_json::Value::Object(out)
}

/// Resolve a reference (`<Name> ID` first, then `<Name>`/`<Name> Name`) to a table id.
///
/// Unresolvable values pass through unchanged; numeric ids are sent as numbers.
fn reference(record: &Record, name: &str, table: &LookupTable) -> serde_json::Value {
    let given = [format!("{name} ID"), name.to_string(), format!("{name} Name")]
        .into_iter()
        .find_map(|field| record.get(&field).filter(|v| !v.is_null()).cloned());
    let Some(given) = given else {
        return serde_json::Value::Null;
    };
    match table.resolve(&given.to_string()) {
        Some(entry) => match entry.id.parse::<i64>() {
            Ok(n) => json!(n),
            Err(_) => json!(entry.id),
        },
        None => given.to_json(),
    }
}

fn item_payload(record: &Record, lookup: &LookupService) -> serde_json::Value {
    let specifications = match record.get("Specifications") {
        Some(v) => v.to_json(),
        None => unclaimed(record),
    };
    let country_code = match record.get("Country Code").filter(|v| !v.is_null()) {
        Some(code) => code.to_json(),
        None => reference(record, "Country", &lookup.countries),
    };
    json!({
        "part_type": {"id": field_json(record, "Part Type ID")},
        "serial_number": field_json(record, "Serial Number"),
        "comments": field_json(record, "Comments"),
        "institution": {"id": reference(record, "Institution", &lookup.institutions)},
        "country_code": country_code,
        "manufacturer": {"id": reference(record, "Manufacturer", &lookup.manufacturers)},
        "specifications": specifications,
    })
}

fn test_payload(record: &Record) -> serde_json::Value {
    let test_data = match record.get("Test Data") {
        Some(v) => v.to_json(),
        None => unclaimed(record),
    };
    json!({
        "test_type": field_json(record, "Test Name"),
        "comments": field_json(record, "Comments"),
        "test_data": test_data,
    })
}
