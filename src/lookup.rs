//! Reference tables for part types, institutions, countries and manufacturers.
//!
//! A [`LookupService`] is built once (usually from a JSON file) and passed to whatever needs
//! it; there is no process-wide cache.
//!
//! File format:
//!
//! ```json
//! {
//!   "Part Types": [{"id": "Z00100300001", "name": "Z.Sandbox.HWDBUnitTest.test type 1"}],
//!   "Institutions": [{"id": 186, "name": "University of Minnesota Twin Cities"}],
//!   "Countries": [{"id": "US", "name": "United States"}],
//!   "Manufacturers": [{"id": 7, "name": "Hajime Inc"}]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::ci_map::CiMap;
use crate::error::{HwdbError, HwdbResult};

/// One `{id, name}` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupEntry {
    #[serde(deserialize_with = "id_as_text")]
    pub id: String,
    pub name: String,
}

impl LookupEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

fn id_as_text<'de, D: Deserializer<'de>>(de: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(de)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("id must be text or a number, got {other}"))),
    }
}

/// Entries resolvable by id or by name, case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entries: Vec<LookupEntry>,
    by_id: CiMap<usize>,
    /// `None` marks a name shared by several entries.
    by_name: CiMap<Option<usize>>,
}

impl LookupTable {
    pub fn new(entries: impl IntoIterator<Item = LookupEntry>) -> Self {
        let mut table = Self::default();
        for entry in entries {
            table.push(entry);
        }
        table
    }

    fn push(&mut self, entry: LookupEntry) {
        let idx = self.entries.len();
        self.by_id.insert(entry.id.trim(), idx);
        let name = entry.name.trim().to_string();
        match self.by_name.get_mut(&name) {
            Some(slot) => *slot = None,
            None => {
                self.by_name.insert(name, Some(idx));
            }
        }
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn by_id(&self, id: &str) -> Option<&LookupEntry> {
        self.by_id.get(id.trim()).map(|&idx| &self.entries[idx])
    }

    /// Resolve a name; ambiguous names resolve to nothing.
    pub fn by_name(&self, name: &str) -> Option<&LookupEntry> {
        self.by_name
            .get(name.trim())
            .copied()
            .flatten()
            .map(|idx| &self.entries[idx])
    }

    /// Resolve `key` as an id first, then as a name.
    pub fn resolve(&self, key: &str) -> Option<&LookupEntry> {
        self.by_id(key).or_else(|| self.by_name(key))
    }
}

#[derive(Debug, Default, Deserialize)]
struct LookupFile {
    #[serde(default, rename = "Part Types", alias = "part_types")]
    part_types: Option<Vec<LookupEntry>>,
    #[serde(default, rename = "Institutions", alias = "institutions")]
    institutions: Vec<LookupEntry>,
    #[serde(default, rename = "Countries", alias = "countries")]
    countries: Vec<LookupEntry>,
    #[serde(default, rename = "Manufacturers", alias = "manufacturers")]
    manufacturers: Vec<LookupEntry>,
}

/// The reference tables used while planning an upload.
#[derive(Debug, Clone, Default)]
pub struct LookupService {
    /// `None` when no part-type table is available; part-type identities are then
    /// accepted unverified.
    pub part_types: Option<LookupTable>,
    pub institutions: LookupTable,
    pub countries: LookupTable,
    pub manufacturers: LookupTable,
}

impl LookupService {
    /// A service with no tables.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_path(path: impl AsRef<Path>) -> HwdbResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> HwdbResult<Self> {
        let file: LookupFile = serde_json::from_str(text)?;
        Ok(Self {
            part_types: file.part_types.map(LookupTable::new),
            institutions: LookupTable::new(file.institutions),
            countries: LookupTable::new(file.countries),
            manufacturers: LookupTable::new(file.manufacturers),
        })
    }

    pub fn with_part_types(mut self, entries: impl IntoIterator<Item = LookupEntry>) -> Self {
        self.part_types = Some(LookupTable::new(entries));
        self
    }

    pub fn with_institutions(mut self, entries: impl IntoIterator<Item = LookupEntry>) -> Self {
        self.institutions = LookupTable::new(entries);
        self
    }

    pub fn with_countries(mut self, entries: impl IntoIterator<Item = LookupEntry>) -> Self {
        self.countries = LookupTable::new(entries);
        self
    }

    pub fn with_manufacturers(mut self, entries: impl IntoIterator<Item = LookupEntry>) -> Self {
        self.manufacturers = LookupTable::new(entries);
        self
    }

    /// Resolve a part-type identity given by id and/or name.
    ///
    /// - Without a part-type table the given values are returned unverified.
    /// - Both given: they must name the same entry, otherwise [`HwdbError::PartTypeMismatch`].
    /// - One given: the other is filled in from the table.
    /// - `Ok(None)`: nothing given, or nothing resolved.
    pub fn resolve_part_type(&self, id: Option<&str>, name: Option<&str>) -> HwdbResult<Option<LookupEntry>> {
        let Some(table) = &self.part_types else {
            return Ok(match (id, name) {
                (None, None) => None,
                (id, name) => Some(LookupEntry::new(id.unwrap_or_default(), name.unwrap_or_default())),
            });
        };
        match (id, name) {
            (Some(id), Some(name)) => {
                let by_id = table.by_id(id);
                let by_name = table.by_name(name);
                match (by_id, by_name) {
                    (Some(a), Some(b)) if a == b => Ok(Some(a.clone())),
                    (None, None) => Ok(None),
                    _ => Err(HwdbError::PartTypeMismatch {
                        id: id.to_string(),
                        name: name.to_string(),
                    }),
                }
            }
            (Some(id), None) => Ok(table.by_id(id).cloned()),
            (None, Some(name)) => Ok(table.by_name(name).cloned()),
            (None, None) => Ok(None),
        }
    }
}
