//! Source nodes and their expansion into sheet jobs.

use std::path::{Path, PathBuf};

use crate::ci_map::CiMap;
use crate::encoder::EncoderRef;
use crate::error::{HwdbError, HwdbResult};
use crate::ingestion::{IngestionFormat, SheetSelection};
use crate::values::{values_from_json, Values};

/// One `Sources` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSpec {
    pub name: String,
    /// Glob patterns; relative patterns resolve against `base_dir`.
    pub files: Vec<String>,
    pub sheets: SheetSpec,
    pub values: Values,
    pub encoder: Option<String>,
    pub part_type_id: Option<String>,
    pub part_type_name: Option<String>,
    /// Directory of the docket file that declared this source.
    pub base_dir: PathBuf,
}

/// Which sheets of each matched file to load.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SheetSpec {
    /// The first sheet.
    #[default]
    Default,
    /// Every sheet of the workbook (`"*"`).
    All,
    List(Vec<SheetOverride>),
}

/// A named sheet with optional sheet-scoped values and encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetOverride {
    pub name: String,
    pub values: Values,
    pub encoder: Option<String>,
}

/// A fully resolved unit of work: one sheet of one file.
#[derive(Debug, Clone)]
pub struct SheetJob {
    pub source_name: String,
    pub path: PathBuf,
    pub format: IngestionFormat,
    pub sheet: SheetSelection,
    /// Docket ⊕ source ⊕ sheet values.
    pub values: Values,
    pub encoder: EncoderRef,
}

type Attrs<'a> = CiMap<&'a serde_json::Value>;

fn attrs(obj: &serde_json::Map<String, serde_json::Value>) -> Attrs<'_> {
    obj.iter().map(|(k, v)| (k.as_str(), v)).collect()
}

impl SourceSpec {
    /// Parse a `Sources` value: a list, a single mapping, or a bare file pattern.
    pub fn list_from_json(v: &serde_json::Value, base_dir: &Path) -> HwdbResult<Vec<Self>> {
        let items: Vec<&serde_json::Value> = match v {
            serde_json::Value::Null => Vec::new(),
            serde_json::Value::Array(items) => items.iter().collect(),
            single => vec![single],
        };
        items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| Self::from_json(item, idx + 1, base_dir))
            .collect()
    }

    /// Parse one source node; `ordinal` (1-based) names unnamed sources.
    pub fn from_json(v: &serde_json::Value, ordinal: usize, base_dir: &Path) -> HwdbResult<Self> {
        let default_name = format!("Unnamed Source Node {ordinal}");
        let obj = match v {
            serde_json::Value::String(pattern) => {
                return Ok(Self {
                    name: default_name,
                    files: vec![pattern.clone()],
                    sheets: SheetSpec::Default,
                    values: Values::new(),
                    encoder: None,
                    part_type_id: None,
                    part_type_name: None,
                    base_dir: base_dir.to_path_buf(),
                });
            }
            serde_json::Value::Object(obj) => obj,
            other => {
                return Err(HwdbError::invalid_docket(format!(
                    "source #{ordinal} must be a mapping or a file pattern, got {other}"
                )));
            }
        };
        let a = attrs(obj);

        let name = text(&a, "Source Name", &default_name)?.unwrap_or(default_name);
        let ctx = format!("source '{name}'");

        let files = match a.get("Files") {
            Some(serde_json::Value::String(p)) => vec![p.clone()],
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(|p| {
                    p.as_str().map(str::to_string).ok_or_else(|| {
                        HwdbError::invalid_docket(format!("{ctx}: file patterns must be strings, got {p}"))
                    })
                })
                .collect::<HwdbResult<_>>()?,
            Some(other) => {
                return Err(HwdbError::invalid_docket(format!(
                    "{ctx}: 'Files' must be a pattern or a list of patterns, got {other}"
                )));
            }
            None => return Err(HwdbError::invalid_docket(format!("{ctx}: missing 'Files'"))),
        };

        Ok(Self {
            sheets: SheetSpec::from_json(a.get("Sheets").copied(), &ctx)?,
            values: match a.get("Values") {
                Some(v) => values_from_json(v, &ctx)?,
                None => Values::new(),
            },
            encoder: text(&a, "Encoder", &ctx)?,
            part_type_id: text(&a, "Part Type ID", &ctx)?,
            part_type_name: text(&a, "Part Type Name", &ctx)?,
            base_dir: base_dir.to_path_buf(),
            files,
            name,
        })
    }

    /// Expand the file patterns into existing files, sorted.
    pub fn expand_files(&self) -> HwdbResult<Vec<PathBuf>> {
        let mut out = Vec::new();
        for pattern in &self.files {
            let full = absolute_pattern(pattern, &self.base_dir);
            let paths = glob::glob(&full).map_err(|e| HwdbError::Glob {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            for entry in paths {
                let path = entry.map_err(|e| HwdbError::Io(e.into()))?;
                if path.is_file() {
                    out.push(path);
                }
            }
        }
        out.sort();
        out.dedup();
        Ok(out)
    }
}

impl SheetSpec {
    fn from_json(v: Option<&serde_json::Value>, ctx: &str) -> HwdbResult<Self> {
        let items: Vec<&serde_json::Value> = match v {
            None | Some(serde_json::Value::Null) => return Ok(Self::Default),
            Some(serde_json::Value::String(s)) if s.trim() == "*" => return Ok(Self::All),
            Some(serde_json::Value::Array(items)) => items.iter().collect(),
            Some(single) => vec![single],
        };
        let sheets = items
            .into_iter()
            .map(|item| SheetOverride::from_json(item, ctx))
            .collect::<HwdbResult<Vec<_>>>()?;
        Ok(Self::List(sheets))
    }
}

impl SheetOverride {
    fn from_json(v: &serde_json::Value, ctx: &str) -> HwdbResult<Self> {
        match v {
            serde_json::Value::String(name) => Ok(Self {
                name: name.clone(),
                values: Values::new(),
                encoder: None,
            }),
            serde_json::Value::Object(obj) => {
                let a = attrs(obj);
                let name = text(&a, "Sheet Name", ctx)?
                    .ok_or_else(|| HwdbError::invalid_docket(format!("{ctx}: sheet entry without 'Sheet Name'")))?;
                let sheet_ctx = format!("{ctx}, sheet '{name}'");
                Ok(Self {
                    values: match a.get("Values") {
                        Some(v) => values_from_json(v, &sheet_ctx)?,
                        None => Values::new(),
                    },
                    encoder: text(&a, "Encoder", &sheet_ctx)?,
                    name,
                })
            }
            other => Err(HwdbError::invalid_docket(format!(
                "{ctx}: sheet entries must be names or mappings, got {other}"
            ))),
        }
    }
}

fn text(a: &Attrs<'_>, key: &str, ctx: &str) -> HwdbResult<Option<String>> {
    match a.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.clone())),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(HwdbError::invalid_docket(format!(
            "{ctx}: '{key}' must be text, got {other}"
        ))),
    }
}

/// Expand a leading `~` and anchor relative patterns at `base_dir`.
fn absolute_pattern(pattern: &str, base_dir: &Path) -> String {
    let expanded = match pattern.strip_prefix("~/").or_else(|| (pattern == "~").then_some("")) {
        Some(rest) => match std::env::var_os("HOME") {
            Some(home) => Path::new(&home).join(rest).to_string_lossy().into_owned(),
            None => pattern.to_string(),
        },
        None => pattern.to_string(),
    };
    if Path::new(&expanded).is_absolute() {
        expanded
    } else {
        let base = glob::Pattern::escape(&base_dir.to_string_lossy());
        Path::new(&base).join(expanded).to_string_lossy().into_owned()
    }
}
