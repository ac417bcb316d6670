//! Dockets: the top-level description of one upload run.
//!
//! A docket names the files to read, the encoders that apply to them and the values that
//! apply at each scope:
//!
//! ```json
//! {
//!   "Docket Name": "Widgets, March batch",
//!   "Values": {"Institution": "University of Minnesota"},
//!   "Includes": ["encoders.json"],
//!   "Sources": [
//!     {"Source Name": "Widgets", "Files": "data/widgets-*.csv", "Encoder": "Widget",
//!      "Part Type ID": "Z00100300001"}
//!   ],
//!   "Encoders": [{"Encoder Name": "Widget", "Schema": {"Serial Number": "str"}}]
//! }
//! ```
//!
//! Planning happens in two steps. [`Docket::process_sources`] validates everything and expands
//! sources into [`SheetJob`]s sequentially; [`Docket::build_plan`] then loads and encodes the
//! jobs in parallel and sorts the records into an [`UploadPlan`]. Any error aborts the whole
//! docket before a single network call is made.

mod plan;
mod source;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ci_map::CiMap;
use crate::encoder::{Encoder, EncoderRef, Record};
use crate::error::{HwdbError, HwdbResult};
use crate::execution::{ExecutionEngine, ExecutionObserver, ExecutionOptions, TracingExecutionObserver};
use crate::ingestion::{list_sheets, IngestionFormat, IngestionObserver, SheetSelection, TracingObserver};
use crate::lookup::LookupService;
use crate::sheet::SheetModel;
use crate::types::Value;
use crate::values::{merge_scoped, values_from_json, Values};

pub use plan::{PlannedRecord, UploadPlan};
pub use source::{SheetJob, SheetOverride, SheetSpec, SourceSpec};

/// Options for [`Docket::build_plan`].
#[derive(Clone, Default)]
pub struct DocketOptions {
    pub execution: ExecutionOptions,
    /// Sheet load observer; [`TracingObserver`] when `None`.
    pub observer: Option<Arc<dyn IngestionObserver>>,
    /// Job event observer; [`TracingExecutionObserver`] when `None`.
    pub execution_observer: Option<Arc<dyn ExecutionObserver>>,
}

/// A parsed docket, includes merged.
#[derive(Debug, Clone)]
pub struct Docket {
    pub name: String,
    pub values: Values,
    pub sources: Vec<SourceSpec>,
    pub encoders: CiMap<Arc<Encoder>>,
    /// Directory relative `Includes` and `Files` resolve against.
    pub base_dir: PathBuf,
}

impl Docket {
    /// Load a docket file (JSON).
    pub fn from_path(path: impl AsRef<Path>) -> HwdbResult<Self> {
        let mut stack = Vec::new();
        Self::load_file(path.as_ref(), &mut stack)
    }

    /// Build a docket from an in-memory JSON value. Relative paths resolve against `base_dir`,
    /// or the working directory when `None`.
    pub fn from_json(v: &serde_json::Value, base_dir: Option<&Path>) -> HwdbResult<Self> {
        let base_dir = match base_dir {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir()?,
        };
        let mut stack = Vec::new();
        Self::parse(v, base_dir, &mut stack)
    }

    fn load_file(path: &Path, stack: &mut Vec<PathBuf>) -> HwdbResult<Self> {
        let canonical = std::fs::canonicalize(path)?;
        if stack.contains(&canonical) {
            return Err(HwdbError::invalid_docket(format!(
                "include cycle through {}",
                canonical.display()
            )));
        }
        let text = std::fs::read_to_string(&canonical)?;
        let v: serde_json::Value = serde_json::from_str(&text)?;
        let base_dir = canonical.parent().map(Path::to_path_buf).unwrap_or_default();

        tracing::debug!(path = %canonical.display(), "loading docket");
        stack.push(canonical);
        let docket = Self::parse(&v, base_dir, stack);
        stack.pop();
        docket
    }

    fn parse(v: &serde_json::Value, base_dir: PathBuf, stack: &mut Vec<PathBuf>) -> HwdbResult<Self> {
        let obj = v
            .as_object()
            .ok_or_else(|| HwdbError::invalid_docket(format!("docket must be a mapping, got {v}")))?;
        let attrs: CiMap<&serde_json::Value> = obj.iter().map(|(k, v)| (k.as_str(), v)).collect();

        let name = match attrs.get("Docket Name") {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(HwdbError::invalid_docket(format!(
                    "'Docket Name' must be text, got {other}"
                )));
            }
        };
        let values = match attrs.get("Values") {
            Some(v) => values_from_json(v, "docket")?,
            None => Values::new(),
        };
        let sources = match attrs.get("Sources") {
            Some(v) => SourceSpec::list_from_json(v, &base_dir)?,
            None => Vec::new(),
        };
        let encoders = match attrs.get("Encoders") {
            Some(v) => parse_encoders(v)?,
            None => CiMap::new(),
        };

        let mut docket = Self {
            name,
            values,
            sources,
            encoders,
            base_dir,
        };

        let includes: Vec<&serde_json::Value> = match attrs.get("Includes") {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::Array(items)) => items.iter().collect(),
            Some(single) => vec![single],
        };
        for include in includes {
            let rel = include.as_str().ok_or_else(|| {
                HwdbError::invalid_docket(format!("'Includes' entries must be paths, got {include}"))
            })?;
            let path = docket.base_dir.join(rel);
            let included = Self::load_file(&path, stack)?;
            docket.merge_include(included, rel)?;
        }
        Ok(docket)
    }

    /// Merge an included docket: values conflict-checked, sources appended, encoders by name.
    fn merge_include(&mut self, other: Docket, rel: &str) -> HwdbResult<()> {
        self.values = merge_scoped(&self.values, &other.values, &format!("include '{rel}'"))?;
        self.sources.extend(other.sources);
        for (name, encoder) in other.encoders.iter() {
            match self.encoders.get(name) {
                Some(existing) if existing != encoder => {
                    return Err(HwdbError::invalid_docket(format!(
                        "include '{rel}' redefines encoder '{name}'"
                    )));
                }
                Some(_) => {}
                None => {
                    self.encoders.insert(name, Arc::clone(encoder));
                }
            }
        }
        Ok(())
    }

    /// Resolve an encoder reference (case-insensitive); `None` means the auto encoder.
    pub fn encoder(&self, name: Option<&str>) -> HwdbResult<EncoderRef> {
        match name {
            None => Ok(EncoderRef::AUTO),
            Some(name) => self
                .encoders
                .get(name)
                .map(|e| EncoderRef::Named(Arc::clone(e)))
                .ok_or_else(|| HwdbError::invalid_encoder(format!("encoder '{name}' is not defined"))),
        }
    }

    /// Validate the docket and expand its sources into sheet jobs.
    ///
    /// Runs sequentially and performs every value conflict check. Sources whose files match
    /// nothing, or whose part type cannot be resolved, are skipped with a warning.
    pub fn process_sources(&self, lookup: &LookupService) -> HwdbResult<Vec<SheetJob>> {
        for (name, encoder) in self.encoders.iter() {
            lookup
                .resolve_part_type(encoder.part_type_id.as_deref(), encoder.part_type_name.as_deref())
                .map_err(|e| HwdbError::invalid_encoder(format!("encoder '{name}': {e}")))?;
        }

        let mut jobs = Vec::new();
        for source in &self.sources {
            let scope = format!("source '{}'", source.name);

            let mut source_values = source.values.clone();
            if source.part_type_id.is_some() || source.part_type_name.is_some() {
                let resolved =
                    lookup.resolve_part_type(source.part_type_id.as_deref(), source.part_type_name.as_deref())?;
                let Some(part_type) = resolved else {
                    tracing::warn!(
                        source = source.name.as_str(),
                        part_type_id = source.part_type_id.as_deref().unwrap_or(""),
                        part_type_name = source.part_type_name.as_deref().unwrap_or(""),
                        "part type not found; skipping source"
                    );
                    continue;
                };
                let mut identity = Values::new();
                if !part_type.id.is_empty() {
                    identity.insert("Part Type ID", Value::from(part_type.id));
                }
                if !part_type.name.is_empty() {
                    identity.insert("Part Type Name", Value::from(part_type.name));
                }
                source_values = merge_scoped(&source_values, &identity, &scope)?;
            }
            let source_values = merge_scoped(&self.values, &source_values, &scope)?;

            let source_encoder = self.encoder(source.encoder.as_deref())?;
            let sheet_encoders = match &source.sheets {
                SheetSpec::List(sheets) => sheets
                    .iter()
                    .map(|s| match &s.encoder {
                        Some(name) => self.encoder(Some(name)),
                        None => Ok(source_encoder.clone()),
                    })
                    .collect::<HwdbResult<Vec<_>>>()?,
                _ => Vec::new(),
            };

            let files = source.expand_files()?;
            if files.is_empty() {
                tracing::warn!(
                    source = source.name.as_str(),
                    patterns = ?source.files,
                    "file patterns matched nothing; skipping source"
                );
                continue;
            }

            for path in files {
                let Some(format) = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .and_then(IngestionFormat::from_extension)
                else {
                    tracing::warn!(path = %path.display(), "unsupported file type; skipping");
                    continue;
                };

                let job = |sheet: SheetSelection, values: Values, encoder: EncoderRef| SheetJob {
                    source_name: source.name.clone(),
                    path: path.clone(),
                    format,
                    sheet,
                    values,
                    encoder,
                };

                match &source.sheets {
                    SheetSpec::Default => {
                        jobs.push(job(SheetSelection::First, source_values.clone(), source_encoder.clone()));
                    }
                    SheetSpec::All => {
                        for name in list_sheets(&path, format)? {
                            jobs.push(job(
                                SheetSelection::Named(name),
                                source_values.clone(),
                                source_encoder.clone(),
                            ));
                        }
                    }
                    SheetSpec::List(sheets) => {
                        for (sheet, encoder) in sheets.iter().zip(&sheet_encoders) {
                            let values = merge_scoped(
                                &source_values,
                                &sheet.values,
                                &format!("sheet '{}' of {scope}", sheet.name),
                            )?;
                            jobs.push(job(SheetSelection::Named(sheet.name.clone()), values, encoder.clone()));
                        }
                    }
                }
            }
        }

        tracing::info!(docket = self.name.as_str(), jobs = jobs.len(), "sources processed");
        Ok(jobs)
    }

    /// Load and encode every sheet job, then sort the records into an upload plan.
    pub fn build_plan(&self, lookup: &LookupService, options: &DocketOptions) -> HwdbResult<UploadPlan> {
        let jobs = self.process_sources(lookup)?;
        let records = encode_jobs(&jobs, options)?;
        let plan = UploadPlan::from_records(records, lookup);
        tracing::info!(
            docket = self.name.as_str(),
            new_items = plan.new_items.len(),
            update_items = plan.update_items.len(),
            new_tests = plan.new_tests.len(),
            warnings = plan.warning_count(),
            "upload plan built"
        );
        Ok(plan)
    }
}

/// Load and encode jobs on the execution engine; records come back in job order.
pub fn encode_jobs(jobs: &[SheetJob], options: &DocketOptions) -> HwdbResult<Vec<Record>> {
    let observer: Arc<dyn IngestionObserver> = options
        .observer
        .clone()
        .unwrap_or_else(|| Arc::new(TracingObserver));
    let execution_observer: Arc<dyn ExecutionObserver> = options
        .execution_observer
        .clone()
        .unwrap_or_else(|| Arc::new(TracingExecutionObserver));

    let engine = ExecutionEngine::new(options.execution.clone())?.with_observer(execution_observer);
    let per_job = engine.run_jobs(jobs, |job| {
        let sheet = SheetModel::load(&job.path, job.format, &job.sheet, job.values.clone(), Some(observer.as_ref()))?;
        job.encoder.encode(&sheet)
    })?;
    Ok(per_job.into_iter().flatten().collect())
}

fn parse_encoders(v: &serde_json::Value) -> HwdbResult<CiMap<Arc<Encoder>>> {
    let parsed: Vec<Encoder> = match v {
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| Encoder::from_json(item, None))
            .collect::<HwdbResult<_>>()?,
        serde_json::Value::Object(obj) => obj
            .iter()
            .map(|(name, item)| Encoder::from_json(item, Some(name)))
            .collect::<HwdbResult<_>>()?,
        other => {
            return Err(HwdbError::invalid_docket(format!(
                "'Encoders' must be a list or a mapping, got {other}"
            )));
        }
    };
    let mut encoders = CiMap::new();
    for encoder in parsed {
        let name = encoder.name.clone();
        if encoders.insert(name.clone(), Arc::new(encoder)).is_some() {
            return Err(HwdbError::invalid_docket(format!("encoder '{name}' is defined twice")));
        }
    }
    Ok(encoders)
}
