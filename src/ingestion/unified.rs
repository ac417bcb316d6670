//! Unified raw-sheet loading.
//!
//! [`load_raw_sheet`] reads one sheet of a spreadsheet file into a [`RawSheet`] grid.
//!
//! - If no format is given, it is inferred from the file extension.
//! - If an [`IngestionObserver`] is provided, success/failure/alerts are reported to it.

use std::error::Error as StdError;
use std::path::Path;

use crate::error::{HwdbError, HwdbResult};
use crate::types::Value;

use super::csv;
use super::observability::{IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats};

/// Supported spreadsheet formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionFormat {
    /// Comma-separated values (one sheet per file).
    Csv,
    /// Spreadsheet/workbook formats (feature-gated behind `excel`).
    Excel,
}

impl IngestionFormat {
    /// Parse a format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => Some(Self::Excel),
            _ => None,
        }
    }

    /// Infer the format of `path` from its extension.
    pub fn from_path(path: &Path) -> HwdbResult<Self> {
        path.extension()
            .and_then(|s| s.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| HwdbError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
    }
}

/// How to choose the sheet to load.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SheetSelection {
    /// The first sheet (the only sheet of a CSV file).
    #[default]
    First,
    /// A single named sheet.
    Named(String),
}

/// A sheet as a grid of cells, before header detection.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSheet {
    /// Sheet name (file stem for CSV).
    pub name: String,
    /// Format the grid was read from. CSV cells are untyped text.
    pub format: IngestionFormat,
    /// Row-major cells; rows may differ in length.
    pub rows: Vec<Vec<Value>>,
}

/// Load a single sheet from `path`.
///
/// When an observer is given, this function reports:
///
/// - `on_success` on success, with row count stats
/// - `on_failure` on failure, with a computed severity
/// - `on_alert` on failure when the computed severity is >= `alert_at_or_above`
pub fn load_raw_sheet(
    path: impl AsRef<Path>,
    format: Option<IngestionFormat>,
    selection: &SheetSelection,
    observer: Option<&dyn IngestionObserver>,
    alert_at_or_above: IngestionSeverity,
) -> HwdbResult<RawSheet> {
    let path = path.as_ref();
    let fmt = match format {
        Some(f) => f,
        None => IngestionFormat::from_path(path)?,
    };

    let result = match fmt {
        IngestionFormat::Csv => csv::read_csv_grid(path),
        IngestionFormat::Excel => load_excel_dispatch(path, selection),
    };

    if let Some(obs) = observer {
        let ctx = IngestionContext {
            path: path.to_path_buf(),
            format: fmt,
            sheet: match (&result, selection) {
                (Ok(sheet), _) => Some(sheet.name.clone()),
                (Err(_), SheetSelection::Named(name)) => Some(name.clone()),
                (Err(_), SheetSelection::First) => None,
            },
        };
        match &result {
            Ok(sheet) => obs.on_success(&ctx, IngestionStats { rows: sheet.rows.len() }),
            Err(e) => {
                let sev = severity_for_error(e);
                obs.on_failure(&ctx, sev, e);
                if sev >= alert_at_or_above {
                    obs.on_alert(&ctx, sev, e);
                }
            }
        }
    }

    result
}

/// List the sheets available in `path` (a CSV file has exactly one, named after its stem).
pub fn list_sheets(path: impl AsRef<Path>, format: IngestionFormat) -> HwdbResult<Vec<String>> {
    let path = path.as_ref();
    match format {
        IngestionFormat::Csv => Ok(vec![csv_sheet_name(path)]),
        IngestionFormat::Excel => list_excel_sheets(path),
    }
}

pub(crate) fn csv_sheet_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

fn severity_for_error(e: &HwdbError) -> IngestionSeverity {
    match e {
        HwdbError::Io(_) => IngestionSeverity::Critical,
        HwdbError::Csv(err) => match err.kind() {
            ::csv::ErrorKind::Io(_) => IngestionSeverity::Critical,
            _ => IngestionSeverity::Error,
        },
        #[cfg(feature = "excel")]
        HwdbError::Excel(err) => {
            if error_chain_contains_io(err) {
                IngestionSeverity::Critical
            } else {
                IngestionSeverity::Error
            }
        }
        _ => IngestionSeverity::Error,
    }
}

#[cfg_attr(not(feature = "excel"), allow(dead_code))]
fn error_chain_contains_io(e: &(dyn StdError + 'static)) -> bool {
    let mut cur: Option<&(dyn StdError + 'static)> = Some(e);
    while let Some(err) = cur {
        if err.is::<std::io::Error>() {
            return true;
        }
        cur = err.source();
    }
    false
}

fn load_excel_dispatch(path: &Path, selection: &SheetSelection) -> HwdbResult<RawSheet> {
    // Avoid unused warnings when the feature is off.
    let _ = (path, selection);

    #[cfg(feature = "excel")]
    {
        use super::excel;

        match selection {
            SheetSelection::First => excel::read_excel_grid(path, None),
            SheetSelection::Named(name) => excel::read_excel_grid(path, Some(name.as_str())),
        }
    }

    #[cfg(not(feature = "excel"))]
    {
        Err(HwdbError::UnsupportedFormat {
            path: path.to_path_buf(),
        })
    }
}

fn list_excel_sheets(path: &Path) -> HwdbResult<Vec<String>> {
    let _ = path;

    #[cfg(feature = "excel")]
    {
        super::excel::sheet_names(path)
    }

    #[cfg(not(feature = "excel"))]
    {
        Err(HwdbError::UnsupportedFormat {
            path: path.to_path_buf(),
        })
    }
}
