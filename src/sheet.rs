//! One loaded sheet: a block of sheet-local values followed by a data table.
//!
//! Lab spreadsheets usually carry a short preamble of `key | value` rows (operator, location,
//! date, ...) above the bulk data table. [`SheetModel::from_raw`] splits the two:
//!
//! 1. Only column 0 is inspected for the split.
//! 2. The header row is the **last** row whose column-0 cell is a sentinel (`External ID` or
//!    `Serial Number`) and which is either the first row or directly below an empty column-0
//!    cell.
//! 3. Rows above the blank separator are `(key, value)` pairs from columns 0 and 1.
//! 4. Without a header row the whole sheet is a local-value block and the table is a single
//!    synthetic empty row, so a record can still be coalesced out of local values alone.

use std::path::{Path, PathBuf};

use crate::ci_map::CiMap;
use crate::error::HwdbResult;
use crate::ingestion::{load_raw_sheet, IngestionFormat, IngestionObserver, IngestionSeverity, RawSheet, SheetSelection};
use crate::types::Value;
use crate::values::{ValueResolver, Values};

/// Column-0 labels that mark the header row of the data table.
pub const HEADER_SENTINELS: [&str; 2] = ["External ID", "Serial Number"];

/// Find the header row of a raw grid, if any.
pub fn detect_header_row(rows: &[Vec<Value>]) -> Option<usize> {
    let first_cell = |idx: usize| rows.get(idx).and_then(|r| r.first());
    (0..rows.len()).rev().find(|&idx| {
        let is_sentinel = first_cell(idx)
            .and_then(Value::as_str)
            .map(str::trim)
            .is_some_and(|s| HEADER_SENTINELS.iter().any(|h| h.eq_ignore_ascii_case(s)));
        is_sentinel && (idx == 0 || first_cell(idx - 1).is_none_or(is_blank))
    })
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Str(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// The tabular region of a sheet.
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: CiMap<usize>,
    rows: Vec<Vec<Value>>,
    /// 1-based spreadsheet row number of each data row; `None` for the synthetic row.
    row_numbers: Vec<Option<usize>>,
}

impl Table {
    fn synthetic() -> Self {
        Self {
            columns: CiMap::new(),
            rows: vec![Vec::new()],
            row_numbers: vec![None],
        }
    }

    fn from_grid(grid: &[Vec<Value>], header_row: usize, format: IngestionFormat) -> Self {
        let mut columns: CiMap<usize> = CiMap::new();
        let header = &grid[header_row];
        for (idx, cell) in header.iter().enumerate() {
            let base = if is_blank(cell) {
                format!("Unnamed: {idx}")
            } else {
                cell.to_string().trim().to_string()
            };
            let mut name = base.clone();
            let mut dup = 1;
            while columns.contains_key(&name) {
                name = format!("{base}.{dup}");
                dup += 1;
            }
            columns.insert(name, idx);
        }

        let width = header.len();
        let mut rows = Vec::new();
        let mut row_numbers = Vec::new();
        for (offset, row) in grid.iter().enumerate().skip(header_row + 1) {
            if row.iter().all(is_blank) {
                continue;
            }
            let mut cells: Vec<Value> = row.iter().take(width).cloned().collect();
            cells.resize(width, Value::Null);
            rows.push(cells);
            row_numbers.push(Some(offset + 1));
        }

        for col in 0..width {
            let mut column: Vec<&mut Value> = rows.iter_mut().map(|r| &mut r[col]).collect();
            match format {
                IngestionFormat::Csv => type_text_column(&mut column),
                IngestionFormat::Excel => widen_numeric_column(&mut column),
            }
        }

        Self {
            columns,
            rows,
            row_numbers,
        }
    }

    /// Column names in sheet order.
    pub fn headers(&self) -> impl Iterator<Item = &str> {
        self.columns.keys()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = *self.columns.get(column)?;
        self.rows.get(row)?.get(idx)
    }
}

/// Type a CSV column: all-int → Int, all-numeric → Float, all-bool-literal → Bool, else text.
fn type_text_column(column: &mut [&mut Value]) {
    let texts = || column.iter().filter_map(|v| v.as_str());
    if texts().next().is_none() {
        return;
    }
    let convert: fn(&str) -> Option<Value> = if texts().all(|s| s.trim().parse::<i64>().is_ok()) {
        |s| s.trim().parse::<i64>().ok().map(Value::Int)
    } else if texts().all(|s| s.trim().parse::<f64>().is_ok()) {
        |s| s.trim().parse::<f64>().ok().map(Value::Float)
    } else if texts().all(|s| parse_bool_literal(s).is_some()) {
        |s| parse_bool_literal(s).map(Value::Bool)
    } else {
        return;
    };
    for cell in column.iter_mut() {
        if let Some(converted) = cell.as_str().and_then(convert) {
            **cell = converted;
        }
    }
}

/// Narrow an all-numeric Excel column to Int when every value is integral, otherwise widen
/// it to Float. Mixed columns keep their native cell types.
fn widen_numeric_column(column: &mut [&mut Value]) {
    let numeric = column
        .iter()
        .all(|v| matches!(**v, Value::Null | Value::Int(_) | Value::Float(_)));
    if !numeric {
        return;
    }
    let all_integral = column.iter().all(|v| match **v {
        Value::Float(f) => integral(f).is_some(),
        _ => true,
    });
    for cell in column.iter_mut() {
        match **cell {
            Value::Float(f) if all_integral => {
                if let Some(i) = integral(f) {
                    **cell = Value::Int(i);
                }
            }
            Value::Int(i) if !all_integral => **cell = Value::Float(i as f64),
            _ => {}
        }
    }
}

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 {
        Some(f as i64)
    } else {
        None
    }
}

fn parse_bool_literal(s: &str) -> Option<bool> {
    match s.trim() {
        "True" | "TRUE" | "true" => Some(true),
        "False" | "FALSE" | "false" => Some(false),
        _ => None,
    }
}

/// Type a single local-value cell.
fn type_local_cell(v: &Value, format: IngestionFormat) -> Value {
    match (format, v) {
        (_, Value::Null) => Value::Str(String::new()),
        (IngestionFormat::Csv, Value::Str(s)) => {
            let t = s.trim();
            if let Ok(i) = t.parse::<i64>() {
                Value::Int(i)
            } else if let Some(f) = t
                .parse::<f64>()
                .ok()
                .filter(|_| t.bytes().any(|b| b.is_ascii_digit()) || t.eq_ignore_ascii_case("nan"))
            {
                Value::Float(f)
            } else if let Some(b) = parse_bool_literal(t) {
                Value::Bool(b)
            } else {
                Value::Str(s.clone())
            }
        }
        (IngestionFormat::Excel, Value::Float(f)) => integral(*f).map(Value::Int).unwrap_or(Value::Float(*f)),
        (_, other) => other.clone(),
    }
}

fn parse_local_values(rows: &[Vec<Value>], format: IngestionFormat) -> Values {
    let mut local = Values::new();
    for row in rows {
        let Some(key) = row.first().filter(|v| !is_blank(v)) else {
            continue;
        };
        let key = key.to_string().trim().to_string();
        let value = type_local_cell(row.get(1).unwrap_or(&Value::Null), format);
        local.insert(key, value);
    }
    local
}

/// A loaded sheet with its local values, data table and outer (job) values.
#[derive(Debug, Clone)]
pub struct SheetModel {
    path: PathBuf,
    sheet: String,
    header_row: Option<usize>,
    local_values: Values,
    outer_values: Values,
    table: Table,
}

impl SheetModel {
    /// Load one sheet from disk and split it.
    pub fn load(
        path: impl AsRef<Path>,
        format: IngestionFormat,
        selection: &SheetSelection,
        outer_values: Values,
        observer: Option<&dyn IngestionObserver>,
    ) -> HwdbResult<Self> {
        let path = path.as_ref();
        let raw = load_raw_sheet(path, Some(format), selection, observer, IngestionSeverity::Critical)?;
        Ok(Self::from_raw(path, raw, outer_values))
    }

    /// Split an in-memory grid into local values and a table.
    pub fn from_raw(path: impl AsRef<Path>, raw: RawSheet, outer_values: Values) -> Self {
        let header_row = detect_header_row(&raw.rows);
        let (local_values, table) = match header_row {
            Some(h) => {
                let local_rows = if h >= 2 { &raw.rows[..h - 1] } else { &raw.rows[..0] };
                (
                    parse_local_values(local_rows, raw.format),
                    Table::from_grid(&raw.rows, h, raw.format),
                )
            }
            None => (parse_local_values(&raw.rows, raw.format), Table::synthetic()),
        };

        tracing::debug!(
            path = %path.as_ref().display(),
            sheet = raw.name.as_str(),
            header_row = ?header_row,
            local_values = local_values.len(),
            rows = table.row_count(),
            "sheet split"
        );

        Self {
            path: path.as_ref().to_path_buf(),
            sheet: raw.name,
            header_row,
            local_values,
            outer_values,
            table,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet
    }

    /// 0-based grid index of the header row, `None` when the sheet has no table.
    pub fn header_row(&self) -> Option<usize> {
        self.header_row
    }

    pub fn local_values(&self) -> &Values {
        &self.local_values
    }

    pub fn outer_values(&self) -> &Values {
        &self.outer_values
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn row_count(&self) -> usize {
        self.table.row_count()
    }

    /// 1-based spreadsheet row of data row `row`, `None` for the synthetic row.
    pub fn row_number(&self, row: usize) -> Option<usize> {
        self.table.row_numbers.get(row).copied().flatten()
    }

    pub fn resolver(&self) -> ValueResolver<'_> {
        ValueResolver::new(&self.table.columns, &self.table.rows, &self.local_values, &self.outer_values)
    }

    /// Resolve `column` through cell → local → outer values.
    pub fn coalesce(&self, column: &str, row: Option<usize>) -> &Value {
        self.resolver().coalesce(column, row)
    }
}
