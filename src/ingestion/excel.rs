#![cfg(feature = "excel")]

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate};

use crate::error::{HwdbError, HwdbResult};
use crate::types::Value;

use super::unified::{IngestionFormat, RawSheet};

/// List the sheet names of a workbook in workbook order.
pub fn sheet_names(path: impl AsRef<Path>) -> HwdbResult<Vec<String>> {
    let workbook = open_workbook_auto(path)?;
    Ok(workbook.sheet_names().to_vec())
}

/// Load one sheet of an Excel document (`.xlsx`, `.xls`, `.ods`, etc.) as a raw grid.
///
/// Behavior:
/// - Picks `sheet_name` if provided; otherwise uses the first sheet in the workbook
/// - Pads the grid so that row/column indexes match the worksheet even when the used range does
///   not start at `A1`
/// - Keeps native cell types; dates become `YYYY-MM-DD HH:MM:SS` text
pub fn read_excel_grid(path: impl AsRef<Path>, sheet_name: Option<&str>) -> HwdbResult<RawSheet> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path)?;

    let names = workbook.sheet_names().to_vec();
    let sheet = match sheet_name {
        Some(name) => names
            .iter()
            .find(|n| n.as_str() == name)
            .or_else(|| names.iter().find(|n| n.eq_ignore_ascii_case(name)))
            .cloned()
            .ok_or_else(|| HwdbError::SheetNotFound {
                path: path.to_path_buf(),
                sheet: name.to_string(),
            })?,
        None => names.first().cloned().ok_or_else(|| HwdbError::SheetNotFound {
            path: path.to_path_buf(),
            sheet: "<first sheet>".to_string(),
        })?,
    };

    let range = workbook.worksheet_range(&sheet)?;
    Ok(RawSheet {
        name: sheet,
        format: IngestionFormat::Excel,
        rows: range_to_grid(&range),
    })
}

fn range_to_grid(range: &calamine::Range<Data>) -> Vec<Vec<Value>> {
    let (start_row, start_col) = range
        .start()
        .map(|(r, c)| (r as usize, c as usize))
        .unwrap_or((0, 0));

    let mut rows: Vec<Vec<Value>> = vec![Vec::new(); start_row];
    for row in range.rows() {
        let mut out: Vec<Value> = vec![Value::Null; start_col];
        out.extend(row.iter().map(convert_cell));
        rows.push(out);
    }
    rows
}

fn convert_cell(c: &Data) -> Value {
    match c {
        Data::Empty => Value::Null,
        Data::String(s) if s.trim().is_empty() => Value::Null,
        Data::String(s) => Value::Str(s.clone()),
        Data::Int(i) => Value::Int(*i),
        Data::Float(f) => Value::Float(*f),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => excel_serial_to_text(dt.as_f64())
            .map(Value::Str)
            .unwrap_or(Value::Float(dt.as_f64())),
        Data::DateTimeIso(s) => Value::Str(s.clone()),
        Data::DurationIso(s) => Value::Str(s.clone()),
        Data::Error(e) => Value::Str(e.to_string()),
    }
}

/// Convert an Excel serial date (days since 1899-12-30) to `YYYY-MM-DD HH:MM:SS`.
fn excel_serial_to_text(serial: f64) -> Option<String> {
    if !serial.is_finite() {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    let dt = base.checked_add_signed(Duration::try_seconds(seconds)?)?;
    Some(dt.format("%Y-%m-%d %H:%M:%S").to_string())
}
