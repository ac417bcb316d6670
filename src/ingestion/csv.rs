//! CSV loading.

use std::path::Path;

use crate::error::HwdbResult;
use crate::types::Value;

use super::unified::{csv_sheet_name, IngestionFormat, RawSheet};

/// Load a CSV file as a raw grid.
///
/// Rules:
///
/// - No header handling: every line is a grid row (header detection happens later).
/// - Rows may have different widths.
/// - Cells are kept as text; empty cells are [`Value::Null`]. Typing happens per column once
///   the table region is known.
/// - The sheet is named after the file stem.
pub fn read_csv_grid(path: impl AsRef<Path>) -> HwdbResult<RawSheet> {
    let path = path.as_ref();
    let name = csv_sheet_name(path);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    read_csv_grid_from_reader(&mut rdr, name)
}

/// Load CSV data from an existing CSV reader.
///
/// The reader should be built with `has_headers(false)`; otherwise the first line is lost.
pub fn read_csv_grid_from_reader<R: std::io::Read>(
    rdr: &mut csv::Reader<R>,
    name: impl Into<String>,
) -> HwdbResult<RawSheet> {
    let mut rows: Vec<Vec<Value>> = Vec::new();
    for (row_idx0, result) in rdr.records().enumerate() {
        let record = result?;
        let row = record
            .iter()
            .enumerate()
            .map(|(col, raw)| {
                // A UTF-8 byte order mark survives into the very first cell.
                let raw = if row_idx0 == 0 && col == 0 {
                    raw.trim_start_matches('\u{feff}')
                } else {
                    raw
                };
                text_cell(raw)
            })
            .collect();
        rows.push(row);
    }

    Ok(RawSheet {
        name: name.into(),
        format: IngestionFormat::Csv,
        rows,
    })
}

fn text_cell(raw: &str) -> Value {
    if raw.trim().is_empty() {
        Value::Null
    } else {
        Value::Str(raw.to_owned())
    }
}
