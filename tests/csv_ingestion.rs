use hwdb_docket::ingestion::csv::{read_csv_grid, read_csv_grid_from_reader};
use hwdb_docket::ingestion::{load_raw_sheet, IngestionFormat, IngestionSeverity, SheetSelection};
use hwdb_docket::sheet::SheetModel;
use hwdb_docket::types::Value;
use hwdb_docket::values::Values;

#[test]
fn read_csv_grid_keeps_preamble_and_table() {
    let raw = read_csv_grid("tests/fixtures/widgets.csv").unwrap();

    assert_eq!(raw.name, "widgets");
    assert_eq!(raw.format, IngestionFormat::Csv);
    assert_eq!(raw.rows.len(), 6);
    assert_eq!(raw.rows[0][0], Value::from("Institution"));
    assert_eq!(raw.rows[2], vec![Value::Null, Value::Null]);
    assert_eq!(raw.rows[3][0], Value::from("Serial Number"));
}

#[test]
fn sheet_model_splits_local_values_from_table() {
    let raw = read_csv_grid("tests/fixtures/widgets.csv").unwrap();
    let sheet = SheetModel::from_raw("tests/fixtures/widgets.csv", raw, Values::new());

    assert_eq!(sheet.header_row(), Some(3));
    assert_eq!(sheet.local_values().len(), 2);
    assert_eq!(
        sheet.local_values().get("lab"),
        Some(&Value::from("Clean Room 2"))
    );

    assert_eq!(sheet.row_count(), 2);
    assert_eq!(sheet.row_number(0), Some(5));
    let headers: Vec<&str> = sheet.table().headers().collect();
    assert_eq!(headers, vec!["Serial Number", "Mass", "Count", "Comments"]);

    // Mass mixes "2.5" and "3": the whole column becomes float.
    assert_eq!(sheet.table().cell(1, "mass"), Some(&Value::Float(3.0)));
    assert_eq!(sheet.table().cell(0, "Count"), Some(&Value::Int(3)));
    assert_eq!(sheet.table().cell(1, "Comments"), Some(&Value::Null));
}

#[test]
fn coalesce_prefers_cell_then_local_then_outer() {
    let raw = read_csv_grid("tests/fixtures/widgets.csv").unwrap();
    let mut outer = Values::new();
    outer.insert("Lab", Value::from("Annex"));
    outer.insert("Country", Value::from("United States"));
    let sheet = SheetModel::from_raw("tests/fixtures/widgets.csv", raw, outer);

    assert_eq!(sheet.coalesce("Serial Number", Some(1)), &Value::from("W-002"));
    assert_eq!(sheet.coalesce("Lab", Some(1)), &Value::from("Clean Room 2"));
    assert_eq!(sheet.coalesce("Country", Some(0)), &Value::from("United States"));
    assert_eq!(sheet.coalesce("Not There", Some(0)), &Value::Null);
}

#[test]
fn sheet_without_sentinel_is_all_local_values() {
    let input = "Operator,Kim\nTemperature,21.5\n";
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input.as_bytes());
    let raw = read_csv_grid_from_reader(&mut rdr, "summary").unwrap();
    let sheet = SheetModel::from_raw("summary.csv", raw, Values::new());

    assert_eq!(sheet.header_row(), None);
    assert_eq!(sheet.row_count(), 1);
    assert_eq!(sheet.row_number(0), None);
    assert_eq!(sheet.coalesce("Temperature", Some(0)), &Value::Float(21.5));
    assert_eq!(sheet.coalesce("Operator", None), &Value::from("Kim"));
}

#[test]
fn load_raw_sheet_infers_csv_from_extension() {
    let raw = load_raw_sheet(
        "tests/fixtures/widget_runs.csv",
        None,
        &SheetSelection::First,
        None,
        IngestionSeverity::Critical,
    )
    .unwrap();
    assert_eq!(raw.name, "widget_runs");
    assert_eq!(raw.rows.len(), 5);
}
