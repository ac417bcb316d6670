#![cfg(feature = "excel_test_writer")]

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;

use hwdb_docket::docket::{Docket, DocketOptions};
use hwdb_docket::ingestion::{
    list_sheets, load_raw_sheet, IngestionContext, IngestionFormat, IngestionObserver,
    IngestionSeverity, SheetSelection,
};
use hwdb_docket::lookup::LookupService;
use hwdb_docket::sheet::SheetModel;
use hwdb_docket::types::Value;
use hwdb_docket::values::Values;
use hwdb_docket::HwdbError;

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("hwdb-docket-{name}-{nanos}"));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Two sheets: "Runs" with a preamble and two rows of the same run, "More" with one row.
fn write_runs_xlsx(path: &Path) {
    use rust_xlsxwriter::{Format, Workbook};

    let date = Format::new().set_num_format("yyyy-mm-dd");
    let mut wb = Workbook::new();

    let ws = wb.add_worksheet();
    ws.set_name("Runs").unwrap();
    ws.write_string(0, 0, "Operator").unwrap();
    ws.write_string(0, 1, "Kim").unwrap();
    // row 1 left blank
    ws.write_string(2, 0, "Serial Number").unwrap();
    ws.write_string(2, 1, "Run").unwrap();
    ws.write_string(2, 2, "Temp").unwrap();
    ws.write_string(2, 3, "Humidity").unwrap();
    ws.write_string(2, 4, "Date").unwrap();

    ws.write_string(3, 0, "W-1").unwrap();
    ws.write_number(3, 1, 1).unwrap();
    ws.write_number(3, 2, 20.5).unwrap();
    ws.write_number_with_format(3, 4, 45292, &date).unwrap();

    ws.write_string(4, 0, "W-1").unwrap();
    ws.write_number(4, 1, 1).unwrap();
    ws.write_number(4, 3, 40).unwrap();

    let ws = wb.add_worksheet();
    ws.set_name("More").unwrap();
    ws.write_string(0, 0, "Serial Number").unwrap();
    ws.write_string(0, 1, "Run").unwrap();
    ws.write_string(0, 2, "Temp").unwrap();
    ws.write_string(1, 0, "W-2").unwrap();
    ws.write_number(1, 1, 7).unwrap();
    ws.write_number(1, 2, 18).unwrap();

    wb.save(path).unwrap();
}

#[derive(Default)]
struct RecordingObserver {
    failures: Mutex<Vec<(Option<String>, IngestionSeverity)>>,
    alerts: Mutex<Vec<IngestionSeverity>>,
}

impl IngestionObserver for RecordingObserver {
    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, _error: &HwdbError) {
        self.failures
            .lock()
            .unwrap()
            .push((ctx.sheet.clone(), severity));
    }

    fn on_alert(&self, _ctx: &IngestionContext, severity: IngestionSeverity, _error: &HwdbError) {
        self.alerts.lock().unwrap().push(severity);
    }
}

#[test]
fn excel_sheets_keep_native_types_and_render_dates() {
    let dir = tmp_dir("native");
    let path = dir.join("x.xlsx");
    write_runs_xlsx(&path);

    assert_eq!(
        list_sheets(&path, IngestionFormat::Excel).unwrap(),
        vec!["Runs".to_string(), "More".to_string()]
    );

    let raw = load_raw_sheet(
        &path,
        None,
        &SheetSelection::First,
        None,
        IngestionSeverity::Critical,
    )
    .unwrap();
    assert_eq!(raw.name, "Runs");
    assert_eq!(raw.format, IngestionFormat::Excel);
    assert_eq!(raw.rows[3][4], Value::from("2024-01-01 00:00:00"));

    let sheet = SheetModel::from_raw(&path, raw, Values::new());
    assert_eq!(sheet.header_row(), Some(2));
    assert_eq!(sheet.local_values().get("Operator"), Some(&Value::from("Kim")));
    // Whole-number columns narrow to Int; columns with fractions stay Float.
    assert_eq!(sheet.table().cell(0, "Run"), Some(&Value::Int(1)));
    assert_eq!(sheet.table().cell(1, "Humidity"), Some(&Value::Int(40)));
    assert_eq!(sheet.table().cell(0, "Temp"), Some(&Value::Float(20.5)));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_sheet_is_an_error_without_alert() {
    let dir = tmp_dir("missing_sheet");
    let path = dir.join("x.xlsx");
    write_runs_xlsx(&path);

    let obs = RecordingObserver::default();
    let err = load_raw_sheet(
        &path,
        Some(IngestionFormat::Excel),
        &SheetSelection::Named("Calibration".to_string()),
        Some(&obs),
        IngestionSeverity::Critical,
    )
    .unwrap_err();

    assert!(matches!(err, HwdbError::SheetNotFound { .. }), "{err}");
    assert_eq!(
        *obs.failures.lock().unwrap(),
        vec![(Some("Calibration".to_string()), IngestionSeverity::Error)]
    );
    assert!(obs.alerts.lock().unwrap().is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn rows_sharing_a_group_key_merge_into_one_member() {
    let dir = tmp_dir("group_merge");
    write_runs_xlsx(&dir.join("x.xlsx"));

    let docket = Docket::from_json(
        &json!({
            "Docket Name": "Environment runs",
            "Sources": [{
                "Source Name": "Runs workbook",
                "Files": "x.xlsx",
                "Sheets": "*",
                "Encoder": "Environment",
                "Part Type ID": "Z00100300001"
            }],
            "Encoders": [{
                "Encoder Name": "Environment",
                "Record Type": "Test",
                "Test Name": "Environment",
                "Schema": {
                    "Serial Number": "str",
                    "Test Data": {
                        "Operator": "null,str",
                        "Runs": {
                            "type": "group",
                            "key": "Run",
                            "members": {
                                "Run": "int",
                                "Temp": "null,float",
                                "Humidity": "null,float",
                                "Date": "null,str"
                            }
                        }
                    }
                }
            }]
        }),
        Some(&dir),
    )
    .unwrap();

    let jobs = docket.process_sources(&LookupService::empty()).unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[1].sheet, SheetSelection::Named("More".to_string()));

    let plan = docket
        .build_plan(&LookupService::empty(), &DocketOptions::default())
        .unwrap();
    assert_eq!(plan.new_tests.len(), 2);

    let first = &plan.new_tests[0];
    assert_eq!(first.record.location.sheet, "Runs");
    assert_eq!(first.record.location.rows, vec![4, 5]);
    assert_eq!(
        first.payload["test_data"],
        json!({
            "Operator": "Kim",
            "Runs": [{"Run": 1, "Temp": 20.5, "Humidity": 40.0, "Date": "2024-01-01 00:00:00"}]
        })
    );

    let second = &plan.new_tests[1];
    assert_eq!(second.serial_number().as_deref(), Some("W-2"));
    assert_eq!(
        second.payload["test_data"]["Runs"],
        json!([{"Run": 7, "Temp": 18.0, "Humidity": null, "Date": null}])
    );

    let _ = std::fs::remove_dir_all(&dir);
}
