use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;

use hwdb_docket::docket::{Docket, DocketOptions};
use hwdb_docket::execution::{ExecutionEvent, ExecutionObserver, ExecutionOptions};
use hwdb_docket::lookup::LookupService;
use hwdb_docket::HwdbError;

fn lookups() -> LookupService {
    LookupService::from_path("tests/fixtures/lookups.json").unwrap()
}

fn fixtures_dir() -> PathBuf {
    std::fs::canonicalize("tests/fixtures").unwrap()
}

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("hwdb_docket_{nanos}_{name}"));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[derive(Default)]
struct RecordingExecutionObserver {
    events: Mutex<Vec<String>>,
}

impl ExecutionObserver for RecordingExecutionObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        let tag = match event {
            ExecutionEvent::RunStarted { jobs } => format!("start:{jobs}"),
            ExecutionEvent::JobStarted { .. } => "job".to_string(),
            ExecutionEvent::JobFinished { records, .. } => format!("done:{records}"),
            ExecutionEvent::JobFailed { .. } => "failed".to_string(),
            ExecutionEvent::RunFinished { .. } => "finish".to_string(),
        };
        self.events.lock().unwrap().push(tag);
    }
}

#[test]
fn docket_with_includes_expands_into_sheet_jobs() {
    let docket = Docket::from_path("tests/fixtures/widgets.docket.json").unwrap();

    assert_eq!(docket.name, "Widget fixtures");
    assert_eq!(docket.sources.len(), 3);
    assert_eq!(docket.encoders.len(), 2);
    assert!(docket.encoders.contains_key("widget runs"));

    let jobs = docket.process_sources(&lookups()).unwrap();
    // "Missing" matches no file and is skipped.
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].source_name, "Widgets");
    assert_eq!(jobs[0].encoder.name(), "Widget");
    assert_eq!(jobs[1].encoder.name(), "Widget Runs");

    let values = &jobs[0].values;
    assert_eq!(values.get("Country").unwrap().to_string(), "United States");
    assert_eq!(values.get("Part Type ID").unwrap().to_string(), "Z00100300001");
    assert_eq!(values.get("Part Type Name").unwrap().to_string(), "Widget");
}

#[test]
fn build_plan_sorts_items_and_tests_with_payloads() {
    let docket = Docket::from_path("tests/fixtures/widgets.docket.json").unwrap();
    let plan = docket
        .build_plan(&lookups(), &DocketOptions::default())
        .unwrap();

    assert_eq!(plan.new_items.len(), 2);
    assert!(plan.update_items.is_empty());
    assert_eq!(plan.new_tests.len(), 2);

    let first = &plan.new_items[0];
    assert_eq!(first.record.location.rows, vec![5]);
    assert!(first.record.warnings.is_empty());
    assert_eq!(
        first.payload,
        json!({
            "part_type": {"id": "Z00100300001"},
            "serial_number": "W-001",
            "comments": "first",
            "institution": {"id": 186},
            "country_code": "US",
            "manufacturer": {"id": null},
            "specifications": {"Mass": 2.5, "Count": 3, "Lab": "Clean Room 2"}
        })
    );
    assert_eq!(plan.new_items[1].payload["comments"], json!(null));
    assert_eq!(plan.new_items[1].payload["specifications"]["Mass"], json!(3.0));

    let runs = &plan.new_tests[0];
    assert_eq!(runs.serial_number().as_deref(), Some("W-001"));
    assert_eq!(runs.record.location.rows, vec![2, 3, 4]);
    assert_eq!(
        runs.payload,
        json!({
            "test_type": "Environment",
            "comments": null,
            "test_data": {
                "Runs": [
                    {"Date": "2024-01-01", "Lab": "Lab1", "Temp": 20.5, "Humidity": 40.0},
                    {"Date": "2024-01-02", "Lab": "Lab1", "Temp": 21.0, "Humidity": 41.0}
                ]
            }
        })
    );
    assert_eq!(
        plan.new_tests[1].payload["test_data"]["Runs"],
        json!([{"Date": "2024-01-01", "Lab": "Lab2", "Temp": 19.0, "Humidity": 39.0}])
    );

    let text = plan.to_string();
    assert!(text.starts_with("2 new item(s), 0 item update(s), 2 new test(s)"), "{text}");
    let doc = plan.to_json();
    assert_eq!(doc["New Items"].as_array().unwrap().len(), 2);
    assert_eq!(doc["New Tests"].as_array().unwrap().len(), 2);
}

#[test]
fn build_plan_reports_job_events() {
    let docket = Docket::from_path("tests/fixtures/widgets.docket.json").unwrap();
    let observer = Arc::new(RecordingExecutionObserver::default());
    let options = DocketOptions {
        execution: ExecutionOptions {
            num_threads: Some(2),
        },
        execution_observer: Some(observer.clone()),
        ..DocketOptions::default()
    };
    docket.build_plan(&lookups(), &options).unwrap();

    let mut events = observer.events.lock().unwrap().clone();
    assert_eq!(events.first().map(String::as_str), Some("start:2"));
    assert_eq!(events.last().map(String::as_str), Some("finish"));
    events.sort();
    assert_eq!(events.iter().filter(|e| *e == "job").count(), 2);
    assert!(events.contains(&"done:2".to_string()));
}

#[test]
fn conflicting_source_value_aborts_before_loading() {
    let docket = Docket::from_json(
        &json!({
            "Docket Name": "conflict",
            "Values": {"Country": "United States"},
            "Sources": [{
                "Source Name": "Widgets",
                "Files": "widgets.csv",
                "Part Type ID": "Z00100300001",
                "Values": {"Country": "Canada"}
            }]
        }),
        Some(&fixtures_dir()),
    )
    .unwrap();

    let err = docket
        .build_plan(&lookups(), &DocketOptions::default())
        .unwrap_err();
    match err {
        HwdbError::ValueConflict { key, scope, .. } => {
            assert_eq!(key, "Country");
            assert_eq!(scope, "source 'Widgets'");
        }
        other => panic!("expected a value conflict, got {other:?}"),
    }
}

#[test]
fn restating_the_same_value_is_not_a_conflict() {
    let docket = Docket::from_json(
        &json!({
            "Values": {"Country": "United States"},
            "Sources": [{
                "Files": "widgets.csv",
                "Part Type ID": "Z00100300001",
                "Values": {"country": "United States"}
            }]
        }),
        Some(&fixtures_dir()),
    )
    .unwrap();

    let jobs = docket.process_sources(&lookups()).unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].source_name, "Unnamed Source Node 1");
}

#[test]
fn source_matching_no_files_is_skipped() {
    let dir = tmp_dir("empty_source");
    let docket = Docket::from_json(
        &json!({
            "Sources": [{"Source Name": "Nothing", "Files": "*.csv", "Part Type ID": "Z00100300001"}]
        }),
        Some(&dir),
    )
    .unwrap();

    let plan = docket
        .build_plan(&lookups(), &DocketOptions::default())
        .unwrap();
    assert!(plan.is_empty());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn unknown_part_type_skips_source() {
    let docket = Docket::from_json(
        &json!({
            "Sources": [{"Files": "widgets.csv", "Part Type ID": "Z99999999999"}]
        }),
        Some(&fixtures_dir()),
    )
    .unwrap();

    let jobs = docket.process_sources(&lookups()).unwrap();
    assert!(jobs.is_empty());
}

#[test]
fn part_type_id_and_name_must_agree() {
    let docket = Docket::from_json(
        &json!({
            "Sources": [{
                "Files": "widgets.csv",
                "Part Type ID": "Z00100300001",
                "Part Type Name": "Gadget"
            }]
        }),
        Some(&fixtures_dir()),
    )
    .unwrap();

    let err = docket.process_sources(&lookups()).unwrap_err();
    assert!(matches!(err, HwdbError::PartTypeMismatch { .. }), "{err}");
}

#[test]
fn undefined_encoder_is_fatal() {
    let docket = Docket::from_json(
        &json!({
            "Sources": [{"Files": "widgets.csv", "Encoder": "Nope", "Part Type ID": "Z00100300001"}]
        }),
        Some(&fixtures_dir()),
    )
    .unwrap();

    let err = docket.process_sources(&lookups()).unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("Nope"), "{err}");
}

#[test]
fn include_cycle_is_rejected() {
    let dir = tmp_dir("include_cycle");
    std::fs::write(dir.join("a.json"), r#"{"Includes": ["b.json"]}"#).unwrap();
    std::fs::write(dir.join("b.json"), r#"{"Includes": ["a.json"]}"#).unwrap();

    let err = Docket::from_path(dir.join("a.json")).unwrap_err();
    assert!(err.to_string().contains("include cycle"), "{err}");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn auto_encoder_copies_every_column() {
    let docket = Docket::from_json(
        &json!({
            "Sources": [{"Files": "widgets.csv", "Part Type ID": "Z00100300001"}]
        }),
        Some(&fixtures_dir()),
    )
    .unwrap();
    let plan = docket
        .build_plan(&lookups(), &DocketOptions::default())
        .unwrap();

    assert_eq!(plan.new_items.len(), 2);
    let record = &plan.new_items[1].record;
    assert_eq!(record.text("Serial Number").as_deref(), Some("W-002"));
    assert_eq!(record.text("Mass").as_deref(), Some("3.0"));
    assert_eq!(record.text("Count").as_deref(), Some("4"));
    let specs = &plan.new_items[1].payload["specifications"];
    assert_eq!(specs["Mass"], json!("3.0"));
}
