use std::cell::{Cell, RefCell};
use std::path::PathBuf;

use serde_json::json;

use hwdb_docket::ci_map::CiMap;
use hwdb_docket::docket::{Docket, DocketOptions, UploadPlan};
use hwdb_docket::encoder::{Record, RecordLocation};
use hwdb_docket::lookup::LookupService;
use hwdb_docket::rest::{HwdbClient, Response, ResponseStatus};
use hwdb_docket::submit::{submit, Outcome, SubmitMode, SubmitOptions};
use hwdb_docket::types::Value;
use hwdb_docket::HwdbResult;

/// Records every call and hands out sequential part IDs for created components.
#[derive(Default)]
struct FakeHwdb {
    calls: RefCell<Vec<String>>,
    next_id: Cell<u32>,
    reject_serial: Option<&'static str>,
    reject_part_type: Option<&'static str>,
}

impl FakeHwdb {
    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl HwdbClient for FakeHwdb {
    fn get(&self, resource: &str) -> HwdbResult<Response> {
        self.calls.borrow_mut().push(format!("GET {resource}"));
        Ok(Response::ok(json!({"status": "OK", "data": {"part_type_id": "Z00100300001"}})))
    }

    fn post(&self, resource: &str, body: &serde_json::Value) -> HwdbResult<Response> {
        self.calls.borrow_mut().push(format!("POST {resource}"));
        let rejected_type = self
            .reject_part_type
            .is_some_and(|pt| resource == format!("component-types/{pt}/components"));
        if rejected_type || self.reject_serial.is_some_and(|sn| body["serial_number"] == json!(sn)) {
            return Ok(Response {
                status: ResponseStatus::Error,
                payload: json!({"status": "ERROR", "data": "duplicate serial number"}),
            });
        }
        if resource.ends_with("/components") {
            let id = self.next_id.get() + 1;
            self.next_id.set(id);
            return Ok(Response::ok(json!({"status": "OK", "data": format!("Z00100300001-{id:05}")})));
        }
        Ok(Response::ok(json!({"status": "OK", "data": {"test_id": 1}})))
    }

    fn patch(&self, resource: &str, _body: &serde_json::Value) -> HwdbResult<Response> {
        self.calls.borrow_mut().push(format!("PATCH {resource}"));
        Ok(Response::ok(json!({"status": "OK", "data": "patched"})))
    }
}

fn widget_plan() -> UploadPlan {
    let lookup = LookupService::from_path("tests/fixtures/lookups.json").unwrap();
    Docket::from_path("tests/fixtures/widgets.docket.json")
        .unwrap()
        .build_plan(&lookup, &DocketOptions::default())
        .unwrap()
}

#[test]
fn dry_run_sends_nothing() {
    let plan = widget_plan();
    let client = FakeHwdb::default();

    let report = submit(&plan, &client, &SubmitOptions::default()).unwrap();

    assert!(client.calls().is_empty());
    assert_eq!(report.mode, SubmitMode::DryRun);
    assert_eq!(report.results.len(), 4);
    assert!(report.results.iter().all(|r| r.outcome == Outcome::Planned));
    assert!(report.to_string().ends_with("4 operation(s): 0 ok, 0 failed, 0 skipped"));
}

#[test]
fn dry_run_with_verification_only_reads() {
    let plan = widget_plan();
    let client = FakeHwdb::default();
    let options = SubmitOptions {
        mode: SubmitMode::DryRun,
        verify_part_types: true,
    };

    let report = submit(&plan, &client, &options).unwrap();

    assert_eq!(client.calls(), vec!["GET component-types/Z00100300001"]);
    assert!(report.unverified_part_types.is_empty());
    assert!(report.is_success());
}

#[test]
fn submit_creates_items_before_attaching_tests() {
    let plan = widget_plan();
    let client = FakeHwdb::default();
    let options = SubmitOptions {
        mode: SubmitMode::Submit,
        verify_part_types: false,
    };

    let report = submit(&plan, &client, &options).unwrap();

    assert_eq!(
        client.calls(),
        vec![
            "POST component-types/Z00100300001/components",
            "POST component-types/Z00100300001/components",
            "POST components/Z00100300001-00001/tests",
            "POST components/Z00100300001-00002/tests",
        ]
    );
    assert_eq!(report.succeeded(), 4);
    assert!(report.is_success());
}

#[test]
fn tests_of_a_rejected_item_are_skipped() {
    let plan = widget_plan();
    let client = FakeHwdb {
        reject_serial: Some("W-001"),
        ..FakeHwdb::default()
    };
    let options = SubmitOptions {
        mode: SubmitMode::Submit,
        verify_part_types: false,
    };

    let report = submit(&plan, &client, &options).unwrap();

    assert_eq!(report.failed(), 1);
    assert_eq!(report.skipped(), 1);
    assert_eq!(report.succeeded(), 2);
    assert!(!report.is_success());
    assert!(matches!(
        &report.results[2].outcome,
        Outcome::Skipped { reason } if reason.contains("W-001")
    ));
    // W-002 still gets its item and its test.
    assert_eq!(
        client.calls().last().map(String::as_str),
        Some("POST components/Z00100300001-00001/tests")
    );
}

fn record(record_type: &str, part_type: &str, serial: &str) -> Record {
    let mut fields: Vec<(&str, Value)> = vec![
        ("Record Type", Value::from(record_type)),
        ("Part Type ID", Value::from(part_type)),
        ("Serial Number", Value::from(serial)),
    ];
    if record_type == "Test" {
        fields.insert(2, ("Test Name", Value::from("Visual")));
    }
    Record {
        fields: fields.into_iter().collect::<CiMap<Value>>(),
        location: RecordLocation {
            file: PathBuf::from("shared_serials.csv"),
            sheet: "shared_serials".to_string(),
            rows: vec![2],
        },
        warnings: Vec::new(),
    }
}

/// Two part types whose items share serial "S-1", each with a test.
fn shared_serial_plan() -> UploadPlan {
    UploadPlan::from_records(
        vec![
            record("Item", "Z00100300001", "S-1"),
            record("Item", "Z00100300002", "S-1"),
            record("Test", "Z00100300001", "S-1"),
            record("Test", "Z00100300002", "S-1"),
        ],
        &LookupService::empty(),
    )
}

#[test]
fn tests_link_to_the_item_of_their_own_part_type() {
    let plan = shared_serial_plan();
    let client = FakeHwdb::default();
    let options = SubmitOptions {
        mode: SubmitMode::Submit,
        verify_part_types: false,
    };

    let report = submit(&plan, &client, &options).unwrap();

    assert_eq!(
        client.calls(),
        vec![
            "POST component-types/Z00100300001/components",
            "POST component-types/Z00100300002/components",
            "POST components/Z00100300001-00001/tests",
            "POST components/Z00100300001-00002/tests",
        ]
    );
    assert!(report.is_success());
}

#[test]
fn failed_item_only_skips_tests_of_its_part_type() {
    let plan = shared_serial_plan();
    let client = FakeHwdb {
        reject_part_type: Some("Z00100300001"),
        ..FakeHwdb::default()
    };
    let options = SubmitOptions {
        mode: SubmitMode::Submit,
        verify_part_types: false,
    };

    let report = submit(&plan, &client, &options).unwrap();

    assert_eq!(report.failed(), 1);
    assert_eq!(report.skipped(), 1);
    assert!(matches!(
        &report.results[2].outcome,
        Outcome::Skipped { reason } if reason.contains("Z00100300001")
    ));
    assert_eq!(
        client.calls().last().map(String::as_str),
        Some("POST components/Z00100300001-00001/tests")
    );
}
