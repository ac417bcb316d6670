//! Turning an upload plan into REST calls.
//!
//! Operations run in a fixed order: new items, then item updates, then tests, so a test can
//! attach to an item created earlier in the same run. In [`SubmitMode::DryRun`] nothing is
//! posted or patched; the optional part-type verification is the only traffic.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::docket::{PlannedRecord, UploadPlan};
use crate::encoder::RecordLocation;
use crate::error::HwdbResult;
use crate::rest::{HwdbClient, ResponseStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitMode {
    #[default]
    DryRun,
    Submit,
}

#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub mode: SubmitMode,
    /// GET every part type in the plan before submitting; operations on part types the
    /// server does not confirm are skipped.
    pub verify_part_types: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    CreateItem,
    UpdateItem,
    CreateTest,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateItem => f.write_str("create item"),
            Self::UpdateItem => f.write_str("update item"),
            Self::CreateTest => f.write_str("create test"),
        }
    }
}

/// The component a test attaches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartRef {
    Id(String),
    /// Known only by serial number; resolved at submit time.
    Serial(String),
    Unknown,
}

/// One REST call.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub part_type_id: String,
    pub part: PartRef,
    pub serial_number: Option<String>,
    pub body: serde_json::Value,
    pub location: RecordLocation,
}

impl Operation {
    fn from_planned(kind: OperationKind, planned: &PlannedRecord) -> Self {
        let part = match (planned.external_id(), planned.serial_number()) {
            (Some(id), _) => PartRef::Id(id),
            (None, Some(sn)) => PartRef::Serial(sn),
            (None, None) => PartRef::Unknown,
        };
        Self {
            kind,
            part_type_id: planned.part_type_id().unwrap_or_default(),
            part,
            serial_number: planned.serial_number(),
            body: planned.payload.clone(),
            location: planned.record.location.clone(),
        }
    }

    pub fn method(&self) -> &'static str {
        match self.kind {
            OperationKind::UpdateItem => "PATCH",
            _ => "POST",
        }
    }

    /// Resource path; `None` while a test's component is known only by serial number.
    pub fn resource(&self) -> Option<String> {
        match (self.kind, &self.part) {
            (OperationKind::CreateItem, _) => Some(format!("component-types/{}/components", self.part_type_id)),
            (OperationKind::UpdateItem, PartRef::Id(id)) => Some(format!("components/{id}")),
            (OperationKind::CreateTest, PartRef::Id(id)) => Some(format!("components/{id}/tests")),
            _ => None,
        }
    }
}

/// The operations a plan turns into, in submission order.
pub fn plan_operations(plan: &UploadPlan) -> Vec<Operation> {
    plan.new_items
        .iter()
        .map(|p| Operation::from_planned(OperationKind::CreateItem, p))
        .chain(plan.update_items.iter().map(|p| Operation::from_planned(OperationKind::UpdateItem, p)))
        .chain(plan.new_tests.iter().map(|p| Operation::from_planned(OperationKind::CreateTest, p)))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Dry run: not sent.
    Planned,
    Succeeded { part_id: Option<String> },
    Failed { status: ResponseStatus, message: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub operation: Operation,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default)]
pub struct SubmitReport {
    pub mode: SubmitMode,
    /// Part types that failed verification.
    pub unverified_part_types: Vec<String>,
    pub results: Vec<OperationResult>,
}

impl SubmitReport {
    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Succeeded { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped { .. }))
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0 && self.skipped() == 0 && self.unverified_part_types.is_empty()
    }
}

impl fmt::Display for SubmitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in &self.results {
            let op = &r.operation;
            let target = op
                .resource()
                .unwrap_or_else(|| format!("<component {}>", op.serial_number.as_deref().unwrap_or("?")));
            let outcome = match &r.outcome {
                Outcome::Planned => "planned".to_string(),
                Outcome::Succeeded { part_id: Some(id) } => format!("ok ({id})"),
                Outcome::Succeeded { part_id: None } => "ok".to_string(),
                Outcome::Failed { status, message } => format!("{status}: {message}"),
                Outcome::Skipped { reason } => format!("skipped: {reason}"),
            };
            writeln!(f, "{} {} {target} -> {outcome}", op.kind, op.method())?;
        }
        write!(
            f,
            "{} operation(s): {} ok, {} failed, {} skipped",
            self.results.len(),
            self.succeeded(),
            self.failed(),
            self.skipped()
        )
    }
}

/// Submit (or, in dry-run mode, only list) the plan's operations.
///
/// Transport errors abort the run; non-OK responses are recorded per operation and the run
/// continues, except that tests of an item whose creation failed are skipped.
pub fn submit(plan: &UploadPlan, client: &dyn HwdbClient, options: &SubmitOptions) -> HwdbResult<SubmitReport> {
    let operations = plan_operations(plan);
    let mut report = SubmitReport {
        mode: options.mode,
        ..SubmitReport::default()
    };

    if options.verify_part_types {
        let part_types: BTreeSet<&str> = operations.iter().map(|op| op.part_type_id.as_str()).collect();
        for id in part_types {
            let response = client.get(&format!("component-types/{id}"))?;
            if !response.is_ok() {
                tracing::warn!(part_type = id, message = %response.message(), "part type not confirmed by server");
                report.unverified_part_types.push(id.to_string());
            }
        }
    }
    let unverified: HashSet<String> = report.unverified_part_types.iter().cloned().collect();

    // Serial numbers are unique per part type only.
    let mut created: HashMap<(String, String), String> = HashMap::new();
    let mut failed_items: HashSet<(String, String)> = HashSet::new();

    for mut operation in operations {
        if unverified.contains(&operation.part_type_id) {
            report.results.push(OperationResult {
                outcome: Outcome::Skipped {
                    reason: format!("part type '{}' not verified", operation.part_type_id),
                },
                operation,
            });
            continue;
        }
        if options.mode == SubmitMode::DryRun {
            report.results.push(OperationResult {
                operation,
                outcome: Outcome::Planned,
            });
            continue;
        }

        if let PartRef::Serial(sn) = &operation.part {
            let item = (operation.part_type_id.clone(), sn.clone());
            if failed_items.contains(&item) {
                let reason = format!("item '{sn}' of part type '{}' was not created", operation.part_type_id);
                report.results.push(OperationResult {
                    operation,
                    outcome: Outcome::Skipped { reason },
                });
                continue;
            }
            if let Some(id) = created.get(&item) {
                operation.part = PartRef::Id(id.clone());
            }
        }

        let Some(resource) = operation.resource() else {
            let reason = match &operation.part {
                PartRef::Serial(sn) => format!("no part ID for serial number '{sn}'"),
                _ => "record has neither External ID nor Serial Number".to_string(),
            };
            report.results.push(OperationResult {
                operation,
                outcome: Outcome::Skipped { reason },
            });
            continue;
        };

        let response = match operation.kind {
            OperationKind::UpdateItem => client.patch(&resource, &operation.body)?,
            _ => client.post(&resource, &operation.body)?,
        };

        let outcome = if response.is_ok() {
            let part_id = match response.data() {
                serde_json::Value::String(s) => Some(s.clone()),
                data => data
                    .get("part_id")
                    .or_else(|| response.payload.get("part_id"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            };
            if operation.kind == OperationKind::CreateItem {
                if let (Some(sn), Some(id)) = (&operation.serial_number, &part_id) {
                    created.insert((operation.part_type_id.clone(), sn.clone()), id.clone());
                }
            }
            tracing::info!(kind = %operation.kind, resource = resource.as_str(), part_id = part_id.as_deref().unwrap_or(""), "submitted");
            Outcome::Succeeded { part_id }
        } else {
            if operation.kind == OperationKind::CreateItem {
                if let Some(sn) = &operation.serial_number {
                    failed_items.insert((operation.part_type_id.clone(), sn.clone()));
                }
            }
            tracing::warn!(kind = %operation.kind, resource = resource.as_str(), status = %response.status, message = %response.message(), "submission failed");
            Outcome::Failed {
                status: response.status,
                message: response.message(),
            }
        };
        report.results.push(OperationResult { operation, outcome });
    }

    Ok(report)
}
