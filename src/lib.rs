//! `hwdb-docket` turns laboratory and manufacturing spreadsheets into hardware database
//! (HWDB) records.
//!
//! A **docket** names the spreadsheets to read, the **encoder** (a declarative schema) that
//! applies to each sheet, and default values at docket, source and sheet scope. Planning an
//! upload runs:
//!
//! 1. [`docket::Docket::process_sources`]: validate the docket and expand every source into
//!    sheet jobs (glob the files, resolve part types and encoders, merge scoped values).
//! 2. [`sheet::SheetModel`]: load each sheet and split it into a block of sheet-local values
//!    and a data table.
//! 3. [`encoder::encode`]: walk the encoder schema over the table, resolving every field
//!    through cell → sheet-local → outer values and casting it to its declared type.
//! 4. [`docket::UploadPlan`]: sort the records into new items, item updates and new tests.
//! 5. [`submit::submit`]: send the plan through an [`rest::HwdbClient`], or only list it.
//!
//! ## What you can ingest
//!
//! - **CSV**: `.csv`
//! - **Excel/workbooks** (Cargo feature `excel`, on by default): `.xlsx`, `.xls`, `.xlsm`,
//!   `.xlsb`, `.ods`
//!
//! ## Quick example: plan a docket
//!
//! ```no_run
//! use hwdb_docket::docket::{Docket, DocketOptions};
//! use hwdb_docket::lookup::LookupService;
//!
//! # fn main() -> Result<(), hwdb_docket::HwdbError> {
//! let docket = Docket::from_path("widgets.docket.json")?;
//! let plan = docket.build_plan(&LookupService::empty(), &DocketOptions::default())?;
//! print!("{plan}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Encoding a sheet directly
//!
//! ```rust
//! use hwdb_docket::encoder::Encoder;
//! use hwdb_docket::ingestion::{IngestionFormat, RawSheet};
//! use hwdb_docket::sheet::SheetModel;
//! use hwdb_docket::types::Value;
//! use hwdb_docket::values::Values;
//!
//! let encoder = Encoder::from_json(
//!     &serde_json::json!({
//!         "Encoder Name": "Widget",
//!         "Part Type ID": "Z00100300001",
//!         "Schema": {"Serial Number": "str", "Specifications": {"Mass": "float"}}
//!     }),
//!     None,
//! )?;
//!
//! let text = |s: &str| Value::from(s);
//! let raw = RawSheet {
//!     name: "widgets".to_string(),
//!     format: IngestionFormat::Csv,
//!     rows: vec![
//!         vec![text("Serial Number"), text("Mass")],
//!         vec![text("W-001"), text("2.5")],
//!     ],
//! };
//! let sheet = SheetModel::from_raw("widgets.csv", raw, Values::new());
//!
//! let records = encoder.encode(&sheet)?;
//! assert_eq!(records.len(), 1);
//! assert_eq!(records[0].get("Serial Number"), Some(&text("W-001")));
//! # Ok::<(), hwdb_docket::HwdbError>(())
//! ```
//!
//! ## Modules
//!
//! - [`docket`]: docket parsing, source expansion and the upload plan
//! - [`encoder`]: encoder schemas and the record encoder
//! - [`sheet`]: header-block detection and the data table
//! - [`values`]: scoped values and the `coalesce` lookup chain
//! - [`coercion`]: permissive casting to declared types
//! - [`ingestion`]: raw CSV/Excel grid loading with observer hooks
//! - [`execution`]: parallel sheet-job execution with metrics
//! - [`lookup`]: part type, institution, country and manufacturer tables
//! - [`rest`] / [`submit`]: the HWDB REST boundary and the submission driver
//! - [`logging`]: subscriber setup for the binary
//! - [`types`], [`ci_map`], [`error`]: shared building blocks

pub mod ci_map;
pub mod coercion;
pub mod docket;
pub mod encoder;
pub mod error;
pub mod execution;
pub mod ingestion;
pub mod logging;
pub mod lookup;
pub mod rest;
pub mod sheet;
pub mod submit;
pub mod types;
pub mod values;

pub use error::{HwdbError, HwdbResult};
