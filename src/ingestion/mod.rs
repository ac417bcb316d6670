//! Raw spreadsheet loading.
//!
//! Most callers should use [`load_raw_sheet`] (from [`unified`]) which:
//!
//! - picks the reader from the file extension (or an explicit [`IngestionFormat`])
//! - returns the whole sheet as a grid of [`crate::types::Value`] cells
//! - optionally reports success/failure/alerts to an [`IngestionObserver`]
//!
//! Header detection and column typing happen later, in [`crate::sheet`].
//!
//! Format-specific functions are also available under:
//! - [`csv`]
//! - `excel` (feature-gated behind `excel`)

pub mod csv;
#[cfg(feature = "excel")]
pub mod excel;
pub mod observability;
pub mod unified;

pub use observability::{
    IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats, TracingObserver,
};
pub use unified::{list_sheets, load_raw_sheet, IngestionFormat, RawSheet, SheetSelection};
