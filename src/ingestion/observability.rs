use std::path::PathBuf;

use crate::error::HwdbError;

use super::unified::IngestionFormat;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestionSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (operation failed).
    Error,
    /// Critical error (typically I/O or other infrastructure failures).
    Critical,
}

/// Context about a sheet load.
#[derive(Debug, Clone)]
pub struct IngestionContext {
    /// The spreadsheet file.
    pub path: PathBuf,
    /// Format used for loading.
    pub format: IngestionFormat,
    /// Sheet name, when known.
    pub sheet: Option<String>,
}

/// Minimal stats reported on a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionStats {
    /// Number of grid rows read (before header detection).
    pub rows: usize,
}

/// Observer interface for sheet load outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait IngestionObserver: Send + Sync {
    /// Called when a sheet loads.
    fn on_success(&self, _ctx: &IngestionContext, _stats: IngestionStats) {}

    /// Called when a sheet fails to load.
    fn on_failure(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &HwdbError) {}

    /// Called when a failure meets an alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &HwdbError) {
        self.on_failure(ctx, severity, error)
    }
}

/// Forwards load events to `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl IngestionObserver for TracingObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        tracing::debug!(
            format = ?ctx.format,
            path = %ctx.path.display(),
            sheet = ctx.sheet.as_deref().unwrap_or(""),
            rows = stats.rows,
            "sheet loaded"
        );
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &HwdbError) {
        tracing::warn!(
            ?severity,
            format = ?ctx.format,
            path = %ctx.path.display(),
            sheet = ctx.sheet.as_deref().unwrap_or(""),
            %error,
            "sheet load failed"
        );
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &HwdbError) {
        tracing::error!(
            ?severity,
            format = ?ctx.format,
            path = %ctx.path.display(),
            sheet = ctx.sheet.as_deref().unwrap_or(""),
            %error,
            "sheet load alert"
        );
    }
}
