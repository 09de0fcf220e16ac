//! Seams to the host job runner.
//!
//! The runner is where configured inputs come from and where masked values,
//! exported variables and outputs go. Both halves are plain synchronous traits:
//! the GitHub implementation only appends to files and prints workflow
//! commands.

use crate::Result;

/// Read side of the job runner: configured inputs and process environment.
///
/// Implementations trim values and report blank ones as absent, so callers
/// never have to distinguish `""` from "not set".
pub trait InputSource: Send + Sync {
    /// Returns the configured value of an action input (e.g. `aws-region`).
    fn input(&self, name: &str) -> Option<String>;

    /// Returns an environment variable visible to the job.
    fn env(&self, name: &str) -> Option<String>;
}

/// Write side of the job runner.
///
/// Masking registration (`set_secret`) must reach the runner before any
/// publish call carrying the same value; [`ExportRecord`](crate::export::ExportRecord)
/// is the only caller and enforces that order.
pub trait ExportSink: Send + Sync {
    /// Registers a value for redaction in all later log output.
    fn set_secret(&self, value: &str) -> Result<()>;

    /// Publishes an environment variable to subsequent job steps.
    fn export_variable(&self, name: &str, value: &str) -> Result<()>;

    /// Publishes a step output.
    fn set_output(&self, name: &str, value: &str) -> Result<()>;

    /// Reports the run as failed with a user-facing message.
    fn set_failed(&self, message: &str);

    /// Writes extended failure detail (full error chain).
    fn error_detail(&self, detail: &str);
}
