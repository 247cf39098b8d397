//! Report export port.

use crate::domain::error::ChanError;
use crate::domain::report::Reports;
use std::path::Path;

/// Port for writing the derived row-sets of a sequence.
pub trait ReportPort {
    /// Write one artifact per row-set under `destination`.
    fn write(&self, reports: &Reports, destination: &Path) -> Result<(), ChanError>;
}
