//! CSV report adapter: one `<name>.csv` file per row-set.

use crate::domain::error::ChanError;
use crate::domain::report::Reports;
use crate::ports::report_port::ReportPort;
use log::info;
use serde::Serialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }

    fn write_rows<T: Serialize>(dir: &Path, name: &str, rows: &[T]) -> Result<(), ChanError> {
        let path = dir.join(format!("{name}.csv"));
        let mut writer = csv::Writer::from_path(&path).map_err(|e| ChanError::Report {
            reason: format!("failed to open {}: {e}", path.display()),
        })?;
        for row in rows {
            writer.serialize(row).map_err(|e| ChanError::Report {
                reason: format!("failed to write {name} row: {e}"),
            })?;
        }
        writer.flush()?;
        info!("wrote {} rows to {}", rows.len(), path.display());
        Ok(())
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, reports: &Reports, destination: &Path) -> Result<(), ChanError> {
        fs::create_dir_all(destination)?;
        let [kline, bi, seg, segseg, zs, segzs, bs, seg_bs, history, seg_history] =
            Reports::NAMES;
        Self::write_rows(destination, kline, &reports.kline_list)?;
        Self::write_rows(destination, bi, &reports.bi_list)?;
        Self::write_rows(destination, seg, &reports.seg_list)?;
        Self::write_rows(destination, segseg, &reports.segseg_list)?;
        Self::write_rows(destination, zs, &reports.zs_list)?;
        Self::write_rows(destination, segzs, &reports.segzs_list)?;
        Self::write_rows(destination, bs, &reports.bs_point_lst)?;
        Self::write_rows(destination, seg_bs, &reports.seg_bs_point_lst)?;
        Self::write_rows(destination, history, &reports.bs_point_history)?;
        Self::write_rows(destination, seg_history, &reports.seg_bs_point_history)?;
        Ok(())
    }
}
