//! Concrete adapter implementations for ports.

pub mod csv_report_adapter;
pub mod ini_config_adapter;
