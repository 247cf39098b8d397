//! Port traits: boundaries the domain talks through.

pub mod config_port;
pub mod report_port;
