//! Core domain types and the cascading structure engine.

pub mod bar;
pub mod candle;
pub mod collaborator;
pub mod component;
pub mod config;
pub mod config_validation;
pub mod eigen;
pub mod error;
pub mod indicator;
pub mod report;
pub mod segment;
pub mod segment_builder;
pub mod segment_cascade;
pub mod sequence;
pub mod signal;
pub mod signal_builder;
pub mod snapshot;
pub mod stroke;
pub mod stroke_builder;
pub mod zone;
pub mod zone_builder;
pub mod zone_linkage;
