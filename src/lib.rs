//! chanlun: incremental market-structure decomposition of price bars.
//!
//! Bars are folded into merged candles, strokes, two levels of segments,
//! consolidation zones and trade signals. Hexagonal architecture: domain logic
//! in [`domain`], port traits in [`ports`], concrete implementations in
//! [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
