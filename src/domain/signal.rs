//! Buy/sell points and the rolling history of the latest one per cascade.

use crate::domain::bar::BarMark;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignalKind {
    /// Divergent exit from the segment's last zone.
    Bs1,
    /// Divergent new extreme without a usable zone.
    Bs1Peak,
    /// First pull-back after a primary point.
    Bs2,
    /// Later pull-backs staying inside the first pull-back's range.
    Bs2Strict,
    /// Pull-back after the next segment's first zone.
    Bs3After,
    /// Pull-back after a primary point that stays out of the final zone.
    Bs3Before,
}

impl SignalKind {
    pub const ALL: [SignalKind; 6] = [
        SignalKind::Bs1,
        SignalKind::Bs1Peak,
        SignalKind::Bs2,
        SignalKind::Bs2Strict,
        SignalKind::Bs3After,
        SignalKind::Bs3Before,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Bs1 => "1",
            SignalKind::Bs1Peak => "1p",
            SignalKind::Bs2 => "2",
            SignalKind::Bs2Strict => "2s",
            SignalKind::Bs3After => "3a",
            SignalKind::Bs3Before => "3b",
        }
    }

    pub fn is_primary(&self) -> bool {
        matches!(self, SignalKind::Bs1 | SignalKind::Bs1Peak)
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SignalKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| format!("unknown signal kind '{}'", s.trim()))
    }
}

/// Parse a comma separated kind list such as `1,1p,2`.
pub fn parse_kinds(value: &str) -> Result<Vec<SignalKind>, String> {
    let mut kinds = Vec::new();
    for part in value.split(',').filter(|p| !p.trim().is_empty()) {
        let kind: SignalKind = part.parse()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    if kinds.is_empty() {
        return Err("at least one signal kind is required".to_string());
    }
    Ok(kinds)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub kinds: Vec<SignalKind>,
    pub is_buy: bool,
    pub mark: BarMark,
    pub candle: usize,
    pub component: usize,
    pub component_begin: BarMark,
    pub component_end: BarMark,
    /// Position in [`SignalList::primaries`] of the point this one follows.
    pub related_primary: Option<usize>,
    pub features: BTreeMap<String, f64>,
}

impl Signal {
    pub fn kinds_label(&self) -> String {
        self.kinds
            .iter()
            .map(SignalKind::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn has_kind(&self, kind: SignalKind) -> bool {
        self.kinds.contains(&kind)
    }
}

/// One history row: the newest signal as of a cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRecord {
    pub time: NaiveDateTime,
    pub kinds: String,
    pub is_buy: bool,
    pub related_primary_time: Option<NaiveDateTime>,
    pub component: usize,
    pub component_begin_time: NaiveDateTime,
    pub component_end_time: NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalList {
    /// Target signals, ordered by bar index.
    pub signals: Vec<Signal>,
    /// Every primary point found, target or not, in discovery order.
    pub primaries: Vec<Signal>,
}

impl SignalList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.signals.clear();
        self.primaries.clear();
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Signal> {
        self.signals.iter()
    }

    pub fn position_of_component(&self, component: usize) -> Option<usize> {
        self.signals.iter().position(|s| s.component == component)
    }

    pub fn primary_for_component(&self, component: usize) -> Option<usize> {
        self.primaries.iter().position(|s| s.component == component)
    }

    pub fn related_primary(&self, signal: &Signal) -> Option<&Signal> {
        signal.related_primary.and_then(|i| self.primaries.get(i))
    }

    pub fn sort_by_bar(&mut self) {
        self.signals.sort_by_key(|s| s.mark.index);
    }

    pub fn latest(&self) -> Option<&Signal> {
        self.signals.last()
    }

    pub fn latest_record(&self) -> Option<SignalRecord> {
        let latest = self.latest()?;
        Some(SignalRecord {
            time: latest.mark.time,
            kinds: latest.kinds_label(),
            is_buy: latest.is_buy,
            related_primary_time: self.related_primary(latest).map(|p| p.mark.time),
            component: latest.component,
            component_begin_time: latest.component_begin.time,
            component_end_time: latest.component_end.time,
        })
    }
}
