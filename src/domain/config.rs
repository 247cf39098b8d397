//! Typed engine configuration, read once through a [`ConfigPort`].

use crate::domain::config_validation::validate_chan_config;
use crate::domain::error::ChanError;
use crate::domain::indicator::{MacdAlgo, MacdParams};
use crate::domain::signal::{SignalKind, parse_kinds};
use crate::ports::config_port::ConfigPort;
use std::str::FromStr;

/// Segment construction variant, fixed for the lifetime of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegAlgo {
    #[default]
    Chan,
    OnePlusOne,
    Break,
}

impl SegAlgo {
    /// Unknown names are a configuration fault.
    pub fn parse(value: &str) -> Result<Self, ChanError> {
        match value.trim() {
            "chan" => Ok(SegAlgo::Chan),
            "1+1" => Ok(SegAlgo::OnePlusOne),
            "break" => Ok(SegAlgo::Break),
            other => Err(ChanError::config_invalid(
                "chan",
                "seg_algo",
                format!("unsupported segment algorithm '{other}'"),
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SegAlgo::Chan => "chan",
            SegAlgo::OnePlusOne => "1+1",
            SegAlgo::Break => "break",
        }
    }

    pub fn is_deprecated(&self) -> bool {
        !matches!(self, SegAlgo::Chan)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrokeAlgo {
    #[default]
    Normal,
    /// Any valid opposite fractal pair makes a stroke, regardless of span.
    Fx,
}

impl FromStr for StrokeAlgo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "normal" => Ok(StrokeAlgo::Normal),
            "fx" => Ok(StrokeAlgo::Fx),
            other => Err(format!("unsupported stroke algo '{other}'")),
        }
    }
}

/// How strictly the end fractal must clear the start fractal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FxCheck {
    Strict,
    Loss,
    #[default]
    Half,
    Totally,
}

impl FromStr for FxCheck {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "strict" => Ok(FxCheck::Strict),
            "loss" => Ok(FxCheck::Loss),
            "half" => Ok(FxCheck::Half),
            "totally" => Ok(FxCheck::Totally),
            other => Err(format!("unsupported fx_check '{other}'")),
        }
    }
}

/// How components after the last sure segment are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeftMethod {
    #[default]
    Peak,
    All,
}

impl FromStr for LeftMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "peak" => Ok(LeftMethod::Peak),
            "all" => Ok(LeftMethod::All),
            other => Err(format!("unsupported left_method '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoneCombineMode {
    #[default]
    Zs,
    Peak,
}

impl FromStr for ZoneCombineMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "zs" => Ok(ZoneCombineMode::Zs),
            "peak" => Ok(ZoneCombineMode::Peak),
            other => Err(format!("unsupported combine_mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrokeConfig {
    pub algo: StrokeAlgo,
    pub is_strict: bool,
    pub fx_check: FxCheck,
    pub gap_as_candle: bool,
    pub end_is_peak: bool,
}

impl Default for StrokeConfig {
    fn default() -> Self {
        Self {
            algo: StrokeAlgo::Normal,
            is_strict: true,
            fx_check: FxCheck::Half,
            gap_as_candle: true,
            end_is_peak: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentConfig {
    pub left_method: LeftMethod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneConfig {
    pub need_combine: bool,
    pub combine_mode: ZoneCombineMode,
    pub one_stroke_zone: bool,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            need_combine: true,
            combine_mode: ZoneCombineMode::Zs,
            one_stroke_zone: false,
        }
    }
}

/// Signal rules for one side (buy or sell).
#[derive(Debug, Clone, PartialEq)]
pub struct PointConfig {
    pub divergence_rate: f64,
    pub min_zone_count: usize,
    pub only_multi_stroke_zone: bool,
    pub max_bs2_rate: f64,
    pub bs1_peak: bool,
    pub macd_algo: MacdAlgo,
    pub bs2_follow_1: bool,
    pub bs3_follow_1: bool,
    pub bs3_peak: bool,
    pub bs2s_follow_2: bool,
    pub max_bs2s_level: Option<usize>,
    pub strict_bs3: bool,
    pub target_kinds: Vec<SignalKind>,
}

impl Default for PointConfig {
    fn default() -> Self {
        Self {
            divergence_rate: f64::INFINITY,
            min_zone_count: 1,
            only_multi_stroke_zone: true,
            max_bs2_rate: 0.9999,
            bs1_peak: true,
            macd_algo: MacdAlgo::Peak,
            bs2_follow_1: true,
            bs3_follow_1: true,
            bs3_peak: false,
            bs2s_follow_2: false,
            max_bs2s_level: None,
            strict_bs3: false,
            target_kinds: SignalKind::ALL.to_vec(),
        }
    }
}

impl PointConfig {
    pub fn targets(&self, kind: SignalKind) -> bool {
        self.target_kinds.contains(&kind)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalConfig {
    pub buy: PointConfig,
    pub sell: PointConfig,
}

impl SignalConfig {
    pub fn side(&self, is_buy: bool) -> &PointConfig {
        if is_buy { &self.buy } else { &self.sell }
    }

    /// Segment-level defaults: slope metric, every zone counts.
    pub fn segment_level() -> Self {
        let point = PointConfig {
            macd_algo: MacdAlgo::Slope,
            only_multi_stroke_zone: false,
            ..PointConfig::default()
        };
        Self {
            buy: point.clone(),
            sell: point,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChanConfig {
    /// Cascade after every structural change instead of once at the end.
    pub streaming: bool,
    pub seg_algo: SegAlgo,
    pub stroke: StrokeConfig,
    pub segment: SegmentConfig,
    pub zone: ZoneConfig,
    pub signal: SignalConfig,
    pub seg_signal: SignalConfig,
    pub macd: MacdParams,
}

impl Default for ChanConfig {
    fn default() -> Self {
        Self {
            streaming: false,
            seg_algo: SegAlgo::Chan,
            stroke: StrokeConfig::default(),
            segment: SegmentConfig::default(),
            zone: ZoneConfig::default(),
            signal: SignalConfig::default(),
            seg_signal: SignalConfig::segment_level(),
            macd: MacdParams::default(),
        }
    }
}

impl ChanConfig {
    /// Read sections `[chan] [stroke] [segment] [zone] [signal] [seg_signal]`.
    ///
    /// Absent keys keep their defaults; a key given with a blank value is
    /// reported missing. Keys in the signal sections accept a
    /// `-buy` or `-sell` suffix that overrides the plain key for one side.
    pub fn from_port(port: &dyn ConfigPort) -> Result<Self, ChanError> {
        let defaults = ChanConfig::default();
        let seg_algo = match read_present(port, "chan", "seg_algo")? {
            Some(v) => SegAlgo::parse(&v)?,
            None => defaults.seg_algo,
        };
        let macd = MacdParams {
            fast: read_count(port, "chan", "macd_fast", defaults.macd.fast)?,
            slow: read_count(port, "chan", "macd_slow", defaults.macd.slow)?,
            signal: read_count(port, "chan", "macd_signal", defaults.macd.signal)?,
        };
        let stroke = StrokeConfig {
            algo: read_parsed(port, "stroke", "algo", defaults.stroke.algo)?,
            is_strict: port.get_bool("stroke", "strict", defaults.stroke.is_strict),
            fx_check: read_parsed(port, "stroke", "fx_check", defaults.stroke.fx_check)?,
            gap_as_candle: port.get_bool("stroke", "gap_as_candle", defaults.stroke.gap_as_candle),
            end_is_peak: port.get_bool("stroke", "end_is_peak", defaults.stroke.end_is_peak),
        };
        let segment = SegmentConfig {
            left_method: read_parsed(port, "segment", "left_method", defaults.segment.left_method)?,
        };
        let zone = ZoneConfig {
            need_combine: port.get_bool("zone", "need_combine", defaults.zone.need_combine),
            combine_mode: read_parsed(port, "zone", "combine_mode", defaults.zone.combine_mode)?,
            one_stroke_zone: port.get_bool("zone", "one_stroke_zone", defaults.zone.one_stroke_zone),
        };
        let signal = read_signal_section(port, "signal", &defaults.signal)?;
        let seg_signal = read_signal_section(port, "seg_signal", &defaults.seg_signal)?;

        let config = ChanConfig {
            streaming: port.get_bool("chan", "streaming", defaults.streaming),
            seg_algo,
            stroke,
            segment,
            zone,
            signal,
            seg_signal,
            macd,
        };
        validate_chan_config(&config)?;
        Ok(config)
    }
}

fn read_present(port: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<String>, ChanError> {
    match port.get_string(section, key) {
        Some(v) if v.trim().is_empty() => Err(ChanError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
        other => Ok(other),
    }
}

fn read_parsed<T>(port: &dyn ConfigPort, section: &str, key: &str, default: T) -> Result<T, ChanError>
where
    T: FromStr<Err = String>,
{
    match read_present(port, section, key)? {
        Some(v) => v
            .parse()
            .map_err(|reason: String| ChanError::config_invalid(section, key, reason)),
        None => Ok(default),
    }
}

fn read_count(port: &dyn ConfigPort, section: &str, key: &str, default: usize) -> Result<usize, ChanError> {
    let value = port.get_int(section, key, default as i64);
    usize::try_from(value)
        .map_err(|_| ChanError::config_invalid(section, key, format!("{key} must be non-negative")))
}

fn read_signal_section(
    port: &dyn ConfigPort,
    section: &str,
    defaults: &SignalConfig,
) -> Result<SignalConfig, ChanError> {
    Ok(SignalConfig {
        buy: read_point(port, section, "buy", &defaults.buy)?,
        sell: read_point(port, section, "sell", &defaults.sell)?,
    })
}

/// Side-specific key first, then the shared key, then the default.
fn side_string(port: &dyn ConfigPort, section: &str, key: &str, side: &str) -> Option<(String, String)> {
    let sided = format!("{key}-{side}");
    port.get_string(section, &sided)
        .map(|v| (sided, v))
        .or_else(|| port.get_string(section, key).map(|v| (key.to_string(), v)))
}

fn side_bool(port: &dyn ConfigPort, section: &str, key: &str, side: &str, default: bool) -> Result<bool, ChanError> {
    match side_string(port, section, key, side) {
        Some((name, v)) => crate::ports::config_port::parse_bool(&v)
            .ok_or_else(|| ChanError::config_invalid(section, &name, format!("'{v}' is not a boolean"))),
        None => Ok(default),
    }
}

fn side_f64(port: &dyn ConfigPort, section: &str, key: &str, side: &str, default: f64) -> Result<f64, ChanError> {
    match side_string(port, section, key, side) {
        Some((name, v)) => v
            .trim()
            .parse::<f64>()
            .map_err(|_| ChanError::config_invalid(section, &name, format!("'{v}' is not a number"))),
        None => Ok(default),
    }
}

fn side_usize(port: &dyn ConfigPort, section: &str, key: &str, side: &str) -> Result<Option<usize>, ChanError> {
    match side_string(port, section, key, side) {
        Some((name, v)) => v.trim().parse::<usize>().map(Some).map_err(|_| {
            ChanError::config_invalid(section, &name, format!("'{v}' is not a non-negative integer"))
        }),
        None => Ok(None),
    }
}

fn side_parsed<T>(port: &dyn ConfigPort, section: &str, key: &str, side: &str, default: T) -> Result<T, ChanError>
where
    T: FromStr<Err = String>,
{
    match side_string(port, section, key, side) {
        Some((name, v)) => v
            .parse()
            .map_err(|reason: String| ChanError::config_invalid(section, &name, reason)),
        None => Ok(default),
    }
}

fn read_point(
    port: &dyn ConfigPort,
    section: &str,
    side: &str,
    defaults: &PointConfig,
) -> Result<PointConfig, ChanError> {
    let target_kinds = match side_string(port, section, "target_kinds", side) {
        Some((name, v)) => parse_kinds(&v).map_err(|reason| ChanError::config_invalid(section, &name, reason))?,
        None => defaults.target_kinds.clone(),
    };
    Ok(PointConfig {
        divergence_rate: side_f64(port, section, "divergence_rate", side, defaults.divergence_rate)?,
        min_zone_count: side_usize(port, section, "min_zone_count", side)?.unwrap_or(defaults.min_zone_count),
        only_multi_stroke_zone: side_bool(
            port,
            section,
            "only_multi_stroke_zone",
            side,
            defaults.only_multi_stroke_zone,
        )?,
        max_bs2_rate: side_f64(port, section, "max_bs2_rate", side, defaults.max_bs2_rate)?,
        bs1_peak: side_bool(port, section, "bs1_peak", side, defaults.bs1_peak)?,
        macd_algo: side_parsed(port, section, "macd_algo", side, defaults.macd_algo)?,
        bs2_follow_1: side_bool(port, section, "bs2_follow_1", side, defaults.bs2_follow_1)?,
        bs3_follow_1: side_bool(port, section, "bs3_follow_1", side, defaults.bs3_follow_1)?,
        bs3_peak: side_bool(port, section, "bs3_peak", side, defaults.bs3_peak)?,
        bs2s_follow_2: side_bool(port, section, "bs2s_follow_2", side, defaults.bs2s_follow_2)?,
        max_bs2s_level: side_usize(port, section, "max_bs2s_level", side)?.or(defaults.max_bs2s_level),
        strict_bs3: side_bool(port, section, "strict_bs3", side, defaults.strict_bs3)?,
        target_kinds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapConfig {
        values: HashMap<(String, String), String>,
    }

    impl MapConfig {
        fn new(entries: &[(&str, &str, &str)]) -> Self {
            Self {
                values: entries
                    .iter()
                    .map(|(s, k, v)| ((s.to_string(), k.to_string()), v.to_string()))
                    .collect(),
            }
        }
    }

    impl ConfigPort for MapConfig {
        fn get_string(&self, section: &str, key: &str) -> Option<String> {
            self.values
                .get(&(section.to_string(), key.to_string()))
                .cloned()
        }

        fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
            self.get_string(section, key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
            self.get_string(section, key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
            self.get_string(section, key)
                .and_then(|v| crate::ports::config_port::parse_bool(&v))
                .unwrap_or(default)
        }
    }

    #[test]
    fn empty_port_gives_defaults() {
        let config = ChanConfig::from_port(&MapConfig::new(&[])).unwrap();
        assert_eq!(config, ChanConfig::default());
        assert_eq!(config.seg_signal.buy.macd_algo, MacdAlgo::Slope);
        assert!(!config.seg_signal.buy.only_multi_stroke_zone);
    }

    #[test]
    fn seg_algo_selector() {
        assert_eq!(SegAlgo::parse("chan").unwrap(), SegAlgo::Chan);
        assert_eq!(SegAlgo::parse("1+1").unwrap(), SegAlgo::OnePlusOne);
        assert_eq!(SegAlgo::parse("break").unwrap(), SegAlgo::Break);
        let err = SegAlgo::parse("zigzag").unwrap_err();
        assert!(matches!(
            err,
            ChanError::ConfigInvalid { ref section, ref key, .. } if section == "chan" && key == "seg_algo"
        ));
    }

    #[test]
    fn unsupported_seg_algo_in_port_fails() {
        let port = MapConfig::new(&[("chan", "seg_algo", "def")]);
        assert!(ChanConfig::from_port(&port).is_err());
    }

    #[test]
    fn side_suffix_overrides_shared_key() {
        let port = MapConfig::new(&[
            ("signal", "divergence_rate", "0.8"),
            ("signal", "divergence_rate-sell", "0.6"),
            ("signal", "target_kinds-buy", "1,2"),
        ]);
        let config = ChanConfig::from_port(&port).unwrap();
        assert!((config.signal.buy.divergence_rate - 0.8).abs() < f64::EPSILON);
        assert!((config.signal.sell.divergence_rate - 0.6).abs() < f64::EPSILON);
        assert_eq!(
            config.signal.buy.target_kinds,
            vec![SignalKind::Bs1, SignalKind::Bs2]
        );
        assert_eq!(config.signal.sell.target_kinds, SignalKind::ALL.to_vec());
    }

    #[test]
    fn stroke_and_zone_sections() {
        let port = MapConfig::new(&[
            ("chan", "streaming", "yes"),
            ("stroke", "fx_check", "strict"),
            ("stroke", "strict", "false"),
            ("zone", "combine_mode", "peak"),
            ("segment", "left_method", "all"),
        ]);
        let config = ChanConfig::from_port(&port).unwrap();
        assert!(config.streaming);
        assert_eq!(config.stroke.fx_check, FxCheck::Strict);
        assert!(!config.stroke.is_strict);
        assert_eq!(config.zone.combine_mode, ZoneCombineMode::Peak);
        assert_eq!(config.segment.left_method, LeftMethod::All);
    }

    #[test]
    fn bad_enum_value_names_the_key() {
        let port = MapConfig::new(&[("stroke", "fx_check", "sloppy")]);
        let err = ChanConfig::from_port(&port).unwrap_err();
        assert!(err.to_string().contains("[stroke] fx_check"));
    }

    #[test]
    fn bad_macd_algo_on_one_side() {
        let port = MapConfig::new(&[("seg_signal", "macd_algo-buy", "rsi")]);
        let err = ChanConfig::from_port(&port).unwrap_err();
        assert!(err.to_string().contains("macd_algo-buy"));
    }

    #[test]
    fn blank_value_is_missing() {
        let port = MapConfig::new(&[("chan", "seg_algo", "  ")]);
        assert!(matches!(
            ChanConfig::from_port(&port).unwrap_err(),
            ChanError::ConfigMissing { ref key, .. } if key == "seg_algo"
        ));
    }
}
