//! Range checks for a typed [`ChanConfig`], run before any ingestion.

use crate::domain::config::{ChanConfig, PointConfig};
use crate::domain::error::ChanError;
use crate::domain::indicator::MacdParams;

pub fn validate_chan_config(config: &ChanConfig) -> Result<(), ChanError> {
    validate_macd(&config.macd)?;
    validate_point("signal", "buy", &config.signal.buy)?;
    validate_point("signal", "sell", &config.signal.sell)?;
    validate_point("seg_signal", "buy", &config.seg_signal.buy)?;
    validate_point("seg_signal", "sell", &config.seg_signal.sell)?;
    Ok(())
}

fn validate_macd(macd: &MacdParams) -> Result<(), ChanError> {
    if macd.fast == 0 {
        return Err(ChanError::config_invalid(
            "chan",
            "macd_fast",
            "macd_fast must be at least 1",
        ));
    }
    if macd.slow <= macd.fast {
        return Err(ChanError::config_invalid(
            "chan",
            "macd_slow",
            "macd_slow must be greater than macd_fast",
        ));
    }
    if macd.signal == 0 {
        return Err(ChanError::config_invalid(
            "chan",
            "macd_signal",
            "macd_signal must be at least 1",
        ));
    }
    Ok(())
}

fn validate_point(section: &str, side: &str, point: &PointConfig) -> Result<(), ChanError> {
    if point.divergence_rate.is_nan() || point.divergence_rate <= 0.0 {
        return Err(ChanError::config_invalid(
            section,
            &format!("divergence_rate-{side}"),
            "divergence_rate must be positive",
        ));
    }
    if !(point.max_bs2_rate > 0.0 && point.max_bs2_rate <= 1.0) {
        return Err(ChanError::config_invalid(
            section,
            &format!("max_bs2_rate-{side}"),
            "max_bs2_rate must be in (0, 1]",
        ));
    }
    if point.target_kinds.is_empty() {
        return Err(ChanError::config_invalid(
            section,
            &format!("target_kinds-{side}"),
            "at least one signal kind is required",
        ));
    }
    if point.max_bs2s_level == Some(0) {
        return Err(ChanError::config_invalid(
            section,
            &format!("max_bs2s_level-{side}"),
            "max_bs2s_level must be at least 1 when set",
        ));
    }
    Ok(())
}
