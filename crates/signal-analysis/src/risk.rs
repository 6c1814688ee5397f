use strategy_core::{RiskProfile, StrategyError, StrategyParams};

use crate::frame::IndicatorFrame;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Stop-loss for an entry evaluated at index `at`.
///
/// Base stop = entry - ATR * multiplier. When enough history exists and
/// the entry bar's high sits within the tolerance band of the trailing
/// high, the stop is re-anchored to the entry bar's high — but never below
/// the base stop (monotonic floor).
pub fn compute_stop_loss_at(
    frame: &IndicatorFrame,
    at: usize,
    entry_price: f64,
    entry_bar_index: Option<usize>,
    params: &StrategyParams,
) -> Result<RiskProfile, StrategyError> {
    if at >= frame.len() {
        return Err(StrategyError::InsufficientData(format!(
            "bar index {} out of range ({} bars)",
            at,
            frame.len()
        )));
    }
    let atr = frame.point(at).atr.ok_or_else(|| {
        StrategyError::InsufficientData("ATR not yet defined at evaluation bar".to_string())
    })?;

    let base_stop = entry_price - atr * params.stop_loss_multiplier;
    let mut stop = base_stop;
    let mut is_new_high_stop = false;

    let available = at + 1;
    if available >= params.new_high_period {
        if let Some(entry_index) = entry_bar_index.filter(|&i| i <= at) {
            let lookback = params.new_high_period.min(available);
            let window = &frame.bars[available - lookback..=at];
            let trailing_high = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let entry_high = frame.bar(entry_index).high;

            if entry_high >= trailing_high * params.new_high_tolerance {
                stop = base_stop.max(entry_high - atr * params.stop_loss_multiplier);
                is_new_high_stop = true;
            }
        }
    }

    let close = frame.bar(at).close;
    Ok(RiskProfile {
        stop_loss: round2(stop),
        base_stop_loss: round2(base_stop),
        atr: round2(atr),
        is_new_high_stop,
        risk_reward_ratio: round2((close - stop) / atr),
    })
}

/// Stop-loss against the most recent bar.
pub fn compute_stop_loss(
    frame: &IndicatorFrame,
    entry_price: f64,
    entry_bar_index: Option<usize>,
    params: &StrategyParams,
) -> Result<RiskProfile, StrategyError> {
    compute_stop_loss_at(frame, frame.last_index(), entry_price, entry_bar_index, params)
}
