use chrono::NaiveDate;
use strategy_core::{SellSignal, SellTrigger, StrategyParams};

use crate::frame::IndicatorFrame;

/// Denominator guard for the strength normalization.
const STRENGTH_EPSILON: f64 = 0.001;

/// RSI below this counts toward the buy score (weak-or-oversold bias).
const RSI_BIAS_CEILING: f64 = 50.0;

/// MACD crossover evaluated at a specific bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossSignal {
    pub detected: bool,
    pub confirmed: bool,
    /// min(|MACD - signal| / (ATR + eps) * 100, 100) at the evaluation
    /// bar; 0 when the cross is absent or unconfirmed.
    pub strength: f64,
    pub cross_index: Option<usize>,
    pub confirmation_window: usize,
}

impl CrossSignal {
    fn absent(confirmation_window: usize) -> Self {
        Self {
            detected: false,
            confirmed: false,
            strength: 0.0,
            cross_index: None,
            confirmation_window,
        }
    }
}

/// Golden-cross test at index `at`: the cross bar is `at - confirm_bars`,
/// and every bar since must keep the MACD line above the signal line.
/// One interior violation invalidates confirmation for this cross
/// instance; there is no partial credit. Undefined (warm-up) values never
/// count as satisfied.
pub fn golden_cross_at(frame: &IndicatorFrame, at: usize, confirm_bars: usize) -> CrossSignal {
    if at >= frame.len() || at < confirm_bars + 1 {
        return CrossSignal::absent(confirm_bars);
    }
    let cross = at - confirm_bars;

    let (Some(macd_prev), Some(signal_prev)) = (
        frame.point(cross - 1).macd,
        frame.point(cross - 1).macd_signal,
    ) else {
        return CrossSignal::absent(confirm_bars);
    };
    let (Some(macd_cross), Some(signal_cross)) =
        (frame.point(cross).macd, frame.point(cross).macd_signal)
    else {
        return CrossSignal::absent(confirm_bars);
    };

    if !(macd_cross > signal_cross && macd_prev <= signal_prev) {
        return CrossSignal::absent(confirm_bars);
    }

    let mut confirmed = true;
    for i in cross + 1..=at {
        match (frame.point(i).macd, frame.point(i).macd_signal) {
            (Some(m), Some(s)) if m > s => {}
            _ => {
                confirmed = false;
                break;
            }
        }
    }

    let strength = if confirmed {
        match (
            frame.point(at).macd,
            frame.point(at).macd_signal,
            frame.point(at).atr,
        ) {
            (Some(m), Some(s), Some(atr)) => ((m - s).abs() / (atr + STRENGTH_EPSILON) * 100.0)
                .min(100.0),
            _ => 0.0,
        }
    } else {
        0.0
    };

    CrossSignal {
        detected: true,
        confirmed,
        strength,
        cross_index: Some(cross),
        confirmation_window: confirm_bars,
    }
}

/// Golden-cross test against the most recent bars.
pub fn detect_golden_cross(frame: &IndicatorFrame, confirm_bars: usize) -> CrossSignal {
    golden_cross_at(frame, frame.last_index(), confirm_bars)
}

/// Death-cross test at index `at`: downward crossover across the latest
/// two bars only. Exits are deliberately unconfirmed — entries filter
/// whipsaw, exits must be fast.
pub fn death_cross_at(frame: &IndicatorFrame, at: usize) -> bool {
    if at >= frame.len() || at < 1 {
        return false;
    }
    let (Some(m), Some(s)) = (frame.point(at).macd, frame.point(at).macd_signal) else {
        return false;
    };
    let (Some(m_prev), Some(s_prev)) = (
        frame.point(at - 1).macd,
        frame.point(at - 1).macd_signal,
    ) else {
        return false;
    };
    m < s && m_prev >= s_prev
}

pub fn detect_death_cross(frame: &IndicatorFrame) -> bool {
    death_cross_at(frame, frame.last_index())
}

/// Scored buy decision. The confirmed cross is mandatory and worth +2;
/// RSI bias and ADX trend strength add +1 each.
#[derive(Debug, Clone, PartialEq)]
pub struct BuyScore {
    pub score: i32,
    pub max_score: i32,
    pub reasons: Vec<String>,
    pub strength: f64,
    pub rsi: Option<f64>,
    pub adx: Option<f64>,
}

/// Buy evaluation at index `at`. Returns `None` when the mandatory
/// confirmed golden cross is absent (short-circuit) or the total score
/// misses `params.min_buy_score`.
pub fn score_buy_at(frame: &IndicatorFrame, at: usize, params: &StrategyParams) -> Option<BuyScore> {
    let cross = golden_cross_at(frame, at, params.confirm_bars);
    if !(cross.detected && cross.confirmed) {
        return None;
    }

    let point = frame.point(at);
    let mut score = 2;
    let mut reasons = vec!["MACD golden cross confirmed (+2)".to_string()];

    if let Some(rsi) = point.rsi {
        if rsi < RSI_BIAS_CEILING {
            score += 1;
            reasons.push(format!("RSI weak ({rsi:.1}) (+1)"));
        }
    }
    if let Some(adx) = point.adx {
        if adx > params.adx.threshold {
            score += 1;
            reasons.push(format!("ADX trending ({adx:.1}) (+1)"));
        }
    }

    if score < params.min_buy_score {
        return None;
    }

    Some(BuyScore {
        score,
        max_score: 4,
        reasons,
        strength: cross.strength,
        rsi: point.rsi,
        adx: point.adx,
    })
}

pub fn score_buy(frame: &IndicatorFrame, params: &StrategyParams) -> Option<BuyScore> {
    score_buy_at(frame, frame.last_index(), params)
}

/// The slice of an open position the sell evaluation needs.
#[derive(Debug, Clone, Copy)]
pub struct OpenExposure {
    pub entry_price: f64,
    pub stop_loss: f64,
    /// Calendar date of the original buy signal; exits on the same date
    /// are suppressed (same-day debounce).
    pub signal_date: NaiveDate,
}

/// Sell evaluation at index `at`. The hard stop takes precedence and is
/// unconditional; a death cross (and any optional exit) is suppressed when
/// the bar falls on the buy signal's calendar date.
pub fn evaluate_sell_at(
    frame: &IndicatorFrame,
    at: usize,
    exposure: &OpenExposure,
    params: &StrategyParams,
) -> Option<SellSignal> {
    let bar = frame.bar(at);
    let close = bar.close;
    let pnl_pct = if exposure.entry_price > 0.0 {
        Some((close - exposure.entry_price) / exposure.entry_price * 100.0)
    } else {
        None
    };

    if exposure.stop_loss > 0.0 && close <= exposure.stop_loss {
        return Some(SellSignal {
            trigger: SellTrigger::HardStopLoss,
            price: close,
            reason: format!(
                "price {:.2} <= stop-loss {:.2}",
                close, exposure.stop_loss
            ),
            pnl_pct,
        });
    }

    let same_day = bar.timestamp.date_naive() == exposure.signal_date;

    if death_cross_at(frame, at) && !same_day {
        return Some(SellSignal {
            trigger: SellTrigger::DeathCross,
            price: close,
            reason: "MACD death cross".to_string(),
            pnl_pct,
        });
    }

    let point = frame.point(at);
    if params.exit.rsi_overbought && !same_day {
        if let Some(rsi) = point.rsi {
            if rsi > params.rsi.overbought {
                return Some(SellSignal {
                    trigger: SellTrigger::RsiOverbought,
                    price: close,
                    reason: format!("RSI overbought ({rsi:.1})"),
                    pnl_pct,
                });
            }
        }
    }
    if params.exit.trend_fade && !same_day {
        if let Some(adx) = point.adx {
            if adx < params.adx.threshold {
                return Some(SellSignal {
                    trigger: SellTrigger::TrendFade,
                    price: close,
                    reason: format!("ADX trend faded ({adx:.1})"),
                    pnl_pct,
                });
            }
        }
    }

    None
}

pub fn evaluate_sell(
    frame: &IndicatorFrame,
    exposure: &OpenExposure,
    params: &StrategyParams,
) -> Option<SellSignal> {
    evaluate_sell_at(frame, frame.last_index(), exposure, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::IndicatorPoint;
    use chrono::{Duration, TimeZone, Utc};
    use strategy_core::Bar;

    /// Hand-built frame: one (macd, signal) pair per bar, constant
    /// RSI/ADX/ATR once past a fake warm-up of `warmup` bars.
    fn synthetic_frame(
        pairs: &[(f64, f64)],
        warmup: usize,
        rsi: f64,
        adx: f64,
        atr: f64,
    ) -> IndicatorFrame {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 1, 30, 0).unwrap();
        let bars = pairs
            .iter()
            .enumerate()
            .map(|(i, _)| Bar {
                timestamp: start + Duration::days(i as i64),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1_000_000.0,
            })
            .collect();
        let points = pairs
            .iter()
            .enumerate()
            .map(|(i, &(macd, signal))| {
                if i < warmup {
                    IndicatorPoint::default()
                } else {
                    IndicatorPoint {
                        macd: Some(macd),
                        macd_signal: Some(signal),
                        macd_histogram: Some(macd - signal),
                        rsi: Some(rsi),
                        adx: Some(adx),
                        di_plus: Some(adx + 5.0),
                        di_minus: Some(adx - 5.0),
                        atr: Some(atr),
                    }
                }
            })
            .collect();
        IndicatorFrame { bars, points }
    }

    /// 44-bar frame with the cross at index 40 and bars 41..=43 holding
    /// above. `dip_at` forces one interior violation.
    fn cross_fixture(dip_at: Option<usize>) -> IndicatorFrame {
        let mut pairs = vec![(-1.0, 0.0); 44];
        for i in 40..44 {
            pairs[i] = (1.0, 0.0);
        }
        if let Some(i) = dip_at {
            pairs[i] = (-0.5, 0.0);
        }
        synthetic_frame(&pairs, 30, 45.0, 22.0, 1.0)
    }

    #[test]
    fn golden_cross_confirmed_when_all_bars_hold() {
        let frame = cross_fixture(None);
        let cross = detect_golden_cross(&frame, 3);
        assert!(cross.detected);
        assert!(cross.confirmed);
        assert_eq!(cross.cross_index, Some(40));
        assert!(cross.strength > 0.0);
    }

    #[test]
    fn interior_violation_invalidates_confirmation() {
        let frame = cross_fixture(Some(42));
        let cross = detect_golden_cross(&frame, 3);
        assert!(cross.detected);
        assert!(!cross.confirmed);
    }

    #[test]
    fn no_cross_when_macd_was_already_above() {
        let pairs = vec![(1.0, 0.0); 44];
        let frame = synthetic_frame(&pairs, 30, 45.0, 22.0, 1.0);
        let cross = detect_golden_cross(&frame, 3);
        assert!(!cross.detected);
    }

    #[test]
    fn undefined_warmup_values_never_confirm() {
        // Cross bar sits inside the warm-up region: nothing to confirm.
        let mut pairs = vec![(-1.0, 0.0); 40];
        for i in 36..40 {
            pairs[i] = (1.0, 0.0);
        }
        let frame = synthetic_frame(&pairs, 37, 45.0, 22.0, 1.0);
        let cross = detect_golden_cross(&frame, 3);
        assert!(!cross.detected);
    }

    #[test]
    fn strength_is_bounded_at_100() {
        let mut pairs = vec![(-1.0, 0.0); 44];
        for i in 40..44 {
            pairs[i] = (500.0, 0.0);
        }
        let frame = synthetic_frame(&pairs, 30, 45.0, 22.0, 1.0);
        let cross = detect_golden_cross(&frame, 3);
        assert!(cross.confirmed);
        assert_eq!(cross.strength, 100.0);
    }

    #[test]
    fn scenario_a_scores_four() {
        // Confirmed cross, RSI 45 (< 50), ADX 22 (> 15) => 2 + 1 + 1.
        let frame = cross_fixture(None);
        let score = score_buy(&frame, &StrategyParams::default()).unwrap();
        assert_eq!(score.score, 4);
        assert_eq!(score.reasons.len(), 3);
    }

    #[test]
    fn scenario_b_unconfirmed_cross_short_circuits() {
        let frame = cross_fixture(Some(42));
        assert!(score_buy(&frame, &StrategyParams::default()).is_none());
    }

    #[test]
    fn strong_rsi_and_weak_trend_drop_the_extras() {
        let mut pairs = vec![(-1.0, 0.0); 44];
        for i in 40..44 {
            pairs[i] = (1.0, 0.0);
        }
        let frame = synthetic_frame(&pairs, 30, 65.0, 10.0, 1.0);
        let score = score_buy(&frame, &StrategyParams::default()).unwrap();
        assert_eq!(score.score, 2);
    }

    #[test]
    fn min_score_gate_blocks_cross_only_entry() {
        let mut pairs = vec![(-1.0, 0.0); 44];
        for i in 40..44 {
            pairs[i] = (1.0, 0.0);
        }
        let frame = synthetic_frame(&pairs, 30, 65.0, 10.0, 1.0);
        let mut params = StrategyParams::default();
        params.min_buy_score = 3;
        assert!(score_buy(&frame, &params).is_none());
    }

    fn death_fixture() -> IndicatorFrame {
        let mut pairs = vec![(1.0, 0.0); 44];
        pairs[43] = (-1.0, 0.0);
        synthetic_frame(&pairs, 30, 55.0, 22.0, 1.0)
    }

    #[test]
    fn death_cross_on_latest_pair() {
        let frame = death_fixture();
        assert!(detect_death_cross(&frame));
    }

    #[test]
    fn hard_stop_takes_precedence_over_macd_state() {
        // MACD still bullish everywhere; the stop fires regardless.
        let pairs = vec![(1.0, 0.0); 44];
        let frame = synthetic_frame(&pairs, 30, 55.0, 22.0, 1.0);
        let exposure = OpenExposure {
            entry_price: 105.0,
            stop_loss: 100.5,
            signal_date: frame.bar(0).timestamp.date_naive(),
        };
        let sell = evaluate_sell(&frame, &exposure, &StrategyParams::default()).unwrap();
        assert_eq!(sell.trigger, SellTrigger::HardStopLoss);
        let pnl = sell.pnl_pct.unwrap();
        assert!((pnl - (100.0 - 105.0) / 105.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn same_day_death_cross_is_suppressed() {
        let frame = death_fixture();
        let exposure = OpenExposure {
            entry_price: 95.0,
            stop_loss: 90.0,
            signal_date: frame.bar(43).timestamp.date_naive(),
        };
        assert!(evaluate_sell(&frame, &exposure, &StrategyParams::default()).is_none());
    }

    #[test]
    fn next_day_death_cross_sells() {
        let frame = death_fixture();
        let exposure = OpenExposure {
            entry_price: 95.0,
            stop_loss: 90.0,
            signal_date: frame.bar(40).timestamp.date_naive(),
        };
        let sell = evaluate_sell(&frame, &exposure, &StrategyParams::default()).unwrap();
        assert_eq!(sell.trigger, SellTrigger::DeathCross);
    }

    #[test]
    fn same_day_stop_loss_is_not_suppressed() {
        let frame = death_fixture();
        let exposure = OpenExposure {
            entry_price: 110.0,
            stop_loss: 100.0,
            signal_date: frame.bar(43).timestamp.date_naive(),
        };
        let sell = evaluate_sell(&frame, &exposure, &StrategyParams::default()).unwrap();
        assert_eq!(sell.trigger, SellTrigger::HardStopLoss);
    }

    #[test]
    fn optional_rsi_exit_fires_only_when_enabled() {
        let pairs = vec![(1.0, 0.0); 44];
        let frame = synthetic_frame(&pairs, 30, 80.0, 22.0, 1.0);
        let exposure = OpenExposure {
            entry_price: 95.0,
            stop_loss: 90.0,
            signal_date: frame.bar(40).timestamp.date_naive(),
        };

        let params = StrategyParams::default();
        assert!(evaluate_sell(&frame, &exposure, &params).is_none());

        let mut params = StrategyParams::default();
        params.exit.rsi_overbought = true;
        let sell = evaluate_sell(&frame, &exposure, &params).unwrap();
        assert_eq!(sell.trigger, SellTrigger::RsiOverbought);
    }
}
