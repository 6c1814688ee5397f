use serde::{Deserialize, Serialize};

use crate::error::StrategyError;

/// Absolute floor on history length, independent of window parameters.
pub const MIN_BARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacdParams {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            fast: 12,
            slow: 26,
            signal: 9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RsiParams {
    pub period: usize,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RsiParams {
    fn default() -> Self {
        Self {
            period: 14,
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdxParams {
    pub period: usize,
    pub threshold: f64,
}

impl Default for AdxParams {
    fn default() -> Self {
        Self {
            period: 14,
            threshold: 15.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtrParams {
    pub period: usize,
}

impl Default for AtrParams {
    fn default() -> Self {
        Self { period: 14 }
    }
}

/// Optional exit conditions beyond hard stop + death cross. Both default
/// off; the death-cross exit is always on.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExitParams {
    #[serde(default)]
    pub rsi_overbought: bool,
    #[serde(default)]
    pub trend_fade: bool,
}

/// Immutable strategy parameter set. Resolved by the caller (global or
/// per-symbol override) and passed into every component; pure computation
/// never reads ambient state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    #[serde(default)]
    pub macd: MacdParams,
    #[serde(default)]
    pub rsi: RsiParams,
    #[serde(default)]
    pub adx: AdxParams,
    #[serde(default)]
    pub atr: AtrParams,
    /// Bars after the cross that must hold MACD > signal.
    pub confirm_bars: usize,
    /// Minimum total buy score; the confirmed cross alone contributes 2.
    pub min_buy_score: i32,
    pub stop_loss_multiplier: f64,
    /// Trailing-high lookback for the new-high stop adjustment (~1 year).
    pub new_high_period: usize,
    /// Entry high >= tolerance * trailing high counts as "near a new high".
    pub new_high_tolerance: f64,
    #[serde(default)]
    pub exit: ExitParams,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            macd: MacdParams::default(),
            rsi: RsiParams::default(),
            adx: AdxParams::default(),
            atr: AtrParams::default(),
            confirm_bars: 3,
            min_buy_score: 2,
            stop_loss_multiplier: 2.0,
            new_high_period: 252,
            new_high_tolerance: 0.98,
            exit: ExitParams::default(),
        }
    }
}

impl StrategyParams {
    /// Reject invalid combinations before any evaluation runs.
    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.macd.fast == 0 || self.macd.slow == 0 || self.macd.signal == 0 {
            return Err(StrategyError::InvalidParams(
                "MACD windows must be positive".to_string(),
            ));
        }
        if self.macd.fast >= self.macd.slow {
            return Err(StrategyError::InvalidParams(format!(
                "MACD fast window ({}) must be shorter than slow window ({})",
                self.macd.fast, self.macd.slow
            )));
        }
        if self.rsi.period == 0 || self.adx.period == 0 || self.atr.period == 0 {
            return Err(StrategyError::InvalidParams(
                "indicator periods must be positive".to_string(),
            ));
        }
        if self.confirm_bars == 0 {
            return Err(StrategyError::InvalidParams(
                "confirm_bars must be at least 1".to_string(),
            ));
        }
        if self.stop_loss_multiplier <= 0.0 {
            return Err(StrategyError::InvalidParams(
                "stop_loss_multiplier must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.new_high_tolerance) {
            return Err(StrategyError::InvalidParams(
                "new_high_tolerance must be in (0, 1]".to_string(),
            ));
        }
        if !(2..=4).contains(&self.min_buy_score) {
            return Err(StrategyError::InvalidParams(
                "min_buy_score must be between 2 and 4".to_string(),
            ));
        }
        Ok(())
    }

    /// Bars required before every indicator is defined and a cross can be
    /// confirmed.
    pub fn warmup_bars(&self) -> usize {
        let macd = self.macd.slow + self.macd.signal;
        let adx = self.adx.period * 2 + 1;
        let atr = self.atr.period + 1;
        let rsi = self.rsi.period + 1;
        macd.max(adx)
            .max(atr)
            .max(rsi)
            .max(self.confirm_bars + 2)
            .max(MIN_BARS)
    }
}
