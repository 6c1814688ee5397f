use strategy_core::{Bar, StrategyError, StrategyParams};

use crate::indicators;

/// Per-bar indicator values. `None` means the indicator is still inside
/// its warm-up window and must never satisfy a signal condition.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorPoint {
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub rsi: Option<f64>,
    pub adx: Option<f64>,
    pub di_plus: Option<f64>,
    pub di_minus: Option<f64>,
    pub atr: Option<f64>,
}

/// A bar sequence augmented with indicator values, one point per bar.
/// Augmentation never reorders or drops bars.
#[derive(Debug, Clone)]
pub struct IndicatorFrame {
    pub bars: Vec<Bar>,
    pub points: Vec<IndicatorPoint>,
}

impl IndicatorFrame {
    /// Compute indicators over an ordered bar sequence. Pure and
    /// deterministic: identical inputs yield identical frames. Every
    /// series is forward-recursive, so values at index `i` depend only on
    /// bars `0..=i` — the prefix property the backtester replays against.
    pub fn compute(bars: &[Bar], params: &StrategyParams) -> Result<Self, StrategyError> {
        params.validate()?;

        let warmup = params.warmup_bars();
        if bars.len() < warmup {
            return Err(StrategyError::InsufficientData(format!(
                "need at least {} bars, got {}",
                warmup,
                bars.len()
            )));
        }
        for pair in bars.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(StrategyError::InvalidParams(format!(
                    "bars out of order at {}",
                    pair[1].timestamp
                )));
            }
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let macd = indicators::macd(
            &closes,
            params.macd.fast,
            params.macd.slow,
            params.macd.signal,
        );
        let rsi = indicators::rsi(&closes, params.rsi.period);
        let adx = indicators::adx(bars, params.adx.period);
        let atr = indicators::atr(bars, params.atr.period);

        let points = (0..bars.len())
            .map(|i| IndicatorPoint {
                macd: macd.macd[i],
                macd_signal: macd.signal[i],
                macd_histogram: macd.histogram[i],
                rsi: rsi[i],
                adx: adx.adx[i],
                di_plus: adx.di_plus[i],
                di_minus: adx.di_minus[i],
                atr: atr[i],
            })
            .collect();

        Ok(Self {
            bars: bars.to_vec(),
            points,
        })
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last_index(&self) -> usize {
        self.bars.len().saturating_sub(1)
    }

    pub fn bar(&self, i: usize) -> &Bar {
        &self.bars[i]
    }

    pub fn point(&self, i: usize) -> &IndicatorPoint {
        &self.points[i]
    }
}
