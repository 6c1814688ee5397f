use strategy_core::Bar;

/// Exponential Moving Average, aligned to the input: `None` before the
/// warm-up window, seeded with the SMA of the first `period` values.
pub fn ema(data: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; data.len()];
    if period == 0 || data.len() < period {
        return result;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed: f64 = data[..period].iter().sum::<f64>() / period as f64;
    result[period - 1] = Some(seed);

    let mut prev = seed;
    for i in period..data.len() {
        let value = (data[i] - prev) * multiplier + prev;
        result[i] = Some(value);
        prev = value;
    }

    result
}

/// MACD line, signal line, and histogram, all aligned per bar.
pub struct MacdSeries {
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

pub fn macd(data: &[f64], fast: usize, slow: usize, signal_period: usize) -> MacdSeries {
    let len = data.len();
    let mut series = MacdSeries {
        macd: vec![None; len],
        signal: vec![None; len],
        histogram: vec![None; len],
    };
    if fast == 0 || slow == 0 || signal_period == 0 || fast >= slow || len < slow {
        return series;
    }

    let fast_ema = ema(data, fast);
    let slow_ema = ema(data, slow);

    // The MACD line exists wherever both EMAs do, i.e. from slow - 1.
    for i in slow - 1..len {
        if let (Some(f), Some(s)) = (fast_ema[i], slow_ema[i]) {
            series.macd[i] = Some(f - s);
        }
    }

    // Signal line: EMA of the defined MACD values, re-anchored to bar index.
    let macd_values: Vec<f64> = series.macd[slow - 1..].iter().flatten().copied().collect();
    let signal_ema = ema(&macd_values, signal_period);
    for (k, value) in signal_ema.iter().enumerate() {
        if let Some(v) = value {
            let i = slow - 1 + k;
            series.signal[i] = Some(*v);
            series.histogram[i] = series.macd[i].map(|m| m - v);
        }
    }

    series
}

/// Relative Strength Index (Wilder smoothing), aligned per bar; first
/// value at index `period`.
pub fn rsi(data: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; data.len()];
    if period == 0 || data.len() < period + 1 {
        return result;
    }

    let mut gains = Vec::with_capacity(data.len() - 1);
    let mut losses = Vec::with_capacity(data.len() - 1);
    for i in 1..data.len() {
        let change = data[i] - data[i - 1];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;
    result[period] = Some(rsi_from_averages(avg_gain, avg_loss));

    for k in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[k]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[k]) / period as f64;
        result[k + 1] = Some(rsi_from_averages(avg_gain, avg_loss));
    }

    result
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

/// Average True Range (Wilder smoothing), aligned per bar; first value at
/// index `period`.
pub fn atr(bars: &[Bar], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; bars.len()];
    if period == 0 || bars.len() < period + 1 {
        return result;
    }

    let true_ranges = true_range(bars);
    let mut value = true_ranges[..period].iter().sum::<f64>() / period as f64;
    result[period] = Some(value);

    for k in period..true_ranges.len() {
        value = (value * (period - 1) as f64 + true_ranges[k]) / period as f64;
        result[k + 1] = Some(value);
    }

    result
}

fn true_range(bars: &[Bar]) -> Vec<f64> {
    let mut ranges = Vec::with_capacity(bars.len().saturating_sub(1));
    for i in 1..bars.len() {
        let high_low = bars[i].high - bars[i].low;
        let high_close = (bars[i].high - bars[i - 1].close).abs();
        let low_close = (bars[i].low - bars[i - 1].close).abs();
        ranges.push(high_low.max(high_close).max(low_close));
    }
    ranges
}

/// ADX with directional components, aligned per bar. DI+/DI- appear at
/// index period + 1, ADX once a further window of DX values is smoothed
/// (index 2 * period).
pub struct AdxSeries {
    pub adx: Vec<Option<f64>>,
    pub di_plus: Vec<Option<f64>>,
    pub di_minus: Vec<Option<f64>>,
}

pub fn adx(bars: &[Bar], period: usize) -> AdxSeries {
    let len = bars.len();
    let mut series = AdxSeries {
        adx: vec![None; len],
        di_plus: vec![None; len],
        di_minus: vec![None; len],
    };
    if period == 0 || len < period * 2 + 1 {
        return series;
    }

    // +DM, -DM and TR, one entry per bar transition.
    let mut plus_dm = Vec::with_capacity(len - 1);
    let mut minus_dm = Vec::with_capacity(len - 1);
    for i in 1..len {
        let up_move = bars[i].high - bars[i - 1].high;
        let down_move = bars[i - 1].low - bars[i].low;
        plus_dm.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dm.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
    }
    let true_ranges = true_range(bars);

    // Wilder's smoothed sums.
    let mut smoothed_plus = plus_dm[..period].iter().sum::<f64>();
    let mut smoothed_minus = minus_dm[..period].iter().sum::<f64>();
    let mut smoothed_tr = true_ranges[..period].iter().sum::<f64>();

    let mut dx_values = Vec::new();
    for k in period..plus_dm.len() {
        smoothed_plus = smoothed_plus - smoothed_plus / period as f64 + plus_dm[k];
        smoothed_minus = smoothed_minus - smoothed_minus / period as f64 + minus_dm[k];
        smoothed_tr = smoothed_tr - smoothed_tr / period as f64 + true_ranges[k];

        let pdi = if smoothed_tr > 0.0 {
            100.0 * smoothed_plus / smoothed_tr
        } else {
            0.0
        };
        let mdi = if smoothed_tr > 0.0 {
            100.0 * smoothed_minus / smoothed_tr
        } else {
            0.0
        };

        let bar_index = k + 1;
        series.di_plus[bar_index] = Some(pdi);
        series.di_minus[bar_index] = Some(mdi);

        let di_sum = pdi + mdi;
        dx_values.push(if di_sum > 0.0 {
            100.0 * (pdi - mdi).abs() / di_sum
        } else {
            0.0
        });
    }

    // Smooth DX into ADX.
    if dx_values.len() < period {
        return series;
    }
    let mut adx_value = dx_values[..period].iter().sum::<f64>() / period as f64;
    series.adx[period * 2] = Some(adx_value);
    for k in period..dx_values.len() {
        adx_value = (adx_value * (period - 1) as f64 + dx_values[k]) / period as f64;
        series.adx[period + 1 + k] = Some(adx_value);
    }

    series
}
