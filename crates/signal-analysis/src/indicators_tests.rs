use super::indicators::*;
use chrono::{Duration, TimeZone, Utc};
use strategy_core::Bar;

fn sample_prices() -> Vec<f64> {
    vec![
        44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03,
        45.61, 46.28, 46.28, 46.00, 46.03, 46.41, 46.22, 45.64, 46.21, 46.25, 45.71, 46.45,
        45.78, 45.35, 44.03, 44.18, 44.22, 44.57, 43.42, 42.66, 43.13, 43.56, 44.01, 44.90,
        45.32, 45.71, 46.02, 46.30,
    ]
}

fn sample_bars() -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    sample_prices()
        .into_iter()
        .enumerate()
        .map(|(i, close)| Bar {
            timestamp: start + Duration::days(i as i64),
            open: close - 0.2,
            high: close + 0.6,
            low: close - 0.6,
            close,
            volume: 1_000_000.0,
        })
        .collect()
}

#[test]
fn ema_undefined_before_window() {
    let data = vec![22.0, 24.0, 23.0, 25.0, 26.0];
    let result = ema(&data, 3);

    assert_eq!(result.len(), data.len());
    assert!(result[0].is_none());
    assert!(result[1].is_none());
    // Seeded with the SMA of the first window.
    let first_sma = (22.0 + 24.0 + 23.0) / 3.0;
    assert!((result[2].unwrap() - first_sma).abs() < 0.01);
    assert!(result[3].is_some());
}

#[test]
fn ema_short_input_stays_undefined() {
    let data = vec![1.0, 2.0];
    let result = ema(&data, 5);
    assert!(result.iter().all(|v| v.is_none()));
}

#[test]
fn ema_follows_an_uptrend() {
    let data: Vec<f64> = (1..=10).map(|i| i as f64).collect();
    let result = ema(&data, 3);
    let defined: Vec<f64> = result.into_iter().flatten().collect();
    for pair in defined.windows(2) {
        assert!(pair[1] > pair[0]);
    }
}

#[test]
fn rsi_stays_in_bounds() {
    let result = rsi(&sample_prices(), 14);
    for value in result.iter().flatten() {
        assert!((0.0..=100.0).contains(value));
    }
}

#[test]
fn rsi_first_value_at_period_index() {
    let result = rsi(&sample_prices(), 14);
    assert!(result[13].is_none());
    assert!(result[14].is_some());
}

#[test]
fn rsi_pure_uptrend_is_overbought() {
    let data: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
    let result = rsi(&data, 14);
    assert!(result.last().unwrap().unwrap() > 70.0);
}

#[test]
fn rsi_insufficient_data_is_all_none() {
    let result = rsi(&[1.0, 2.0, 3.0], 14);
    assert!(result.iter().all(|v| v.is_none()));
}

#[test]
fn macd_histogram_is_line_minus_signal() {
    let series = macd(&sample_prices(), 12, 26, 9);
    for i in 0..series.macd.len() {
        if let (Some(m), Some(s), Some(h)) = (series.macd[i], series.signal[i], series.histogram[i])
        {
            assert!((h - (m - s)).abs() < 1e-9);
        }
    }
}

#[test]
fn macd_alignment_offsets() {
    let series = macd(&sample_prices(), 12, 26, 9);
    assert!(series.macd[24].is_none());
    assert!(series.macd[25].is_some());
    assert!(series.signal[32].is_none());
    assert!(series.signal[33].is_some());
    assert!(series.histogram[33].is_some());
}

#[test]
fn macd_rejects_fast_ge_slow() {
    let series = macd(&sample_prices(), 26, 12, 9);
    assert!(series.macd.iter().all(|v| v.is_none()));
}

#[test]
fn atr_is_positive_once_defined() {
    let result = atr(&sample_bars(), 14);
    assert!(result[13].is_none());
    assert!(result[14].is_some());
    for value in result.iter().flatten() {
        assert!(*value > 0.0);
    }
}

#[test]
fn atr_grows_with_volatility() {
    let bars = sample_bars();
    let calm = atr(&bars, 5);

    let mut wild = bars;
    for bar in &mut wild {
        bar.high += 5.0;
        bar.low -= 5.0;
    }
    let volatile = atr(&wild, 5);

    assert!(volatile[5].unwrap() > calm[5].unwrap());
}

#[test]
fn adx_defined_after_double_window() {
    let result = adx(&sample_bars(), 14);
    assert!(result.adx[27].is_none());
    assert!(result.adx[28].is_some());
    assert!(result.di_plus[15].is_some());
    assert!(result.di_minus[15].is_some());
}

#[test]
fn adx_stays_in_bounds() {
    let result = adx(&sample_bars(), 14);
    for value in result.adx.iter().flatten() {
        assert!((0.0..=100.0).contains(value));
    }
}

#[test]
fn adx_short_input_is_all_none() {
    let bars = &sample_bars()[..10];
    let result = adx(bars, 14);
    assert!(result.adx.iter().all(|v| v.is_none()));
    assert!(result.di_plus.iter().all(|v| v.is_none()));
}
