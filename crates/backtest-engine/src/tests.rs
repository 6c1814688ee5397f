use chrono::{Duration, TimeZone, Utc};
use strategy_core::{Bar, SellTrigger, StrategyParams};

use crate::engine::run_backtest;
use crate::models::BacktestConfig;
use crate::optimizer::{optimize, OptimizerGrid};

fn bars_from_closes(closes: &[f64], step: Duration) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2023, 1, 2, 1, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            timestamp: start + step * i as i32,
            open: close - 0.3,
            high: close + 0.8,
            low: close - 0.8,
            close,
            volume: 1_000_000.0,
        })
        .collect()
}

/// Slow oscillation: repeated golden/death crosses, several round trips.
fn wave_closes(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 100.0 + 12.0 * (i as f64 / 8.0).sin())
        .collect()
}

/// Decline, steady recovery, then a single catastrophic gap down.
fn crash_closes() -> Vec<f64> {
    let mut closes: Vec<f64> = (0..60).map(|i| 150.0 - i as f64).collect();
    closes.extend((1..=60).map(|i| 90.0 + i as f64));
    closes.extend(std::iter::repeat(40.0).take(4));
    closes
}

#[test]
fn backtest_is_deterministic() {
    let bars = bars_from_closes(&wave_closes(300), Duration::days(1));
    let config = BacktestConfig::default();

    let a = run_backtest(&bars, &config).unwrap();
    let b = run_backtest(&bars, &config).unwrap();

    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[test]
fn wave_series_produces_round_trips() {
    let bars = bars_from_closes(&wave_closes(300), Duration::days(1));
    let result = run_backtest(&bars, &BacktestConfig::default()).unwrap();

    assert!(!result.trades.is_empty());
    for trade in &result.trades {
        assert!(trade.entry_time < trade.exit_time);
        assert!(trade.quantity > 0.0);
        assert!(trade.entry_score >= 2);
    }
    // At most one entry can still be open when the series ends.
    assert!(result.buy_markers.len() - result.sell_markers.len() <= 1);
    assert_eq!(result.total_trades, result.trades.len());
    assert_eq!(
        result.winning_trades + result.losing_trades,
        result.total_trades
    );
}

#[test]
fn equity_curve_tracks_peak_and_drawdown() {
    let bars = bars_from_closes(&wave_closes(300), Duration::days(1));
    let config = BacktestConfig::default();
    let result = run_backtest(&bars, &config).unwrap();

    let mut peak = config.initial_capital;
    let mut max_drawdown = 0.0f64;
    for point in &result.equity_curve {
        if point.equity > peak {
            peak = point.equity;
        }
        let expected = peak - point.equity;
        assert!((point.drawdown - expected).abs() < 1e-6);
        if point.equity == peak {
            assert!(point.drawdown.abs() < 1e-6);
        }
        max_drawdown = max_drawdown.max(point.drawdown);
    }
    assert!((result.max_drawdown - max_drawdown).abs() < 1e-6);
}

#[test]
fn flat_end_capital_compounds_trade_pnl() {
    let bars = bars_from_closes(&wave_closes(300), Duration::days(1));
    let config = BacktestConfig::default();
    let result = run_backtest(&bars, &config).unwrap();

    if result.buy_markers.len() == result.sell_markers.len() {
        let compounded = result
            .trades
            .iter()
            .fold(config.initial_capital, |capital, t| {
                capital * (1.0 + t.pnl_pct / 100.0)
            });
        assert!((result.final_capital - compounded).abs() / compounded < 1e-9);
    }
}

#[test]
fn gap_below_stop_exits_as_hard_stop() {
    // MACD is still far above its signal line when the gap hits; the stop
    // check runs first and must win.
    let bars = bars_from_closes(&crash_closes(), Duration::days(1));
    let result = run_backtest(&bars, &BacktestConfig::default()).unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.trigger, SellTrigger::HardStopLoss);
    assert!(trade.pnl_pct < 0.0);
    assert_eq!(trade.exit_price, 40.0);
}

#[test]
fn death_cross_exits_never_share_the_entry_date() {
    // Hourly bars put whole entry/exit cycles inside one calendar date;
    // the debounce must defer those exits.
    let bars = bars_from_closes(&wave_closes(600), Duration::hours(1));
    let result = run_backtest(&bars, &BacktestConfig::default()).unwrap();

    assert!(!result.trades.is_empty());
    for trade in &result.trades {
        if trade.trigger == SellTrigger::DeathCross {
            assert_ne!(
                trade.entry_time.date_naive(),
                trade.exit_time.date_naive()
            );
        }
    }
}

#[test]
fn invalid_macd_combination_is_rejected() {
    let bars = bars_from_closes(&wave_closes(300), Duration::days(1));
    let mut config = BacktestConfig::default();
    config.params.macd.fast = 30;
    config.params.macd.slow = 26;
    assert!(run_backtest(&bars, &config).is_err());
}

#[test]
fn grid_search_accounts_for_every_combination() {
    let bars = bars_from_closes(&wave_closes(300), Duration::days(1));
    let grid = OptimizerGrid::default();
    let result = optimize(&bars, &BacktestConfig::default(), &grid, 60.0).unwrap();

    // fast=20 x slow=20 is the only invalid pair in the default grid.
    let expected_skipped = 1 * 3 * 3 * 4 * 3;
    assert_eq!(grid.size(), 3 * 3 * 3 * 3 * 4 * 3);
    assert_eq!(result.skipped_invalid, expected_skipped);
    assert_eq!(
        result.evaluated + result.failed + result.skipped_invalid,
        grid.size()
    );
    assert_eq!(result.failed, 0);
    assert_eq!(result.target_win_rate, 60.0);
}

#[test]
fn grid_search_is_deterministic() {
    let bars = bars_from_closes(&wave_closes(300), Duration::days(1));
    let grid = OptimizerGrid::default();
    let base = BacktestConfig::default();

    let a = optimize(&bars, &base, &grid, 60.0).unwrap();
    let b = optimize(&bars, &base, &grid, 60.0).unwrap();

    assert_eq!(a.best_score, b.best_score);
    assert_eq!(a.best.params, b.best.params);
    assert_eq!(
        serde_json::to_string(&a.best).unwrap(),
        serde_json::to_string(&b.best).unwrap()
    );
}

#[test]
fn grid_search_returns_the_argmax() {
    let bars = bars_from_closes(&wave_closes(300), Duration::days(1));
    let base = BacktestConfig::default();
    let grid = OptimizerGrid {
        macd_fast: vec![8, 12],
        macd_slow: vec![26, 32],
        macd_signal: vec![9],
        rsi_period: vec![14],
        confirm_bars: vec![2, 3],
        stop_loss_multiplier: vec![2.0],
    };
    let target = 60.0;
    let result = optimize(&bars, &base, &grid, target).unwrap();

    // Re-run every combination sequentially; none may beat the winner.
    for &fast in &grid.macd_fast {
        for &slow in &grid.macd_slow {
            for &confirm in &grid.confirm_bars {
                let mut params = StrategyParams::default();
                params.macd.fast = fast;
                params.macd.slow = slow;
                params.confirm_bars = confirm;
                let config = BacktestConfig {
                    params,
                    ..BacktestConfig::default()
                };
                let trial = run_backtest(&bars, &config).unwrap();
                let score =
                    -(trial.win_rate - target).abs() * 100.0 + trial.total_return_pct * 0.1;
                assert!(score <= result.best_score + 1e-9);
            }
        }
    }
}
