use chrono::NaiveDate;
use signal_analysis::{
    compute_stop_loss_at, evaluate_sell_at, score_buy_at, IndicatorFrame, OpenExposure,
};
use strategy_core::{Bar, StrategyError};

use crate::models::*;

/// An open position inside the replay.
struct OpenTrade {
    quantity: f64,
    entry_price: f64,
    entry_index: usize,
    entry_score: i32,
    stop_loss: f64,
    entry_date: NaiveDate,
}

/// Replay the live decision rules bar-by-bar over a historical series.
///
/// Sizing is full-capital-per-trade: the entire cash balance buys at the
/// confirmed-signal bar's close, and the position is liquidated entirely
/// at the exit bar's close. Exits apply the same `evaluate_sell_at` rules
/// as the scanner — hard stop first, then the death cross with its
/// same-day debounce keyed to bar dates. Deterministic and side-effect
/// free: identical input and parameters yield identical results.
pub fn run_backtest(bars: &[Bar], config: &BacktestConfig) -> Result<BacktestResult, StrategyError> {
    config.params.validate()?;
    let frame = IndicatorFrame::compute(bars, &config.params)?;

    let mut cash = config.initial_capital;
    let mut open: Option<OpenTrade> = None;

    let mut trades: Vec<BacktestTrade> = Vec::new();
    let mut equity_curve: Vec<EquityPoint> = Vec::new();
    let mut buy_markers: Vec<MarkerPoint> = Vec::new();
    let mut sell_markers: Vec<MarkerPoint> = Vec::new();

    let mut peak = config.initial_capital;
    let mut max_drawdown = 0.0f64;

    for i in config.warmup_offset..frame.len() {
        let bar = frame.bar(i);

        if let Some(position) = &open {
            let exposure = OpenExposure {
                entry_price: position.entry_price,
                stop_loss: position.stop_loss,
                signal_date: position.entry_date,
            };
            if let Some(sell) = evaluate_sell_at(&frame, i, &exposure, &config.params) {
                cash = position.quantity * bar.close;
                trades.push(BacktestTrade {
                    entry_time: frame.bar(position.entry_index).timestamp,
                    exit_time: bar.timestamp,
                    entry_price: position.entry_price,
                    exit_price: bar.close,
                    quantity: position.quantity,
                    pnl_pct: (bar.close - position.entry_price) / position.entry_price * 100.0,
                    entry_score: position.entry_score,
                    trigger: sell.trigger,
                });
                sell_markers.push(MarkerPoint {
                    timestamp: bar.timestamp,
                    bar_index: i,
                    price: bar.close,
                });
                open = None;
            }
        } else if let Some(score) = score_buy_at(&frame, i, &config.params) {
            let risk = compute_stop_loss_at(&frame, i, bar.close, Some(i), &config.params)?;
            let quantity = cash / bar.close;
            open = Some(OpenTrade {
                quantity,
                entry_price: bar.close,
                entry_index: i,
                entry_score: score.score,
                stop_loss: risk.stop_loss,
                entry_date: bar.timestamp.date_naive(),
            });
            buy_markers.push(MarkerPoint {
                timestamp: bar.timestamp,
                bar_index: i,
                price: bar.close,
            });
            cash = 0.0;
        }

        // Mark-to-market equity, running peak, drawdown (0 at a new peak).
        let equity = cash
            + open
                .as_ref()
                .map(|p| p.quantity * bar.close)
                .unwrap_or(0.0);
        if equity > peak {
            peak = equity;
        }
        let drawdown = peak - equity;
        if drawdown > max_drawdown {
            max_drawdown = drawdown;
        }
        equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            equity,
            drawdown,
        });
    }

    let final_capital = equity_curve
        .last()
        .map(|p| p.equity)
        .unwrap_or(config.initial_capital);
    let winning_trades = trades.iter().filter(|t| t.pnl_pct > 0.0).count();
    let total_trades = trades.len();

    Ok(BacktestResult {
        trades,
        equity_curve,
        buy_markers,
        sell_markers,
        initial_capital: config.initial_capital,
        final_capital,
        max_drawdown,
        total_trades,
        winning_trades,
        losing_trades: total_trades - winning_trades,
        win_rate: if total_trades > 0 {
            winning_trades as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        },
        total_return_pct: (final_capital - config.initial_capital) / config.initial_capital
            * 100.0,
        params: config.params.clone(),
    })
}
