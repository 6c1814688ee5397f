use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strategy_core::{SellTrigger, StrategyParams};

/// Configuration for a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Bars skipped before the replay starts trading.
    pub warmup_offset: usize,
    pub params: StrategyParams,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            warmup_offset: 30,
            params: StrategyParams::default(),
        }
    }
}

/// A point on the equity curve. Drawdown is absolute: zero whenever a new
/// peak is reached, else peak minus current equity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
    pub drawdown: f64,
}

/// Chart marker for an entry or exit bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerPoint {
    pub timestamp: DateTime<Utc>,
    pub bar_index: usize,
    pub price: f64,
}

/// One completed round trip in the replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub pnl_pct: f64,
    pub entry_score: i32,
    pub trigger: SellTrigger,
}

/// Result of a completed backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub trades: Vec<BacktestTrade>,
    pub equity_curve: Vec<EquityPoint>,
    pub buy_markers: Vec<MarkerPoint>,
    pub sell_markers: Vec<MarkerPoint>,
    pub initial_capital: f64,
    /// Mark-to-market at the last bar; an open position is not force-closed.
    pub final_capital: f64,
    pub max_drawdown: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// 0-100 percentage over completed trades.
    pub win_rate: f64,
    pub total_return_pct: f64,
    pub params: StrategyParams,
}
