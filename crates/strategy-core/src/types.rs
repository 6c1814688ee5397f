use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Position lifecycle states. NO_POSITION is the absence of an active record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    SignalBuySent,
    Holding,
    SignalSellSent,
    Cooldown,
}

impl PositionStatus {
    pub fn to_label(&self) -> &'static str {
        match self {
            PositionStatus::SignalBuySent => "SIGNAL_BUY_SENT",
            PositionStatus::Holding => "HOLDING",
            PositionStatus::SignalSellSent => "SIGNAL_SELL_SENT",
            PositionStatus::Cooldown => "COOLDOWN",
        }
    }
}

/// What fired a sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SellTrigger {
    HardStopLoss,
    DeathCross,
    RsiOverbought,
    TrendFade,
    Manual,
}

impl SellTrigger {
    pub fn to_label(&self) -> &'static str {
        match self {
            SellTrigger::HardStopLoss => "hard_stop_loss",
            SellTrigger::DeathCross => "death_cross",
            SellTrigger::RsiOverbought => "rsi_overbought",
            SellTrigger::TrendFade => "trend_fade",
            SellTrigger::Manual => "manual",
        }
    }
}

/// Stop-loss computation output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskProfile {
    pub stop_loss: f64,
    pub base_stop_loss: f64,
    pub atr: f64,
    pub is_new_high_stop: bool,
    /// (close - stop_loss) / ATR, reported as a guide, not enforced.
    pub risk_reward_ratio: f64,
}

/// Everything captured at buy-signal time: the scored decision plus the
/// risk profile computed for the entry bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalData {
    pub price: f64,
    pub time: DateTime<Utc>,
    pub bar_index: usize,
    pub score: i32,
    pub max_score: i32,
    pub reasons: Vec<String>,
    pub strength: f64,
    pub rsi: Option<f64>,
    pub adx: Option<f64>,
    pub risk: RiskProfile,
}

/// Entry terms attached once a buy is confirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingInfo {
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub stop_loss: f64,
    pub quantity: f64,
}

/// A sell condition detected for a held position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellSignal {
    pub trigger: SellTrigger,
    pub price: f64,
    pub reason: String,
    pub pnl_pct: Option<f64>,
}

/// Exit terms attached once a sell is confirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseInfo {
    pub exit_price: f64,
    pub exit_time: DateTime<Utc>,
    pub pnl_pct: f64,
    pub trigger: SellTrigger,
}

/// Per-instrument lifecycle record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub status: PositionStatus,
    pub signal_data: SignalData,
    #[serde(default)]
    pub holding_info: Option<HoldingInfo>,
    #[serde(default)]
    pub sell_signal: Option<SellSignal>,
    #[serde(default)]
    pub close_info: Option<CloseInfo>,
    #[serde(default)]
    pub cooldown_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn new(symbol: &str, signal_data: SignalData, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("{}_{}", symbol, now.format("%Y%m%d%H%M%S")),
            symbol: symbol.to_string(),
            status: PositionStatus::SignalBuySent,
            signal_data,
            holding_info: None,
            sell_signal: None,
            close_info: None,
            cooldown_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Active = occupying the one-position-per-symbol slot (not cooling down).
    pub fn is_active(&self) -> bool {
        !matches!(self.status, PositionStatus::Cooldown)
    }

    /// The stop level currently in force: holding stop once entered,
    /// else the one computed at signal time.
    pub fn stop_loss(&self) -> f64 {
        self.holding_info
            .as_ref()
            .map(|h| h.stop_loss)
            .unwrap_or(self.signal_data.risk.stop_loss)
    }

    /// Entry price in force: confirmed entry terms, else the signal price.
    pub fn entry_price(&self) -> f64 {
        self.holding_info
            .as_ref()
            .map(|h| h.entry_price)
            .unwrap_or(self.signal_data.price)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Immutable closed-trade ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: String,
    pub symbol: String,
    pub side: TradeSide,
    pub entry_price: f64,
    pub exit_price: f64,
    #[serde(default)]
    pub entry_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_time: Option<DateTime<Utc>>,
    pub quantity: f64,
    pub pnl_pct: f64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Aggregate statistics over the trade ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// 0-100 percentage
    pub win_rate: f64,
    pub avg_pnl: f64,
    pub max_pnl: f64,
    pub min_pnl: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Buy,
    Sell,
}

/// Append-only signal audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    pub symbol: String,
    pub kind: SignalKind,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// System log entry kept alongside the signal history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: String,
    pub message: String,
    pub module: String,
    pub timestamp: DateTime<Utc>,
}
