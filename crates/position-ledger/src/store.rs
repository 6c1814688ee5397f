use chrono::{DateTime, Utc};
use strategy_core::{
    LogEntry, Position, PositionStatus, SignalKind, SignalRecord, StrategyError, StrategyParams,
    TradeRecord, TradeSide, TradeStats,
};

pub type StoreResult<T> = Result<T, StrategyError>;

/// The single repository capability behind positions, the trade ledger,
/// the signal/system logs, strategy parameters, and the monitored-symbol
/// list. Backings are swappable (in-memory, JSON files); callers hold an
/// `Arc<dyn SignalStore>`.
pub trait SignalStore: Send + Sync {
    // ---- positions ----

    /// The symbol's record regardless of state, cooldown included.
    fn position(&self, symbol: &str) -> StoreResult<Option<Position>>;

    /// The symbol's record only while it occupies the active slot.
    fn active_position(&self, symbol: &str) -> StoreResult<Option<Position>> {
        Ok(self.position(symbol)?.filter(|p| p.is_active()))
    }

    fn positions_by_status(&self, status: Option<PositionStatus>) -> StoreResult<Vec<Position>>;

    /// Create a new position record. Fails with `StateConflict` when any
    /// record (active or cooling down) already exists for the symbol —
    /// the one-position-per-instrument invariant is enforced here too.
    fn create_position(&self, position: Position) -> StoreResult<()>;

    fn update_position(&self, position: &Position) -> StoreResult<()>;

    fn delete_position(&self, symbol: &str) -> StoreResult<()>;

    fn cooldown_active(&self, symbol: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        Ok(self.position(symbol)?.is_some_and(|p| {
            p.status == PositionStatus::Cooldown
                && p.cooldown_until.is_some_and(|until| until > now)
        }))
    }

    /// Delete cooldown records whose expiry has passed; returns how many
    /// were removed.
    fn sweep_expired_cooldowns(&self, now: DateTime<Utc>) -> StoreResult<usize>;

    // ---- trade ledger (append-only) ----

    fn append_trade(&self, trade: TradeRecord) -> StoreResult<()>;

    /// Most recent first, optionally filtered by symbol.
    fn trades(&self, symbol: Option<&str>, limit: usize) -> StoreResult<Vec<TradeRecord>>;

    /// Aggregate statistics over closed (sell-side) trades.
    fn trade_stats(&self, symbol: Option<&str>) -> StoreResult<TradeStats> {
        let trades = self.trades(symbol, 1000)?;
        Ok(stats_from(&trades))
    }

    // ---- signal audit log (append-only) ----

    fn log_signal(&self, record: SignalRecord) -> StoreResult<()>;

    fn signals(
        &self,
        symbol: Option<&str>,
        kind: Option<SignalKind>,
        limit: usize,
    ) -> StoreResult<Vec<SignalRecord>>;

    // ---- system log ----

    fn append_log(&self, entry: LogEntry) -> StoreResult<()>;

    fn logs(&self, level: Option<&str>, limit: usize) -> StoreResult<Vec<LogEntry>>;

    // ---- strategy parameters ----

    fn strategy_params(&self) -> StoreResult<Option<StrategyParams>>;

    fn save_strategy_params(&self, params: &StrategyParams) -> StoreResult<()>;

    fn symbol_params(&self, symbol: &str) -> StoreResult<Option<StrategyParams>>;

    fn save_symbol_params(&self, symbol: &str, params: &StrategyParams) -> StoreResult<()>;

    // ---- monitored symbols ----

    fn watchlist(&self) -> StoreResult<Vec<String>>;

    fn set_watchlist(&self, symbols: &[String]) -> StoreResult<Vec<String>>;

    /// Returns false when the symbol was already present.
    fn add_watch_symbol(&self, symbol: &str) -> StoreResult<bool>;

    /// Returns false when the symbol was not present.
    fn remove_watch_symbol(&self, symbol: &str) -> StoreResult<bool>;
}

/// Resolve the parameter set in force for a symbol: per-symbol override,
/// else the stored global set, else the built-in defaults.
pub fn params_for(store: &dyn SignalStore, symbol: &str) -> StoreResult<StrategyParams> {
    if let Some(params) = store.symbol_params(symbol)? {
        return Ok(params);
    }
    if let Some(params) = store.strategy_params()? {
        return Ok(params);
    }
    Ok(StrategyParams::default())
}

/// Statistics over the sell side of the ledger (closed round-trips).
pub(crate) fn stats_from(trades: &[TradeRecord]) -> TradeStats {
    let closed: Vec<&TradeRecord> = trades.iter().filter(|t| t.side == TradeSide::Sell).collect();
    if closed.is_empty() {
        return TradeStats::default();
    }

    let pnls: Vec<f64> = closed.iter().map(|t| t.pnl_pct).collect();
    let winning = pnls.iter().filter(|&&p| p > 0.0).count();
    let total = closed.len();

    TradeStats {
        total_trades: total,
        winning_trades: winning,
        losing_trades: total - winning,
        win_rate: winning as f64 / total as f64 * 100.0,
        avg_pnl: pnls.iter().sum::<f64>() / total as f64,
        max_pnl: pnls.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        min_pnl: pnls.iter().copied().fold(f64::INFINITY, f64::min),
    }
}

/// Normalize a user-supplied symbol the way the watchlist stores them.
pub(crate) fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
