use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use strategy_core::{
    LogEntry, Position, PositionStatus, SignalKind, SignalRecord, StrategyError, StrategyParams,
    TradeRecord,
};

use crate::store::{normalize_symbol, SignalStore, StoreResult};

#[derive(Default)]
struct Inner {
    positions: HashMap<String, Position>,
    trades: Vec<TradeRecord>,
    signals: Vec<SignalRecord>,
    logs: Vec<LogEntry>,
    global_params: Option<StrategyParams>,
    symbol_params: HashMap<String, StrategyParams>,
    watchlist: Vec<String>,
}

/// In-memory backing: tests, throwaway runs, and anything that must not
/// touch disk.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_watchlist(symbols: &[&str]) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.write().unwrap_or_else(|e| e.into_inner());
            inner.watchlist = symbols.iter().map(|s| normalize_symbol(s)).collect();
        }
        store
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl SignalStore for MemoryStore {
    fn position(&self, symbol: &str) -> StoreResult<Option<Position>> {
        Ok(self.read().positions.get(symbol).cloned())
    }

    fn positions_by_status(&self, status: Option<PositionStatus>) -> StoreResult<Vec<Position>> {
        let inner = self.read();
        let mut positions: Vec<Position> = inner
            .positions
            .values()
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(positions)
    }

    fn create_position(&self, position: Position) -> StoreResult<()> {
        let mut inner = self.write();
        if inner.positions.contains_key(&position.symbol) {
            return Err(StrategyError::StateConflict(format!(
                "{} already has a position record",
                position.symbol
            )));
        }
        inner.positions.insert(position.symbol.clone(), position);
        Ok(())
    }

    fn update_position(&self, position: &Position) -> StoreResult<()> {
        let mut inner = self.write();
        if !inner.positions.contains_key(&position.symbol) {
            return Err(StrategyError::StateConflict(format!(
                "no position record for {}",
                position.symbol
            )));
        }
        inner
            .positions
            .insert(position.symbol.clone(), position.clone());
        Ok(())
    }

    fn delete_position(&self, symbol: &str) -> StoreResult<()> {
        self.write().positions.remove(symbol);
        Ok(())
    }

    fn sweep_expired_cooldowns(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let mut inner = self.write();
        let before = inner.positions.len();
        inner.positions.retain(|_, p| {
            !(p.status == PositionStatus::Cooldown
                && p.cooldown_until.map_or(true, |until| until <= now))
        });
        Ok(before - inner.positions.len())
    }

    fn append_trade(&self, trade: TradeRecord) -> StoreResult<()> {
        self.write().trades.push(trade);
        Ok(())
    }

    fn trades(&self, symbol: Option<&str>, limit: usize) -> StoreResult<Vec<TradeRecord>> {
        let inner = self.read();
        let mut trades: Vec<TradeRecord> = inner
            .trades
            .iter()
            .filter(|t| symbol.map_or(true, |s| t.symbol == s))
            .cloned()
            .collect();
        trades.reverse();
        trades.truncate(limit);
        Ok(trades)
    }

    fn log_signal(&self, record: SignalRecord) -> StoreResult<()> {
        self.write().signals.push(record);
        Ok(())
    }

    fn signals(
        &self,
        symbol: Option<&str>,
        kind: Option<SignalKind>,
        limit: usize,
    ) -> StoreResult<Vec<SignalRecord>> {
        let inner = self.read();
        let mut signals: Vec<SignalRecord> = inner
            .signals
            .iter()
            .filter(|s| symbol.map_or(true, |sym| s.symbol == sym))
            .filter(|s| kind.map_or(true, |k| s.kind == k))
            .cloned()
            .collect();
        signals.reverse();
        signals.truncate(limit);
        Ok(signals)
    }

    fn append_log(&self, entry: LogEntry) -> StoreResult<()> {
        self.write().logs.push(entry);
        Ok(())
    }

    fn logs(&self, level: Option<&str>, limit: usize) -> StoreResult<Vec<LogEntry>> {
        let inner = self.read();
        let mut logs: Vec<LogEntry> = inner
            .logs
            .iter()
            .filter(|l| level.map_or(true, |lvl| l.level == lvl))
            .cloned()
            .collect();
        logs.reverse();
        logs.truncate(limit);
        Ok(logs)
    }

    fn strategy_params(&self) -> StoreResult<Option<StrategyParams>> {
        Ok(self.read().global_params.clone())
    }

    fn save_strategy_params(&self, params: &StrategyParams) -> StoreResult<()> {
        self.write().global_params = Some(params.clone());
        Ok(())
    }

    fn symbol_params(&self, symbol: &str) -> StoreResult<Option<StrategyParams>> {
        Ok(self.read().symbol_params.get(symbol).cloned())
    }

    fn save_symbol_params(&self, symbol: &str, params: &StrategyParams) -> StoreResult<()> {
        self.write()
            .symbol_params
            .insert(symbol.to_string(), params.clone());
        Ok(())
    }

    fn watchlist(&self) -> StoreResult<Vec<String>> {
        Ok(self.read().watchlist.clone())
    }

    fn set_watchlist(&self, symbols: &[String]) -> StoreResult<Vec<String>> {
        let cleaned: Vec<String> = symbols
            .iter()
            .map(|s| normalize_symbol(s))
            .filter(|s| !s.is_empty())
            .collect();
        self.write().watchlist = cleaned.clone();
        Ok(cleaned)
    }

    fn add_watch_symbol(&self, symbol: &str) -> StoreResult<bool> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Ok(false);
        }
        let mut inner = self.write();
        if inner.watchlist.contains(&symbol) {
            return Ok(false);
        }
        inner.watchlist.push(symbol);
        Ok(true)
    }

    fn remove_watch_symbol(&self, symbol: &str) -> StoreResult<bool> {
        let symbol = normalize_symbol(symbol);
        let mut inner = self.write();
        let before = inner.watchlist.len();
        inner.watchlist.retain(|s| s != &symbol);
        Ok(inner.watchlist.len() != before)
    }
}
