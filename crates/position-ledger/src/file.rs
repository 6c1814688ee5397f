use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strategy_core::{
    LogEntry, Position, PositionStatus, SignalKind, SignalRecord, StrategyError, StrategyParams,
    TradeRecord,
};

use crate::store::{normalize_symbol, SignalStore, StoreResult};

const POSITIONS_FILE: &str = "positions.json";
const TRADES_FILE: &str = "trades.json";
const SIGNALS_FILE: &str = "signals.json";
const LOGS_FILE: &str = "logs.json";
const CONFIG_FILE: &str = "config.json";
const SYMBOLS_FILE: &str = "symbols.json";

/// The system log is capped at its most recent entries.
const LOG_CAP: usize = 500;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigDoc {
    #[serde(default)]
    params: Option<StrategyParams>,
    #[serde(default)]
    symbol_params: HashMap<String, StrategyParams>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SymbolsDoc {
    #[serde(default)]
    symbols: Vec<String>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

/// JSON-file backing: one document per collection under a data directory.
/// Every operation is a whole-file read-modify-write under one lock —
/// collections are small (positions per watchlist symbol, capped logs).
pub struct FileStore {
    data_dir: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).map_err(persistence)?;

        let store = Self {
            data_dir,
            lock: Mutex::new(()),
        };
        for file in [POSITIONS_FILE, TRADES_FILE, SIGNALS_FILE, LOGS_FILE] {
            let path = store.path(file);
            if !path.exists() {
                write_json(&path, &Vec::<serde_json::Value>::new())?;
            }
        }
        Ok(store)
    }

    fn path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }

    fn read_positions(&self) -> StoreResult<Vec<Position>> {
        read_json(&self.path(POSITIONS_FILE))
    }

    fn write_positions(&self, positions: &[Position]) -> StoreResult<()> {
        write_json(&self.path(POSITIONS_FILE), &positions)
    }

    fn read_config(&self) -> StoreResult<ConfigDoc> {
        read_json(&self.path(CONFIG_FILE))
    }

    fn write_config(&self, mut doc: ConfigDoc) -> StoreResult<()> {
        doc.updated_at = Some(Utc::now());
        write_json(&self.path(CONFIG_FILE), &doc)
    }
}

fn persistence(err: impl std::fmt::Display) -> StrategyError {
    StrategyError::Persistence(err.to_string())
}

fn read_json<T: DeserializeOwned + Default>(path: &Path) -> StoreResult<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let raw = fs::read_to_string(path).map_err(persistence)?;
    if raw.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&raw).map_err(persistence)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let raw = serde_json::to_string_pretty(value).map_err(persistence)?;
    fs::write(path, raw).map_err(persistence)
}

impl SignalStore for FileStore {
    fn position(&self, symbol: &str) -> StoreResult<Option<Position>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self
            .read_positions()?
            .into_iter()
            .find(|p| p.symbol == symbol))
    }

    fn positions_by_status(&self, status: Option<PositionStatus>) -> StoreResult<Vec<Position>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut positions: Vec<Position> = self
            .read_positions()?
            .into_iter()
            .filter(|p| status.map_or(true, |s| p.status == s))
            .collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(positions)
    }

    fn create_position(&self, position: Position) -> StoreResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut positions = self.read_positions()?;
        if positions.iter().any(|p| p.symbol == position.symbol) {
            return Err(StrategyError::StateConflict(format!(
                "{} already has a position record",
                position.symbol
            )));
        }
        positions.push(position);
        self.write_positions(&positions)
    }

    fn update_position(&self, position: &Position) -> StoreResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut positions = self.read_positions()?;
        let Some(slot) = positions.iter_mut().find(|p| p.symbol == position.symbol) else {
            return Err(StrategyError::StateConflict(format!(
                "no position record for {}",
                position.symbol
            )));
        };
        *slot = position.clone();
        self.write_positions(&positions)
    }

    fn delete_position(&self, symbol: &str) -> StoreResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut positions = self.read_positions()?;
        positions.retain(|p| p.symbol != symbol);
        self.write_positions(&positions)
    }

    fn sweep_expired_cooldowns(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut positions = self.read_positions()?;
        let before = positions.len();
        positions.retain(|p| {
            !(p.status == PositionStatus::Cooldown
                && p.cooldown_until.map_or(true, |until| until <= now))
        });
        let removed = before - positions.len();
        if removed > 0 {
            self.write_positions(&positions)?;
            tracing::debug!("removed {removed} expired cooldown records");
        }
        Ok(removed)
    }

    fn append_trade(&self, trade: TradeRecord) -> StoreResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.path(TRADES_FILE);
        let mut trades: Vec<TradeRecord> = read_json(&path)?;
        trades.push(trade);
        write_json(&path, &trades)
    }

    fn trades(&self, symbol: Option<&str>, limit: usize) -> StoreResult<Vec<TradeRecord>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut trades: Vec<TradeRecord> = read_json(&self.path(TRADES_FILE))?;
        if let Some(symbol) = symbol {
            trades.retain(|t| t.symbol == symbol);
        }
        trades.reverse();
        trades.truncate(limit);
        Ok(trades)
    }

    fn log_signal(&self, record: SignalRecord) -> StoreResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.path(SIGNALS_FILE);
        let mut signals: Vec<SignalRecord> = read_json(&path)?;
        signals.push(record);
        write_json(&path, &signals)
    }

    fn signals(
        &self,
        symbol: Option<&str>,
        kind: Option<SignalKind>,
        limit: usize,
    ) -> StoreResult<Vec<SignalRecord>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut signals: Vec<SignalRecord> = read_json(&self.path(SIGNALS_FILE))?;
        signals.retain(|s| symbol.map_or(true, |sym| s.symbol == sym));
        signals.retain(|s| kind.map_or(true, |k| s.kind == k));
        signals.reverse();
        signals.truncate(limit);
        Ok(signals)
    }

    fn append_log(&self, entry: LogEntry) -> StoreResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let path = self.path(LOGS_FILE);
        let mut logs: Vec<LogEntry> = read_json(&path)?;
        logs.push(entry);
        if logs.len() > LOG_CAP {
            let excess = logs.len() - LOG_CAP;
            logs.drain(..excess);
        }
        write_json(&path, &logs)
    }

    fn logs(&self, level: Option<&str>, limit: usize) -> StoreResult<Vec<LogEntry>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut logs: Vec<LogEntry> = read_json(&self.path(LOGS_FILE))?;
        logs.retain(|l| level.map_or(true, |lvl| l.level == lvl));
        logs.reverse();
        logs.truncate(limit);
        Ok(logs)
    }

    fn strategy_params(&self) -> StoreResult<Option<StrategyParams>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read_config()?.params)
    }

    fn save_strategy_params(&self, params: &StrategyParams) -> StoreResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc = self.read_config()?;
        doc.params = Some(params.clone());
        self.write_config(doc)
    }

    fn symbol_params(&self, symbol: &str) -> StoreResult<Option<StrategyParams>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.read_config()?.symbol_params.get(symbol).cloned())
    }

    fn save_symbol_params(&self, symbol: &str, params: &StrategyParams) -> StoreResult<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc = self.read_config()?;
        doc.symbol_params.insert(symbol.to_string(), params.clone());
        self.write_config(doc)
    }

    fn watchlist(&self) -> StoreResult<Vec<String>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let doc: SymbolsDoc = read_json(&self.path(SYMBOLS_FILE))?;
        Ok(doc.symbols)
    }

    fn set_watchlist(&self, symbols: &[String]) -> StoreResult<Vec<String>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let cleaned: Vec<String> = symbols
            .iter()
            .map(|s| normalize_symbol(s))
            .filter(|s| !s.is_empty())
            .collect();
        let doc = SymbolsDoc {
            symbols: cleaned.clone(),
            updated_at: Some(Utc::now()),
        };
        write_json(&self.path(SYMBOLS_FILE), &doc)?;
        Ok(cleaned)
    }

    fn add_watch_symbol(&self, symbol: &str) -> StoreResult<bool> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Ok(false);
        }
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc: SymbolsDoc = read_json(&self.path(SYMBOLS_FILE))?;
        if doc.symbols.contains(&symbol) {
            return Ok(false);
        }
        doc.symbols.push(symbol);
        doc.updated_at = Some(Utc::now());
        write_json(&self.path(SYMBOLS_FILE), &doc)?;
        Ok(true)
    }

    fn remove_watch_symbol(&self, symbol: &str) -> StoreResult<bool> {
        let symbol = normalize_symbol(symbol);
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc: SymbolsDoc = read_json(&self.path(SYMBOLS_FILE))?;
        let before = doc.symbols.len();
        doc.symbols.retain(|s| s != &symbol);
        if doc.symbols.len() == before {
            return Ok(false);
        }
        doc.updated_at = Some(Utc::now());
        write_json(&self.path(SYMBOLS_FILE), &doc)?;
        Ok(true)
    }
}
