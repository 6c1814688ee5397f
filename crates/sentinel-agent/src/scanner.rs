use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc, Weekday};
use dashmap::DashMap;
use position_ledger::{params_for, SignalStore};
use signal_analysis::{
    compute_stop_loss, evaluate_sell, score_buy, IndicatorFrame, OpenExposure,
};
use strategy_core::{
    Bar, LogEntry, MarketData, Notifier, Position, PositionStatus, SellSignal, SellTrigger,
    SignalData, StrategyError, StrategyParams,
};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::commands::Command;
use crate::config::AgentConfig;
use crate::lifecycle::PositionLifecycle;

/// Runs the two evaluation cycles over the monitored instruments. The
/// scan cycle and the fast hard-stop cycle may race on the same position
/// record, so every per-symbol evaluation serializes on a symbol lock.
pub struct MarketScanner {
    config: AgentConfig,
    store: Arc<dyn SignalStore>,
    provider: Arc<dyn MarketData>,
    notifier: Arc<dyn Notifier>,
    lifecycle: Arc<PositionLifecycle>,
    symbol_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl MarketScanner {
    pub fn new(
        config: AgentConfig,
        store: Arc<dyn SignalStore>,
        provider: Arc<dyn MarketData>,
        notifier: Arc<dyn Notifier>,
        lifecycle: Arc<PositionLifecycle>,
    ) -> Self {
        Self {
            config,
            store,
            provider,
            notifier,
            lifecycle,
            symbol_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, symbol: &str) -> Arc<Mutex<()>> {
        self.symbol_locks
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Inside the configured exchange session (weekdays only)?
    pub fn is_trading_session(&self) -> bool {
        let Ok((start, end)) = self.config.session_bounds() else {
            return false;
        };
        let now = Utc::now().with_timezone(&self.config.timezone());
        if matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
            return false;
        }
        let time = now.time();
        time >= start && time <= end
    }

    /// One evaluation pass over every monitored instrument. A failure in
    /// one instrument is caught at the instrument boundary and never
    /// aborts the rest of the cycle.
    pub async fn scan_cycle(&self) {
        if self.config.session_gate_enabled && !self.is_trading_session() {
            tracing::debug!("outside trading session, skipping scan");
            return;
        }

        let symbols = match self.store.watchlist() {
            Ok(symbols) => symbols,
            Err(e) => {
                tracing::error!("failed to load watchlist: {e}");
                return;
            }
        };
        tracing::info!("market scan: {} symbols", symbols.len());

        for symbol in symbols {
            if let Err(e) = self.process_symbol(&symbol).await {
                tracing::error!("{symbol}: scan failed - {e}");
                let _ = self.store.append_log(LogEntry {
                    level: "ERROR".to_string(),
                    message: format!("{symbol}: {e}"),
                    module: "market_scan".to_string(),
                    timestamp: Utc::now(),
                });
            }
        }

        tracing::info!("market scan complete");
    }

    async fn process_symbol(&self, symbol: &str) -> Result<(), StrategyError> {
        let lock = self.lock_for(symbol);
        let _guard = lock.lock().await;
        let now = Utc::now();

        if self.store.cooldown_active(symbol, now)? {
            tracing::debug!("{symbol}: in cooldown, skipping");
            return Ok(());
        }

        let params = params_for(self.store.as_ref(), symbol)?;
        let bars = self
            .fetch_bars(symbol, &self.config.data_period, &self.config.data_interval)
            .await?;
        let frame = IndicatorFrame::compute(&bars, &params)?;

        match self.store.active_position(symbol)? {
            None => self.evaluate_buy(symbol, &frame, &params, now).await,
            Some(position)
                if matches!(
                    position.status,
                    PositionStatus::SignalBuySent | PositionStatus::Holding
                ) =>
            {
                self.evaluate_exit(symbol, &position, &frame, &params, now)
                    .await
            }
            // Sell already signaled; waiting on confirmation.
            Some(_) => Ok(()),
        }
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        period: &str,
        interval: &str,
    ) -> Result<Vec<Bar>, StrategyError> {
        timeout(
            self.config.request_timeout(),
            self.provider
                .fetch_bars(symbol, period, interval, self.config.min_bars),
        )
        .await
        .map_err(|_| StrategyError::NoData(format!("{symbol}: market data request timed out")))?
    }

    async fn evaluate_buy(
        &self,
        symbol: &str,
        frame: &IndicatorFrame,
        params: &StrategyParams,
        now: DateTime<Utc>,
    ) -> Result<(), StrategyError> {
        let Some(score) = score_buy(frame, params) else {
            return Ok(());
        };

        let last = frame.last_index();
        let bar = frame.bar(last);
        let risk = compute_stop_loss(frame, bar.close, Some(last), params)?;
        let signal = SignalData {
            price: bar.close,
            time: bar.timestamp,
            bar_index: last,
            score: score.score,
            max_score: score.max_score,
            reasons: score.reasons,
            strength: score.strength,
            rsi: score.rsi,
            adx: score.adx,
            risk,
        };

        // Persist first; a persistence failure propagates and the signal
        // is never reported as sent.
        let position = self.lifecycle.open_on_buy(symbol, signal, now)?;
        tracing::info!(
            "{symbol}: buy signal, score {}/{}, stop {:.2}",
            position.signal_data.score,
            position.signal_data.max_score,
            position.signal_data.risk.stop_loss,
        );

        if let Err(e) = timeout(
            self.config.request_timeout(),
            self.notifier
                .send_buy_signal(symbol, position.signal_data.price, &position.signal_data),
        )
        .await
        .unwrap_or_else(|_| Err(StrategyError::Notification("timed out".to_string())))
        {
            tracing::warn!("{symbol}: buy notification failed - {e}");
        }
        Ok(())
    }

    async fn evaluate_exit(
        &self,
        symbol: &str,
        position: &Position,
        frame: &IndicatorFrame,
        params: &StrategyParams,
        now: DateTime<Utc>,
    ) -> Result<(), StrategyError> {
        let exposure = OpenExposure {
            entry_price: position.entry_price(),
            stop_loss: position.stop_loss(),
            signal_date: position.signal_data.time.date_naive(),
        };
        let Some(sell) = evaluate_sell(frame, &exposure, params) else {
            return Ok(());
        };
        self.dispatch_sell(symbol, sell, now).await
    }

    /// Persist the SIGNAL_SELL_SENT transition, then notify. Callers must
    /// already hold the symbol lock.
    async fn dispatch_sell(
        &self,
        symbol: &str,
        sell: SellSignal,
        now: DateTime<Utc>,
    ) -> Result<(), StrategyError> {
        let position = self.lifecycle.signal_sell(symbol, sell, now)?;
        let sell = position
            .sell_signal
            .as_ref()
            .ok_or_else(|| StrategyError::StateConflict(format!("{symbol}: sell signal missing")))?;
        tracing::info!("{symbol}: sell signal - {}", sell.reason);

        let delivery = if sell.trigger == SellTrigger::HardStopLoss {
            self.notifier
                .send_force_sell(symbol, sell.price, &sell.reason)
        } else {
            self.notifier
                .send_sell_signal(symbol, sell.price, &sell.reason, sell.pnl_pct)
        };
        if let Err(e) = timeout(self.config.request_timeout(), delivery)
            .await
            .unwrap_or_else(|_| Err(StrategyError::Notification("timed out".to_string())))
        {
            tracing::warn!("{symbol}: sell notification failed - {e}");
        }
        Ok(())
    }

    /// Fast stop-loss-only pass over held positions, run on a tighter
    /// cadence than the main scan.
    pub async fn hard_stop_cycle(&self) {
        if self.config.session_gate_enabled && !self.is_trading_session() {
            return;
        }

        let positions = match self.store.positions_by_status(Some(PositionStatus::Holding)) {
            Ok(positions) => positions,
            Err(e) => {
                tracing::error!("failed to load holdings: {e}");
                return;
            }
        };
        if positions.is_empty() {
            return;
        }
        tracing::debug!("hard-stop check: {} holdings", positions.len());

        for position in positions {
            let symbol = position.symbol.clone();
            if let Err(e) = self.check_hard_stop(&symbol).await {
                tracing::error!("{symbol}: hard-stop check failed - {e}");
                let _ = self.store.append_log(LogEntry {
                    level: "ERROR".to_string(),
                    message: format!("{symbol}: {e}"),
                    module: "hard_stop".to_string(),
                    timestamp: Utc::now(),
                });
            }
        }
    }

    async fn check_hard_stop(&self, symbol: &str) -> Result<(), StrategyError> {
        let lock = self.lock_for(symbol);
        let _guard = lock.lock().await;

        // Re-read under the lock; the scan cycle may have moved it on.
        let Some(position) = self.store.active_position(symbol)? else {
            return Ok(());
        };
        if position.status != PositionStatus::Holding {
            return Ok(());
        }
        let stop_loss = position.stop_loss();
        if stop_loss <= 0.0 {
            return Ok(());
        }

        let bars = self.fetch_bars(symbol, "1d", "1m").await?;
        let Some(last) = bars.last() else {
            return Ok(());
        };
        if last.close > stop_loss {
            return Ok(());
        }

        tracing::warn!(
            "{symbol}: price {:.2} <= stop-loss {:.2}",
            last.close,
            stop_loss
        );
        let entry_price = position.entry_price();
        let sell = SellSignal {
            trigger: SellTrigger::HardStopLoss,
            price: last.close,
            reason: format!("price {:.2} <= stop-loss {:.2}", last.close, stop_loss),
            pnl_pct: (entry_price > 0.0)
                .then(|| (last.close - entry_price) / entry_price * 100.0),
        };
        self.dispatch_sell(symbol, sell, Utc::now()).await
    }

    /// Handle one inbound confirmation command; returns the user-facing
    /// reply. State conflicts surface as descriptive errors with state
    /// unchanged.
    pub async fn handle_command(&self, command: Command) -> Result<String, StrategyError> {
        match command {
            Command::ConfirmBuy { symbol, price } => {
                let lock = self.lock_for(&symbol);
                let _guard = lock.lock().await;
                let params = params_for(self.store.as_ref(), &symbol)?;
                let position = self
                    .lifecycle
                    .confirm_buy(&symbol, price, &params, Utc::now())?;
                let holding = position.holding_info.as_ref().ok_or_else(|| {
                    StrategyError::StateConflict(format!("{symbol}: holding info missing"))
                })?;
                Ok(format!(
                    "buy confirmed: {symbol} @ {:.2}, stop-loss {:.2}",
                    holding.entry_price, holding.stop_loss
                ))
            }
            Command::ConfirmSell { symbol, price } => {
                let lock = self.lock_for(&symbol);
                let _guard = lock.lock().await;
                // No explicit price: try the live quote, fall back to the
                // recorded terms.
                let exit_price = match price {
                    Some(price) => Some(price),
                    None => match self.fetch_bars(&symbol, "1d", "1m").await {
                        Ok(bars) => bars.last().map(|b| b.close),
                        Err(e) => {
                            tracing::warn!("{symbol}: quote fetch failed, using recorded price - {e}");
                            None
                        }
                    },
                };
                let (_, trade) = self.lifecycle.confirm_sell(&symbol, exit_price, Utc::now())?;
                Ok(format!(
                    "sell confirmed: {symbol} @ {:.2} (P&L {:+.2}%)",
                    trade.exit_price, trade.pnl_pct
                ))
            }
            Command::Ignore { symbol } => {
                let lock = self.lock_for(&symbol);
                let _guard = lock.lock().await;
                self.lifecycle.ignore(&symbol)?;
                Ok(format!("signal ignored: {symbol}"))
            }
            Command::Backtest {
                symbol,
                period,
                interval,
                capital,
            } => {
                let params = params_for(self.store.as_ref(), &symbol)?;
                let bars = self.fetch_bars(&symbol, &period, &interval).await?;
                let mut config = backtest_engine::BacktestConfig {
                    params,
                    ..backtest_engine::BacktestConfig::default()
                };
                if let Some(capital) = capital {
                    config.initial_capital = capital;
                }
                let result = backtest_engine::run_backtest(&bars, &config)?;
                Ok(format!(
                    "backtest {symbol} ({period}/{interval}): {} trades, win rate {:.1}%, \
                     return {:+.2}%, max drawdown {:.2}",
                    result.total_trades,
                    result.win_rate,
                    result.total_return_pct,
                    result.max_drawdown,
                ))
            }
            Command::Status => {
                let positions = self.store.positions_by_status(None)?;
                let stats = self.store.trade_stats(None)?;
                let mut lines = vec![format!("{} position records", positions.len())];
                for position in &positions {
                    lines.push(format!(
                        "  {} {} @ {:.2}",
                        position.symbol,
                        position.status.to_label(),
                        position.entry_price(),
                    ));
                }
                lines.push(format!(
                    "trades: {} total, win rate {:.1}%, avg P&L {:+.2}%",
                    stats.total_trades, stats.win_rate, stats.avg_pnl
                ));
                Ok(lines.join("\n"))
            }
        }
    }
}
