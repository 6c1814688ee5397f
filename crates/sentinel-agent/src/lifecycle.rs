use std::sync::Arc;

use chrono::{DateTime, Utc};
use position_ledger::SignalStore;
use strategy_core::{
    CloseInfo, HoldingInfo, Position, PositionStatus, SellSignal, SellTrigger, SignalData,
    SignalKind, SignalRecord, StrategyError, StrategyParams, TradeRecord, TradeSide,
};

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Owns the per-instrument lifecycle:
/// SIGNAL_BUY_SENT -> HOLDING -> SIGNAL_SELL_SENT -> COOLDOWN -> removed.
///
/// Every transition persists before the caller may notify, so a
/// persistence failure means the signal was never reported as sent.
pub struct PositionLifecycle {
    store: Arc<dyn SignalStore>,
    cooldown: chrono::Duration,
}

impl PositionLifecycle {
    pub fn new(store: Arc<dyn SignalStore>, cooldown: chrono::Duration) -> Self {
        Self { store, cooldown }
    }

    pub fn store(&self) -> &Arc<dyn SignalStore> {
        &self.store
    }

    /// NO_POSITION -> SIGNAL_BUY_SENT. Refused while any record (active
    /// or cooling down) exists for the symbol.
    pub fn open_on_buy(
        &self,
        symbol: &str,
        signal: SignalData,
        now: DateTime<Utc>,
    ) -> Result<Position, StrategyError> {
        if self.store.cooldown_active(symbol, now)? {
            return Err(StrategyError::StateConflict(format!(
                "{symbol} is in cooldown, buy signals are suppressed"
            )));
        }
        if self.store.active_position(symbol)?.is_some() {
            return Err(StrategyError::StateConflict(format!(
                "{symbol} already has an active position"
            )));
        }

        self.store.log_signal(SignalRecord {
            symbol: symbol.to_string(),
            kind: SignalKind::Buy,
            payload: serde_json::to_value(&signal)
                .map_err(|e| StrategyError::Persistence(e.to_string()))?,
            created_at: now,
        })?;

        let position = Position::new(symbol, signal, now);
        self.store.create_position(position.clone())?;
        Ok(position)
    }

    /// SIGNAL_BUY_SENT -> HOLDING on external confirmation. An explicit
    /// price overrides the signal price, and the stop is recomputed off it
    /// with the same ATR distance.
    pub fn confirm_buy(
        &self,
        symbol: &str,
        explicit_price: Option<f64>,
        params: &StrategyParams,
        now: DateTime<Utc>,
    ) -> Result<Position, StrategyError> {
        let Some(mut position) = self.store.active_position(symbol)? else {
            return Err(StrategyError::StateConflict(format!(
                "no buy signal pending for {symbol}"
            )));
        };
        match position.status {
            PositionStatus::SignalBuySent => {}
            PositionStatus::Holding => {
                return Err(StrategyError::StateConflict(format!(
                    "{symbol} is already holding"
                )))
            }
            _ => {
                return Err(StrategyError::StateConflict(format!(
                    "{symbol} has no buy signal to confirm"
                )))
            }
        }

        let entry_price = explicit_price.unwrap_or(position.signal_data.price);
        let stop_loss = match explicit_price {
            Some(price) => round2(price - position.signal_data.risk.atr * params.stop_loss_multiplier),
            None => position.signal_data.risk.stop_loss,
        };

        position.holding_info = Some(HoldingInfo {
            entry_price,
            entry_time: now,
            stop_loss,
            quantity: 0.0,
        });
        position.status = PositionStatus::Holding;
        position.updated_at = now;
        self.store.update_position(&position)?;

        self.store.append_trade(TradeRecord {
            id: format!("{}_{}", symbol, now.format("%Y%m%d%H%M%S")),
            symbol: symbol.to_string(),
            side: TradeSide::Buy,
            entry_price,
            exit_price: 0.0,
            entry_time: Some(now),
            exit_time: None,
            quantity: 0.0,
            pnl_pct: 0.0,
            reason: "buy confirmed".to_string(),
            created_at: now,
        })?;

        Ok(position)
    }

    /// SIGNAL_BUY_SENT | HOLDING -> SIGNAL_SELL_SENT. Reached identically
    /// from the scan cycle and the fast hard-stop cycle.
    pub fn signal_sell(
        &self,
        symbol: &str,
        sell: SellSignal,
        now: DateTime<Utc>,
    ) -> Result<Position, StrategyError> {
        let Some(mut position) = self.store.active_position(symbol)? else {
            return Err(StrategyError::StateConflict(format!(
                "no active position for {symbol}"
            )));
        };
        if position.status == PositionStatus::SignalSellSent {
            return Err(StrategyError::StateConflict(format!(
                "sell signal already sent for {symbol}"
            )));
        }

        self.store.log_signal(SignalRecord {
            symbol: symbol.to_string(),
            kind: SignalKind::Sell,
            payload: serde_json::to_value(&sell)
                .map_err(|e| StrategyError::Persistence(e.to_string()))?,
            created_at: now,
        })?;

        position.sell_signal = Some(sell);
        position.status = PositionStatus::SignalSellSent;
        position.updated_at = now;
        self.store.update_position(&position)?;
        Ok(position)
    }

    /// HOLDING | SIGNAL_SELL_SENT -> COOLDOWN on external confirmation.
    /// Appends the closed trade and starts the cooldown clock.
    pub fn confirm_sell(
        &self,
        symbol: &str,
        explicit_price: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<(Position, TradeRecord), StrategyError> {
        let Some(mut position) = self.store.active_position(symbol)? else {
            return Err(StrategyError::StateConflict(format!(
                "no holding for {symbol}"
            )));
        };
        if position.status == PositionStatus::SignalBuySent {
            return Err(StrategyError::StateConflict(format!(
                "{symbol} buy was never confirmed, use ignore instead"
            )));
        }

        let entry_price = position.entry_price();
        let exit_price = explicit_price
            .or(position.sell_signal.as_ref().map(|s| s.price))
            .unwrap_or(entry_price);
        let pnl_pct = if entry_price > 0.0 {
            (exit_price - entry_price) / entry_price * 100.0
        } else {
            0.0
        };
        let trigger = position
            .sell_signal
            .as_ref()
            .map(|s| s.trigger)
            .unwrap_or(SellTrigger::Manual);

        position.close_info = Some(CloseInfo {
            exit_price,
            exit_time: now,
            pnl_pct,
            trigger,
        });
        position.status = PositionStatus::Cooldown;
        position.cooldown_until = Some(now + self.cooldown);
        position.updated_at = now;
        self.store.update_position(&position)?;

        let quantity = position
            .holding_info
            .as_ref()
            .map(|h| h.quantity)
            .unwrap_or(0.0);
        let trade = TradeRecord {
            id: format!("{}_{}", symbol, now.format("%Y%m%d%H%M%S")),
            symbol: symbol.to_string(),
            side: TradeSide::Sell,
            entry_price,
            exit_price,
            entry_time: position.holding_info.as_ref().map(|h| h.entry_time),
            exit_time: Some(now),
            quantity,
            pnl_pct,
            reason: format!("sell confirmed ({})", trigger.to_label()),
            created_at: now,
        };
        self.store.append_trade(trade.clone())?;

        Ok((position, trade))
    }

    /// Discard a pending buy signal without entering cooldown.
    pub fn ignore(&self, symbol: &str) -> Result<(), StrategyError> {
        let Some(position) = self.store.active_position(symbol)? else {
            return Err(StrategyError::StateConflict(format!(
                "no pending signal for {symbol}"
            )));
        };
        if position.status != PositionStatus::SignalBuySent {
            return Err(StrategyError::StateConflict(format!(
                "{symbol} is {}, only pending buy signals can be ignored",
                position.status.to_label()
            )));
        }
        self.store.delete_position(symbol)
    }

    /// Remove cooldown records whose expiry has passed.
    pub fn sweep_cooldowns(&self, now: DateTime<Utc>) -> Result<usize, StrategyError> {
        self.store.sweep_expired_cooldowns(now)
    }
}


#[cfg(test)]
mod tests {
    use super::tests_support::signal_fixture;
    use super::*;
    use chrono::{Duration, TimeZone};
    use position_ledger::MemoryStore;

    fn lifecycle() -> PositionLifecycle {
        PositionLifecycle::new(Arc::new(MemoryStore::new()), Duration::hours(24))
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 2, 0, 0).unwrap()
    }

    fn signal(price: f64) -> SignalData {
        signal_fixture(price, t0())
    }

    fn sell(price: f64) -> SellSignal {
        SellSignal {
            trigger: SellTrigger::DeathCross,
            price,
            reason: "MACD death cross".to_string(),
            pnl_pct: Some(2.0),
        }
    }

    #[test]
    fn full_lifecycle_happy_path() {
        let lc = lifecycle();
        let params = StrategyParams::default();

        let position = lc.open_on_buy("2330.TW", signal(600.0), t0()).unwrap();
        assert_eq!(position.status, PositionStatus::SignalBuySent);

        let position = lc
            .confirm_buy("2330.TW", None, &params, t0() + Duration::minutes(5))
            .unwrap();
        assert_eq!(position.status, PositionStatus::Holding);
        assert_eq!(position.holding_info.as_ref().unwrap().entry_price, 600.0);
        assert_eq!(position.holding_info.as_ref().unwrap().stop_loss, 596.0);

        let position = lc
            .signal_sell("2330.TW", sell(612.0), t0() + Duration::days(1))
            .unwrap();
        assert_eq!(position.status, PositionStatus::SignalSellSent);

        let (position, trade) = lc
            .confirm_sell("2330.TW", None, t0() + Duration::days(1) + Duration::minutes(5))
            .unwrap();
        assert_eq!(position.status, PositionStatus::Cooldown);
        assert!(position.cooldown_until.is_some());
        assert_eq!(trade.side, TradeSide::Sell);
        assert!((trade.pnl_pct - 2.0).abs() < 1e-9);
    }

    #[test]
    fn explicit_confirm_price_recomputes_the_stop() {
        let lc = lifecycle();
        lc.open_on_buy("2330.TW", signal(600.0), t0()).unwrap();
        let position = lc
            .confirm_buy("2330.TW", Some(610.0), &StrategyParams::default(), t0())
            .unwrap();
        let holding = position.holding_info.unwrap();
        assert_eq!(holding.entry_price, 610.0);
        assert_eq!(holding.stop_loss, 606.0); // 610 - 2 * ATR(2.0)
    }

    #[test]
    fn only_one_active_position_per_symbol() {
        let lc = lifecycle();
        lc.open_on_buy("2330.TW", signal(600.0), t0()).unwrap();
        let err = lc.open_on_buy("2330.TW", signal(610.0), t0()).unwrap_err();
        assert!(matches!(err, StrategyError::StateConflict(_)));
    }

    #[test]
    fn cooldown_blocks_new_buy_until_swept() {
        let lc = lifecycle();
        lc.open_on_buy("2330.TW", signal(600.0), t0()).unwrap();
        lc.confirm_buy("2330.TW", None, &StrategyParams::default(), t0())
            .unwrap();
        lc.signal_sell("2330.TW", sell(590.0), t0() + Duration::days(1))
            .unwrap();
        lc.confirm_sell("2330.TW", None, t0() + Duration::days(1))
            .unwrap();

        // Fresh confirmed cross or not, the cooldown gate holds.
        let during = t0() + Duration::days(1) + Duration::hours(12);
        let err = lc.open_on_buy("2330.TW", signal(595.0), during).unwrap_err();
        assert!(matches!(err, StrategyError::StateConflict(_)));

        // Expired but not yet swept: the stale record still occupies the slot.
        let after = t0() + Duration::days(3);
        assert!(lc.open_on_buy("2330.TW", signal(595.0), after).is_err());

        assert_eq!(lc.sweep_cooldowns(after).unwrap(), 1);
        assert!(lc.open_on_buy("2330.TW", signal(595.0), after).is_ok());
    }

    #[test]
    fn confirm_sell_without_holding_is_rejected() {
        let lc = lifecycle();
        let err = lc.confirm_sell("2330.TW", None, t0()).unwrap_err();
        assert!(matches!(err, StrategyError::StateConflict(_)));

        lc.open_on_buy("2330.TW", signal(600.0), t0()).unwrap();
        let err = lc.confirm_sell("2330.TW", None, t0()).unwrap_err();
        assert!(matches!(err, StrategyError::StateConflict(_)));
    }

    #[test]
    fn confirm_buy_twice_is_rejected() {
        let lc = lifecycle();
        let params = StrategyParams::default();
        lc.open_on_buy("2330.TW", signal(600.0), t0()).unwrap();
        lc.confirm_buy("2330.TW", None, &params, t0()).unwrap();
        let err = lc.confirm_buy("2330.TW", None, &params, t0()).unwrap_err();
        assert!(matches!(err, StrategyError::StateConflict(_)));
    }

    #[test]
    fn duplicate_sell_signal_is_rejected() {
        let lc = lifecycle();
        lc.open_on_buy("2330.TW", signal(600.0), t0()).unwrap();
        lc.confirm_buy("2330.TW", None, &StrategyParams::default(), t0())
            .unwrap();
        lc.signal_sell("2330.TW", sell(590.0), t0()).unwrap();
        let err = lc.signal_sell("2330.TW", sell(589.0), t0()).unwrap_err();
        assert!(matches!(err, StrategyError::StateConflict(_)));
    }

    #[test]
    fn sell_from_unconfirmed_buy_uses_signal_price() {
        // A stop can fire while the buy is still awaiting confirmation.
        let lc = lifecycle();
        lc.open_on_buy("2330.TW", signal(600.0), t0()).unwrap();
        let position = lc
            .signal_sell(
                "2330.TW",
                SellSignal {
                    trigger: SellTrigger::HardStopLoss,
                    price: 595.0,
                    reason: "price 595.00 <= stop-loss 596.00".to_string(),
                    pnl_pct: None,
                },
                t0(),
            )
            .unwrap();
        assert_eq!(position.status, PositionStatus::SignalSellSent);

        let (_, trade) = lc.confirm_sell("2330.TW", None, t0()).unwrap();
        assert_eq!(trade.entry_price, 600.0);
        assert_eq!(trade.exit_price, 595.0);
    }

    #[test]
    fn ignore_discards_only_pending_signals() {
        let lc = lifecycle();
        lc.open_on_buy("2330.TW", signal(600.0), t0()).unwrap();
        lc.ignore("2330.TW").unwrap();
        assert!(lc.store().active_position("2330.TW").unwrap().is_none());

        // No cooldown after ignore: a new signal may open immediately.
        assert!(lc.open_on_buy("2330.TW", signal(601.0), t0()).is_ok());

        lc.confirm_buy("2330.TW", None, &StrategyParams::default(), t0())
            .unwrap();
        assert!(matches!(
            lc.ignore("2330.TW"),
            Err(StrategyError::StateConflict(_))
        ));
    }

    #[test]
    fn signals_are_logged_before_positions_exist() {
        let lc = lifecycle();
        lc.open_on_buy("2330.TW", signal(600.0), t0()).unwrap();
        let records = lc
            .store()
            .signals(Some("2330.TW"), Some(SignalKind::Buy), 10)
            .unwrap();
        assert_eq!(records.len(), 1);
    }
}
