use async_trait::async_trait;

use crate::{Bar, SignalData, StrategyError};

/// Market-data provider returning an ordered bar sequence for an
/// instrument. Implementations must fail with `NoData` when the instrument
/// is unknown or the feed returns nothing, and `InsufficientData` when
/// fewer bars than the requested minimum come back.
#[async_trait]
pub trait MarketData: Send + Sync {
    async fn fetch_bars(
        &self,
        symbol: &str,
        period: &str,
        interval: &str,
        min_bars: usize,
    ) -> Result<Vec<Bar>, StrategyError>;
}

/// Outbound notification channel for human-in-the-loop confirmation.
/// Implementations format messages themselves; callers never push raw
/// errors through this interface.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_buy_signal(
        &self,
        symbol: &str,
        price: f64,
        signal: &SignalData,
    ) -> Result<(), StrategyError>;

    async fn send_sell_signal(
        &self,
        symbol: &str,
        price: f64,
        reason: &str,
        pnl_pct: Option<f64>,
    ) -> Result<(), StrategyError>;

    async fn send_force_sell(
        &self,
        symbol: &str,
        price: f64,
        reason: &str,
    ) -> Result<(), StrategyError>;
}
