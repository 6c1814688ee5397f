use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use strategy_core::{Notifier, SignalData, StrategyError};

/// Posts formatted signal messages to a configured webhook. An empty URL
/// disables delivery silently so the agent can run headless.
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String, timeout: std::time::Duration) -> Result<Self, StrategyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StrategyError::Notification(e.to_string()))?;
        Ok(Self {
            client,
            webhook_url,
        })
    }

    async fn post(&self, content: &str) -> Result<(), StrategyError> {
        if self.webhook_url.is_empty() {
            tracing::debug!("webhook not configured, skipping notification");
            return Ok(());
        }

        let payload = json!({
            "content": content,
            "username": "Trend Sentinel",
        });

        self.client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| StrategyError::Notification(e.to_string()))?
            .error_for_status()
            .map_err(|e| StrategyError::Notification(e.to_string()))?;

        tracing::debug!("notification sent");
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_buy_signal(
        &self,
        symbol: &str,
        price: f64,
        signal: &SignalData,
    ) -> Result<(), StrategyError> {
        let message = format!(
            "**Buy signal: {}**\n\
             Price: {:.2}\n\
             Score: {}/{} ({})\n\
             RSI: {} | ADX: {} | ATR: {:.2}\n\
             Stop-loss: {:.2}{}\n\
             Risk/reward: {:.2}\n\
             Reply `buy {}` to confirm.",
            symbol,
            price,
            signal.score,
            signal.max_score,
            signal.reasons.join(", "),
            signal
                .rsi
                .map(|v| format!("{v:.1}"))
                .unwrap_or_else(|| "-".to_string()),
            signal
                .adx
                .map(|v| format!("{v:.1}"))
                .unwrap_or_else(|| "-".to_string()),
            signal.risk.atr,
            signal.risk.stop_loss,
            if signal.risk.is_new_high_stop {
                " (anchored to trailing high)"
            } else {
                ""
            },
            signal.risk.risk_reward_ratio,
            symbol,
        );
        self.post(&message).await
    }

    async fn send_sell_signal(
        &self,
        symbol: &str,
        price: f64,
        reason: &str,
        pnl_pct: Option<f64>,
    ) -> Result<(), StrategyError> {
        let pnl = pnl_pct
            .map(|p| format!("\nP&L: {p:+.2}%"))
            .unwrap_or_default();
        let message = format!(
            "**Sell signal: {symbol}**\n\
             Price: {price:.2}\n\
             Reason: {reason}{pnl}\n\
             Reply `sell {symbol}` to confirm."
        );
        self.post(&message).await
    }

    async fn send_force_sell(
        &self,
        symbol: &str,
        price: f64,
        reason: &str,
    ) -> Result<(), StrategyError> {
        let message = format!(
            "**Stop-loss triggered: {symbol}**\n\
             Price: {price:.2}\n\
             {reason}\n\
             Exit recommended immediately. Reply `sell {symbol}` to confirm."
        );
        self.post(&message).await
    }
}
