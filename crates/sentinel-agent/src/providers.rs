use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use strategy_core::{Bar, MarketData, StrategyError};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Market-data client over the Yahoo Finance chart API.
pub struct YahooChartClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    result: Option<Vec<ChartResult>>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    open: Option<Vec<Option<f64>>>,
    high: Option<Vec<Option<f64>>>,
    low: Option<Vec<Option<f64>>>,
    close: Option<Vec<Option<f64>>>,
    volume: Option<Vec<Option<f64>>>,
}

impl YahooChartClient {
    pub fn new(timeout: std::time::Duration) -> Result<Self, StrategyError> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    pub fn with_base_url(
        base_url: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, StrategyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StrategyError::NoData(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn bars_from(result: ChartResult) -> Vec<Bar> {
        let timestamps = result.timestamp.unwrap_or_default();
        let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
        let opens = quote.open.unwrap_or_default();
        let highs = quote.high.unwrap_or_default();
        let lows = quote.low.unwrap_or_default();
        let closes = quote.close.unwrap_or_default();
        let volumes = quote.volume.unwrap_or_default();

        let mut bars: Vec<Bar> = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let Some(timestamp) = DateTime::<Utc>::from_timestamp(ts, 0) else {
                continue;
            };
            // The feed reports holes as nulls; a bar without full OHLC is
            // dropped rather than zero-filled.
            let (Some(Some(open)), Some(Some(high)), Some(Some(low)), Some(Some(close))) = (
                opens.get(i).copied(),
                highs.get(i).copied(),
                lows.get(i).copied(),
                closes.get(i).copied(),
            ) else {
                continue;
            };
            let volume = volumes.get(i).copied().flatten().unwrap_or(0.0);

            // Keep timestamps strictly increasing.
            if bars
                .last()
                .map(|prev: &Bar| timestamp <= prev.timestamp)
                .unwrap_or(false)
            {
                continue;
            }
            bars.push(Bar {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            });
        }
        bars
    }
}

#[async_trait]
impl MarketData for YahooChartClient {
    async fn fetch_bars(
        &self,
        symbol: &str,
        period: &str,
        interval: &str,
        min_bars: usize,
    ) -> Result<Vec<Bar>, StrategyError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        let response = self
            .client
            .get(&url)
            .query(&[("range", period), ("interval", interval)])
            .send()
            .await
            .map_err(|e| StrategyError::NoData(format!("{symbol}: {e}")))?;

        if !response.status().is_success() {
            return Err(StrategyError::NoData(format!(
                "{symbol}: chart API returned {}",
                response.status()
            )));
        }

        let parsed: ChartResponse = response
            .json()
            .await
            .map_err(|e| StrategyError::NoData(format!("{symbol}: malformed chart payload: {e}")))?;

        if let Some(error) = parsed.chart.error {
            if !error.is_null() {
                return Err(StrategyError::NoData(format!("{symbol}: {error}")));
            }
        }
        let Some(result) = parsed
            .chart
            .result
            .and_then(|mut results| (!results.is_empty()).then(|| results.remove(0)))
        else {
            return Err(StrategyError::NoData(format!(
                "{symbol}: no chart data returned"
            )));
        };

        let bars = Self::bars_from(result);
        if bars.is_empty() {
            return Err(StrategyError::NoData(format!(
                "{symbol}: chart data contained no usable bars"
            )));
        }
        if bars.len() < min_bars {
            return Err(StrategyError::InsufficientData(format!(
                "{symbol}: got {} bars, need {}",
                bars.len(),
                min_bars
            )));
        }

        tracing::debug!("{symbol}: fetched {} bars", bars.len());
        Ok(bars)
    }
}
