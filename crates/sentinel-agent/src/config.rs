use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    // Cycle cadence
    pub scan_interval_seconds: u64,      // 300 (5 minutes)
    pub hard_stop_interval_seconds: u64, // 60 (fast stop-loss poll)
    pub cooldown_hours: i64,             // 24 (re-entry block after exit)

    // Trading session, exchange-local
    pub session_timezone: String, // "Asia/Taipei"
    pub session_start: String,    // "09:00"
    pub session_end: String,      // "13:30"
    pub session_gate_enabled: bool,

    // Market data
    pub data_period: String,   // "1mo"
    pub data_interval: String, // "5m"
    pub min_bars: usize,       // 50
    pub request_timeout_seconds: u64,

    // Watchlist seed, applied only when the store has none
    pub default_watchlist: Vec<String>,

    // Notifications
    pub webhook_url: String,

    // Storage
    pub data_dir: String,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            scan_interval_seconds: env::var("SCAN_INTERVAL")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
            hard_stop_interval_seconds: env::var("HARD_STOP_INTERVAL")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            cooldown_hours: env::var("COOLDOWN_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()?,

            session_timezone: env::var("SESSION_TIMEZONE")
                .unwrap_or_else(|_| "Asia/Taipei".to_string()),
            session_start: env::var("SESSION_START").unwrap_or_else(|_| "09:00".to_string()),
            session_end: env::var("SESSION_END").unwrap_or_else(|_| "13:30".to_string()),
            session_gate_enabled: env::var("SESSION_GATE_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,

            data_period: env::var("DATA_PERIOD").unwrap_or_else(|_| "1mo".to_string()),
            data_interval: env::var("DATA_INTERVAL").unwrap_or_else(|_| "5m".to_string()),
            min_bars: env::var("MIN_BARS")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,
            request_timeout_seconds: env::var("REQUEST_TIMEOUT")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            default_watchlist: env::var("WATCHLIST")
                .unwrap_or_else(|_| "2330.TW,8110.TW,2337.TW".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),

            webhook_url: env::var("WEBHOOK_URL").unwrap_or_else(|_| String::new()),

            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scan_interval_seconds == 0 || self.hard_stop_interval_seconds == 0 {
            bail!("cycle intervals must be positive");
        }
        if self.cooldown_hours < 0 {
            bail!("COOLDOWN_HOURS must not be negative");
        }
        if self.request_timeout_seconds == 0 {
            bail!("REQUEST_TIMEOUT must be positive");
        }
        self.session_timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| anyhow::anyhow!("invalid SESSION_TIMEZONE: {e}"))?;
        self.session_bounds()?;
        Ok(())
    }

    pub fn session_bounds(&self) -> Result<(NaiveTime, NaiveTime)> {
        let start = NaiveTime::parse_from_str(&self.session_start, "%H:%M")
            .context("invalid SESSION_START, expected HH:MM")?;
        let end = NaiveTime::parse_from_str(&self.session_end, "%H:%M")
            .context("invalid SESSION_END, expected HH:MM")?;
        if start >= end {
            bail!("SESSION_START must be before SESSION_END");
        }
        Ok((start, end))
    }

    pub fn timezone(&self) -> chrono_tz::Tz {
        // Validated in from_env.
        self.session_timezone
            .parse()
            .unwrap_or(chrono_tz::Asia::Taipei)
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::hours(self.cooldown_hours)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_seconds)
    }
}
