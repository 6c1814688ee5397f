use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Inbound confirmation commands, decoupled from whatever transport
/// delivers them. The stdin listener below is one transport; a chat
/// gateway would feed the same queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ConfirmBuy {
        symbol: String,
        price: Option<f64>,
    },
    ConfirmSell {
        symbol: String,
        price: Option<f64>,
    },
    Ignore {
        symbol: String,
    },
    Backtest {
        symbol: String,
        period: String,
        interval: String,
        capital: Option<f64>,
    },
    Status,
}

impl Command {
    /// Parse a line-protocol command:
    /// `buy SYMBOL [price]`, `sell SYMBOL [price]`, `ignore SYMBOL`,
    /// `backtest SYMBOL [period] [interval] [capital]`, `status`.
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut tokens = line.split_whitespace();
        let verb = tokens.next().ok_or("empty command")?.to_lowercase();
        if verb == "status" {
            return Ok(Command::Status);
        }

        let symbol = tokens
            .next()
            .map(|s| s.to_uppercase())
            .ok_or_else(|| format!("usage: {verb} SYMBOL ..."))?;

        match verb.as_str() {
            "buy" | "sell" => {
                let price = match tokens.next() {
                    Some(raw) => Some(
                        raw.parse::<f64>()
                            .map_err(|_| format!("invalid price: {raw}"))?,
                    ),
                    None => None,
                };
                if verb == "buy" {
                    Ok(Command::ConfirmBuy { symbol, price })
                } else {
                    Ok(Command::ConfirmSell { symbol, price })
                }
            }
            "ignore" => Ok(Command::Ignore { symbol }),
            "backtest" => {
                let capital = match tokens.clone().nth(2) {
                    Some(raw) => Some(
                        raw.parse::<f64>()
                            .map_err(|_| format!("invalid capital: {raw}"))?,
                    ),
                    None => None,
                };
                Ok(Command::Backtest {
                    symbol,
                    period: tokens.next().unwrap_or("6mo").to_string(),
                    interval: tokens.next().unwrap_or("1d").to_string(),
                    capital,
                })
            }
            other => Err(format!(
                "unknown command: {other} (expected buy, sell, ignore, backtest or status)"
            )),
        }
    }
}

/// Feed the command queue from stdin, one command per line.
pub fn spawn_stdin_listener(tx: mpsc::Sender<Command>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match Command::parse(line) {
                Ok(command) => {
                    if tx.send(command).await.is_err() {
                        break;
                    }
                }
                Err(reason) => tracing::warn!("{reason}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_buy_with_and_without_price() {
        assert_eq!(
            Command::parse("buy 2330.tw").unwrap(),
            Command::ConfirmBuy {
                symbol: "2330.TW".to_string(),
                price: None
            }
        );
        assert_eq!(
            Command::parse("buy 2330.TW 612.5").unwrap(),
            Command::ConfirmBuy {
                symbol: "2330.TW".to_string(),
                price: Some(612.5)
            }
        );
    }

    #[test]
    fn parses_sell_and_ignore() {
        assert_eq!(
            Command::parse("sell 8110.TW").unwrap(),
            Command::ConfirmSell {
                symbol: "8110.TW".to_string(),
                price: None
            }
        );
        assert_eq!(
            Command::parse("ignore 8110.TW").unwrap(),
            Command::Ignore {
                symbol: "8110.TW".to_string()
            }
        );
    }

    #[test]
    fn backtest_defaults_period_and_interval() {
        assert_eq!(
            Command::parse("backtest 2330.TW").unwrap(),
            Command::Backtest {
                symbol: "2330.TW".to_string(),
                period: "6mo".to_string(),
                interval: "1d".to_string(),
                capital: None,
            }
        );
        assert_eq!(
            Command::parse("backtest 2330.TW 1y 1d 50000").unwrap(),
            Command::Backtest {
                symbol: "2330.TW".to_string(),
                period: "1y".to_string(),
                interval: "1d".to_string(),
                capital: Some(50000.0),
            }
        );
    }

    #[test]
    fn status_takes_no_arguments() {
        assert_eq!(Command::parse("status").unwrap(), Command::Status);
    }

    #[test]
    fn rejects_garbage() {
        assert!(Command::parse("").is_err());
        assert!(Command::parse("buy").is_err());
        assert!(Command::parse("buy 2330.TW abc").is_err());
        assert!(Command::parse("hold 2330.TW").is_err());
    }
}
