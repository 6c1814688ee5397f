use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("No market data: {0}")]
    NoData(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("State conflict: {0}")]
    StateConflict(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Notification error: {0}")]
    Notification(String),
}
