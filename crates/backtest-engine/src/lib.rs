pub mod engine;
pub mod models;
pub mod optimizer;

#[cfg(test)]
mod tests;

pub use engine::run_backtest;
pub use models::*;
pub use optimizer::{optimize, OptimizationResult, OptimizerGrid};
