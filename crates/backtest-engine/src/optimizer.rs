use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strategy_core::{Bar, StrategyError, StrategyParams};

use crate::engine::run_backtest;
use crate::models::{BacktestConfig, BacktestResult};

/// Fixed parameter grid for the exhaustive search. The defaults span a
/// 3 x 3 x 3 x 3 x 4 x 3 space; combinations with fast >= slow are
/// rejected before any evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerGrid {
    pub macd_fast: Vec<usize>,
    pub macd_slow: Vec<usize>,
    pub macd_signal: Vec<usize>,
    pub rsi_period: Vec<usize>,
    pub confirm_bars: Vec<usize>,
    pub stop_loss_multiplier: Vec<f64>,
}

impl Default for OptimizerGrid {
    fn default() -> Self {
        Self {
            macd_fast: vec![8, 12, 20],
            macd_slow: vec![20, 26, 32],
            macd_signal: vec![7, 9, 11],
            rsi_period: vec![10, 14, 21],
            confirm_bars: vec![2, 3, 4, 5],
            stop_loss_multiplier: vec![1.5, 2.0, 2.5],
        }
    }
}

impl OptimizerGrid {
    /// Total grid size, invalid combinations included.
    pub fn size(&self) -> usize {
        self.macd_fast.len()
            * self.macd_slow.len()
            * self.macd_signal.len()
            * self.rsi_period.len()
            * self.confirm_bars.len()
            * self.stop_loss_multiplier.len()
    }

    /// Expand the grid into concrete parameter sets (base overridden per
    /// axis), counting the fast >= slow combinations skipped.
    fn expand(&self, base: &StrategyParams) -> (Vec<StrategyParams>, usize) {
        let mut combos = Vec::with_capacity(self.size());
        let mut skipped = 0usize;
        for &fast in &self.macd_fast {
            for &slow in &self.macd_slow {
                for &signal in &self.macd_signal {
                    for &rsi_period in &self.rsi_period {
                        for &confirm_bars in &self.confirm_bars {
                            for &multiplier in &self.stop_loss_multiplier {
                                if fast >= slow {
                                    skipped += 1;
                                    continue;
                                }
                                let mut params = base.clone();
                                params.macd.fast = fast;
                                params.macd.slow = slow;
                                params.macd.signal = signal;
                                params.rsi.period = rsi_period;
                                params.confirm_bars = confirm_bars;
                                params.stop_loss_multiplier = multiplier;
                                combos.push(params);
                            }
                        }
                    }
                }
            }
        }
        (combos, skipped)
    }
}

/// Outcome of a grid search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub best: BacktestResult,
    pub best_score: f64,
    pub target_win_rate: f64,
    /// Trials that produced a result.
    pub evaluated: usize,
    /// fast >= slow combinations rejected up front.
    pub skipped_invalid: usize,
    /// Trials that failed (e.g. not enough history for a window).
    pub failed: usize,
}

/// Score a trial: closeness to the target win rate dominates, total
/// return breaks the remaining ground.
fn score_result(result: &BacktestResult, target_win_rate: f64) -> f64 {
    -(result.win_rate - target_win_rate).abs() * 100.0 + result.total_return_pct * 0.1
}

/// Exhaustive grid search over strategy parameters. Trials share no
/// mutable state and run in parallel; equal scores resolve to the lowest
/// grid index, so the result is deterministic regardless of scheduling.
pub fn optimize(
    bars: &[Bar],
    base: &BacktestConfig,
    grid: &OptimizerGrid,
    target_win_rate: f64,
) -> Result<OptimizationResult, StrategyError> {
    let (combos, skipped_invalid) = grid.expand(&base.params);
    if combos.is_empty() {
        return Err(StrategyError::InvalidParams(
            "parameter grid contains no valid combination".to_string(),
        ));
    }

    let trials: Vec<Option<(f64, BacktestResult)>> = combos
        .par_iter()
        .map(|params| {
            let config = BacktestConfig {
                initial_capital: base.initial_capital,
                warmup_offset: base.warmup_offset,
                params: params.clone(),
            };
            match run_backtest(bars, &config) {
                Ok(result) => {
                    let score = score_result(&result, target_win_rate);
                    Some((score, result))
                }
                Err(e) => {
                    tracing::debug!("grid trial failed: {e}");
                    None
                }
            }
        })
        .collect();

    let evaluated = trials.iter().filter(|t| t.is_some()).count();
    let failed = trials.len() - evaluated;

    // Strictly-greater comparison over the index-ordered trials: lowest
    // grid index wins ties.
    let mut best: Option<(f64, BacktestResult)> = None;
    for trial in trials.into_iter().flatten() {
        match &best {
            Some((best_score, _)) if trial.0 <= *best_score => {}
            _ => best = Some(trial),
        }
    }

    let (best_score, best) = best.ok_or_else(|| {
        StrategyError::InsufficientData(
            "no grid combination produced a backtest result".to_string(),
        )
    })?;

    Ok(OptimizationResult {
        best,
        best_score,
        target_win_rate,
        evaluated,
        skipped_invalid,
        failed,
    })
}
