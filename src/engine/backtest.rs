//! Walk-forward backtest engine.
//!
//! For each split the engine refits a fresh calibrator on the training
//! slice, then walks the test slice in time order. At every event timestamp
//! it first settles due positions, then runs the candidate through the gate
//! sequence: capital, snapshot, prediction, Kelly fraction, exposure caps,
//! liquidity, cost, affordability, EV lower bound. Adverse conditions are
//! soft skips; calibrator and cost-model failures propagate.

use thiserror::Error;

use crate::engine::cost::{CostBreakdown, CostError, CostModel};
use crate::engine::risk::RiskManager;
use crate::model::isotonic::{
    CalibrationConfig, CalibrationError, IsotonicCalibrator, TrainingRow,
};
use crate::types::{BookLookup, CapitalPoint, FeatureRow, Stamp, TauBucket, TradeResult};

#[derive(Debug, Error)]
pub enum BacktestError {
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Cost(#[from] CostError),
}

#[derive(Clone, Debug)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// A candidate trades only when its EV lower bound exceeds this.
    pub min_ev: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            min_ev: 0.0,
        }
    }
}

/// A position between open and settlement. Immutable once created.
struct OpenPosition {
    row: FeatureRow,
    breakdown: CostBreakdown,
    shares: f64,
    notional: f64,
    q_hat: f64,
    q_lower: f64,
    ev_lower: f64,
}

#[derive(Debug)]
pub struct BacktestResult {
    pub capital_history: Vec<CapitalPoint>,
    pub executed_trades: Vec<TradeResult>,
    pub ending_capital: f64,
}

pub struct BacktestEngine {
    cost_model: CostModel,
    risk: RiskManager,
    config: BacktestConfig,
    calibration: CalibrationConfig,
    books: BookLookup,
}

impl BacktestEngine {
    pub fn new(
        cost_model: CostModel,
        risk: RiskManager,
        config: BacktestConfig,
        calibration: CalibrationConfig,
        books: BookLookup,
    ) -> Self {
        Self {
            cost_model,
            risk,
            config,
            calibration,
            books,
        }
    }

    /// Settle every open position due at `now_ms` (all of them when `None`),
    /// crediting payouts and releasing exposure. Positions settle in open
    /// order.
    fn settle_positions(
        &mut self,
        now_ms: Option<i64>,
        open_positions: &mut Vec<OpenPosition>,
        capital: &mut f64,
        executed: &mut Vec<TradeResult>,
        history: &mut Vec<CapitalPoint>,
    ) {
        let mut remaining = Vec::with_capacity(open_positions.len());
        for position in open_positions.drain(..) {
            let due = match now_ms {
                Some(now) => position.row.resolve_ts_ms <= now,
                None => true,
            };
            if !due {
                remaining.push(position);
                continue;
            }

            let payout = position.row.outcome.payout() * position.shares;
            *capital += payout;
            let total_cost = position.breakdown.total_cost();
            let pnl = payout - position.notional - total_cost;

            executed.push(TradeResult {
                trade_id: position.row.trade_id.clone(),
                condition_id: position.row.condition_id.clone(),
                ts_ms: position.row.ts_ms,
                resolve_ts_ms: position.row.resolve_ts_ms,
                category: position.row.category.clone(),
                neg_risk_group: position.row.neg_risk_group.clone(),
                price: position.row.price,
                execution_price: position.breakdown.execution_price,
                shares: position.shares,
                notional: position.notional,
                q_hat: position.q_hat,
                q_lower: position.q_lower,
                ev_lower: position.ev_lower,
                total_cost,
                payout,
                pnl,
            });
            self.risk.release_position(
                position.row.category.as_deref(),
                position.row.neg_risk_group.as_deref(),
                &position.row.condition_id,
                position.notional,
            );
            history.push(CapitalPoint {
                stamp: Stamp::Event(position.row.resolve_ts_ms),
                capital: *capital,
            });
        }
        *open_positions = remaining;
    }

    /// Run the walk-forward backtest over time-ordered candidate rows.
    /// Splits are `(train_end, test_end)` pairs and are never reordered.
    pub fn run(
        &mut self,
        rows: &[FeatureRow],
        splits: &[(i64, i64)],
    ) -> Result<BacktestResult, BacktestError> {
        let mut capital = self.config.initial_capital;
        let mut open_positions: Vec<OpenPosition> = Vec::new();
        let mut executed: Vec<TradeResult> = Vec::new();
        let mut history: Vec<CapitalPoint> = Vec::new();

        let mut data: Vec<FeatureRow> = rows.to_vec();
        // Stable: same-timestamp rows keep their input order.
        data.sort_by_key(|r| r.ts_ms);

        for &(train_end, test_end) in splits {
            let train: Vec<&FeatureRow> = data.iter().filter(|r| r.ts_ms <= train_end).collect();
            let test: Vec<&FeatureRow> = data
                .iter()
                .filter(|r| r.ts_ms > train_end && r.ts_ms <= test_end)
                .collect();
            if test.is_empty() {
                continue;
            }

            let mut calibrator = IsotonicCalibrator::new(self.calibration.clone());
            let training: Vec<TrainingRow> = train
                .iter()
                .map(|r| TrainingRow {
                    price: r.price,
                    outcome: r.outcome.payout(),
                    bucket: r.tau_bucket,
                })
                .collect();
            calibrator.fit(&training)?;

            let queries: Vec<(f64, TauBucket)> =
                test.iter().map(|r| (r.price, r.tau_bucket)).collect();
            let predictions = calibrator.transform(&queries)?;

            for (row, prediction) in test.iter().zip(&predictions) {
                // a. Settlement strictly precedes opening at this timestamp.
                self.settle_positions(
                    Some(row.ts_ms),
                    &mut open_positions,
                    &mut capital,
                    &mut executed,
                    &mut history,
                );

                // b. Skip gates: exhausted capital, missing snapshot,
                //    missing prediction.
                if capital <= 0.0 {
                    continue;
                }
                let key = (row.token_id.clone(), row.ts_ms);
                let snapshot = match self.books.get(&key) {
                    Some(s) => s,
                    None => continue,
                };
                let prediction = match prediction {
                    Some(p) => *p,
                    None => continue,
                };

                // c. Sizing under Kelly and exposure caps.
                let fraction = self.risk.kelly_fraction(prediction.q_hat, row.price);
                if fraction <= 0.0 {
                    continue;
                }
                let available = self.risk.available_notional(
                    capital,
                    row.category.as_deref(),
                    row.neg_risk_group.as_deref(),
                    &row.condition_id,
                );
                if available <= 0.0 {
                    continue;
                }
                let target_notional = (capital * fraction).min(available);
                if target_notional <= 0.0 {
                    continue;
                }

                // d. Liquidity probe and cost estimate.
                let liquidity = snapshot.ask_depth();
                if liquidity <= 0.0 {
                    continue;
                }
                let tentative_size = liquidity.min(target_notional / row.price);
                let mut breakdown = self.cost_model.estimate_cost(
                    snapshot,
                    tentative_size,
                    row.time_to_event_days,
                )?;

                // e. At most one re-size when the fill overshoots the target.
                if breakdown.notional() > target_notional && breakdown.filled_size > 0.0 {
                    let adjusted_size = target_notional / breakdown.execution_price;
                    breakdown = self.cost_model.estimate_cost(
                        snapshot,
                        adjusted_size,
                        row.time_to_event_days,
                    )?;
                }

                // f. Final gates: fill, affordability, EV lower bound.
                if breakdown.filled_size == 0.0 {
                    continue;
                }
                if breakdown.notional() + breakdown.total_cost() > capital {
                    continue;
                }
                let ev_lower =
                    prediction.q_lower - breakdown.execution_price - breakdown.per_share_cost();
                if ev_lower <= self.config.min_ev {
                    continue;
                }

                // g. Commit.
                capital -= breakdown.notional() + breakdown.total_cost();
                history.push(CapitalPoint {
                    stamp: Stamp::Event(row.ts_ms),
                    capital,
                });
                self.risk.register_position(
                    row.category.as_deref(),
                    row.neg_risk_group.as_deref(),
                    &row.condition_id,
                    breakdown.notional(),
                );
                open_positions.push(OpenPosition {
                    row: (*row).clone(),
                    breakdown,
                    shares: breakdown.filled_size,
                    notional: breakdown.notional(),
                    q_hat: prediction.q_hat,
                    q_lower: prediction.q_lower,
                    ev_lower,
                });
            }
        }

        // Force-settle whatever is still open, then close the history with
        // the explicit end-of-run marker.
        self.settle_positions(
            None,
            &mut open_positions,
            &mut capital,
            &mut executed,
            &mut history,
        );
        history.push(CapitalPoint {
            stamp: Stamp::EndOfRun,
            capital,
        });

        Ok(BacktestResult {
            capital_history: history,
            executed_trades: executed,
            ending_capital: capital,
        })
    }
}
