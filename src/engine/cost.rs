//! Order-book cost model: VWAP fill against the ask side plus slippage,
//! taker fee, gas and borrow components.

use thiserror::Error;

use crate::types::BookSnapshot;

#[derive(Debug, Error, PartialEq)]
pub enum CostError {
    #[error("no ask liquidity available")]
    NoAskLiquidity,
    #[error("unable to fill order with available liquidity")]
    InsufficientLiquidity,
}

/// Decomposed cost of one simulated fill.
#[derive(Clone, Copy, Debug)]
pub struct CostBreakdown {
    /// Volume-weighted average fill price.
    pub execution_price: f64,
    pub filled_size: f64,
    pub slippage_cost: f64,
    pub taker_fee_cost: f64,
    pub gas_cost: f64,
    pub borrow_cost: f64,
}

impl CostBreakdown {
    pub fn notional(&self) -> f64 {
        self.execution_price * self.filled_size
    }

    pub fn transaction_cost(&self) -> f64 {
        self.slippage_cost + self.taker_fee_cost + self.gas_cost
    }

    pub fn total_cost(&self) -> f64 {
        self.transaction_cost() + self.borrow_cost
    }

    pub fn per_share_cost(&self) -> f64 {
        if self.filled_size == 0.0 {
            return 0.0;
        }
        self.total_cost() / self.filled_size
    }
}

pub struct CostModel {
    /// Taker fee as a fraction of executed notional.
    pub taker_fee: f64,
    /// Flat cost per fill, charged regardless of size.
    pub gas_cost: f64,
    /// Annualized borrow rate applied over the holding period.
    pub borrow_rate: f64,
}

impl CostModel {
    pub fn new(taker_fee: f64, gas_cost: f64, borrow_rate: f64) -> Self {
        Self { taker_fee, gas_cost, borrow_rate }
    }

    /// Walk the ask side in price priority, consuming up to `size` shares.
    /// Returns (vwap, filled). The 1e-9 remainder tolerance keeps floating
    /// fragments from touching an extra level.
    fn compute_vwap(&self, snapshot: &BookSnapshot, size: f64) -> (f64, f64) {
        let mut asks: Vec<(f64, f64)> = snapshot.asks().map(|l| (l.price, l.size)).collect();
        asks.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut remaining = size;
        let mut total_cost = 0.0;
        let mut filled = 0.0;
        for (price, available) in asks {
            let take = remaining.min(available);
            total_cost += take * price;
            filled += take;
            remaining -= take;
            if remaining <= 1e-9 {
                break;
            }
        }
        if filled == 0.0 {
            return (f64::NAN, 0.0);
        }
        (total_cost / filled, filled)
    }

    /// Estimate the full cost of buying `target_size` shares against the
    /// snapshot, held for `tau_days` until resolution.
    pub fn estimate_cost(
        &self,
        snapshot: &BookSnapshot,
        target_size: f64,
        tau_days: f64,
    ) -> Result<CostBreakdown, CostError> {
        let best_ask = snapshot.best_ask().ok_or(CostError::NoAskLiquidity)?;

        let (vwap, filled) = self.compute_vwap(snapshot, target_size);
        if filled == 0.0 {
            return Err(CostError::InsufficientLiquidity);
        }

        let slippage_cost = ((vwap - best_ask) * filled).max(0.0);
        let taker_fee_cost = self.taker_fee * vwap * filled;
        let borrow_cost = tau_days.max(0.0) / 365.0 * self.borrow_rate * vwap * filled;

        Ok(CostBreakdown {
            execution_price: vwap,
            filled_size: filled,
            slippage_cost,
            taker_fee_cost,
            gas_cost: self.gas_cost,
            borrow_cost,
        })
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new(0.0, 0.25, 0.05)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BookLevel, BookSide};

    fn book(asks: &[(f64, f64)], bids: &[(f64, f64)]) -> BookSnapshot {
        let mut levels = Vec::new();
        for (i, &(price, size)) in asks.iter().enumerate() {
            levels.push(BookLevel { side: BookSide::Ask, level: (i + 1) as u32, price, size });
        }
        for (i, &(price, size)) in bids.iter().enumerate() {
            levels.push(BookLevel { side: BookSide::Bid, level: (i + 1) as u32, price, size });
        }
        BookSnapshot { levels }
    }

    /// Scenario: Asks (0.50 x 10) and (0.52 x 5); buying 12 shares.
    /// Expected: VWAP = (0.50*10 + 0.52*2)/12 and slippage = (vwap - 0.50)*12.
    #[test]
    fn test_vwap_two_levels() {
        let model = CostModel::new(0.0, 0.0, 0.0);
        let snap = book(&[(0.50, 10.0), (0.52, 5.0)], &[]);
        let bd = model.estimate_cost(&snap, 12.0, 1.0).unwrap();

        let expected_vwap = (0.50 * 10.0 + 0.52 * 2.0) / 12.0;
        assert!((bd.execution_price - expected_vwap).abs() < 1e-12);
        assert!((bd.filled_size - 12.0).abs() < 1e-12);
        assert!((bd.slippage_cost - (expected_vwap - 0.50) * 12.0).abs() < 1e-12);
    }

    /// Scenario: Book with only bid levels; any buy attempted.
    /// Expected: NoAskLiquidity error.
    #[test]
    fn test_no_ask_side_errors() {
        let model = CostModel::default();
        let snap = book(&[], &[(0.45, 20.0)]);
        assert_eq!(
            model.estimate_cost(&snap, 5.0, 1.0).unwrap_err(),
            CostError::NoAskLiquidity
        );
    }

    /// Scenario: Ask levels present but all with zero resting size.
    /// Expected: InsufficientLiquidity error (nothing fills).
    #[test]
    fn test_zero_size_asks_error() {
        let model = CostModel::default();
        let snap = book(&[(0.50, 0.0), (0.55, 0.0)], &[]);
        assert_eq!(
            model.estimate_cost(&snap, 5.0, 1.0).unwrap_err(),
            CostError::InsufficientLiquidity
        );
    }

    /// Scenario: Target 20 shares against a book holding only 8.
    /// Expected: Partial fill of 8 at the swept VWAP; no error.
    #[test]
    fn test_partial_fill_when_book_exhausted() {
        let model = CostModel::new(0.0, 0.0, 0.0);
        let snap = book(&[(0.40, 5.0), (0.44, 3.0)], &[]);
        let bd = model.estimate_cost(&snap, 20.0, 0.0).unwrap();
        assert!((bd.filled_size - 8.0).abs() < 1e-12);
        let expected_vwap = (0.40 * 5.0 + 0.44 * 3.0) / 8.0;
        assert!((bd.execution_price - expected_vwap).abs() < 1e-12);
    }

    /// Scenario: Single level fill with 2% taker fee, $0.25 gas, 5% borrow over 73 days.
    /// Expected: fee = 0.02*notional, borrow = 73/365*0.05*notional, gas flat; totals add up.
    #[test]
    fn test_fee_gas_borrow_components() {
        let model = CostModel::new(0.02, 0.25, 0.05);
        let snap = book(&[(0.50, 100.0)], &[]);
        let bd = model.estimate_cost(&snap, 10.0, 73.0).unwrap();

        let notional = 0.50 * 10.0;
        assert!((bd.notional() - notional).abs() < 1e-12);
        assert!((bd.taker_fee_cost - 0.02 * notional).abs() < 1e-12);
        assert!((bd.borrow_cost - 73.0 / 365.0 * 0.05 * notional).abs() < 1e-12);
        assert!((bd.gas_cost - 0.25).abs() < 1e-12);
        assert!((bd.slippage_cost - 0.0).abs() < 1e-12);
        assert!(
            (bd.total_cost() - (bd.taker_fee_cost + bd.gas_cost + bd.borrow_cost)).abs() < 1e-12
        );
        assert!((bd.per_share_cost() - bd.total_cost() / 10.0).abs() < 1e-12);
    }

    /// Scenario: Negative time-to-resolution passed to the borrow term.
    /// Expected: Borrow cost clamps to zero instead of going negative.
    #[test]
    fn test_negative_tau_clamps_borrow() {
        let model = CostModel::new(0.0, 0.0, 0.10);
        let snap = book(&[(0.60, 10.0)], &[]);
        let bd = model.estimate_cost(&snap, 5.0, -2.0).unwrap();
        assert_eq!(bd.borrow_cost, 0.0);
    }

    /// Scenario: Ask levels listed with price priority inverted relative to level index.
    /// Expected: The walk consumes the cheaper price first; slippage is measured against the
    /// level-1 ask, so a cheaper deep level yields zero (clamped) slippage.
    #[test]
    fn test_walk_sorts_by_price_not_level() {
        let model = CostModel::new(0.0, 0.0, 0.0);
        // Level 1 quotes 0.52 but a deeper level offers 0.50.
        let snap = book(&[(0.52, 10.0), (0.50, 10.0)], &[]);
        let bd = model.estimate_cost(&snap, 10.0, 0.0).unwrap();
        assert!((bd.execution_price - 0.50).abs() < 1e-12);
        // best_ask is the level-1 price (0.52); vwap below it clamps at zero.
        assert_eq!(bd.slippage_cost, 0.0);
    }

    /// Scenario: Unfilled breakdown constructed directly (filled_size 0).
    /// Expected: per_share_cost reports 0 instead of dividing by zero.
    #[test]
    fn test_per_share_cost_unfilled() {
        let bd = CostBreakdown {
            execution_price: f64::NAN,
            filled_size: 0.0,
            slippage_cost: 0.0,
            taker_fee_cost: 0.0,
            gas_cost: 0.25,
            borrow_cost: 0.0,
        };
        assert_eq!(bd.per_share_cost(), 0.0);
    }

    /// Scenario: Target size leaves a 1e-12 remainder after the first level.
    /// Expected: The tolerance stops the walk; the second level is never touched.
    #[test]
    fn test_remainder_tolerance_stops_walk() {
        let model = CostModel::new(0.0, 0.0, 0.0);
        let snap = book(&[(0.50, 10.0), (0.90, 10.0)], &[]);
        let bd = model.estimate_cost(&snap, 10.0 + 1e-12, 0.0).unwrap();
        assert!((bd.execution_price - 0.50).abs() < 1e-12);
    }
}
