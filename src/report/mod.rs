//! Post-run diagnostics: summary statistics, monthly P&L breakdown,
//! calibration bins, and the Brier score.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike};

use crate::types::TradeResult;

/// Headline statistics over the settled trades.
#[derive(Clone, Debug, Default)]
pub struct Summary {
    pub trades: usize,
    pub total_pnl: f64,
    pub total_notional: f64,
    pub total_cost: f64,
    pub win_rate: f64,
    pub average_return: f64,
    pub sharpe_like: f64,
    pub absolute_return: f64,
    pub ending_capital: f64,
}

pub fn compute_summary(trades: &[TradeResult], initial_capital: f64) -> Summary {
    let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();
    let total_notional: f64 = trades.iter().map(|t| t.notional).sum();
    let total_cost: f64 = trades.iter().map(|t| t.total_cost).sum();

    let win_rate = if trades.is_empty() {
        0.0
    } else {
        trades.iter().filter(|t| t.won()).count() as f64 / trades.len() as f64
    };

    let returns: Vec<f64> = trades
        .iter()
        .filter(|t| t.notional > 0.0)
        .map(|t| t.pnl / t.notional)
        .collect();
    let average_return = if returns.is_empty() {
        0.0
    } else {
        returns.iter().sum::<f64>() / returns.len() as f64
    };
    let volatility = if returns.len() > 1 {
        let mean = average_return;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
            / (returns.len() - 1) as f64;
        var.sqrt()
    } else {
        0.0
    };
    let sharpe_like = if volatility > 1e-9 {
        average_return / volatility
    } else {
        0.0
    };

    let absolute_return = if initial_capital != 0.0 {
        total_pnl / initial_capital
    } else {
        0.0
    };

    Summary {
        trades: trades.len(),
        total_pnl,
        total_notional,
        total_cost,
        win_rate,
        average_return,
        sharpe_like,
        absolute_return,
        ending_capital: initial_capital + total_pnl,
    }
}

// ─── Monthly breakdown ───

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MonthlyPnl {
    pub year: i32,
    pub month: u32,
    pub pnl: f64,
    pub notional: f64,
    pub count: usize,
}

/// P&L aggregated by resolution month, chronological.
pub fn compute_monthly_breakdown(trades: &[TradeResult]) -> Vec<MonthlyPnl> {
    let mut by_month: BTreeMap<(i32, u32), (f64, f64, usize)> = BTreeMap::new();
    for trade in trades {
        let Some(dt) = DateTime::from_timestamp_millis(trade.resolve_ts_ms) else {
            continue;
        };
        let entry = by_month.entry((dt.year(), dt.month())).or_insert((0.0, 0.0, 0));
        entry.0 += trade.pnl;
        entry.1 += trade.notional;
        entry.2 += 1;
    }
    by_month
        .into_iter()
        .map(|((year, month), (pnl, notional, count))| MonthlyPnl {
            year,
            month,
            pnl,
            notional,
            count,
        })
        .collect()
}

// ─── Calibration ───

#[derive(Clone, Copy, Debug)]
pub struct CalibrationBin {
    pub lo: f64,
    pub hi: f64,
    /// Mean q_hat of the trades in the bin; NaN when the bin is empty.
    pub mean_prediction: f64,
    /// Empirical win frequency in the bin; NaN when the bin is empty.
    pub empirical: f64,
    pub count: usize,
}

/// Bucket predictions into `n_bins` equal bins over [0.5, 1.0] and compare
/// the mean prediction with the realized win frequency per bin. The first
/// bin is closed on the left; predictions outside the range are ignored.
pub fn compute_calibration(trades: &[TradeResult], n_bins: usize) -> Vec<CalibrationBin> {
    let width = 0.5 / n_bins as f64;
    let mut sums = vec![(0.0f64, 0.0f64, 0usize); n_bins];

    for trade in trades {
        let q = trade.q_hat;
        if !(0.5..=1.0).contains(&q) {
            continue;
        }
        // Right-closed bins: an upper edge belongs to the bin below it. The
        // tolerance keeps edge values from leaking into the next bin.
        let mut idx = n_bins - 1;
        for i in 1..=n_bins {
            let hi = 0.5 + i as f64 * width;
            if q <= hi + 1e-12 {
                idx = i - 1;
                break;
            }
        }
        let outcome = if trade.payout > 0.0 { 1.0 } else { 0.0 };
        sums[idx].0 += q;
        sums[idx].1 += outcome;
        sums[idx].2 += 1;
    }

    sums.into_iter()
        .enumerate()
        .map(|(i, (q_sum, win_sum, count))| CalibrationBin {
            lo: 0.5 + i as f64 * width,
            hi: 0.5 + (i + 1) as f64 * width,
            mean_prediction: if count > 0 { q_sum / count as f64 } else { f64::NAN },
            empirical: if count > 0 { win_sum / count as f64 } else { f64::NAN },
            count,
        })
        .collect()
}

/// Mean squared error of q_hat against the realized 0/1 outcome.
pub fn brier_score(trades: &[TradeResult]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let sum: f64 = trades
        .iter()
        .map(|t| {
            let outcome = if t.payout > 0.0 { 1.0 } else { 0.0 };
            (t.q_hat - outcome).powi(2)
        })
        .sum();
    sum / trades.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(pnl: f64, notional: f64, payout: f64, q_hat: f64, resolve_ts_ms: i64) -> TradeResult {
        TradeResult {
            trade_id: "t".to_string(),
            condition_id: "m".to_string(),
            ts_ms: 0,
            resolve_ts_ms,
            category: None,
            neg_risk_group: None,
            price: 0.5,
            execution_price: 0.5,
            shares: notional / 0.5,
            notional,
            q_hat,
            q_lower: q_hat - 0.1,
            ev_lower: 0.0,
            total_cost: 0.5,
            payout,
            pnl,
        }
    }

    /// Scenario: One winner (+50 on 100) and one loser (-100 on 100).
    /// Expected: Totals, 50% win rate, mean return -0.25, ending capital initial + pnl.
    #[test]
    fn test_summary_two_trades() {
        let trades = vec![
            trade(50.0, 100.0, 150.0, 0.8, 0),
            trade(-100.0, 100.0, 0.0, 0.7, 0),
        ];
        let summary = compute_summary(&trades, 1_000.0);
        assert_eq!(summary.trades, 2);
        assert!((summary.total_pnl - (-50.0)).abs() < 1e-12);
        assert!((summary.total_notional - 200.0).abs() < 1e-12);
        assert!((summary.total_cost - 1.0).abs() < 1e-12);
        assert!((summary.win_rate - 0.5).abs() < 1e-12);
        assert!((summary.average_return - (-0.25)).abs() < 1e-12);
        assert!((summary.absolute_return - (-0.05)).abs() < 1e-12);
        assert!((summary.ending_capital - 950.0).abs() < 1e-12);
        // returns are 0.5 and -1.0: sample std = 1.0606..., sharpe ~ -0.2357
        assert!(summary.sharpe_like < 0.0);
    }

    /// Scenario: No trades at all.
    /// Expected: All-zero summary with ending capital equal to initial.
    #[test]
    fn test_summary_empty() {
        let summary = compute_summary(&[], 500.0);
        assert_eq!(summary.trades, 0);
        assert_eq!(summary.win_rate, 0.0);
        assert_eq!(summary.sharpe_like, 0.0);
        assert!((summary.ending_capital - 500.0).abs() < 1e-12);
    }

    /// Scenario: Trade whose payout exactly equals its notional (break-even after costs).
    /// Expected: Counted as a win (payout >= notional).
    #[test]
    fn test_breakeven_counts_as_win() {
        let trades = vec![trade(-0.5, 100.0, 100.0, 0.6, 0)];
        let summary = compute_summary(&trades, 1_000.0);
        assert!((summary.win_rate - 1.0).abs() < 1e-12);
    }

    /// Scenario: Trades resolving in March and April 2024 (two in March).
    /// Expected: Two monthly rows in chronological order with summed pnl and counts.
    #[test]
    fn test_monthly_breakdown() {
        let march = 1_709_500_000_000; // 2024-03-03
        let april = 1_712_100_000_000; // 2024-04-03
        let trades = vec![
            trade(10.0, 100.0, 110.0, 0.8, march),
            trade(5.0, 50.0, 55.0, 0.8, march + 1_000_000),
            trade(-20.0, 100.0, 0.0, 0.7, april),
        ];
        let monthly = compute_monthly_breakdown(&trades);
        assert_eq!(monthly.len(), 2);
        assert_eq!((monthly[0].year, monthly[0].month), (2024, 3));
        assert!((monthly[0].pnl - 15.0).abs() < 1e-12);
        assert_eq!(monthly[0].count, 2);
        assert_eq!((monthly[1].year, monthly[1].month), (2024, 4));
        assert_eq!(monthly[1].count, 1);
    }

    /// Scenario: Predictions at 0.5, 0.6 (a bin edge), 0.61, 1.0, and 0.4 (out of range),
    /// bucketed into 5 bins over [0.5, 1.0].
    /// Expected: 0.5 and 0.6 land in the first bin (right-closed), 0.61 in the second,
    /// 1.0 in the last, and 0.4 is ignored.
    #[test]
    fn test_calibration_bin_edges() {
        let trades = vec![
            trade(1.0, 10.0, 11.0, 0.5, 0),
            trade(1.0, 10.0, 11.0, 0.6, 0),
            trade(1.0, 10.0, 0.0, 0.61, 0),
            trade(1.0, 10.0, 11.0, 1.0, 0),
            trade(1.0, 10.0, 11.0, 0.4, 0),
        ];
        let bins = compute_calibration(&trades, 5);
        assert_eq!(bins.len(), 5);
        assert_eq!(bins[0].count, 2);
        assert_eq!(bins[1].count, 1);
        assert_eq!(bins[4].count, 1);
        assert_eq!(bins[2].count, 0);
        assert!(bins[2].mean_prediction.is_nan());
        assert!((bins[0].lo - 0.5).abs() < 1e-12);
        assert!((bins[4].hi - 1.0).abs() < 1e-12);
        // Bin 1 holds the losing 0.61 trade: empirical 0.
        assert!((bins[1].empirical - 0.0).abs() < 1e-12);
        assert!((bins[0].empirical - 1.0).abs() < 1e-12);
    }

    /// Scenario: Two trades with q_hat 0.8: one wins, one loses.
    /// Expected: Brier = ((0.8-1)^2 + (0.8-0)^2) / 2 = 0.34.
    #[test]
    fn test_brier_score() {
        let trades = vec![
            trade(10.0, 10.0, 20.0, 0.8, 0),
            trade(-10.0, 10.0, 0.0, 0.8, 0),
        ];
        assert!((brier_score(&trades) - 0.34).abs() < 1e-12);
        assert_eq!(brier_score(&[]), 0.0);
    }
}
