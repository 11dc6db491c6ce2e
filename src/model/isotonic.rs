//! Per-bucket isotonic probability calibration.
//!
//! Maps a raw market price to a calibrated win probability via
//! pool-adjacent-violators regression, fit separately per time-to-resolution
//! bucket, with a Jeffreys-prior lower credible bound from the training
//! points near the queried price.

use std::collections::HashMap;

use statrs::distribution::{Beta, ContinuousCDF};
use thiserror::Error;

use crate::types::TauBucket;

#[derive(Debug, Error, PartialEq)]
pub enum CalibrationError {
    #[error("no bucket produced a calibration model")]
    EmptyTrainingSet,
    #[error("transform called before fit")]
    NotFitted,
}

#[derive(Clone, Debug)]
pub struct CalibrationConfig {
    /// Quantile of the Beta posterior reported as the lower bound.
    pub alpha: f64,
    /// Base half-width of the price window used for the bound.
    pub neighborhood: f64,
    /// Minimum neighbors before the window stops expanding.
    pub min_count: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            neighborhood: 0.05,
            min_count: 2,
        }
    }
}

/// One training point: raw price and realized outcome (0 or 1).
#[derive(Clone, Copy, Debug)]
pub struct TrainingRow {
    pub price: f64,
    pub outcome: f64,
    pub bucket: TauBucket,
}

/// Calibrated output for one query row.
#[derive(Clone, Copy, Debug)]
pub struct Prediction {
    /// Mean calibrated win probability.
    pub q_hat: f64,
    /// Lower confidence bound, never above `q_hat`.
    pub q_lower: f64,
    /// Training neighbors within the base neighborhood of the query price.
    pub sample_count: usize,
}

// ─── Pool-adjacent-violators ───

/// Weighted isotonic regression via pool-adjacent-violators. Returns the
/// fitted nondecreasing sequence aligned with the input.
fn pav(y: &[f64], w: &[f64]) -> Vec<f64> {
    struct Block {
        value: f64,
        weight: f64,
        count: usize,
    }

    let mut blocks: Vec<Block> = Vec::with_capacity(y.len());
    for (&yi, &wi) in y.iter().zip(w) {
        blocks.push(Block { value: yi, weight: wi, count: 1 });
        // Merge backwards while the order constraint is violated.
        while blocks.len() >= 2 && blocks[blocks.len() - 2].value > blocks[blocks.len() - 1].value {
            let right = match blocks.pop() {
                Some(b) => b,
                None => break,
            };
            if let Some(left) = blocks.last_mut() {
                let total = left.weight + right.weight;
                left.value = (left.value * left.weight + right.value * right.weight) / total;
                left.weight = total;
                left.count += right.count;
            }
        }
    }

    let mut out = Vec::with_capacity(y.len());
    for block in &blocks {
        for _ in 0..block.count {
            out.push(block.value);
        }
    }
    out
}

// ─── Per-bucket model ───

/// Fitted step function for one bucket plus the raw training points kept
/// for the neighborhood query.
#[derive(Clone, Debug)]
struct BucketModel {
    prices: Vec<f64>,
    outcomes: Vec<f64>,
    xp: Vec<f64>,
    yp: Vec<f64>,
}

impl BucketModel {
    fn fit(mut pairs: Vec<(f64, f64)>) -> Self {
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        let prices: Vec<f64> = pairs.iter().map(|p| p.0).collect();
        let outcomes: Vec<f64> = pairs.iter().map(|p| p.1).collect();
        let weights = vec![1.0; outcomes.len()];
        let fitted = pav(&outcomes, &weights);

        // Collapse to one breakpoint per unique price (mean of fitted values).
        let mut xp: Vec<f64> = Vec::new();
        let mut yp: Vec<f64> = Vec::new();
        let mut i = 0;
        while i < prices.len() {
            let mut j = i + 1;
            while j < prices.len() && prices[j] == prices[i] {
                j += 1;
            }
            let mean = fitted[i..j].iter().sum::<f64>() / (j - i) as f64;
            xp.push(prices[i]);
            yp.push(mean);
            i = j;
        }

        Self { prices, outcomes, xp, yp }
    }

    /// Piecewise-linear interpolation over (xp, yp), clamped to the
    /// endpoint values outside the fitted range.
    fn predict_mean(&self, price: f64) -> f64 {
        let first = self.xp[0];
        let last = self.xp[self.xp.len() - 1];
        if price <= first {
            return self.yp[0];
        }
        if price >= last {
            return self.yp[self.yp.len() - 1];
        }
        let idx = self.xp.partition_point(|&x| x < price);
        let (x0, x1) = (self.xp[idx - 1], self.xp[idx]);
        let (y0, y1) = (self.yp[idx - 1], self.yp[idx]);
        y0 + (y1 - y0) * (price - x0) / (x1 - x0)
    }

    fn neighbors_within(&self, price: f64, window: f64) -> usize {
        self.prices.iter().filter(|&&p| (p - price).abs() <= window).count()
    }
}

// ─── Calibrator ───

pub struct IsotonicCalibrator {
    config: CalibrationConfig,
    models: HashMap<TauBucket, BucketModel>,
}

impl IsotonicCalibrator {
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            config,
            models: HashMap::new(),
        }
    }

    /// Fit one bucket model per nonempty tau bucket.
    pub fn fit(&mut self, rows: &[TrainingRow]) -> Result<(), CalibrationError> {
        let mut by_bucket: HashMap<TauBucket, Vec<(f64, f64)>> = HashMap::new();
        for row in rows {
            by_bucket.entry(row.bucket).or_default().push((row.price, row.outcome));
        }
        for (bucket, pairs) in by_bucket {
            if pairs.is_empty() {
                continue;
            }
            self.models.insert(bucket, BucketModel::fit(pairs));
        }
        if self.models.is_empty() {
            return Err(CalibrationError::EmptyTrainingSet);
        }
        Ok(())
    }

    /// Calibrate each (price, bucket) query. A row whose bucket has no
    /// model yields `None`; the engine treats that as a skip.
    pub fn transform(
        &self,
        rows: &[(f64, TauBucket)],
    ) -> Result<Vec<Option<Prediction>>, CalibrationError> {
        if self.models.is_empty() {
            return Err(CalibrationError::NotFitted);
        }

        let mut out = Vec::with_capacity(rows.len());
        for &(price, bucket) in rows {
            let model = match self.models.get(&bucket) {
                Some(m) => m,
                None => {
                    out.push(None);
                    continue;
                }
            };
            let mean = model.predict_mean(price);
            let prediction = match self.lower_bound(model, price) {
                Some(lb) => Prediction {
                    q_hat: mean,
                    q_lower: lb.min(mean),
                    sample_count: model.neighbors_within(price, self.config.neighborhood),
                },
                // No usable neighborhood: fall back to the mean with an
                // empty sample so downstream gating stays conservative.
                None => Prediction {
                    q_hat: mean,
                    q_lower: mean,
                    sample_count: 0,
                },
            };
            out.push(Some(prediction));
        }
        Ok(out)
    }

    /// Jeffreys lower credible bound from the training points near `price`.
    /// The window starts at `neighborhood` and grows 1.5x until it holds
    /// `min_count` points or reaches 0.1.
    fn lower_bound(&self, model: &BucketModel, price: f64) -> Option<f64> {
        let mut window = self.config.neighborhood;
        let mut count = model.neighbors_within(price, window);
        while count < self.config.min_count && window < 0.1 {
            window *= 1.5;
            count = model.neighbors_within(price, window);
        }
        if count == 0 {
            return None;
        }

        let successes: f64 = model
            .prices
            .iter()
            .zip(&model.outcomes)
            .filter(|(&p, _)| (p - price).abs() <= window)
            .map(|(_, &o)| o)
            .sum();
        let failures = count as f64 - successes;
        let posterior = Beta::new(successes + 0.5, failures + 0.5).ok()?;
        Some(posterior.inverse_cdf(self.config.alpha))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_weights(n: usize) -> Vec<f64> {
        vec![1.0; n]
    }

    fn rows(pairs: &[(f64, f64)], bucket: TauBucket) -> Vec<TrainingRow> {
        pairs
            .iter()
            .map(|&(price, outcome)| TrainingRow { price, outcome, bucket })
            .collect()
    }

    /// Scenario: PAV on [3,1,2] with unit weights (single violation then a flat tail).
    /// Expected: All three values pool to the block mean 2.
    #[test]
    fn test_pav_pools_violation() {
        let fitted = pav(&[3.0, 1.0, 2.0], &unit_weights(3));
        assert_eq!(fitted, vec![2.0, 2.0, 2.0]);
    }

    /// Scenario: PAV on an already nondecreasing sequence [1,2,3].
    /// Expected: Output is unchanged.
    #[test]
    fn test_pav_identity_on_sorted() {
        let fitted = pav(&[1.0, 2.0, 3.0], &unit_weights(3));
        assert_eq!(fitted, vec![1.0, 2.0, 3.0]);
    }

    /// Scenario: PAV on the fully reversed sequence [4,3,2,1].
    /// Expected: Everything pools into one block at the global mean 2.5.
    #[test]
    fn test_pav_fully_reversed() {
        let fitted = pav(&[4.0, 3.0, 2.0, 1.0], &unit_weights(4));
        assert_eq!(fitted, vec![2.5, 2.5, 2.5, 2.5]);
    }

    /// Scenario: PAV with unequal weights: value 0 with weight 3 after value 1 with weight 1.
    /// Expected: Pooled value is the weighted mean (1*1 + 0*3)/4 = 0.25.
    #[test]
    fn test_pav_weighted_merge() {
        let fitted = pav(&[1.0, 0.0], &[1.0, 3.0]);
        assert_eq!(fitted, vec![0.25, 0.25]);
    }

    /// Scenario: 20 training prices in [0.8, 0.99] with outcome 1 iff price > 0.9, one bucket.
    /// Expected: Transforming the training prices yields a nondecreasing q_hat sequence.
    #[test]
    fn test_monotonic_q_hat() {
        let n = 20;
        let pairs: Vec<(f64, f64)> = (0..n)
            .map(|i| {
                let price = 0.8 + 0.19 * i as f64 / (n - 1) as f64;
                (price, if price > 0.9 { 1.0 } else { 0.0 })
            })
            .collect();
        let mut calibrator = IsotonicCalibrator::new(CalibrationConfig::default());
        calibrator.fit(&rows(&pairs, TauBucket::D1to3)).unwrap();

        let queries: Vec<(f64, TauBucket)> =
            pairs.iter().map(|&(p, _)| (p, TauBucket::D1to3)).collect();
        let preds = calibrator.transform(&queries).unwrap();

        let mut prev = f64::NEG_INFINITY;
        for pred in preds {
            let pred = pred.expect("bucket was fitted");
            assert!(pred.q_hat >= prev - 1e-8, "q_hat must be nondecreasing");
            assert!(pred.q_lower <= pred.q_hat + 1e-12, "bound ordering");
            prev = pred.q_hat;
        }
    }

    /// Scenario: Fit called with an empty training slice.
    /// Expected: EmptyTrainingSet error.
    #[test]
    fn test_fit_empty_errors() {
        let mut calibrator = IsotonicCalibrator::new(CalibrationConfig::default());
        assert_eq!(calibrator.fit(&[]), Err(CalibrationError::EmptyTrainingSet));
    }

    /// Scenario: Transform called before any successful fit.
    /// Expected: NotFitted error.
    #[test]
    fn test_transform_before_fit_errors() {
        let calibrator = IsotonicCalibrator::new(CalibrationConfig::default());
        let err = calibrator.transform(&[(0.5, TauBucket::D0to1)]).unwrap_err();
        assert_eq!(err, CalibrationError::NotFitted);
    }

    /// Scenario: Model fitted only for the 1-3d bucket, queried with a 7-30d row.
    /// Expected: The mismatched row yields None; a matching row yields a prediction.
    #[test]
    fn test_bucket_miss_yields_none() {
        let mut calibrator = IsotonicCalibrator::new(CalibrationConfig::default());
        calibrator
            .fit(&rows(&[(0.4, 0.0), (0.6, 1.0)], TauBucket::D1to3))
            .unwrap();
        let preds = calibrator
            .transform(&[(0.5, TauBucket::D7to30), (0.5, TauBucket::D1to3)])
            .unwrap();
        assert!(preds[0].is_none());
        assert!(preds[1].is_some());
    }

    /// Scenario: Queries below and above the fitted price range.
    /// Expected: q_hat clamps to the endpoint fitted values.
    #[test]
    fn test_interpolation_clamps_at_endpoints() {
        let mut calibrator = IsotonicCalibrator::new(CalibrationConfig::default());
        calibrator
            .fit(&rows(&[(0.4, 0.0), (0.5, 0.0), (0.6, 1.0), (0.7, 1.0)], TauBucket::D0to1))
            .unwrap();
        let preds = calibrator
            .transform(&[(0.1, TauBucket::D0to1), (0.95, TauBucket::D0to1)])
            .unwrap();
        let low = preds[0].unwrap();
        let high = preds[1].unwrap();
        assert!((low.q_hat - 0.0).abs() < 1e-12);
        assert!((high.q_hat - 1.0).abs() < 1e-12);
    }

    /// Scenario: Two training points at the identical price 0.5 with outcomes 0 and 1.
    /// Expected: Breakpoints collapse to a single (0.5, 0.5) entry; q_hat is 0.5 everywhere.
    #[test]
    fn test_duplicate_prices_collapse() {
        let mut calibrator = IsotonicCalibrator::new(CalibrationConfig::default());
        calibrator
            .fit(&rows(&[(0.5, 0.0), (0.5, 1.0)], TauBucket::D0to1))
            .unwrap();
        let preds = calibrator
            .transform(&[(0.3, TauBucket::D0to1), (0.5, TauBucket::D0to1), (0.8, TauBucket::D0to1)])
            .unwrap();
        for pred in preds {
            assert!((pred.unwrap().q_hat - 0.5).abs() < 1e-12);
        }
    }

    /// Scenario: Training points at 0.5 and 0.58; query at 0.5 with base neighborhood 0.05.
    /// Expected: Window expands (0.05 -> 0.075 -> 0.1125) until both points are in; the
    /// reported sample_count still uses the base window, so it stays 1.
    #[test]
    fn test_neighborhood_expansion() {
        let mut calibrator = IsotonicCalibrator::new(CalibrationConfig::default());
        calibrator
            .fit(&rows(&[(0.5, 1.0), (0.58, 1.0)], TauBucket::D0to1))
            .unwrap();
        let pred = calibrator.transform(&[(0.5, TauBucket::D0to1)]).unwrap()[0].unwrap();
        assert_eq!(pred.sample_count, 1);
        assert!(pred.q_lower > 0.0 && pred.q_lower < 1.0);
        assert!(pred.q_lower <= pred.q_hat);
    }

    /// Scenario: All training points clustered at 0.9; query at 0.5, far outside any window.
    /// Expected: No neighbors even after expansion -> q_lower falls back to q_hat, sample_count 0.
    #[test]
    fn test_no_neighbors_falls_back_to_mean() {
        let mut calibrator = IsotonicCalibrator::new(CalibrationConfig::default());
        calibrator
            .fit(&rows(&[(0.9, 1.0), (0.91, 1.0), (0.92, 0.0)], TauBucket::D0to1))
            .unwrap();
        let pred = calibrator.transform(&[(0.5, TauBucket::D0to1)]).unwrap()[0].unwrap();
        assert_eq!(pred.sample_count, 0);
        assert!((pred.q_lower - pred.q_hat).abs() < 1e-12);
    }

    /// Scenario: Jeffreys bound with all-success neighborhoods of growing size (2 vs 6 wins).
    /// Expected: The bound stays strictly inside (0,1), sits below the fitted mean of 1,
    /// and tightens upward as evidence accumulates.
    #[test]
    fn test_lower_bound_tightens_with_evidence() {
        let small: Vec<(f64, f64)> = (0..2).map(|i| (0.6 + 0.01 * i as f64, 1.0)).collect();
        let large: Vec<(f64, f64)> = (0..6).map(|i| (0.6 + 0.01 * i as f64, 1.0)).collect();

        let mut cal_small = IsotonicCalibrator::new(CalibrationConfig::default());
        cal_small.fit(&rows(&small, TauBucket::D0to1)).unwrap();
        let mut cal_large = IsotonicCalibrator::new(CalibrationConfig::default());
        cal_large.fit(&rows(&large, TauBucket::D0to1)).unwrap();

        let lb_small = cal_small.transform(&[(0.6, TauBucket::D0to1)]).unwrap()[0]
            .unwrap()
            .q_lower;
        let lb_large = cal_large.transform(&[(0.6, TauBucket::D0to1)]).unwrap()[0]
            .unwrap()
            .q_lower;

        assert!(lb_small > 0.0 && lb_small < 1.0);
        assert!(lb_large > 0.0 && lb_large < 1.0);
        assert!(lb_large > lb_small, "more wins should raise the bound");
    }

    /// Scenario: Balanced neighborhood (two wins, two losses) around price 0.5.
    /// Expected: The 5% Jeffreys bound sits well below the empirical rate 0.5.
    #[test]
    fn test_lower_bound_below_empirical_rate() {
        let mut calibrator = IsotonicCalibrator::new(CalibrationConfig::default());
        calibrator
            .fit(&rows(
                &[(0.48, 0.0), (0.49, 1.0), (0.51, 0.0), (0.52, 1.0)],
                TauBucket::D0to1,
            ))
            .unwrap();
        let pred = calibrator.transform(&[(0.5, TauBucket::D0to1)]).unwrap()[0].unwrap();
        assert!(pred.q_lower < 0.5);
        assert_eq!(pred.sample_count, 4);
    }
}
