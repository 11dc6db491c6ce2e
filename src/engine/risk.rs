//! Kelly sizing and the per-axis exposure ledger.
//!
//! Exposure is tracked on three axes: category, neg-risk group, and market.
//! Each axis caps open notional at a fraction of current capital; absent
//! keys impose no cap.

use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct RiskConfig {
    /// Fractional-Kelly multiplier applied to the raw edge.
    pub kelly_lambda: f64,
    /// Hard cap on the Kelly fraction.
    pub max_fraction: f64,
    pub category_cap: f64,
    pub neg_risk_cap: f64,
    pub market_cap: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            kelly_lambda: 0.4,
            max_fraction: 0.25,
            category_cap: 0.4,
            neg_risk_cap: 0.4,
            market_cap: 0.5,
        }
    }
}

pub struct RiskManager {
    config: RiskConfig,
    category_exposure: HashMap<String, f64>,
    neg_risk_exposure: HashMap<String, f64>,
    market_exposure: HashMap<String, f64>,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            category_exposure: HashMap::new(),
            neg_risk_exposure: HashMap::new(),
            market_exposure: HashMap::new(),
        }
    }

    /// Scaled Kelly fraction for a calibrated win probability against the
    /// quoted price. Zero when there is no edge or the price is degenerate.
    pub fn kelly_fraction(&self, q_hat: f64, price: f64) -> f64 {
        let edge = q_hat - price;
        if edge <= 0.0 || price >= 1.0 {
            return 0.0;
        }
        let raw = edge / (1.0 - price);
        (self.config.kelly_lambda * raw).clamp(0.0, self.config.max_fraction)
    }

    /// Notional still available under every applicable exposure cap.
    pub fn available_notional(
        &self,
        capital: f64,
        category: Option<&str>,
        neg_risk_group: Option<&str>,
        market: &str,
    ) -> f64 {
        let mut available = capital;
        if let Some(category) = category {
            let used = self.category_exposure.get(category).copied().unwrap_or(0.0);
            available = available.min((self.config.category_cap * capital - used).max(0.0));
        }
        if let Some(group) = neg_risk_group {
            let used = self.neg_risk_exposure.get(group).copied().unwrap_or(0.0);
            available = available.min((self.config.neg_risk_cap * capital - used).max(0.0));
        }
        let used = self.market_exposure.get(market).copied().unwrap_or(0.0);
        available = available.min((self.config.market_cap * capital - used).max(0.0));
        available.max(0.0)
    }

    /// Add `notional` to every present axis.
    pub fn register_position(
        &mut self,
        category: Option<&str>,
        neg_risk_group: Option<&str>,
        market: &str,
        notional: f64,
    ) {
        if let Some(category) = category {
            *self.category_exposure.entry(category.to_string()).or_insert(0.0) += notional;
        }
        if let Some(group) = neg_risk_group {
            *self.neg_risk_exposure.entry(group.to_string()).or_insert(0.0) += notional;
        }
        *self.market_exposure.entry(market.to_string()).or_insert(0.0) += notional;
    }

    /// Subtract `notional` from every present axis, clamping at zero so
    /// numerical drift never drives an axis negative.
    pub fn release_position(
        &mut self,
        category: Option<&str>,
        neg_risk_group: Option<&str>,
        market: &str,
        notional: f64,
    ) {
        if let Some(category) = category {
            if let Some(v) = self.category_exposure.get_mut(category) {
                *v = (*v - notional).max(0.0);
            }
        }
        if let Some(group) = neg_risk_group {
            if let Some(v) = self.neg_risk_exposure.get_mut(group) {
                *v = (*v - notional).max(0.0);
            }
        }
        if let Some(v) = self.market_exposure.get_mut(market) {
            *v = (*v - notional).max(0.0);
        }
    }

    pub fn category_exposure(&self, category: &str) -> f64 {
        self.category_exposure.get(category).copied().unwrap_or(0.0)
    }

    pub fn neg_risk_exposure(&self, group: &str) -> f64 {
        self.neg_risk_exposure.get(group).copied().unwrap_or(0.0)
    }

    pub fn market_exposure(&self, market: &str) -> f64 {
        self.market_exposure.get(market).copied().unwrap_or(0.0)
    }
}
