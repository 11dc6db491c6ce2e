use crate::engine::backtest::BacktestConfig;
use crate::engine::cost::CostModel;
use crate::engine::risk::RiskConfig;
use crate::feature::LabelConfig;
use crate::model::isotonic::CalibrationConfig;

/// Backtest configuration loaded from environment variables.
#[derive(Clone, Debug)]
pub struct Config {
    // Engine
    pub initial_capital: f64,
    pub min_ev: f64,

    // Cost model
    pub taker_fee: f64,
    pub gas_cost: f64,
    pub borrow_rate: f64,

    // Risk
    pub kelly_lambda: f64,
    pub max_fraction: f64,
    pub category_cap: f64,
    pub neg_risk_cap: f64,
    pub market_cap: f64,

    // Calibration
    pub calib_alpha: f64,
    pub calib_neighborhood: f64,
    pub calib_min_count: usize,

    // Labels
    pub time_cut_hours: f64,
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            initial_capital: env_f64("INITIAL_CAPITAL", 100_000.0),
            min_ev: env_f64("MIN_EV", 0.0),
            taker_fee: env_f64("TAKER_FEE", 0.0),
            gas_cost: env_f64("GAS_COST", 0.25),
            borrow_rate: env_f64("BORROW_RATE", 0.05),
            kelly_lambda: env_f64("KELLY_LAMBDA", 0.4),
            max_fraction: env_f64("MAX_KELLY_FRACTION", 0.25),
            category_cap: env_f64("CATEGORY_CAP", 0.4),
            neg_risk_cap: env_f64("NEG_RISK_CAP", 0.4),
            market_cap: env_f64("MARKET_CAP", 0.5),
            calib_alpha: env_f64("CALIB_ALPHA", 0.05),
            calib_neighborhood: env_f64("CALIB_NEIGHBORHOOD", 0.05),
            calib_min_count: env_usize("CALIB_MIN_COUNT", 2),
            time_cut_hours: env_f64("TIME_CUT_HOURS", 4.0),
        }
    }

    pub fn cost_model(&self) -> CostModel {
        CostModel::new(self.taker_fee, self.gas_cost, self.borrow_rate)
    }

    pub fn risk(&self) -> RiskConfig {
        RiskConfig {
            kelly_lambda: self.kelly_lambda,
            max_fraction: self.max_fraction,
            category_cap: self.category_cap,
            neg_risk_cap: self.neg_risk_cap,
            market_cap: self.market_cap,
        }
    }

    pub fn calibration(&self) -> CalibrationConfig {
        CalibrationConfig {
            alpha: self.calib_alpha,
            neighborhood: self.calib_neighborhood,
            min_count: self.calib_min_count,
        }
    }

    pub fn backtest(&self) -> BacktestConfig {
        BacktestConfig {
            initial_capital: self.initial_capital,
            min_ev: self.min_ev,
        }
    }

    pub fn labels(&self) -> LabelConfig {
        LabelConfig {
            time_cut_hours: self.time_cut_hours,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            min_ev: 0.0,
            taker_fee: 0.0,
            gas_cost: 0.25,
            borrow_rate: 0.05,
            kelly_lambda: 0.4,
            max_fraction: 0.25,
            category_cap: 0.4,
            neg_risk_cap: 0.4,
            market_cap: 0.5,
            calib_alpha: 0.05,
            calib_neighborhood: 0.05,
            calib_min_count: 2,
            time_cut_hours: 4.0,
        }
    }
}
