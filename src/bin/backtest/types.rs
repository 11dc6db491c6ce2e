use polymarket_backtest::report::{CalibrationBin, MonthlyPnl, Summary};
use polymarket_backtest::types::{CapitalPoint, TradeResult};

// ─── Active tab in the TUI ───

#[derive(Clone, Copy, PartialEq)]
pub enum Tab {
    Summary,
    Trades,
    Calibration,
    Equity,
}

impl Tab {
    pub fn all() -> &'static [Tab] {
        &[Tab::Summary, Tab::Trades, Tab::Calibration, Tab::Equity]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tab::Summary => "Summary",
            Tab::Trades => "Trades",
            Tab::Calibration => "Calibration",
            Tab::Equity => "Equity",
        }
    }

    pub fn next(&self) -> Tab {
        let tabs = Self::all();
        let idx = tabs.iter().position(|t| t == self).unwrap_or(0);
        tabs[(idx + 1) % tabs.len()]
    }

    pub fn prev(&self) -> Tab {
        let tabs = Self::all();
        let idx = tabs.iter().position(|t| t == self).unwrap_or(0);
        tabs[(idx + tabs.len() - 1) % tabs.len()]
    }
}

// ─── App state ───

pub struct BacktestApp {
    pub tab: Tab,
    pub trades: Vec<TradeResult>,
    pub capital_history: Vec<CapitalPoint>,
    pub summary: Summary,
    pub monthly: Vec<MonthlyPnl>,
    pub calibration: Vec<CalibrationBin>,
    pub brier: f64,
    pub initial_capital: f64,
    pub ending_capital: f64,
    pub n_candidates: usize,
    pub avg_spread: f64,

    pub trade_scroll: usize,
}

impl BacktestApp {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        trades: Vec<TradeResult>,
        capital_history: Vec<CapitalPoint>,
        summary: Summary,
        monthly: Vec<MonthlyPnl>,
        calibration: Vec<CalibrationBin>,
        brier: f64,
        initial_capital: f64,
        ending_capital: f64,
        n_candidates: usize,
        avg_spread: f64,
    ) -> Self {
        Self {
            tab: Tab::Summary,
            trades,
            capital_history,
            summary,
            monthly,
            calibration,
            brier,
            initial_capital,
            ending_capital,
            n_candidates,
            avg_spread,
            trade_scroll: 0,
        }
    }

    pub fn n_wins(&self) -> usize {
        self.trades.iter().filter(|t| t.won()).count()
    }

    pub fn n_losses(&self) -> usize {
        self.trades.len() - self.n_wins()
    }

    /// Largest peak-to-trough fall of the capital trajectory.
    pub fn max_drawdown(&self) -> f64 {
        let mut peak = self.initial_capital;
        let mut max_dd = 0.0f64;
        for point in &self.capital_history {
            peak = peak.max(point.capital);
            max_dd = max_dd.max(peak - point.capital);
        }
        max_dd
    }

    /// Equity curve as (index, capital) points, starting at the initial
    /// capital so an empty run still draws a flat line.
    pub fn equity_points(&self) -> Vec<(f64, f64)> {
        let mut points = Vec::with_capacity(self.capital_history.len() + 1);
        points.push((0.0, self.initial_capital));
        for (i, point) in self.capital_history.iter().enumerate() {
            points.push(((i + 1) as f64, point.capital));
        }
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polymarket_backtest::types::Stamp;

    fn app_with_history(capitals: &[f64]) -> BacktestApp {
        let history = capitals
            .iter()
            .enumerate()
            .map(|(i, &capital)| CapitalPoint {
                stamp: Stamp::Event(i as i64),
                capital,
            })
            .collect();
        BacktestApp::new(
            vec![],
            history,
            Summary::default(),
            vec![],
            vec![],
            0.0,
            100.0,
            100.0,
            0,
            0.0,
        )
    }

    /// Scenario: Capital path 100 -> 120 -> 90 -> 110.
    /// Expected: Max drawdown is the 120 -> 90 fall = 30.
    #[test]
    fn test_max_drawdown() {
        let app = app_with_history(&[120.0, 90.0, 110.0]);
        assert!((app.max_drawdown() - 30.0).abs() < 1e-12);
    }

    /// Scenario: Empty capital history.
    /// Expected: Zero drawdown and a single starting equity point.
    #[test]
    fn test_empty_history() {
        let app = app_with_history(&[]);
        assert_eq!(app.max_drawdown(), 0.0);
        assert_eq!(app.equity_points(), vec![(0.0, 100.0)]);
    }

    /// Scenario: Tab cycling forward and backward across all four tabs.
    /// Expected: next() and prev() wrap around.
    #[test]
    fn test_tab_cycling() {
        assert!(Tab::Summary.next() == Tab::Trades);
        assert!(Tab::Equity.next() == Tab::Summary);
        assert!(Tab::Summary.prev() == Tab::Equity);
    }
}
