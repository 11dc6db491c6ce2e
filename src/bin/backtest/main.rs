//! Backtest runner: loads a fixture directory, attaches labels, computes
//! candidate features, runs the walk-forward engine, and presents the
//! results as an interactive dashboard or a stdout report.
//!
//! Usage: cargo run --bin backtest -- [--dump] [--initial-capital X] [--min-ev X] <data_dir>
//!
//! The data_dir must contain gamma_markets_sample.json,
//! subgraph_resolutions.csv and dataapi_trades.csv; clob_books.csv and
//! prices_history.csv are optional (synthetic fallbacks cover them).
//!
//! Keys:
//!   [Tab/1-4] Switch tab  [j/k] Scroll trades  [q/Esc] Quit

mod render;
mod types;

use std::io::{self, stdout};
use std::path::Path;
use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event as CEvent, KeyCode, KeyEvent},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;

use polymarket_backtest::config::Config;
use polymarket_backtest::engine::backtest::{BacktestEngine, BacktestResult};
use polymarket_backtest::engine::risk::RiskManager;
use polymarket_backtest::feature::{attach_labels, build_book_lookup, compute_features};
use polymarket_backtest::ingest::bundle::{ensure_books, ensure_prices, load_local_bundle};
use polymarket_backtest::report::{
    brier_score, compute_calibration, compute_monthly_breakdown, compute_summary,
};
use polymarket_backtest::types::FeatureRow;

use crate::types::{BacktestApp, Tab};

/// Single walk-forward split at the midpoint of the candidate timeline.
/// Requires at least two distinct timestamps.
fn build_splits(features: &[FeatureRow]) -> Option<Vec<(i64, i64)>> {
    let mut timeline: Vec<i64> = features.iter().map(|r| r.ts_ms).collect();
    timeline.sort_unstable();
    timeline.dedup();
    if timeline.len() < 2 {
        return None;
    }
    let start = timeline[0];
    let end = timeline[timeline.len() - 1];
    let midpoint = start + (end - start) / 2;
    Some(vec![(midpoint, end)])
}

fn run_pipeline(data_dir: &str, config: &Config) -> Result<(BacktestResult, Vec<FeatureRow>), String> {
    let bundle = load_local_bundle(Path::new(data_dir)).map_err(|e| e.to_string())?;
    eprintln!(
        "[LOAD] {} markets, {} resolutions, {} trades, {} book rows, {} price points",
        bundle.markets.len(),
        bundle.resolutions.len(),
        bundle.trades.len(),
        bundle.books.len(),
        bundle.prices.len(),
    );

    let books = ensure_books(&bundle);
    let prices = ensure_prices(&bundle);
    if bundle.books.is_empty() {
        eprintln!("[LOAD] no archived books, synthesized {} rows", books.len());
    }

    let labeled = attach_labels(&bundle.trades, &bundle.resolutions, &config.labels())
        .map_err(|e| e.to_string())?;
    let features = compute_features(&labeled, &bundle.markets, &books, &prices)
        .map_err(|e| e.to_string())?;
    if features.is_empty() {
        return Err("no candidate rows after labeling; verify the fixtures".to_string());
    }
    eprintln!("[FEATURE] {} candidate rows", features.len());

    let splits = build_splits(&features)
        .ok_or_else(|| "not enough distinct timestamps for a walk-forward split".to_string())?;

    let mut engine = BacktestEngine::new(
        config.cost_model(),
        RiskManager::new(config.risk()),
        config.backtest(),
        config.calibration(),
        build_book_lookup(&books),
    );
    let result = engine.run(&features, &splits).map_err(|e| e.to_string())?;
    eprintln!(
        "[BT] {} trades executed | ending capital ${:.2}",
        result.executed_trades.len(),
        result.ending_capital,
    );
    Ok((result, features))
}

fn handle_key(app: &mut BacktestApp, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return true,

        KeyCode::Tab => app.tab = app.tab.next(),
        KeyCode::BackTab => app.tab = app.tab.prev(),
        KeyCode::Char('1') => app.tab = Tab::Summary,
        KeyCode::Char('2') => app.tab = Tab::Trades,
        KeyCode::Char('3') => app.tab = Tab::Calibration,
        KeyCode::Char('4') => app.tab = Tab::Equity,

        KeyCode::Char('j') | KeyCode::Down => {
            if app.tab == Tab::Trades && app.trade_scroll + 1 < app.trades.len() {
                app.trade_scroll += 1;
            }
        }
        KeyCode::Char('k') | KeyCode::Up => {
            if app.tab == Tab::Trades {
                app.trade_scroll = app.trade_scroll.saturating_sub(1);
            }
        }
        KeyCode::Home => app.trade_scroll = 0,
        KeyCode::End => app.trade_scroll = app.trades.len().saturating_sub(1),

        _ => {}
    }
    false
}

// ─── Dump mode: print full results to stdout (no TUI) ───

fn print_dump(app: &BacktestApp) {
    println!("╔══════════════════════════════════════════════════════════════════════╗");
    println!("║  BACKTEST RESULTS                                                    ║");
    println!("╚══════════════════════════════════════════════════════════════════════╝");
    println!();

    let s = &app.summary;
    println!("─── SUMMARY ───────────────────────────────────────────────────────────");
    println!("  Initial Capital  ${:.2}", app.initial_capital);
    println!("  Ending Capital   ${:.2}", app.ending_capital);
    println!("  Total PnL        ${:+.2}", s.total_pnl);
    println!("  Total Notional   ${:.2}", s.total_notional);
    println!("  Total Cost       ${:.2}", s.total_cost);
    println!("  Absolute Return  {:+.2}%", s.absolute_return * 100.0);
    println!("  Win Rate         {:.1}% ({}/{})", s.win_rate * 100.0, app.n_wins(), app.trades.len());
    println!("  Avg Return       {:+.2}%", s.average_return * 100.0);
    println!("  Sharpe-like      {:.2}", s.sharpe_like);
    println!("  Max Drawdown     ${:.2}", app.max_drawdown());
    println!("  Brier Score      {:.4}", app.brier);
    println!("  Candidates       {}", app.n_candidates);
    println!();

    println!("─── MONTHLY PNL (BY RESOLVE) ──────────────────────────────────────────");
    println!("{:<9} {:>12} {:>12} {:>7}", "Month", "PnL", "Notional", "Count");
    for m in &app.monthly {
        println!(
            "{:04}-{:02}   {:>+12.2} {:>12.2} {:>7}",
            m.year, m.month, m.pnl, m.notional, m.count
        );
    }
    println!();

    println!("─── CALIBRATION ───────────────────────────────────────────────────────");
    println!("{:<14} {:>10} {:>10} {:>7}", "Bin", "Predicted", "Realized", "Count");
    for bin in &app.calibration {
        if bin.count > 0 {
            println!(
                "({:.2}, {:.2}]   {:>10.3} {:>10.3} {:>7}",
                bin.lo, bin.hi, bin.mean_prediction, bin.empirical, bin.count
            );
        } else {
            println!("({:.2}, {:.2}]   {:>10} {:>10} {:>7}", bin.lo, bin.hi, "-", "-", 0);
        }
    }
    println!();

    println!("─── TRADES ────────────────────────────────────────────────────────────");
    println!(
        "{:<14} {:<10} {:>6} {:>6} {:>8} {:>9} {:>6} {:>6} {:>7} {:>8} {:>9}",
        "Trade", "Market", "Px", "Exec", "Shares", "Notional", "qHat", "qLow", "Cost", "Payout", "PnL"
    );
    for t in &app.trades {
        println!(
            "{:<14} {:<10} {:>6.3} {:>6.3} {:>8.1} {:>9.2} {:>6.3} {:>6.3} {:>7.2} {:>8.2} {:>+9.2}",
            t.trade_id, t.condition_id, t.price, t.execution_price, t.shares, t.notional,
            t.q_hat, t.q_lower, t.total_cost, t.payout, t.pnl
        );
    }
    println!();

    // ── Equity curve (text sparkline) ──
    println!("─── EQUITY CURVE ──────────────────────────────────────────────────────");
    let points = app.equity_points();
    let max_c = points.iter().map(|p| p.1).fold(f64::MIN, f64::max);
    let min_c = points.iter().map(|p| p.1).fold(f64::MAX, f64::min);
    let range = (max_c - min_c).max(1.0);
    let bars = [' ', '\u{2581}', '\u{2582}', '\u{2583}', '\u{2584}', '\u{2585}', '\u{2586}', '\u{2587}', '\u{2588}'];
    let curve: String = points
        .iter()
        .map(|&(_, capital)| {
            let normalized = ((capital - min_c) / range * 8.0).round() as usize;
            bars[normalized.min(8)]
        })
        .collect();
    println!("  ${:>12.2} max", max_c);
    println!("  |{}|", curve);
    println!("  ${:>12.2} min", min_c);
    println!();
}

fn main() -> io::Result<()> {
    let _ = dotenvy::dotenv();
    let args: Vec<String> = std::env::args().collect();

    let dump_mode = args.iter().any(|a| a == "--dump");
    let flag_value = |name: &str| -> Option<f64> {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
            .and_then(|v| v.parse().ok())
    };

    let mut skip_next = false;
    let data_dir = args
        .iter()
        .skip(1)
        .find(|a| {
            if skip_next {
                skip_next = false;
                return false;
            }
            if *a == "--initial-capital" || *a == "--min-ev" {
                skip_next = true;
                return false;
            }
            !a.starts_with("--")
        })
        .cloned();

    let data_dir = match data_dir {
        Some(d) => d,
        None => {
            eprintln!("Usage: backtest [--dump] [--initial-capital X] [--min-ev X] <data_dir>");
            eprintln!("  e.g. cargo run --bin backtest -- data/");
            eprintln!("  --dump  Print results to stdout instead of the TUI");
            std::process::exit(1);
        }
    };

    let mut config = Config::from_env();
    if let Some(capital) = flag_value("--initial-capital") {
        config.initial_capital = capital;
    }
    if let Some(min_ev) = flag_value("--min-ev") {
        config.min_ev = min_ev;
    }

    let (result, features) = match run_pipeline(&data_dir, &config) {
        Ok(v) => v,
        Err(message) => {
            eprintln!("Backtest failed: {message}");
            std::process::exit(1);
        }
    };

    let summary = compute_summary(&result.executed_trades, config.initial_capital);
    let monthly = compute_monthly_breakdown(&result.executed_trades);
    let calibration = compute_calibration(&result.executed_trades, 5);
    let brier = brier_score(&result.executed_trades);
    let avg_spread = if features.is_empty() {
        0.0
    } else {
        features.iter().map(|r| r.spread).sum::<f64>() / features.len() as f64
    };

    let app = BacktestApp::new(
        result.executed_trades,
        result.capital_history,
        summary,
        monthly,
        calibration,
        brier,
        config.initial_capital,
        result.ending_capital,
        features.len(),
        avg_spread,
    );

    if dump_mode {
        print_dump(&app);
        return Ok(());
    }

    eprintln!("Starting TUI...");

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    let mut app = app;

    loop {
        terminal.draw(|frame| render::draw(&app, frame))?;

        let timeout = tick_rate.checked_sub(last_tick.elapsed()).unwrap_or(Duration::ZERO);

        if crossterm::event::poll(timeout)? {
            if let CEvent::Key(key) = event::read()? {
                if handle_key(&mut app, key) {
                    break;
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    Ok(())
}
