use ratatui::prelude::*;
use ratatui::widgets::*;

use crate::types::{BacktestApp, Tab};

// ─── Colors ───

const BORDER: Style = Style::new().fg(Color::DarkGray);
const GREEN: Color = Color::Green;
const RED: Color = Color::Red;
const CYAN: Color = Color::Cyan;
const WHITE: Color = Color::White;
const GRAY: Color = Color::DarkGray;

fn pnl_color(pnl: f64) -> Color {
    if pnl > 0.0 {
        GREEN
    } else if pnl < 0.0 {
        RED
    } else {
        WHITE
    }
}

// ─── Main draw ───

pub fn draw(app: &BacktestApp, frame: &mut Frame) {
    let [header_area, tabs_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Min(10),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    render_header(app, header_area, frame.buffer_mut());
    render_tabs(app, tabs_area, frame.buffer_mut());
    render_footer(footer_area, frame.buffer_mut());

    match app.tab {
        Tab::Summary => render_summary(app, body_area, frame.buffer_mut()),
        Tab::Trades => render_trades(app, body_area, frame.buffer_mut()),
        Tab::Calibration => render_calibration(app, body_area, frame.buffer_mut()),
        Tab::Equity => render_equity(app, body_area, frame.buffer_mut()),
    }
}

// ─── Header ───

fn render_header(app: &BacktestApp, area: Rect, buf: &mut Buffer) {
    let pnl = app.summary.total_pnl;
    let text = format!(
        " BACKTEST | {} trades | PnL {:+.2} | WR {:.0}% | Brier {:.4} | Capital ${:.0} -> ${:.0}",
        app.summary.trades,
        pnl,
        app.summary.win_rate * 100.0,
        app.brier,
        app.initial_capital,
        app.ending_capital,
    );
    Paragraph::new(text)
        .style(Style::default().fg(Color::Black).bg(if pnl >= 0.0 { GREEN } else { RED }))
        .render(area, buf);
}

// ─── Tabs bar ───

fn render_tabs(app: &BacktestApp, area: Rect, buf: &mut Buffer) {
    let mut line_spans = Vec::new();
    for (i, tab) in Tab::all().iter().enumerate() {
        if i > 0 {
            line_spans.push(Span::styled(" | ", Style::default().fg(GRAY)));
        }
        let style = if *tab == app.tab {
            Style::default().fg(Color::Black).bg(CYAN).bold()
        } else {
            Style::default().fg(WHITE)
        };
        line_spans.push(Span::styled(format!(" {} ", tab.label()), style));
    }
    line_spans.push(Span::styled("   [Tab/1-4] switch  ", Style::default().fg(GRAY)));
    Paragraph::new(Line::from(line_spans)).render(area, buf);
}

// ─── Footer ───

fn render_footer(area: Rect, buf: &mut Buffer) {
    let text = " [Tab/1-4] Switch tab  [j/k] Scroll trades  [q/Esc] Quit";
    Paragraph::new(text)
        .style(Style::default().fg(Color::Black).bg(GRAY))
        .render(area, buf);
}

fn kv_line(label: &str, value: String, color: Color) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{:<22}", label), Style::default().fg(GRAY)),
        Span::styled(value, Style::default().fg(color)),
    ])
}

// ─── Tab 1: Summary ───

fn render_summary(app: &BacktestApp, area: Rect, buf: &mut Buffer) {
    let [stats_area, monthly_area] = Layout::horizontal([
        Constraint::Length(46),
        Constraint::Min(30),
    ])
    .areas(area);

    let s = &app.summary;
    let lines = vec![
        Line::from(""),
        kv_line("  Total PnL", format!("${:+.2}", s.total_pnl), pnl_color(s.total_pnl)),
        kv_line("  Total Notional", format!("${:.2}", s.total_notional), WHITE),
        kv_line("  Total Cost", format!("${:.2}", s.total_cost), WHITE),
        kv_line(
            "  Absolute Return",
            format!("{:+.2}%", s.absolute_return * 100.0),
            pnl_color(s.absolute_return),
        ),
        Line::from(""),
        kv_line(
            "  Win Rate",
            format!("{:.1}% ({}/{})", s.win_rate * 100.0, app.n_wins(), app.trades.len()),
            if s.win_rate >= 0.5 { GREEN } else { RED },
        ),
        kv_line("  Avg Return/Trade", format!("{:+.2}%", s.average_return * 100.0), pnl_color(s.average_return)),
        kv_line("  Sharpe-like", format!("{:.2}", s.sharpe_like), pnl_color(s.sharpe_like)),
        kv_line("  Max Drawdown", format!("${:.2}", app.max_drawdown()), RED),
        kv_line("  Brier Score", format!("{:.4}", app.brier), WHITE),
        Line::from(""),
        kv_line("  Candidates", format!("{}", app.n_candidates), WHITE),
        kv_line("  Executed", format!("{}", s.trades), WHITE),
        kv_line("  Avg Entry Spread", format!("{:.4}", app.avg_spread), WHITE),
        kv_line("  Ending Capital", format!("${:.2}", app.ending_capital), pnl_color(s.total_pnl)),
    ];
    Widget::render(
        Paragraph::new(lines)
            .block(Block::bordered().title("Performance Summary").border_style(BORDER)),
        stats_area,
        buf,
    );

    render_monthly(app, monthly_area, buf);
}

fn render_monthly(app: &BacktestApp, area: Rect, buf: &mut Buffer) {
    let rows: Vec<Row> = app
        .monthly
        .iter()
        .map(|m| {
            Row::new(vec![
                Cell::from(format!("{:04}-{:02}", m.year, m.month)),
                Cell::from(format!("{:+.2}", m.pnl)).style(Style::default().fg(pnl_color(m.pnl))),
                Cell::from(format!("{:.2}", m.notional)),
                Cell::from(format!("{}", m.count)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(9),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(7),
        ],
    )
    .header(Row::new(vec!["Month", "PnL", "Notional", "Count"]).style(Style::default().fg(CYAN)))
    .block(Block::bordered().title("Monthly PnL (by resolve)").border_style(BORDER));
    Widget::render(table, area, buf);
}

// ─── Tab 2: Trades ───

fn render_trades(app: &BacktestApp, area: Rect, buf: &mut Buffer) {
    let visible = area.height.saturating_sub(3) as usize;
    let rows: Vec<Row> = app
        .trades
        .iter()
        .skip(app.trade_scroll)
        .take(visible)
        .map(|t| {
            Row::new(vec![
                Cell::from(t.trade_id.clone()),
                Cell::from(t.condition_id.clone()),
                Cell::from(format!("{:.3}", t.price)),
                Cell::from(format!("{:.3}", t.execution_price)),
                Cell::from(format!("{:.1}", t.shares)),
                Cell::from(format!("{:.2}", t.notional)),
                Cell::from(format!("{:.3}", t.q_hat)),
                Cell::from(format!("{:.3}", t.q_lower)),
                Cell::from(format!("{:+.3}", t.ev_lower)),
                Cell::from(format!("{:.2}", t.total_cost)),
                Cell::from(format!("{:.2}", t.payout)),
                Cell::from(format!("{:+.2}", t.pnl)).style(Style::default().fg(pnl_color(t.pnl))),
            ])
        })
        .collect();

    let title = format!(
        "Trades ({}-{} of {})",
        app.trade_scroll + 1,
        (app.trade_scroll + visible).min(app.trades.len()),
        app.trades.len()
    );
    let table = Table::new(
        rows,
        [
            Constraint::Length(14),
            Constraint::Length(12),
            Constraint::Length(6),
            Constraint::Length(6),
            Constraint::Length(8),
            Constraint::Length(9),
            Constraint::Length(6),
            Constraint::Length(6),
            Constraint::Length(7),
            Constraint::Length(7),
            Constraint::Length(9),
            Constraint::Length(9),
        ],
    )
    .header(
        Row::new(vec![
            "Trade", "Market", "Px", "Exec", "Shares", "Notional", "qHat", "qLow", "EV", "Cost",
            "Payout", "PnL",
        ])
        .style(Style::default().fg(CYAN)),
    )
    .block(Block::bordered().title(title).border_style(BORDER));
    Widget::render(table, area, buf);
}

// ─── Tab 3: Calibration ───

fn render_calibration(app: &BacktestApp, area: Rect, buf: &mut Buffer) {
    let rows: Vec<Row> = app
        .calibration
        .iter()
        .map(|bin| {
            let (mean, empirical, gap) = if bin.count > 0 {
                (
                    format!("{:.3}", bin.mean_prediction),
                    format!("{:.3}", bin.empirical),
                    format!("{:+.3}", bin.empirical - bin.mean_prediction),
                )
            } else {
                ("-".to_string(), "-".to_string(), "-".to_string())
            };
            Row::new(vec![
                Cell::from(format!("({:.2}, {:.2}]", bin.lo, bin.hi)),
                Cell::from(mean),
                Cell::from(empirical),
                Cell::from(gap),
                Cell::from(format!("{}", bin.count)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(14),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(7),
        ],
    )
    .header(
        Row::new(vec!["Bin", "Predicted", "Realized", "Gap", "Count"])
            .style(Style::default().fg(CYAN)),
    )
    .block(
        Block::bordered()
            .title(format!("Calibration (Brier {:.4})", app.brier))
            .border_style(BORDER),
    );
    Widget::render(table, area, buf);
}

// ─── Tab 4: Equity ───

fn render_equity(app: &BacktestApp, area: Rect, buf: &mut Buffer) {
    let data = app.equity_points();
    let min_y = data.iter().map(|p| p.1).fold(f64::MAX, f64::min);
    let max_y = data.iter().map(|p| p.1).fold(f64::MIN, f64::max);
    let pad = ((max_y - min_y) * 0.05).max(1.0);

    let dataset = Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(if app.summary.total_pnl >= 0.0 { GREEN } else { RED }))
        .data(&data);

    let x_max = (data.len() as f64 - 1.0).max(1.0);
    let chart = Chart::new(vec![dataset])
        .block(Block::bordered().title("Equity Curve").border_style(BORDER))
        .x_axis(
            Axis::default()
                .bounds([0.0, x_max])
                .labels(vec!["start".into(), "end".to_string()])
                .style(Style::default().fg(GRAY)),
        )
        .y_axis(
            Axis::default()
                .bounds([min_y - pad, max_y + pad])
                .labels(vec![
                    format!("{:.0}", min_y - pad),
                    format!("{:.0}", max_y + pad),
                ])
                .style(Style::default().fg(GRAY)),
        );
    Widget::render(chart, area, buf);
}
