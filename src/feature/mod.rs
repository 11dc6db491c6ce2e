//! Feature pipeline: label attachment with the look-ahead cut, market
//! metadata join, tau-bucket assignment, level-1 book features, and a
//! backward as-of momentum join.

use std::collections::HashMap;

use thiserror::Error;

use crate::types::{
    BookLookup, BookRow, BookSnapshot, FeatureRow, Market, Outcome, PricePoint, Resolution,
    TauBucket, Trade,
};

const DAY_MS: f64 = 86_400_000.0;
const HOUR_MS: f64 = 3_600_000.0;

#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    #[error("missing resolution for condition {0}")]
    MissingResolution(String),
    #[error("missing market metadata for condition {0}")]
    MissingMarket(String),
    #[error("missing order book snapshot for token {token_id} at {ts_ms}")]
    MissingBookCoverage { token_id: String, ts_ms: i64 },
}

#[derive(Clone, Debug)]
pub struct LabelConfig {
    /// Trades closer than this to their resolve time are dropped before
    /// labels attach, so labels never leak into near-resolution prints.
    pub time_cut_hours: f64,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self { time_cut_hours: 4.0 }
    }
}

/// A trade with its resolution attached.
#[derive(Clone, Debug)]
pub struct LabeledTrade {
    pub trade_id: String,
    pub token_id: String,
    pub condition_id: String,
    pub ts_ms: i64,
    pub price: f64,
    pub size: f64,
    pub outcome: Outcome,
    pub resolve_ts_ms: i64,
}

/// Attach resolution outcomes to each trade, dropping any trade inside the
/// look-ahead cut window. Output is sorted by timestamp (stable).
pub fn attach_labels(
    trades: &[Trade],
    resolutions: &[Resolution],
    config: &LabelConfig,
) -> Result<Vec<LabeledTrade>, FeatureError> {
    let by_condition: HashMap<&str, &Resolution> = resolutions
        .iter()
        .map(|r| (r.condition_id.as_str(), r))
        .collect();

    let cut_ms = (config.time_cut_hours * HOUR_MS) as i64;
    let mut labeled = Vec::with_capacity(trades.len());
    for trade in trades {
        let resolution = by_condition
            .get(trade.condition_id.as_str())
            .ok_or_else(|| FeatureError::MissingResolution(trade.condition_id.clone()))?;
        if trade.ts_ms > resolution.resolve_ts_ms - cut_ms {
            continue;
        }
        labeled.push(LabeledTrade {
            trade_id: trade.trade_id.clone(),
            token_id: trade.token_id.clone(),
            condition_id: trade.condition_id.clone(),
            ts_ms: trade.ts_ms,
            price: trade.price,
            size: trade.size,
            outcome: resolution.outcome,
            resolve_ts_ms: resolution.resolve_ts_ms,
        });
    }
    labeled.sort_by_key(|t| t.ts_ms);
    Ok(labeled)
}

/// Group flat book rows into snapshots keyed by (token_id, ts_ms).
pub fn build_book_lookup(rows: &[BookRow]) -> BookLookup {
    let mut lookup = BookLookup::new();
    for row in rows {
        let snapshot = lookup
            .entry((row.token_id.clone(), row.ts_ms))
            .or_insert_with(BookSnapshot::default);
        snapshot.levels.push(crate::types::BookLevel {
            side: row.side,
            level: row.level,
            price: row.price,
            size: row.size,
        });
    }
    lookup
}

/// Join market metadata and book/price features onto labeled trades,
/// producing the candidate rows the engine consumes. Rows whose market has
/// already passed its end date are dropped. Output is sorted by timestamp
/// (stable, so same-timestamp rows keep input order).
pub fn compute_features(
    labeled: &[LabeledTrade],
    markets: &[Market],
    books: &[BookRow],
    prices: &[PricePoint],
) -> Result<Vec<FeatureRow>, FeatureError> {
    let market_by_condition: HashMap<&str, &Market> =
        markets.iter().map(|m| (m.condition_id.as_str(), m)).collect();
    let lookup = build_book_lookup(books);

    // Price history per token, sorted by time, for the backward as-of join.
    let mut history: HashMap<&str, Vec<(i64, f64)>> = HashMap::new();
    for point in prices {
        history
            .entry(point.token_id.as_str())
            .or_default()
            .push((point.ts_ms, point.price));
    }
    for series in history.values_mut() {
        series.sort_by_key(|&(ts, _)| ts);
    }

    let mut out = Vec::with_capacity(labeled.len());
    for trade in labeled {
        let market = market_by_condition
            .get(trade.condition_id.as_str())
            .ok_or_else(|| FeatureError::MissingMarket(trade.condition_id.clone()))?;

        let time_to_event_days = (market.end_date_ms - trade.ts_ms) as f64 / DAY_MS;
        if time_to_event_days <= 0.0 {
            continue;
        }

        let key = (trade.token_id.clone(), trade.ts_ms);
        let snapshot = lookup
            .get(&key)
            .ok_or_else(|| FeatureError::MissingBookCoverage {
                token_id: trade.token_id.clone(),
                ts_ms: trade.ts_ms,
            })?;
        let best_ask = snapshot
            .best_ask()
            .ok_or_else(|| FeatureError::MissingBookCoverage {
                token_id: trade.token_id.clone(),
                ts_ms: trade.ts_ms,
            })?;
        let best_bid = snapshot
            .best_bid()
            .ok_or_else(|| FeatureError::MissingBookCoverage {
                token_id: trade.token_id.clone(),
                ts_ms: trade.ts_ms,
            })?;
        let ask_depth = snapshot.ask_depth();
        let bid_depth: f64 = snapshot.bids().map(|l| l.size).sum();

        let midpoint = (best_ask + best_bid) / 2.0;
        // Latest strictly earlier print for the same token; a fresh token
        // falls back to just under the midpoint.
        let prev_price = history
            .get(trade.token_id.as_str())
            .and_then(|series| {
                let idx = series.partition_point(|&(ts, _)| ts < trade.ts_ms);
                if idx == 0 {
                    None
                } else {
                    Some(series[idx - 1].1)
                }
            })
            .unwrap_or(midpoint - 0.01);

        out.push(FeatureRow {
            trade_id: trade.trade_id.clone(),
            token_id: trade.token_id.clone(),
            condition_id: trade.condition_id.clone(),
            ts_ms: trade.ts_ms,
            resolve_ts_ms: trade.resolve_ts_ms,
            price: trade.price,
            size: trade.size,
            outcome: trade.outcome,
            time_to_event_days,
            tau_bucket: TauBucket::from_days(time_to_event_days),
            best_ask,
            best_bid,
            spread: best_ask - best_bid,
            ask_depth,
            bid_depth,
            prev_price,
            price_change: trade.price - prev_price,
            category: market.category.clone(),
            neg_risk_group: market.neg_risk_group.clone(),
            slug: market.slug.clone(),
        });
    }
    out.sort_by_key(|r| r.ts_ms);
    Ok(out)
}
