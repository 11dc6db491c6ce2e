//! Gamma market metadata loader. The fixture mirrors the shape of
//! `GET https://gamma-api.polymarket.com/markets`.

use std::path::Path;

use serde::Deserialize;

use crate::ingest::{parse_ts_ms, IngestError};
use crate::types::Market;

#[derive(Debug, Deserialize)]
struct RawMarket {
    condition_id: Option<String>,
    slug: Option<String>,
    category: Option<String>,
    end_date: Option<String>,
    clob_token_yes: Option<String>,
    clob_token_no: Option<String>,
    neg_risk_group: Option<String>,
}

fn parse_markets(content: &str, path: &str) -> Result<Vec<Market>, IngestError> {
    let raw: Vec<RawMarket> = serde_json::from_str(content).map_err(|source| IngestError::Json {
        path: path.to_string(),
        source,
    })?;

    let mut markets: Vec<Market> = raw
        .into_iter()
        .filter_map(|entry| {
            // A market without an id or end date cannot anchor any trade.
            let condition_id = entry.condition_id?;
            let end_date_ms = parse_ts_ms(&entry.end_date?)?;
            Some(Market {
                condition_id,
                slug: entry.slug.unwrap_or_default(),
                category: entry.category,
                end_date_ms,
                clob_token_yes: entry.clob_token_yes.unwrap_or_default(),
                clob_token_no: entry.clob_token_no,
                neg_risk_group: entry.neg_risk_group,
            })
        })
        .collect();
    markets.sort_by_key(|m| m.end_date_ms);
    Ok(markets)
}

pub fn load_gamma_markets(path: &Path) -> Result<Vec<Market>, IngestError> {
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|source| IngestError::Io {
        path: display.clone(),
        source,
    })?;
    parse_markets(&content, &display)
}
