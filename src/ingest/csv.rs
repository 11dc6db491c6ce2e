//! Hand-rolled CSV parsers for the fixture tables. Columns are located by
//! header name, so column order in the export does not matter; malformed
//! data rows are skipped.

use std::path::Path;

use crate::ingest::{parse_ts_ms, IngestError};
use crate::types::{BookRow, BookSide, Outcome, PricePoint, Resolution, Trade};

/// Resolve each requested column name to its index in the header line.
fn header_indices(
    header: &str,
    file: &str,
    columns: &[&str],
) -> Result<Vec<usize>, IngestError> {
    let names: Vec<&str> = header.split(',').map(|s| s.trim()).collect();
    columns
        .iter()
        .map(|column| {
            names
                .iter()
                .position(|name| name == column)
                .ok_or_else(|| IngestError::MissingColumn {
                    file: file.to_string(),
                    column: column.to_string(),
                })
        })
        .collect()
}

fn read(path: &Path) -> Result<(String, String), IngestError> {
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|source| IngestError::Io {
        path: display.clone(),
        source,
    })?;
    Ok((content, display))
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

// ─── Resolutions ───

fn parse_resolutions(content: &str, file: &str) -> Result<Vec<Resolution>, IngestError> {
    let mut lines = content.lines();
    let header = lines.next().unwrap_or_default();
    let idx = header_indices(
        header,
        file,
        &["condition_id", "resolved_outcome", "resolve_ts", "dispute_flag"],
    )?;

    let mut rows: Vec<Resolution> = lines
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(',').collect();
            let get = |i: usize| fields.get(idx[i]).map(|s| s.trim());
            Some(Resolution {
                condition_id: get(0)?.to_string(),
                outcome: Outcome::from_label(get(1)?)?,
                resolve_ts_ms: parse_ts_ms(get(2)?)?,
                dispute_flag: parse_bool(get(3)?),
            })
        })
        .collect();
    rows.sort_by_key(|r| r.resolve_ts_ms);
    Ok(rows)
}

pub fn load_resolutions(path: &Path) -> Result<Vec<Resolution>, IngestError> {
    let (content, display) = read(path)?;
    parse_resolutions(&content, &display)
}

// ─── Trades ───

fn parse_trades(content: &str, file: &str) -> Result<Vec<Trade>, IngestError> {
    let mut lines = content.lines();
    let header = lines.next().unwrap_or_default();
    let idx = header_indices(
        header,
        file,
        &["trade_id", "token_id", "condition_id", "timestamp", "price", "size"],
    )?;

    let mut rows: Vec<Trade> = lines
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(',').collect();
            let get = |i: usize| fields.get(idx[i]).map(|s| s.trim());
            let price: f64 = get(4)?.parse().ok()?;
            if !(0.0..=1.0).contains(&price) {
                return None;
            }
            Some(Trade {
                trade_id: get(0)?.to_string(),
                token_id: get(1)?.to_string(),
                condition_id: get(2)?.to_string(),
                ts_ms: parse_ts_ms(get(3)?)?,
                price,
                size: get(5)?.parse().ok()?,
            })
        })
        .collect();
    rows.sort_by_key(|t| t.ts_ms);
    Ok(rows)
}

pub fn load_trades(path: &Path) -> Result<Vec<Trade>, IngestError> {
    let (content, display) = read(path)?;
    parse_trades(&content, &display)
}

// ─── Books ───

fn parse_books(content: &str, file: &str) -> Result<Vec<BookRow>, IngestError> {
    let mut lines = content.lines();
    let header = lines.next().unwrap_or_default();
    let idx = header_indices(
        header,
        file,
        &["token_id", "timestamp", "side", "level", "price", "size"],
    )?;

    let mut rows: Vec<BookRow> = lines
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(',').collect();
            let get = |i: usize| fields.get(idx[i]).map(|s| s.trim());
            let level: u32 = get(3)?.parse().ok()?;
            if level < 1 {
                return None;
            }
            Some(BookRow {
                token_id: get(0)?.to_string(),
                ts_ms: parse_ts_ms(get(1)?)?,
                side: BookSide::from_label(get(2)?)?,
                level,
                price: get(4)?.parse().ok()?,
                size: get(5)?.parse().ok()?,
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        (&a.token_id, a.ts_ms, a.side as u8, a.level)
            .cmp(&(&b.token_id, b.ts_ms, b.side as u8, b.level))
    });
    Ok(rows)
}

pub fn load_books(path: &Path) -> Result<Vec<BookRow>, IngestError> {
    let (content, display) = read(path)?;
    parse_books(&content, &display)
}

// ─── Prices ───

fn parse_prices(content: &str, file: &str) -> Result<Vec<PricePoint>, IngestError> {
    let mut lines = content.lines();
    let header = lines.next().unwrap_or_default();
    let idx = header_indices(header, file, &["token_id", "timestamp", "price"])?;

    let mut rows: Vec<PricePoint> = lines
        .filter_map(|line| {
            let fields: Vec<&str> = line.split(',').collect();
            let get = |i: usize| fields.get(idx[i]).map(|s| s.trim());
            Some(PricePoint {
                token_id: get(0)?.to_string(),
                ts_ms: parse_ts_ms(get(1)?)?,
                price: get(2)?.parse().ok()?,
            })
        })
        .collect();
    rows.sort_by(|a, b| (&a.token_id, a.ts_ms).cmp(&(&b.token_id, b.ts_ms)));
    Ok(rows)
}

pub fn load_prices(path: &Path) -> Result<Vec<PricePoint>, IngestError> {
    let (content, display) = read(path)?;
    parse_prices(&content, &display)
}
