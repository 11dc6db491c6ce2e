//! Aggregate fixture bundle plus the fallbacks applied when a bundle has
//! no archived book snapshots or price history.

use std::path::Path;

use crate::ingest::csv::{load_books, load_prices, load_resolutions, load_trades};
use crate::ingest::markets::load_gamma_markets;
use crate::ingest::IngestError;
use crate::types::{BookRow, BookSide, Market, PricePoint, Resolution, Trade};

/// Container holding all inputs required by the backtest.
pub struct DataBundle {
    pub markets: Vec<Market>,
    pub resolutions: Vec<Resolution>,
    pub trades: Vec<Trade>,
    pub books: Vec<BookRow>,
    pub prices: Vec<PricePoint>,
}

/// Load the canonical fixtures from a data directory. Markets, resolutions
/// and trades are required; books and prices fall back to empty when their
/// files are absent (the run substitutes synthetic data for them).
pub fn load_local_bundle(dir: &Path) -> Result<DataBundle, IngestError> {
    let markets = load_gamma_markets(&dir.join("gamma_markets_sample.json"))?;
    let resolutions = load_resolutions(&dir.join("subgraph_resolutions.csv"))?;
    let trades = load_trades(&dir.join("dataapi_trades.csv"))?;

    let books_path = dir.join("clob_books.csv");
    let books = if books_path.exists() {
        load_books(&books_path)?
    } else {
        Vec::new()
    };
    let prices_path = dir.join("prices_history.csv");
    let prices = if prices_path.exists() {
        load_prices(&prices_path)?
    } else {
        Vec::new()
    };

    Ok(DataBundle {
        markets,
        resolutions,
        trades,
        books,
        prices,
    })
}

/// Fabricate a conservative book around each trade print: asks above and
/// bids below at a 1% (floor 0.002) tick, with depth decaying 25% per
/// level down to a 25% floor. Used only when no snapshots were archived.
pub fn synthesise_books(trades: &[Trade], levels: u32) -> Vec<BookRow> {
    let mut rows = Vec::with_capacity(trades.len() * levels as usize * 2);
    for trade in trades {
        let size = if trade.size > 0.0 { trade.size } else { 1.0 };
        let tick = (trade.price * 0.01).max(0.002);
        for level in 1..=levels {
            let offset = tick * level as f64;
            let depth = (size * (1.0 - 0.25 * (level - 1) as f64)).max(size * 0.25);
            rows.push(BookRow {
                token_id: trade.token_id.clone(),
                ts_ms: trade.ts_ms,
                side: BookSide::Ask,
                level,
                price: (trade.price + offset).min(0.999),
                size: depth,
            });
            rows.push(BookRow {
                token_id: trade.token_id.clone(),
                ts_ms: trade.ts_ms,
                side: BookSide::Bid,
                level,
                price: (trade.price - offset).max(0.001),
                size: depth,
            });
        }
    }
    rows.sort_by(|a, b| {
        (&a.token_id, a.ts_ms, a.side as u8, a.level)
            .cmp(&(&b.token_id, b.ts_ms, b.side as u8, b.level))
    });
    rows
}

/// The bundle's books, or a synthetic ladder derived from its trades.
pub fn ensure_books(bundle: &DataBundle) -> Vec<BookRow> {
    if !bundle.books.is_empty() {
        return bundle.books.clone();
    }
    synthesise_books(&bundle.trades, 3)
}

/// The bundle's price history, or one projected from its trade prints.
pub fn ensure_prices(bundle: &DataBundle) -> Vec<PricePoint> {
    if !bundle.prices.is_empty() {
        return bundle.prices.clone();
    }
    bundle
        .trades
        .iter()
        .map(|t| PricePoint {
            token_id: t.token_id.clone(),
            ts_ms: t.ts_ms,
            price: t.price,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(price: f64, size: f64) -> Trade {
        Trade {
            trade_id: "t1".to_string(),
            token_id: "tok1".to_string(),
            condition_id: "m1".to_string(),
            ts_ms: 1_000,
            price,
            size,
        }
    }

    /// Scenario: Synthetic book for one mid-priced trade with 3 levels.
    /// Expected: Level 1 exists on both sides, asks ascend and bids descend from the
    /// print, and depth decays 25% per level.
    #[test]
    fn test_synthesise_books_ladder() {
        let rows = synthesise_books(&[trade(0.50, 100.0)], 3);
        assert_eq!(rows.len(), 6);

        let asks: Vec<&BookRow> = rows.iter().filter(|r| r.side == BookSide::Ask).collect();
        let bids: Vec<&BookRow> = rows.iter().filter(|r| r.side == BookSide::Bid).collect();
        assert_eq!(asks.len(), 3);
        assert_eq!(bids.len(), 3);
        assert_eq!(asks[0].level, 1);
        assert_eq!(bids[0].level, 1);

        let tick = 0.005; // 1% of 0.50
        assert!((asks[0].price - 0.505).abs() < 1e-12);
        assert!((asks[2].price - (0.50 + 3.0 * tick)).abs() < 1e-12);
        assert!((bids[0].price - 0.495).abs() < 1e-12);
        assert!((asks[0].size - 100.0).abs() < 1e-12);
        assert!((asks[1].size - 75.0).abs() < 1e-12);
        assert!((asks[2].size - 50.0).abs() < 1e-12);
    }

    /// Scenario: Synthetic book for a print at 0.998, one tick from the price ceiling.
    /// Expected: Ask prices clamp at 0.999 and bids stay above 0.001.
    #[test]
    fn test_synthesise_books_clamps_extremes() {
        let rows = synthesise_books(&[trade(0.998, 10.0)], 3);
        for row in rows.iter().filter(|r| r.side == BookSide::Ask) {
            assert!(row.price <= 0.999);
        }
        for row in rows.iter().filter(|r| r.side == BookSide::Bid) {
            assert!(row.price >= 0.001);
        }
    }

    /// Scenario: Trade with zero recorded size.
    /// Expected: The ladder substitutes a unit size instead of an empty book.
    #[test]
    fn test_synthesise_books_zero_size() {
        let rows = synthesise_books(&[trade(0.5, 0.0)], 1);
        assert!((rows[0].size - 1.0).abs() < 1e-12);
    }

    /// Scenario: Bundle with no price history but two trades.
    /// Expected: ensure_prices projects token/timestamp/price from the trades.
    #[test]
    fn test_ensure_prices_fallback() {
        let bundle = DataBundle {
            markets: vec![],
            resolutions: vec![],
            trades: vec![trade(0.40, 5.0), trade(0.60, 5.0)],
            books: vec![],
            prices: vec![],
        };
        let prices = ensure_prices(&bundle);
        assert_eq!(prices.len(), 2);
        assert!((prices[0].price - 0.40).abs() < 1e-12);

        let books = ensure_books(&bundle);
        assert!(!books.is_empty());
    }
}
