use std::path::Path;

use crate::ingest::decode::decode_csv_line;
use crate::models::Trade;
use crate::Result;

/// Outcome of parsing a trade history file
#[derive(Debug, Clone, Default)]
pub struct LoadedTrades {
    pub trades: Vec<Trade>,
    pub rejected: usize,
    /// The file listed newest first and was re-sorted
    pub reversed: bool,
}

/// Read a `timestamp,price,amount` trade history file
pub fn load_trades_csv(path: impl AsRef<Path>) -> Result<LoadedTrades> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let loaded = parse_trades_csv(&text);

    tracing::info!(
        path = %path.display(),
        trades = loaded.trades.len(),
        rejected = loaded.rejected,
        reversed = loaded.reversed,
        "Loaded trade history"
    );

    Ok(loaded)
}

/// Parse trade history text.
///
/// A first line whose timestamp column is not an integer is taken as the
/// header. Malformed lines are logged and skipped. The result is always in
/// ascending timestamp order; equal timestamps keep file order.
pub fn parse_trades_csv(text: &str) -> LoadedTrades {
    let mut loaded = LoadedTrades::default();

    for (i, line) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line_no == 1 && is_header(line) {
            continue;
        }

        match decode_csv_line(line, line_no) {
            Ok(trade) => loaded.trades.push(trade),
            Err(e) => {
                loaded.rejected += 1;
                tracing::warn!(line = line_no, error = %e, "Skipping malformed trade line");
            }
        }
    }

    if let (Some(first), Some(last)) = (loaded.trades.first(), loaded.trades.last()) {
        if first.timestamp > last.timestamp {
            loaded.reversed = true;
            loaded.trades.reverse();
        }
    }
    // Local disorder
    loaded.trades.sort_by_key(|t| t.timestamp);

    loaded
}

fn is_header(line: &str) -> bool {
    line.split(',')
        .next()
        .map(|c| c.trim().parse::<i64>().is_err())
        .unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_header_skipped_and_fields_parsed() {
        let loaded = parse_trades_csv("timestamp,price,amount\n100,250.5,0.2\n160,251,1\n");
        assert_eq!(loaded.trades.len(), 2);
        assert_eq!(loaded.rejected, 0);
        assert_eq!(loaded.trades[0].timestamp, 100);
        assert_eq!(loaded.trades[0].price, Decimal::from_str("250.5").unwrap());
        assert_eq!(loaded.trades[1].amount, Decimal::ONE);
    }

    #[test]
    fn test_file_without_header_keeps_first_trade() {
        let loaded = parse_trades_csv("100,250,1\n101,251,1\n");
        assert_eq!(loaded.trades.len(), 2);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let loaded = parse_trades_csv("ts,price,amount\n100,abc,1\n101,250\n102,250,1\n");
        assert_eq!(loaded.trades.len(), 1);
        assert_eq!(loaded.rejected, 2);
        assert_eq!(loaded.trades[0].timestamp, 102);
    }

    #[test]
    fn test_reversed_file_sorted_ascending() {
        let loaded = parse_trades_csv("ts,price,amount\n300,3,1\n200,2,1\n100,1,1\n");
        assert!(loaded.reversed);
        let stamps: Vec<i64> = loaded.trades.iter().map(|t| t.timestamp).collect();
        assert_eq!(stamps, vec![100, 200, 300]);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        assert!(load_trades_csv("/nonexistent/trades.csv").is_err());
    }
}
