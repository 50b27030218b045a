use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggressor side of a venue trade, when the venue reports it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

/// A single executed trade as reported by the venue
///
/// Immutable once received. `amount` is always non-negative; the venue's
/// signed amount is folded into `side`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trade {
    pub id: String,
    pub timestamp: i64, // unix seconds
    pub price: Decimal,
    pub amount: Decimal,
    pub side: Option<TradeSide>,
}

/// OHLCV aggregate of every trade in `[start_time, end_time)`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    pub start_time: i64,
    pub end_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub trade_count: u64,
}

impl Candle {
    /// An empty candle for the bucket starting at `start_time`.
    /// The end saturates at `i64::MAX`; callers that care use [`Candle::try_empty`].
    pub fn empty(start_time: i64, duration_secs: i64) -> Self {
        Self {
            start_time,
            end_time: start_time.saturating_add(duration_secs),
            open: Decimal::ZERO,
            high: Decimal::ZERO,
            low: Decimal::ZERO,
            close: Decimal::ZERO,
            volume: Decimal::ZERO,
            trade_count: 0,
        }
    }

    /// An empty candle, or `None` if its end is not representable
    pub fn try_empty(start_time: i64, duration_secs: i64) -> Option<Self> {
        start_time
            .checked_add(duration_secs)
            .map(|_| Self::empty(start_time, duration_secs))
    }

    /// Whether `timestamp` falls inside this candle's half-open interval
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start_time && timestamp < self.end_time
    }

    pub fn is_empty(&self) -> bool {
        self.trade_count == 0
    }

    /// Merge a trade into the candle. The caller guarantees the trade lies
    /// in the bucket and arrives in feed order.
    pub fn merge(&mut self, trade: &Trade) {
        if self.trade_count == 0 {
            self.open = trade.price;
            self.high = trade.price;
            self.low = trade.price;
        } else {
            self.high = self.high.max(trade.price);
            self.low = self.low.min(trade.price);
        }
        self.close = trade.price;
        self.volume += trade.amount;
        self.trade_count += 1;
    }

    pub fn duration_secs(&self) -> i64 {
        self.end_time - self.start_time
    }
}

/// Output of a [`crate::strategy::SignalEvaluator`] for one candle window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Enter,
    Exit,
    Hold,
}

/// The single live position of a trading session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum PositionState {
    #[default]
    NoPosition,
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Book-keeping entry appended on every executed entry or exit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeRecord {
    /// Ordinal of the candle that triggered the order (0-based)
    pub index: usize,
    pub price: Decimal,
    pub size: Decimal,
    pub side: OrderSide,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn trade(ts: i64, price: &str, amount: &str) -> Trade {
        Trade {
            id: ts.to_string(),
            timestamp: ts,
            price: Decimal::from_str(price).unwrap(),
            amount: Decimal::from_str(amount).unwrap(),
            side: None,
        }
    }

    #[test]
    fn test_empty_candle_interval() {
        let candle = Candle::empty(600, 300);
        assert_eq!(candle.end_time, 900);
        assert_eq!(candle.duration_secs(), 300);
        assert!(candle.is_empty());
        assert!(candle.contains(600));
        assert!(candle.contains(899));
        assert!(!candle.contains(900));
    }

    #[test]
    fn test_empty_candle_at_end_of_time() {
        let candle = Candle::empty(i64::MAX - 10, 60);
        assert_eq!(candle.end_time, i64::MAX);
        assert!(Candle::try_empty(i64::MAX - 10, 60).is_none());
        assert!(Candle::try_empty(i64::MAX - 60, 60).is_some());
    }

    #[test]
    fn test_merge_tracks_ohlcv() {
        let mut candle = Candle::empty(0, 60);
        candle.merge(&trade(1, "100", "1"));
        candle.merge(&trade(2, "105.5", "0.5"));
        candle.merge(&trade(3, "98", "2"));
        candle.merge(&trade(4, "101", "0.25"));

        assert_eq!(candle.open, Decimal::from(100));
        assert_eq!(candle.high, Decimal::from_str("105.5").unwrap());
        assert_eq!(candle.low, Decimal::from(98));
        assert_eq!(candle.close, Decimal::from(101));
        assert_eq!(candle.volume, Decimal::from_str("3.75").unwrap());
        assert_eq!(candle.trade_count, 4);
    }

    #[test]
    fn test_default_position_state() {
        assert_eq!(PositionState::default(), PositionState::NoPosition);
    }
}
