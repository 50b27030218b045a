// Trade-to-candle aggregation: bucket state, clock-driven closing, backfill replay
pub mod actor;
pub mod backfill;

pub use actor::{spawn_aggregator, spawn_clock, Clock, ManualClock, SystemClock};
pub use backfill::BackfillStats;

use std::sync::Arc;

use crate::bus::CandleBus;
use crate::error::TraderError;
use crate::models::{Candle, Trade};
use crate::Result;

/// What happened to a trade handed to [`CandleAggregator::ingest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Merged,
    /// The trade's bucket had already closed
    DroppedLate,
    /// No representable bucket can hold the trade's timestamp
    DroppedOutOfRange,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatorStats {
    pub merged: u64,
    pub late_dropped: u64,
    pub out_of_range: u64,
    pub published: u64,
    pub empty_skipped: u64,
}

/// Round `timestamp` down to a multiple of `duration_secs`
pub fn align_down(timestamp: i64, duration_secs: i64) -> i64 {
    timestamp - timestamp.rem_euclid(duration_secs)
}

/// Buckets trades into fixed-duration candles over half-open intervals
/// `[start, start + duration)`.
///
/// Owns the single in-progress candle. Buckets are contiguous: each new
/// bucket starts exactly at the previous bucket's end, however many empty
/// intervals are skipped. Empty buckets are never published.
pub struct CandleAggregator {
    duration_secs: i64,
    current: Candle,
    bus: Arc<CandleBus>,
    stats: AggregatorStats,
    backfilled: bool,
}

impl CandleAggregator {
    /// Create an aggregator whose first bucket starts at `start`
    pub fn new(duration_secs: i64, start: i64, bus: Arc<CandleBus>) -> Result<Self> {
        if duration_secs <= 0 {
            return Err(TraderError::InvalidArgument(format!(
                "bucket duration must be positive, got {}",
                duration_secs
            )));
        }

        Ok(Self {
            duration_secs,
            current: Candle::empty(start, duration_secs),
            bus,
            stats: AggregatorStats::default(),
            backfilled: false,
        })
    }

    /// Create an aggregator whose first bucket is the aligned bucket containing `now`
    pub fn starting_at(duration_secs: i64, now: i64, bus: Arc<CandleBus>) -> Result<Self> {
        if duration_secs <= 0 {
            return Err(TraderError::InvalidArgument(format!(
                "bucket duration must be positive, got {}",
                duration_secs
            )));
        }
        Self::new(duration_secs, align_down(now, duration_secs), bus)
    }

    pub fn duration_secs(&self) -> i64 {
        self.duration_secs
    }

    pub fn current_start(&self) -> i64 {
        self.current.start_time
    }

    pub fn current_end(&self) -> i64 {
        self.current.end_time
    }

    /// Copy of the in-progress candle
    pub fn current_candle(&self) -> Candle {
        self.current.clone()
    }

    pub fn stats(&self) -> &AggregatorStats {
        &self.stats
    }

    /// Merge a trade into its bucket.
    ///
    /// Trades older than the open bucket are dropped. Trades at or past the
    /// open bucket's end first close it (and any empty buckets in between).
    pub fn ingest(&mut self, trade: &Trade) -> IngestOutcome {
        if trade.timestamp < self.current.start_time {
            self.stats.late_dropped += 1;
            tracing::debug!(
                id = %trade.id,
                timestamp = trade.timestamp,
                bucket_start = self.current.start_time,
                "Dropping late trade"
            );
            return IngestOutcome::DroppedLate;
        }

        if trade.timestamp >= self.current.end_time {
            self.advance(trade.timestamp);
        }

        if !self.current.contains(trade.timestamp) {
            self.stats.out_of_range += 1;
            tracing::warn!(
                id = %trade.id,
                timestamp = trade.timestamp,
                bucket_start = self.current.start_time,
                "Dropping trade with unrepresentable bucket"
            );
            return IngestOutcome::DroppedOutOfRange;
        }

        self.current.merge(trade);
        self.stats.merged += 1;
        IngestOutcome::Merged
    }

    /// Close every bucket that ended at or before `now`.
    ///
    /// Returns the number of candles published. Leaves the open bucket in
    /// place if the bucket containing `now` would end past `i64::MAX`.
    pub fn advance(&mut self, now: i64) -> usize {
        let d = self.duration_secs;
        let mut published = 0;

        while now >= self.current.end_time {
            let next_start = self.current.end_time;

            // Whole empty intervals between the closed bucket and `now`
            let skipped = now.checked_sub(next_start).map(|gap| gap / d);
            let open = skipped.and_then(|n| {
                n.checked_mul(d)
                    .and_then(|offset| next_start.checked_add(offset))
                    .and_then(|start| Candle::try_empty(start, d))
            });
            let (Some(skipped), Some(open)) = (skipped, open) else {
                tracing::error!(
                    now,
                    bucket_start = self.current.start_time,
                    "Cannot advance past the representable time range"
                );
                break;
            };

            let closed = std::mem::replace(&mut self.current, open);
            if closed.is_empty() {
                self.stats.empty_skipped += 1;
                tracing::debug!(start = closed.start_time, "Bucket was empty");
            } else {
                self.publish(&closed);
                published += 1;
            }
            self.stats.empty_skipped += skipped as u64;
        }

        published
    }

    fn publish(&mut self, candle: &Candle) {
        tracing::debug!(
            start = candle.start_time,
            end = candle.end_time,
            close = %candle.close,
            trades = candle.trade_count,
            "Publishing candle"
        );
        self.bus.publish(candle);
        self.stats.published += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::CollectingListener;
    use rust_decimal::Decimal;

    fn trade(id: u32, ts: i64, price: i64, amount: i64) -> Trade {
        Trade {
            id: id.to_string(),
            timestamp: ts,
            price: Decimal::from(price),
            amount: Decimal::from(amount),
            side: None,
        }
    }

    fn setup(duration: i64, start: i64) -> (CandleAggregator, Arc<CollectingListener>) {
        let bus = Arc::new(CandleBus::new());
        let collector = Arc::new(CollectingListener::new());
        bus.subscribe(collector.clone()).unwrap();
        (CandleAggregator::new(duration, start, bus).unwrap(), collector)
    }

    #[test]
    fn test_rejects_non_positive_duration() {
        let bus = Arc::new(CandleBus::new());
        assert!(CandleAggregator::new(0, 0, bus.clone()).is_err());
        assert!(CandleAggregator::new(-60, 0, bus).is_err());
    }

    #[test]
    fn test_align_down() {
        assert_eq!(align_down(1_000, 300), 900);
        assert_eq!(align_down(900, 300), 900);
        assert_eq!(align_down(-1, 300), -300);
    }

    #[test]
    fn test_five_minute_candle() {
        let t0 = 1_700_000_100;
        let (mut agg, collector) = setup(300, t0);

        agg.ingest(&trade(1, t0 + 10, 100, 1));
        agg.ingest(&trade(2, t0 + 290, 110, 2));
        assert_eq!(agg.advance(t0 + 300), 1);

        let candles = collector.candles();
        assert_eq!(candles.len(), 1);
        let c = &candles[0];
        assert_eq!(c.start_time, t0);
        assert_eq!(c.end_time, t0 + 300);
        assert_eq!(c.open, Decimal::from(100));
        assert_eq!(c.close, Decimal::from(110));
        assert_eq!(c.high, Decimal::from(110));
        assert_eq!(c.low, Decimal::from(100));
        assert_eq!(c.volume, Decimal::from(3));
        assert_eq!(c.trade_count, 2);
    }

    #[test]
    fn test_advance_before_end_is_noop() {
        let (mut agg, collector) = setup(60, 0);
        agg.ingest(&trade(1, 5, 100, 1));

        assert_eq!(agg.advance(59), 0);
        assert!(collector.candles().is_empty());
        assert_eq!(agg.current_start(), 0);
    }

    #[test]
    fn test_empty_bucket_not_published_but_window_advances() {
        let (mut agg, collector) = setup(60, 0);

        assert_eq!(agg.advance(60), 0);
        assert_eq!(agg.current_start(), 60);
        assert_eq!(agg.current_end(), 120);
        assert!(collector.candles().is_empty());
        assert_eq!(agg.stats().empty_skipped, 1);
    }

    #[test]
    fn test_multi_interval_gap_keeps_alignment() {
        let (mut agg, collector) = setup(60, 0);
        agg.ingest(&trade(1, 10, 100, 1));

        // Clock wakes up five buckets later
        assert_eq!(agg.advance(330), 1);
        assert_eq!(agg.current_start(), 300);
        assert_eq!(agg.current_end(), 360);
        assert_eq!(agg.stats().empty_skipped, 4);

        agg.ingest(&trade(2, 335, 101, 1));
        agg.advance(360);

        let candles = collector.candles();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].start_time, 0);
        assert_eq!(candles[1].start_time, 300);
        assert_eq!((candles[1].start_time - candles[0].end_time) % 60, 0);
    }

    #[test]
    fn test_trade_past_end_rolls_bucket() {
        let (mut agg, collector) = setup(60, 0);
        agg.ingest(&trade(1, 10, 100, 1));
        assert_eq!(agg.ingest(&trade(2, 60, 105, 1)), IngestOutcome::Merged);

        let candles = collector.candles();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].close, Decimal::from(100));
        assert_eq!(agg.current_start(), 60);
        assert_eq!(agg.current_candle().open, Decimal::from(105));
    }

    #[test]
    fn test_late_trade_dropped_without_mutation() {
        let (mut agg, _collector) = setup(60, 0);
        agg.ingest(&trade(1, 70, 100, 1));
        let before = agg.current_candle();

        assert_eq!(agg.ingest(&trade(2, 59, 1, 1)), IngestOutcome::DroppedLate);
        assert_eq!(agg.current_candle(), before);
        assert_eq!(agg.stats().late_dropped, 1);
    }

    #[test]
    fn test_far_future_trade_dropped_without_panic() {
        let (mut agg, collector) = setup(60, 0);
        agg.ingest(&trade(1, 10, 100, 1));

        assert_eq!(
            agg.ingest(&trade(2, i64::MAX, 1, 1)),
            IngestOutcome::DroppedOutOfRange
        );
        assert_eq!(agg.stats().out_of_range, 1);
        assert_eq!(agg.current_start(), 0);
        assert!(collector.candles().is_empty());

        // The bucket still accepts ordinary trades afterwards
        assert_eq!(agg.ingest(&trade(3, 20, 101, 1)), IngestOutcome::Merged);
        assert_eq!(agg.current_candle().trade_count, 2);
        assert_eq!(agg.advance(i64::MAX), 0);
        assert_eq!(agg.advance(60), 1);
    }

    #[test]
    fn test_boundary_trade_belongs_to_next_bucket() {
        let (mut agg, collector) = setup(60, 0);
        agg.ingest(&trade(1, 59, 100, 1));
        agg.ingest(&trade(2, 60, 200, 1));
        agg.advance(120);

        let candles = collector.candles();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].trade_count, 1);
        assert_eq!(candles[0].close, Decimal::from(100));
        assert_eq!(candles[1].open, Decimal::from(200));
    }

    #[test]
    fn test_consecutive_candles_are_contiguous() {
        let (mut agg, collector) = setup(60, 0);
        for i in 0..10 {
            agg.ingest(&trade(i, i as i64 * 60 + 30, 100 + i as i64, 1));
        }
        agg.advance(600);

        let candles = collector.candles();
        assert_eq!(candles.len(), 10);
        for pair in candles.windows(2) {
            assert_eq!(pair[1].start_time, pair[0].end_time);
        }
    }

    #[test]
    fn test_repeated_advance_does_not_double_publish() {
        let (mut agg, collector) = setup(60, 0);
        agg.ingest(&trade(1, 10, 100, 1));

        assert_eq!(agg.advance(60), 1);
        assert_eq!(agg.advance(60), 0);
        assert_eq!(agg.advance(61), 0);
        assert_eq!(collector.candles().len(), 1);
    }
}
