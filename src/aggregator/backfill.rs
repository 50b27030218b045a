use crate::error::TraderError;
use crate::models::{Candle, Trade};
use crate::Result;

use super::CandleAggregator;

/// Statistics from a backfill replay
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackfillStats {
    pub replayed_trades: usize,
    pub published: usize,
    pub empty_buckets: usize,
    pub out_of_window: usize,
    /// Trades in the final bucket that was handed over to the live stream
    pub discarded_overlap: usize,
}

impl CandleAggregator {
    /// Replay historical trades collected before live streaming begins.
    ///
    /// Bucket `i` covers `[origin_start + i*duration, origin_start + (i+1)*duration)`
    /// for `i` in `0..count`; a trade lands in bucket
    /// `floor((timestamp - origin_start) / duration)`, so a trade exactly on
    /// a boundary belongs to the later bucket. Buckets are published in
    /// increasing index order, empty ones skipped.
    ///
    /// If the final bucket is still open at `takeover_at` it is discarded and
    /// becomes the live bucket, so only the live stream ever publishes that
    /// interval. Otherwise it is published and the live bucket is the one
    /// containing `takeover_at`.
    ///
    /// Must run before any live trade is ingested.
    pub fn backfill(
        &mut self,
        historical: &[Trade],
        origin_start: i64,
        duration_secs: i64,
        count: usize,
        takeover_at: i64,
    ) -> Result<BackfillStats> {
        if duration_secs != self.duration_secs {
            return Err(TraderError::InvalidArgument(format!(
                "backfill duration {} does not match aggregator duration {}",
                duration_secs, self.duration_secs
            )));
        }
        if count == 0 {
            return Err(TraderError::InvalidArgument(
                "backfill needs at least one bucket".into(),
            ));
        }
        if self.backfilled || self.stats.merged > 0 || self.stats.published > 0 {
            return Err(TraderError::InvalidArgument(
                "backfill must run before live ingestion".into(),
            ));
        }

        let last_start = i64::try_from(count - 1)
            .ok()
            .and_then(|n| n.checked_mul(duration_secs))
            .and_then(|offset| origin_start.checked_add(offset))
            .filter(|start| start.checked_add(duration_secs).is_some())
            .ok_or_else(|| {
                TraderError::InvalidArgument(format!(
                    "{} buckets of {}s from {} overflow the time range",
                    count, duration_secs, origin_start
                ))
            })?;
        if takeover_at < last_start {
            return Err(TraderError::InvalidArgument(format!(
                "takeover time {} precedes the final backfill bucket at {}",
                takeover_at, last_start
            )));
        }

        let mut stats = BackfillStats::default();
        // Every start is at most `last_start`, checked above
        let mut buckets: Vec<Candle> = (0..count as i64)
            .map(|i| Candle::empty(origin_start + i * duration_secs, duration_secs))
            .collect();

        // Stable sort keeps feed order for equal timestamps
        let mut ordered: Vec<&Trade> = historical.iter().collect();
        ordered.sort_by_key(|t| t.timestamp);

        for trade in ordered {
            let index = trade
                .timestamp
                .checked_sub(origin_start)
                .filter(|offset| *offset >= 0)
                .and_then(|offset| usize::try_from(offset / duration_secs).ok());
            match index.and_then(|i| buckets.get_mut(i)) {
                Some(bucket) => {
                    bucket.merge(trade);
                    stats.replayed_trades += 1;
                }
                None => stats.out_of_window += 1,
            }
        }

        let final_bucket = buckets.pop().ok_or_else(|| {
            TraderError::InvalidArgument("backfill needs at least one bucket".into())
        })?;

        for bucket in &buckets {
            if bucket.is_empty() {
                stats.empty_buckets += 1;
            } else {
                self.publish(bucket);
                stats.published += 1;
            }
        }

        if takeover_at < final_bucket.end_time {
            stats.discarded_overlap = final_bucket.trade_count as usize;
            tracing::info!(
                start = final_bucket.start_time,
                discarded_trades = stats.discarded_overlap,
                "Final backfill bucket overlaps live stream, handing it over"
            );
            self.current = Candle::empty(final_bucket.start_time, duration_secs);
        } else {
            if final_bucket.is_empty() {
                stats.empty_buckets += 1;
            } else {
                self.publish(&final_bucket);
                stats.published += 1;
            }
            self.current = Candle::empty(final_bucket.end_time, duration_secs);
            self.advance(takeover_at);
        }

        self.backfilled = true;
        tracing::info!(
            replayed = stats.replayed_trades,
            published = stats.published,
            empty = stats.empty_buckets,
            skipped = stats.out_of_window,
            live_start = self.current.start_time,
            "Backfill complete"
        );

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{CandleBus, CollectingListener};
    use rust_decimal::Decimal;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn trade(id: &str, ts: i64, price: i64) -> Trade {
        Trade {
            id: id.to_string(),
            timestamp: ts,
            price: Decimal::from(price),
            amount: Decimal::ONE,
            side: None,
        }
    }

    fn setup(start: i64) -> (CandleAggregator, Arc<CollectingListener>) {
        let bus = Arc::new(CandleBus::new());
        let collector = Arc::new(CollectingListener::new());
        bus.subscribe(collector.clone()).unwrap();
        (CandleAggregator::new(60, start, bus).unwrap(), collector)
    }

    #[test]
    fn test_publishes_in_index_order_and_discards_overlap() {
        let (mut agg, collector) = setup(0);
        let history = vec![
            trade("a", 5, 100),
            trade("b", 65, 101),
            trade("c", 70, 102),
            trade("d", 185, 103), // final bucket [180, 240)
        ];

        let stats = agg.backfill(&history, 0, 60, 4, 200).unwrap();

        let candles = collector.candles();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].start_time, 0);
        assert_eq!(candles[1].start_time, 60);
        assert_eq!(candles[1].trade_count, 2);
        assert_eq!(stats.empty_buckets, 1); // [120, 180)
        assert_eq!(stats.discarded_overlap, 1);
        assert_eq!(agg.current_start(), 180);
        assert!(agg.current_candle().is_empty());
    }

    #[test]
    fn test_boundary_trade_goes_to_later_bucket() {
        let (mut agg, collector) = setup(0);
        let history = vec![trade("a", 59, 100), trade("b", 60, 200), trade("c", 120, 300)];

        agg.backfill(&history, 0, 60, 3, 130).unwrap();

        let candles = collector.candles();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].close, Decimal::from(100));
        assert_eq!(candles[1].open, Decimal::from(200));
        assert_eq!(candles[1].trade_count, 1);
    }

    #[test]
    fn test_no_interval_published_twice_across_takeover() {
        let (mut agg, collector) = setup(0);
        let history: Vec<Trade> = (0..10)
            .map(|i| trade(&format!("h{}", i), i * 30, 100 + i))
            .collect();

        // Final bucket [240, 300) still open at 290
        agg.backfill(&history, 0, 60, 5, 290).unwrap();

        // Live stream repeats the overlapping interval, then moves on
        agg.ingest(&trade("l1", 285, 200));
        agg.ingest(&trade("l2", 310, 201));
        agg.ingest(&trade("late", 100, 1));
        agg.advance(360);

        let candles = collector.candles();
        let intervals: HashSet<(i64, i64)> =
            candles.iter().map(|c| (c.start_time, c.end_time)).collect();
        assert_eq!(intervals.len(), candles.len());
        assert_eq!(candles.len(), 6);
        for pair in candles.windows(2) {
            assert_eq!(pair[1].start_time, pair[0].end_time);
        }
        // Only the live trade made it into the handed-over bucket
        assert_eq!(candles[4].start_time, 240);
        assert_eq!(candles[4].trade_count, 1);
        assert_eq!(candles[4].open, Decimal::from(200));
    }

    #[test]
    fn test_completed_final_bucket_is_published() {
        let (mut agg, collector) = setup(0);
        let history = vec![trade("a", 10, 100), trade("b", 70, 101)];

        agg.backfill(&history, 0, 60, 2, 250).unwrap();

        assert_eq!(collector.candles().len(), 2);
        assert_eq!(agg.current_start(), 240);
    }

    #[test]
    fn test_out_of_window_trades_ignored() {
        let (mut agg, _collector) = setup(0);
        let history = vec![trade("early", 50, 1), trade("a", 130, 2), trade("future", 400, 3)];

        let stats = agg.backfill(&history, 100, 60, 3, 230).unwrap();
        assert_eq!(stats.out_of_window, 2);
        assert_eq!(stats.replayed_trades, 1);
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let (mut agg, _collector) = setup(0);
        let history = vec![trade("min", i64::MIN, 1), trade("max", i64::MAX, 2), trade("a", 10, 3)];

        let stats = agg.backfill(&history, 0, 60, 2, 70).unwrap();
        assert_eq!(stats.out_of_window, 2);
        assert_eq!(stats.replayed_trades, 1);

        let (mut agg, _collector) = setup(0);
        let result = agg.backfill(&[], i64::MAX - 100, 60, 3, i64::MAX);
        assert!(matches!(result, Err(TraderError::InvalidArgument(_))));
    }

    #[test]
    fn test_rejects_backfill_after_live_ingest() {
        let (mut agg, _collector) = setup(0);
        agg.ingest(&trade("live", 5, 100));

        let result = agg.backfill(&[], 0, 60, 1, 10);
        assert!(matches!(result, Err(TraderError::InvalidArgument(_))));
    }

    #[test]
    fn test_rejects_mismatched_duration() {
        let (mut agg, _collector) = setup(0);
        assert!(agg.backfill(&[], 0, 300, 1, 10).is_err());
        assert!(agg.backfill(&[], 0, 60, 0, 10).is_err());
    }
}
