// Trade ingestion: decode venue payloads, drop duplicates, forward to the aggregator
pub mod decode;

pub use decode::{decode_csv_line, decode_feed_message, decode_rest_trades, decode_trade_object};

use std::collections::{HashSet, VecDeque};
use tokio::sync::mpsc;

use crate::error::{DecodeError, TraderError};
use crate::models::Trade;
use crate::Result;

const DEFAULT_DEDUP_CAPACITY: usize = 4096;

/// Counters for everything the ingestor has seen
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestStats {
    pub accepted: u64,
    pub rejected: u64,
    pub duplicates: u64,
}

/// Bounded set of recently forwarded trade ids
struct RecentIds {
    order: VecDeque<String>,
    ids: HashSet<String>,
    capacity: usize,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns false if the id was already present
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        self.ids.insert(id.to_string());
        self.order.push_back(id.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }
}

/// Normalizes raw trade records from the feed and forwards them to the
/// aggregator's trade channel.
///
/// Malformed records are logged and counted; they never reach bucket state.
/// Trades re-sent by the venue (after a reconnect, or overlapping polls) are
/// dropped by id.
pub struct TradeIngestor {
    tx: mpsc::Sender<Trade>,
    recent: RecentIds,
    stats: IngestStats,
}

impl TradeIngestor {
    pub fn new(tx: mpsc::Sender<Trade>) -> Self {
        Self::with_dedup_capacity(tx, DEFAULT_DEDUP_CAPACITY)
    }

    pub fn with_dedup_capacity(tx: mpsc::Sender<Trade>, capacity: usize) -> Self {
        Self {
            tx,
            recent: RecentIds::new(capacity.max(1)),
            stats: IngestStats::default(),
        }
    }

    /// Forward one validated trade. Returns `Ok(false)` for a duplicate.
    pub async fn ingest(&mut self, trade: Trade) -> Result<bool> {
        if !self.recent.insert(&trade.id) {
            self.stats.duplicates += 1;
            tracing::debug!(id = %trade.id, "Dropping duplicate trade");
            return Ok(false);
        }

        self.tx
            .send(trade)
            .await
            .map_err(|_| TraderError::ChannelClosed("aggregator trade channel"))?;
        self.stats.accepted += 1;
        Ok(true)
    }

    /// Decode and forward one streaming-channel message.
    ///
    /// Returns the number of trades forwarded. A malformed message yields 0;
    /// a malformed record inside a snapshot is rejected on its own.
    pub async fn ingest_message(&mut self, text: &str) -> Result<usize> {
        match decode_feed_message(text) {
            Ok(records) => self.ingest_decoded(records).await,
            Err(e) => {
                self.reject(&e, text);
                Ok(0)
            }
        }
    }

    /// Forward a batch of individually decoded records, rejecting the bad ones
    pub async fn ingest_decoded<I>(&mut self, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = std::result::Result<Trade, DecodeError>>,
    {
        let mut forwarded = 0;
        for record in records {
            match record {
                Ok(trade) => {
                    if self.ingest(trade).await? {
                        forwarded += 1;
                    }
                }
                Err(e) => self.reject(&e, ""),
            }
        }
        Ok(forwarded)
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    fn reject(&mut self, error: &DecodeError, payload: &str) {
        self.stats.rejected += 1;
        log_rejected(error, payload);
    }
}

fn log_rejected(error: &DecodeError, payload: &str) {
    tracing::warn!(error = %error, payload = %payload, "Rejected malformed trade record");
}

/// Split decoded records into trades and a count of rejections, logging
/// each rejected record. For batches that bypass the ingestor, such as
/// backfill history.
pub fn partition_decoded<I>(records: I) -> (Vec<Trade>, u64)
where
    I: IntoIterator<Item = std::result::Result<Trade, DecodeError>>,
{
    let mut trades = Vec::new();
    let mut rejected = 0;
    for record in records {
        match record {
            Ok(trade) => trades.push(trade),
            Err(e) => {
                rejected += 1;
                log_rejected(&e, "");
            }
        }
    }
    (trades, rejected)
}
