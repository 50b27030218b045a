use governor::{Quota, RateLimiter};
use reqwest::Client;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::{DecodeError, TraderError};
use crate::ingest::decode::decode_rest_trades;
use crate::ingest::TradeIngestor;
use crate::models::Trade;
use crate::Result;

type FeedRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

struct ExponentialBackoff {
    current: Duration,
    initial: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial,
            initial,
            max,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Polls a venue's recent-trades endpoint and feeds the ingestor.
///
/// The endpoint returns a JSON array of trade objects, usually overlapping
/// the previous poll; the ingestor's id dedup drops the repeats. A failed
/// request backs off exponentially and retries. Aggregator state lives
/// downstream and is untouched by feed failures.
#[derive(Clone)]
pub struct RestTradePoller {
    client: Client,
    url: String,
    poll_interval: Duration,
    rate_limiter: Arc<FeedRateLimiter>,
    max_backoff: Duration,
}

impl RestTradePoller {
    pub fn new(url: impl Into<String>, requests_per_minute: u32, poll_interval: Duration) -> Result<Self> {
        let rpm = NonZeroU32::new(requests_per_minute).ok_or_else(|| {
            TraderError::InvalidArgument("requests_per_minute must be positive".into())
        })?;

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            url: url.into(),
            poll_interval,
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_minute(rpm))),
            max_backoff: Duration::from_secs(60),
        })
    }

    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// One rate-limited request, decoded record by record, oldest first
    pub async fn fetch(&self) -> Result<Vec<std::result::Result<Trade, DecodeError>>> {
        self.rate_limiter.until_ready().await;

        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let mut records = decode_rest_trades(&body)?;

        // Venues list newest first; the aggregator wants feed order
        records.sort_by_key(|r| match r {
            Ok(trade) => trade.timestamp,
            Err(_) => i64::MIN,
        });
        Ok(records)
    }

    /// Fetch once and forward everything new. Returns trades forwarded.
    pub async fn poll_once(&self, ingestor: &mut TradeIngestor) -> Result<usize> {
        let records = self.fetch().await?;
        ingestor.ingest_decoded(records).await
    }

    /// Poll until shutdown or until the aggregator's channel closes.
    /// Returns the ingestor so its stats can be inspected.
    pub async fn run(&self, mut ingestor: TradeIngestor, mut shutdown: watch::Receiver<bool>) -> TradeIngestor {
        let mut backoff = ExponentialBackoff::new(self.poll_interval, self.max_backoff);
        tracing::info!(url = %self.url, interval_ms = self.poll_interval.as_millis() as u64, "Starting trade poller");

        loop {
            let delay = match self.poll_once(&mut ingestor).await {
                Ok(forwarded) => {
                    backoff.reset();
                    tracing::debug!(forwarded, "Poll complete");
                    self.poll_interval
                }
                Err(TraderError::ChannelClosed(what)) => {
                    tracing::info!(channel = what, "Downstream closed, stopping poller");
                    break;
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "Trade poll failed");
                    delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Trade poller shutting down");
                        break;
                    }
                }
            }
        }

        ingestor
    }
}
