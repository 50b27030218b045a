use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

use super::CandleAggregator;
use crate::models::Trade;

/// Source of "now" in unix seconds
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// Clock that only moves when told to
#[derive(Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Run the aggregator as the sole owner of its bucket state.
///
/// Trades and clock ticks arrive on separate channels and are merged by one
/// selecting loop, so ingest and advance never overlap. Pending trades are
/// drained before a tick is applied, so a tick cannot close a bucket while
/// trades for it are still queued.
///
/// The task ends on shutdown or once both channels are closed, and hands
/// the aggregator back.
pub fn spawn_aggregator(
    mut aggregator: CandleAggregator,
    mut trades: mpsc::Receiver<Trade>,
    mut ticks: mpsc::Receiver<i64>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<CandleAggregator> {
    tokio::spawn(async move {
        let mut trades_open = true;
        let mut ticks_open = true;

        while trades_open || ticks_open {
            tokio::select! {
                biased;

                maybe_trade = trades.recv(), if trades_open => match maybe_trade {
                    Some(trade) => {
                        aggregator.ingest(&trade);
                    }
                    None => {
                        tracing::info!("Trade channel closed");
                        trades_open = false;
                    }
                },
                maybe_tick = ticks.recv(), if ticks_open => match maybe_tick {
                    Some(now) => {
                        aggregator.advance(now);
                    }
                    None => {
                        tracing::debug!("Clock channel closed");
                        ticks_open = false;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Aggregator shutting down");
                        break;
                    }
                }
            }
        }

        aggregator
    })
}

/// Emit `clock.now_secs()` once per bucket, aligned to bucket ends.
///
/// `first_end` is the end of the bucket that is open when the clock starts.
pub fn spawn_clock(
    clock: Arc<dyn Clock>,
    first_end: i64,
    period_secs: i64,
    ticks: mpsc::Sender<i64>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let wait = (first_end - clock.now_secs()).max(0) as u64;
        let period = Duration::from_secs(period_secs.max(1) as u64);
        let mut interval = interval_at(Instant::now() + Duration::from_secs(wait), period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if ticks.send(clock.now_secs()).await.is_err() {
                        tracing::debug!("Aggregator gone, stopping clock");
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
