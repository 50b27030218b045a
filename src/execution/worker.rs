use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::state_machine::{CandleOutcome, PositionStateMachine};
use crate::bus::CandleListener;
use crate::models::Candle;

/// Bus-facing side of a position worker.
///
/// `on_candle` only enqueues, so the publishing aggregator is never held up
/// by balance queries or order submission. Candles are handled one at a time
/// in publish order.
pub struct PositionWorkerHandle {
    tx: Mutex<Option<mpsc::UnboundedSender<Candle>>>,
}

impl PositionWorkerHandle {
    /// Stop accepting candles. The worker drains what is queued, then exits.
    pub fn close(&self) {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
    }
}

impl CandleListener for PositionWorkerHandle {
    fn on_candle(&self, candle: &Candle) {
        let Ok(tx) = self.tx.lock() else {
            return;
        };
        match tx.as_ref() {
            Some(tx) => {
                if tx.send(candle.clone()).is_err() {
                    tracing::warn!(start = candle.start_time, "Position worker gone, candle lost");
                }
            }
            None => tracing::debug!(start = candle.start_time, "Position worker closed, ignoring candle"),
        }
    }

    fn name(&self) -> &str {
        "position-worker"
    }
}

/// Run a state machine on its own task, fed through the returned handle.
///
/// The task ends once the handle is closed (or dropped) and the queue is
/// drained, and returns the machine so callers can read its records.
pub fn spawn_position_worker(
    mut machine: PositionStateMachine,
) -> (PositionWorkerHandle, JoinHandle<PositionStateMachine>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Candle>();

    let task = tokio::spawn(async move {
        while let Some(candle) = rx.recv().await {
            match machine.on_candle(candle).await {
                CandleOutcome::WarmingUp { received, needed } => {
                    tracing::debug!(received, needed, "Warming up");
                }
                CandleOutcome::NoAction => {}
                outcome => tracing::debug!(?outcome, "Candle handled"),
            }
        }
        tracing::info!(
            candles = machine.candles_received(),
            orders = machine.records().len(),
            "Position worker stopped"
        );
        machine
    });

    (
        PositionWorkerHandle {
            tx: Mutex::new(Some(tx)),
        },
        task,
    )
}
