use std::sync::{Arc, RwLock};

use crate::error::TraderError;
use crate::models::Candle;
use crate::Result;

/// Receiver of completed candles.
///
/// Called synchronously on the publishing thread, so implementations should
/// hand work off quickly rather than block.
pub trait CandleListener: Send + Sync {
    fn on_candle(&self, candle: &Candle);

    fn name(&self) -> &str {
        "listener"
    }
}

/// Publish/subscribe fan-out of completed candles.
///
/// Subscribers form an ordered set (registration order, no duplicates).
/// Delivery is synchronous and in registration order; the bus performs no
/// redelivery suppression.
#[derive(Default)]
pub struct CandleBus {
    subscribers: RwLock<Vec<Arc<dyn CandleListener>>>,
}

fn same_listener(a: &Arc<dyn CandleListener>, b: &Arc<dyn CandleListener>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

impl CandleBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Registering the same listener twice is rejected.
    pub fn subscribe(&self, listener: Arc<dyn CandleListener>) -> Result<()> {
        let mut subscribers = self
            .subscribers
            .write()
            .map_err(|e| TraderError::InvalidArgument(e.to_string()))?;

        if subscribers.iter().any(|s| same_listener(s, &listener)) {
            return Err(TraderError::InvalidArgument(format!(
                "listener '{}' is already subscribed",
                listener.name()
            )));
        }

        tracing::debug!(listener = listener.name(), "Subscribed to candle bus");
        subscribers.push(listener);
        Ok(())
    }

    /// Remove a listener. Removing one that is not registered is rejected.
    pub fn unsubscribe(&self, listener: &Arc<dyn CandleListener>) -> Result<()> {
        let mut subscribers = self
            .subscribers
            .write()
            .map_err(|e| TraderError::InvalidArgument(e.to_string()))?;

        let position = subscribers
            .iter()
            .position(|s| same_listener(s, listener))
            .ok_or_else(|| {
                TraderError::InvalidArgument(format!(
                    "listener '{}' is not subscribed",
                    listener.name()
                ))
            })?;

        subscribers.remove(position);
        tracing::debug!(listener = listener.name(), "Unsubscribed from candle bus");
        Ok(())
    }

    /// Deliver a candle to every current subscriber, in registration order.
    ///
    /// Iterates a snapshot taken under the lock, so listeners may
    /// (un)subscribe from inside `on_candle`. Empty candles are never
    /// delivered. Returns the number of listeners reached.
    pub fn publish(&self, candle: &Candle) -> usize {
        if candle.is_empty() {
            tracing::warn!(start = candle.start_time, "Refusing to publish empty candle");
            return 0;
        }

        let snapshot: Vec<Arc<dyn CandleListener>> = match self.subscribers.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        for listener in &snapshot {
            listener.on_candle(candle);
        }
        snapshot.len()
    }

    pub fn subscriber_count(&self) -> usize {
        match self.subscribers.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// Listener that keeps every candle it receives; used by batch runs and tests
#[derive(Default)]
pub struct CollectingListener {
    candles: std::sync::Mutex<Vec<Candle>>,
}

impl CollectingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn candles(&self) -> Vec<Candle> {
        match self.candles.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Remove and return everything received so far
    pub fn drain(&self) -> Vec<Candle> {
        match self.candles.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl CandleListener for CollectingListener {
    fn on_candle(&self, candle: &Candle) {
        match self.candles.lock() {
            Ok(mut guard) => guard.push(candle.clone()),
            Err(poisoned) => poisoned.into_inner().push(candle.clone()),
        }
    }

    fn name(&self) -> &str {
        "collector"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl CandleListener for Recorder {
        fn on_candle(&self, candle: &Candle) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}@{}", self.label, candle.start_time));
        }

        fn name(&self) -> &str {
            self.label
        }
    }

    fn candle(start: i64) -> Candle {
        let mut c = Candle::empty(start, 60);
        c.open = Decimal::ONE;
        c.high = Decimal::ONE;
        c.low = Decimal::ONE;
        c.close = Decimal::ONE;
        c.trade_count = 1;
        c
    }

    #[test]
    fn test_publish_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let bus = CandleBus::new();
        for label in ["a", "b", "c"] {
            bus.subscribe(Arc::new(Recorder {
                label,
                log: log.clone(),
            }))
            .unwrap();
        }

        assert_eq!(bus.publish(&candle(0)), 3);
        assert_eq!(*log.lock().unwrap(), vec!["a@0", "b@0", "c@0"]);
    }

    #[test]
    fn test_duplicate_subscribe_rejected() {
        let bus = CandleBus::new();
        let listener: Arc<dyn CandleListener> = Arc::new(CollectingListener::new());

        bus.subscribe(listener.clone()).unwrap();
        let result = bus.subscribe(listener);
        assert!(matches!(result, Err(TraderError::InvalidArgument(_))));
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_unsubscribe_unknown_rejected() {
        let bus = CandleBus::new();
        let listener: Arc<dyn CandleListener> = Arc::new(CollectingListener::new());

        let result = bus.unsubscribe(&listener);
        assert!(matches!(result, Err(TraderError::InvalidArgument(_))));
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = CandleBus::new();
        let collector = Arc::new(CollectingListener::new());
        let listener: Arc<dyn CandleListener> = collector.clone();

        bus.subscribe(listener.clone()).unwrap();
        bus.publish(&candle(0));
        bus.unsubscribe(&listener).unwrap();
        bus.publish(&candle(60));

        assert_eq!(collector.candles().len(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_empty_candle_never_delivered() {
        let bus = CandleBus::new();
        let collector = Arc::new(CollectingListener::new());
        bus.subscribe(collector.clone()).unwrap();

        assert_eq!(bus.publish(&Candle::empty(0, 60)), 0);
        assert!(collector.candles().is_empty());
    }
}
