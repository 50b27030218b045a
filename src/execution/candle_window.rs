use crate::models::Candle;
use std::collections::VecDeque;

/// Rolling window of the most recent completed candles, oldest first
#[derive(Debug, Clone)]
pub struct CandleWindow {
    candles: VecDeque<Candle>,
    max_candles: usize,
}

impl CandleWindow {
    /// Create a window holding at most `max_candles` candles
    pub fn new(max_candles: usize) -> Self {
        Self {
            candles: VecDeque::with_capacity(max_candles),
            max_candles: max_candles.max(1),
        }
    }

    /// Add a candle, dropping the oldest once full
    pub fn push(&mut self, candle: Candle) {
        self.candles.push_back(candle);

        while self.candles.len() > self.max_candles {
            self.candles.pop_front();
        }
    }

    /// Contiguous view for signal evaluators
    pub fn as_slice(&mut self) -> &[Candle] {
        self.candles.make_contiguous()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}
