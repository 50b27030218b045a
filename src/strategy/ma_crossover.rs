use rust_decimal::prelude::ToPrimitive;

use super::SignalEvaluator;
use crate::error::TraderError;
use crate::models::Candle;
use crate::Result;

/// Calculate Simple Moving Average (SMA) over the last `period` values
fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Short/long SMA crossover on candle closes
///
/// Enters when the short average crosses above the long one, exits when it
/// crosses below. Needs `long + 1` candles to see a cross.
#[derive(Debug, Clone)]
pub struct MovingAverageCrossover {
    short_period: usize,
    long_period: usize,
}

impl MovingAverageCrossover {
    /// Requires `0 < short_period < long_period`
    pub fn new(short_period: usize, long_period: usize) -> Result<Self> {
        if short_period == 0 || short_period >= long_period {
            return Err(TraderError::InvalidArgument(format!(
                "crossover needs 0 < short < long, got short={} long={}",
                short_period, long_period
            )));
        }
        Ok(Self {
            short_period,
            long_period,
        })
    }

    pub fn min_candles_required(&self) -> usize {
        self.long_period + 1
    }

    /// (previous spread, current spread) of short minus long SMA
    fn spreads(&self, window: &[Candle]) -> Option<(f64, f64)> {
        if window.len() < self.min_candles_required() {
            return None;
        }
        let closes: Vec<f64> = window
            .iter()
            .map(|c| c.close.to_f64().unwrap_or(0.0))
            .collect();
        let previous = &closes[..closes.len() - 1];

        let current = calculate_sma(&closes, self.short_period)? - calculate_sma(&closes, self.long_period)?;
        let before = calculate_sma(previous, self.short_period)? - calculate_sma(previous, self.long_period)?;
        Some((before, current))
    }
}

impl Default for MovingAverageCrossover {
    fn default() -> Self {
        Self {
            short_period: 5,
            long_period: 20,
        }
    }
}

impl SignalEvaluator for MovingAverageCrossover {
    fn should_enter(&self, window: &[Candle]) -> bool {
        matches!(self.spreads(window), Some((before, now)) if before <= 0.0 && now > 0.0)
    }

    fn should_exit(&self, window: &[Candle]) -> bool {
        matches!(self.spreads(window), Some((before, now)) if before >= 0.0 && now < 0.0)
    }

    fn name(&self) -> &str {
        "ma_crossover"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Signal;
    use rust_decimal::Decimal;

    fn candles(closes: &[i64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let mut c = Candle::empty(i as i64 * 60, 60);
                c.open = Decimal::from(close);
                c.high = Decimal::from(close);
                c.low = Decimal::from(close);
                c.close = Decimal::from(close);
                c.trade_count = 1;
                c
            })
            .collect()
    }

    #[test]
    fn test_sma() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        assert_eq!(calculate_sma(&prices, 5), Some(104.0));
        assert_eq!(calculate_sma(&prices[..2], 5), None);
    }

    #[test]
    fn test_rejects_invalid_periods() {
        assert!(MovingAverageCrossover::new(0, 20).is_err());
        assert!(MovingAverageCrossover::new(20, 20).is_err());
        assert!(MovingAverageCrossover::new(30, 20).is_err());
        let evaluator = MovingAverageCrossover::new(1, 2).unwrap();
        assert_eq!(evaluator.min_candles_required(), 3);
    }

    #[test]
    fn test_cross_up_enters() {
        let evaluator = MovingAverageCrossover::new(2, 4).unwrap();
        let window = candles(&[10, 10, 10, 10, 10, 20]);
        assert!(evaluator.should_enter(&window));
        assert!(!evaluator.should_exit(&window));
        assert_eq!(evaluator.evaluate(&window), Signal::Enter);
    }

    #[test]
    fn test_cross_down_exits() {
        let evaluator = MovingAverageCrossover::new(2, 4).unwrap();
        let window = candles(&[10, 10, 10, 10, 10, 2]);
        assert!(evaluator.should_exit(&window));
        assert_eq!(evaluator.evaluate(&window), Signal::Exit);
    }

    #[test]
    fn test_insufficient_history_holds() {
        let evaluator = MovingAverageCrossover::new(2, 4).unwrap();
        assert_eq!(evaluator.evaluate(&candles(&[10, 20])), Signal::Hold);
    }
}
