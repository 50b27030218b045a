// Signal evaluation seam between candles and the position state machine
pub mod ma_crossover;

pub use ma_crossover::MovingAverageCrossover;

use crate::models::{Candle, Signal};

/// Computes enter/exit decisions from a window of completed candles.
///
/// The window is oldest-first and never longer than the state machine's
/// warm-up threshold.
pub trait SignalEvaluator: Send + Sync {
    fn should_enter(&self, window: &[Candle]) -> bool;

    fn should_exit(&self, window: &[Candle]) -> bool;

    /// Get evaluator name
    fn name(&self) -> &str;

    /// Collapse both checks into one signal. The exit check only runs when
    /// the enter check is false.
    fn evaluate(&self, window: &[Candle]) -> Signal {
        if self.should_enter(window) {
            Signal::Enter
        } else if self.should_exit(window) {
            Signal::Exit
        } else {
            Signal::Hold
        }
    }
}
