use serde::{Deserialize, Serialize};

use crate::models::{OrderSide, PositionState, Signal};

/// An order transition the position state machine may take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub side: OrderSide,
    pub from: PositionState,
    pub to: PositionState,
}

/// Map the current state and the evaluator's signal to at most one
/// transition.
///
/// A signal that points in the direction the state already holds is
/// ignored, so a repeated signal never issues a second order. LONG and
/// SHORT are only left through NO_POSITION.
pub fn decide(state: PositionState, signal: Signal) -> Option<Transition> {
    let (side, to) = match (signal, state) {
        (Signal::Hold, _) | (Signal::Enter, PositionState::Long) | (Signal::Exit, PositionState::Short) => {
            return None
        }
        (Signal::Enter, PositionState::Short) => (OrderSide::Buy, PositionState::NoPosition),
        (Signal::Enter, _) => (OrderSide::Buy, PositionState::Long),
        (Signal::Exit, PositionState::Long) => (OrderSide::Sell, PositionState::NoPosition),
        (Signal::Exit, _) => (OrderSide::Sell, PositionState::Short),
    };
    Some(Transition {
        side,
        from: state,
        to,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use PositionState::*;

    fn to(state: PositionState, signal: Signal) -> Option<(OrderSide, PositionState)> {
        decide(state, signal).map(|t| (t.side, t.to))
    }

    #[test]
    fn test_enter_from_flat_goes_long() {
        assert_eq!(to(NoPosition, Signal::Enter), Some((OrderSide::Buy, Long)));
    }

    #[test]
    fn test_exit_from_flat_goes_short() {
        assert_eq!(to(NoPosition, Signal::Exit), Some((OrderSide::Sell, Short)));
    }

    #[test]
    fn test_positions_close_through_flat() {
        assert_eq!(to(Long, Signal::Exit), Some((OrderSide::Sell, NoPosition)));
        assert_eq!(to(Short, Signal::Enter), Some((OrderSide::Buy, NoPosition)));
    }

    #[test]
    fn test_repeated_signal_is_idempotent() {
        assert_eq!(to(Long, Signal::Enter), None);
        assert_eq!(to(Short, Signal::Exit), None);
    }

    #[test]
    fn test_hold_never_transitions() {
        for state in [NoPosition, Long, Short] {
            assert_eq!(to(state, Signal::Hold), None);
        }
    }
}
