// Position state machine and order execution
pub mod candle_window;
pub mod fsm;
pub mod sizing;
pub mod state_machine;
pub mod worker;

pub use candle_window::CandleWindow;
pub use fsm::{decide, Transition};
pub use sizing::OrderSizing;
pub use state_machine::{CandleOutcome, ExecutionConfig, PositionStateMachine};
pub use worker::{spawn_position_worker, PositionWorkerHandle};
