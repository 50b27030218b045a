pub mod loader;
pub mod report;
pub mod runner;
pub mod synthetic;

pub use loader::{load_trades_csv, parse_trades_csv, LoadedTrades};
pub use report::{BacktestReport, ClosedTrade};
pub use runner::{BacktestOutcome, BacktestRunner};
pub use synthetic::{MarketScenario, SyntheticTradeGenerator};
