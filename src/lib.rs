// Core modules
pub mod aggregator;
pub mod backtest;
pub mod bus;
pub mod config;
pub mod error;
pub mod execution;
pub mod feed;
pub mod gateway;
pub mod ingest;
pub mod models;
pub mod strategy;

// Re-export commonly used types
pub use error::TraderError;
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, TraderError>;
