// Exchange order boundary
pub mod paper;

pub use paper::PaperGateway;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::models::OrderSide;

/// An order still resting on the venue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenOrder {
    pub id: String,
    pub pair: String,
    pub side: OrderSide,
    pub size: Decimal,
}

/// Places and cancels orders and reports balances.
///
/// Every call may fail with a network condition; callers treat a failure as
/// "no action" for the current candle.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Submit a market order and return the venue's order id
    async fn place_market_order(
        &self,
        side: OrderSide,
        size: Decimal,
        pair: &str,
    ) -> Result<String, GatewayError>;

    /// Returns `Ok(false)` when the venue refused to cancel
    async fn cancel_order(&self, order_id: &str) -> Result<bool, GatewayError>;

    async fn open_orders(&self) -> Result<Vec<OpenOrder>, GatewayError>;

    /// Available balance in `currency`
    async fn balance(&self, currency: &str) -> Result<Decimal, GatewayError>;

    /// Best ask for `OrderSide::Buy`, best bid for `OrderSide::Sell`
    async fn best_price(&self, pair: &str, side: OrderSide) -> Result<Decimal, GatewayError>;
}
