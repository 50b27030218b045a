use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{OpenOrder, OrderGateway};
use crate::bus::CandleListener;
use crate::error::GatewayError;
use crate::models::{Candle, OrderSide};

/// A fill executed by the paper venue
#[derive(Debug, Clone, PartialEq)]
pub struct PaperFill {
    pub order_id: String,
    pub side: OrderSide,
    pub size: Decimal,
    pub price: Decimal,
}

struct PaperBook {
    balances: HashMap<String, Decimal>,
    price: Decimal,
    fills: Vec<PaperFill>,
}

/// In-memory venue for backtests and dry runs.
///
/// Market orders fill immediately at the current price with no fees and
/// never rest, so there is never anything to cancel.
pub struct PaperGateway {
    base_currency: String,
    quote_currency: String,
    book: Mutex<PaperBook>,
}

impl PaperGateway {
    pub fn new(
        base_currency: impl Into<String>,
        quote_currency: impl Into<String>,
        base_balance: Decimal,
        quote_balance: Decimal,
    ) -> Self {
        let base_currency = base_currency.into();
        let quote_currency = quote_currency.into();
        let mut balances = HashMap::new();
        balances.insert(base_currency.clone(), base_balance);
        balances.insert(quote_currency.clone(), quote_balance);

        Self {
            base_currency,
            quote_currency,
            book: Mutex::new(PaperBook {
                balances,
                price: Decimal::ZERO,
                fills: Vec::new(),
            }),
        }
    }

    /// Set the price used for quotes and fills
    pub fn set_price(&self, price: Decimal) {
        self.lock().price = price;
    }

    pub fn fills(&self) -> Vec<PaperFill> {
        self.lock().fills.clone()
    }

    pub fn balance_of(&self, currency: &str) -> Decimal {
        self.lock()
            .balances
            .get(currency)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PaperBook> {
        self.book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl OrderGateway for PaperGateway {
    async fn place_market_order(
        &self,
        side: OrderSide,
        size: Decimal,
        pair: &str,
    ) -> Result<String, GatewayError> {
        if size <= Decimal::ZERO {
            return Err(GatewayError::Rejected(format!("non-positive size {}", size)));
        }

        let mut book = self.lock();
        let price = book.price;
        if price <= Decimal::ZERO {
            return Err(GatewayError::Rejected("no price available".to_string()));
        }

        let (spend_currency, spend, receive_currency, receive) = match side {
            OrderSide::Buy => (&self.quote_currency, size * price, &self.base_currency, size),
            OrderSide::Sell => (&self.base_currency, size, &self.quote_currency, size * price),
        };

        let available = book.balances.get(spend_currency).copied().unwrap_or(Decimal::ZERO);
        if available < spend {
            return Err(GatewayError::InsufficientBalance {
                currency: spend_currency.clone(),
            });
        }

        book.balances.insert(spend_currency.clone(), available - spend);
        *book
            .balances
            .entry(receive_currency.clone())
            .or_insert(Decimal::ZERO) += receive;

        let order_id = uuid::Uuid::new_v4().to_string();
        book.fills.push(PaperFill {
            order_id: order_id.clone(),
            side,
            size,
            price,
        });

        tracing::debug!(
            order_id = %order_id,
            side = %side,
            size = %size,
            price = %price,
            pair,
            "Paper fill"
        );

        Ok(order_id)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool, GatewayError> {
        Err(GatewayError::UnknownOrder(order_id.to_string()))
    }

    async fn open_orders(&self) -> Result<Vec<OpenOrder>, GatewayError> {
        Ok(Vec::new())
    }

    async fn balance(&self, currency: &str) -> Result<Decimal, GatewayError> {
        Ok(self.balance_of(currency))
    }

    async fn best_price(&self, _pair: &str, _side: OrderSide) -> Result<Decimal, GatewayError> {
        let price = self.lock().price;
        if price <= Decimal::ZERO {
            return Err(GatewayError::Rejected("no price available".to_string()));
        }
        Ok(price)
    }
}

/// Marks the paper venue to each completed candle's close
impl CandleListener for PaperGateway {
    fn on_candle(&self, candle: &Candle) {
        self.set_price(candle.close);
    }

    fn name(&self) -> &str {
        "paper-gateway"
    }
}
