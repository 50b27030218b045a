use rust_decimal::Decimal;
use std::sync::Arc;

use super::candle_window::CandleWindow;
use super::fsm::{decide, Transition};
use super::sizing::OrderSizing;
use crate::config::Settings;
use crate::error::GatewayError;
use crate::gateway::OrderGateway;
use crate::models::{Candle, OrderSide, PositionState, TradeRecord};
use crate::strategy::SignalEvaluator;

/// Market and sizing parameters of one trading session
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub pair: String,
    pub base_currency: String,
    pub quote_currency: String,
    /// Candles needed before the evaluator is consulted; also the window length
    pub warmup_candles: usize,
    pub sizing: OrderSizing,
}

impl ExecutionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            pair: settings.pair.clone(),
            base_currency: settings.base_currency.clone(),
            quote_currency: settings.quote_currency.clone(),
            warmup_candles: settings.warmup_candles,
            sizing: OrderSizing::from_settings(settings),
        }
    }
}

/// What one candle did to the position
#[derive(Debug, Clone, PartialEq)]
pub enum CandleOutcome {
    /// Still collecting history; the evaluator was not called
    WarmingUp { received: usize, needed: usize },
    /// No transition applies to the current signal and state
    NoAction,
    Executed {
        order_id: String,
        transition: Transition,
        record: TradeRecord,
    },
    /// A transition applied but the computed size is under the exchange minimum
    SizeTooSmall { transition: Transition, size: Decimal },
    /// A balance, price or order call failed; state is unchanged
    Failed {
        transition: Transition,
        error: GatewayError,
    },
}

/// Reacts to completed candles by evaluating a signal and placing at most
/// one order per state transition.
///
/// `on_candle` takes `&mut self`, so evaluations of one machine never
/// overlap; the balance read and the order it sizes always belong to the
/// same candle.
pub struct PositionStateMachine {
    config: ExecutionConfig,
    evaluator: Box<dyn SignalEvaluator>,
    gateway: Arc<dyn OrderGateway>,
    window: CandleWindow,
    received: usize,
    state: PositionState,
    records: Vec<TradeRecord>,
}

impl PositionStateMachine {
    pub fn new(
        config: ExecutionConfig,
        evaluator: Box<dyn SignalEvaluator>,
        gateway: Arc<dyn OrderGateway>,
    ) -> Self {
        let window = CandleWindow::new(config.warmup_candles);
        Self {
            config,
            evaluator,
            gateway,
            window,
            received: 0,
            state: PositionState::NoPosition,
            records: Vec::new(),
        }
    }

    pub fn state(&self) -> PositionState {
        self.state
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<TradeRecord> {
        self.records
    }

    pub fn candles_received(&self) -> usize {
        self.received
    }

    pub fn is_warmed_up(&self) -> bool {
        self.received >= self.config.warmup_candles
    }

    /// Handle one completed candle
    pub async fn on_candle(&mut self, candle: Candle) -> CandleOutcome {
        let index = self.received;
        self.received += 1;
        self.window.push(candle.clone());

        if !self.is_warmed_up() {
            return CandleOutcome::WarmingUp {
                received: self.received,
                needed: self.config.warmup_candles,
            };
        }

        let signal = self.evaluator.evaluate(self.window.as_slice());
        let Some(transition) = decide(self.state, signal) else {
            return CandleOutcome::NoAction;
        };

        tracing::info!(
            evaluator = self.evaluator.name(),
            candle = index,
            end = candle.end_time,
            close = %candle.close,
            side = %transition.side,
            from = ?transition.from,
            to = ?transition.to,
            "Signal triggers transition"
        );

        self.cancel_open_orders().await;

        let size = match self.order_size(transition.side).await {
            Ok(size) => size,
            Err(error) => {
                tracing::error!(side = %transition.side, error = %error, "Could not size order");
                return CandleOutcome::Failed { transition, error };
            }
        };

        if !self.config.sizing.meets_minimum(size) {
            tracing::info!(
                side = %transition.side,
                size = %size,
                min = %self.config.sizing.min_order_size,
                "Order size below minimum, skipping"
            );
            return CandleOutcome::SizeTooSmall { transition, size };
        }

        let order_id = match self
            .gateway
            .place_market_order(transition.side, size, &self.config.pair)
            .await
        {
            Ok(order_id) => order_id,
            Err(error) => {
                tracing::error!(
                    side = %transition.side,
                    size = %size,
                    error = %error,
                    "Order placement failed"
                );
                return CandleOutcome::Failed { transition, error };
            }
        };

        let record = TradeRecord {
            index,
            price: candle.close,
            size,
            side: transition.side,
            timestamp: candle.end_time,
        };
        self.records.push(record.clone());
        self.state = transition.to;

        tracing::info!(
            order_id = %order_id,
            side = %transition.side,
            size = %size,
            price = %candle.close,
            state = ?self.state,
            "Order placed"
        );

        CandleOutcome::Executed {
            order_id,
            transition,
            record,
        }
    }

    /// Cancel whatever is still resting. Failures are logged and ignored:
    /// the new order goes out regardless.
    async fn cancel_open_orders(&self) {
        let orders = match self.gateway.open_orders().await {
            Ok(orders) => orders,
            Err(e) => {
                tracing::warn!(error = %e, "Could not list open orders");
                return;
            }
        };

        for order in orders {
            match self.gateway.cancel_order(&order.id).await {
                Ok(true) => tracing::debug!(order_id = %order.id, "Cancelled open order"),
                Ok(false) => tracing::warn!(order_id = %order.id, "Venue refused cancel"),
                Err(e) => tracing::warn!(order_id = %order.id, error = %e, "Cancel failed"),
            }
        }
    }

    async fn order_size(&self, side: OrderSide) -> Result<Decimal, GatewayError> {
        let sizing = &self.config.sizing;
        match side {
            OrderSide::Buy => {
                let quote = self.gateway.balance(&self.config.quote_currency).await?;
                let ask = self
                    .gateway
                    .best_price(&self.config.pair, OrderSide::Buy)
                    .await?;
                Ok(sizing.buy_size(quote, ask))
            }
            OrderSide::Sell => {
                let base = self.gateway.balance(&self.config.base_currency).await?;
                Ok(sizing.sell_size(base))
            }
        }
    }
}
