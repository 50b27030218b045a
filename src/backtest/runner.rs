use rust_decimal::Decimal;
use std::sync::Arc;

use crate::aggregator::{align_down, CandleAggregator};
use crate::backtest::report::BacktestReport;
use crate::bus::{CandleBus, CollectingListener};
use crate::config::Settings;
use crate::error::TraderError;
use crate::execution::{ExecutionConfig, PositionStateMachine};
use crate::gateway::PaperGateway;
use crate::models::{Candle, PositionState, Trade, TradeRecord};
use crate::strategy::SignalEvaluator;
use crate::Result;

/// Everything a backtest produced
#[derive(Debug, Clone)]
pub struct BacktestOutcome {
    pub report: BacktestReport,
    pub candles: Vec<Candle>,
    pub records: Vec<TradeRecord>,
    pub final_state: PositionState,
    pub final_quote_balance: Decimal,
    pub final_base_balance: Decimal,
}

/// Replays a trade history through the live pipeline: the same aggregator,
/// bus and state machine, against a paper venue that fills at each candle's
/// close.
pub struct BacktestRunner {
    bucket_secs: i64,
    execution: ExecutionConfig,
    quote_balance: Decimal,
    base_balance: Decimal,
    fee_pct: f64,
    fee_fixed: f64,
}

impl BacktestRunner {
    pub fn new(bucket_secs: i64, execution: ExecutionConfig, quote_balance: Decimal, base_balance: Decimal) -> Self {
        Self {
            bucket_secs,
            execution,
            quote_balance,
            base_balance,
            fee_pct: 0.0,
            fee_fixed: 0.0,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.bucket_secs,
            ExecutionConfig::from_settings(settings),
            settings.paper_quote_balance,
            settings.paper_base_balance,
        )
        .with_fees(settings.fee_pct, settings.fee_fixed)
    }

    pub fn with_fees(mut self, fee_pct: f64, fee_fixed: f64) -> Self {
        self.fee_pct = fee_pct;
        self.fee_fixed = fee_fixed;
        self
    }

    /// Run `evaluator` over `trades`, which must be in ascending timestamp order
    pub async fn run(&self, trades: &[Trade], evaluator: Box<dyn SignalEvaluator>) -> Result<BacktestOutcome> {
        let (first, last) = match (trades.first(), trades.last()) {
            (Some(first), Some(last)) => (first.timestamp, last.timestamp),
            _ => return Err(TraderError::InvalidArgument("no trades to backtest".into())),
        };
        if first > last {
            return Err(TraderError::InvalidArgument(
                "trades must be in ascending timestamp order".into(),
            ));
        }

        let evaluator_name = evaluator.name().to_string();
        tracing::info!(
            trades = trades.len(),
            bucket_secs = self.bucket_secs,
            evaluator = %evaluator_name,
            "Starting backtest"
        );

        let bus = Arc::new(CandleBus::new());
        let pending = Arc::new(CollectingListener::new());
        bus.subscribe(pending.clone())?;

        let mut aggregator = CandleAggregator::new(self.bucket_secs, align_down(first, self.bucket_secs), bus)?;

        let gateway = Arc::new(PaperGateway::new(
            self.execution.base_currency.clone(),
            self.execution.quote_currency.clone(),
            self.base_balance,
            self.quote_balance,
        ));
        let mut machine = PositionStateMachine::new(self.execution.clone(), evaluator, gateway.clone());
        let mut candles = Vec::new();

        for trade in trades {
            aggregator.ingest(trade);
            Self::deliver(&pending, &gateway, &mut machine, &mut candles).await;
        }

        // Close the last bucket
        aggregator.advance(align_down(last, self.bucket_secs) + self.bucket_secs);
        Self::deliver(&pending, &gateway, &mut machine, &mut candles).await;

        let stats = aggregator.stats();
        tracing::info!(
            candles = candles.len(),
            late_dropped = stats.late_dropped,
            out_of_range = stats.out_of_range,
            empty_skipped = stats.empty_skipped,
            orders = machine.records().len(),
            "Backtest replay complete"
        );

        let final_state = machine.state();
        let records = machine.into_records();
        let report = BacktestReport::from_records(&records, &candles, self.fee_pct, self.fee_fixed);

        Ok(BacktestOutcome {
            report,
            candles,
            records,
            final_state,
            final_quote_balance: gateway.balance_of(&self.execution.quote_currency),
            final_base_balance: gateway.balance_of(&self.execution.base_currency),
        })
    }

    /// Hand newly published candles to the machine, pricing the paper venue
    /// at each close first
    async fn deliver(
        pending: &CollectingListener,
        gateway: &PaperGateway,
        machine: &mut PositionStateMachine,
        candles: &mut Vec<Candle>,
    ) {
        for candle in pending.drain() {
            gateway.set_price(candle.close);
            machine.on_candle(candle.clone()).await;
            candles.push(candle);
        }
    }

    /// Run a backtest and print its report
    pub async fn run_and_report(
        &self,
        trades: &[Trade],
        evaluator: Box<dyn SignalEvaluator>,
        scenario_name: &str,
    ) -> Result<BacktestOutcome> {
        println!("\n🔬 Running backtest: {}", scenario_name);
        println!("   Evaluator: {}", evaluator.name());
        println!("   Trades: {}", trades.len());
        println!("   Bucket: {}s", self.bucket_secs);

        let outcome = self.run(trades, evaluator).await?;
        println!("   Candles: {}", outcome.candles.len());
        outcome.report.print_report();

        Ok(outcome)
    }
}
