use anyhow::Result;
use candle_trader::backtest::{BacktestOutcome, BacktestRunner, MarketScenario, SyntheticTradeGenerator};
use candle_trader::execution::{ExecutionConfig, OrderSizing};
use candle_trader::strategy::MovingAverageCrossover;
use rust_decimal::Decimal;

const BUCKET_SECS: i64 = 60;
const NUM_BUCKETS: usize = 1_000;
const START_TIME: i64 = 1_700_000_000;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("candle_trader=info")
        .init();

    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║          CANDLE TRADER BACKTESTING SUITE              ║");
    println!("╚═══════════════════════════════════════════════════════╝");

    let execution = ExecutionConfig {
        pair: "BTC/USD".to_string(),
        base_currency: "BTC".to_string(),
        quote_currency: "USD".to_string(),
        warmup_candles: 205,
        sizing: OrderSizing::default(),
    };
    let runner = BacktestRunner::new(BUCKET_SECS, execution, Decimal::from(10_000), Decimal::ZERO)
        .with_fees(0.002, 0.0);

    let scenarios = [
        (MarketScenario::Uptrend, "📈 Uptrend"),
        (MarketScenario::Downtrend, "📉 Downtrend"),
        (MarketScenario::Sideways, "↔️  Sideways (mean-reverting)"),
        (MarketScenario::Volatile, "⚡ Volatile (±3% swings)"),
        (MarketScenario::WithGaps, "🕳️  With empty buckets"),
    ];

    let mut results = Vec::new();

    for (scenario, name) in scenarios {
        let mut generator = SyntheticTradeGenerator::new(42);
        let trades = generator.generate(scenario, START_TIME, NUM_BUCKETS, BUCKET_SECS);

        match runner
            .run_and_report(&trades, Box::new(MovingAverageCrossover::default()), name)
            .await
        {
            Ok(outcome) => results.push((name.to_string(), outcome)),
            Err(e) => eprintln!("❌ Backtest failed for {}: {}", name, e),
        }
    }

    print_summary_comparison(&results);

    Ok(())
}

fn print_summary_comparison(results: &[(String, BacktestOutcome)]) {
    println!("\n╔═══════════════════════════════════════════════════════╗");
    println!("║              SCENARIO COMPARISON                      ║");
    println!("╚═══════════════════════════════════════════════════════╝\n");

    println!(
        "{:<30} {:>8} {:>10} {:>10} {:>8} {:>8}",
        "Scenario", "Trades", "Profit", "B&H", "Win%", "MaxDD%"
    );
    println!("{}", "─".repeat(80));

    for (name, outcome) in results {
        let report = &outcome.report;
        println!(
            "{:<30} {:>8} {:>10.4} {:>10.4} {:>8.1} {:>8.2}",
            name,
            report.number_of_trades,
            report.total_profit,
            report.buy_and_hold_profit,
            report.profitable_trades_ratio * 100.0,
            report.max_drawdown * 100.0
        );
    }

    println!("\n");
}
