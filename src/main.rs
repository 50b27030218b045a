use anyhow::{Context, Result};
use candle_trader::aggregator::{
    align_down, spawn_aggregator, spawn_clock, CandleAggregator, Clock, SystemClock,
};
use candle_trader::backtest::{load_trades_csv, BacktestRunner};
use candle_trader::bus::CandleBus;
use candle_trader::config::Settings;
use candle_trader::execution::{spawn_position_worker, ExecutionConfig, PositionStateMachine};
use candle_trader::feed::RestTradePoller;
use candle_trader::gateway::PaperGateway;
use candle_trader::ingest::{partition_decoded, TradeIngestor};
use candle_trader::strategy::MovingAverageCrossover;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::EnvFilter;

const TRADE_CHANNEL_CAPACITY: usize = 4_096;

#[derive(Parser)]
#[command(name = "candle-trader", about = "Candle aggregation and position trading")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Short moving-average period of the crossover evaluator
    #[arg(long, global = true, default_value_t = 5)]
    short: usize,

    /// Long moving-average period of the crossover evaluator
    #[arg(long, global = true, default_value_t = 20)]
    long: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Stream trades from the venue and trade on a paper account
    Live {
        #[arg(long)]
        bucket_secs: Option<i64>,

        /// Buckets of history to replay before going live
        #[arg(long)]
        backfill_buckets: Option<usize>,
    },
    /// Replay a `timestamp,price,amount` trade file
    Backtest {
        #[arg(long)]
        file: PathBuf,

        #[arg(long)]
        bucket_secs: Option<i64>,

        /// Candles needed before the first evaluation
        #[arg(long)]
        warmup: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let mut settings = Settings::load().context("Failed to load settings")?;
    let evaluator = MovingAverageCrossover::new(cli.short, cli.long)?;

    match cli.command {
        Command::Live {
            bucket_secs,
            backfill_buckets,
        } => {
            if let Some(secs) = bucket_secs {
                settings.bucket_secs = secs;
            }
            if let Some(count) = backfill_buckets {
                settings.backfill_buckets = count;
            }
            settings.validate()?;
            run_live(settings, evaluator).await
        }
        Command::Backtest {
            file,
            bucket_secs,
            warmup,
        } => {
            if let Some(secs) = bucket_secs {
                settings.bucket_secs = secs;
            }
            if let Some(warmup) = warmup {
                settings.warmup_candles = warmup;
            }
            settings.validate()?;
            run_backtest(settings, file, evaluator).await
        }
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("candle_trader=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_backtest(settings: Settings, file: PathBuf, evaluator: MovingAverageCrossover) -> Result<()> {
    let loaded = load_trades_csv(&file)
        .with_context(|| format!("Failed to read trade file {}", file.display()))?;

    let runner = BacktestRunner::from_settings(&settings);
    let name = file.display().to_string();
    let outcome = runner
        .run_and_report(&loaded.trades, Box::new(evaluator), &name)
        .await
        .context("Backtest failed")?;

    tracing::info!(
        final_state = ?outcome.final_state,
        quote = %outcome.final_quote_balance,
        base = %outcome.final_base_balance,
        "Backtest finished"
    );
    Ok(())
}

async fn run_live(settings: Settings, evaluator: MovingAverageCrossover) -> Result<()> {
    tracing::info!(
        pair = %settings.pair,
        bucket_secs = settings.bucket_secs,
        warmup = settings.warmup_candles,
        feed = %settings.feed_url,
        "🚀 Candle trader starting"
    );

    let bus = Arc::new(CandleBus::new());
    let gateway = Arc::new(PaperGateway::new(
        settings.base_currency.clone(),
        settings.quote_currency.clone(),
        settings.paper_base_balance,
        settings.paper_quote_balance,
    ));
    // Venue is marked before the worker sees the candle
    bus.subscribe(gateway.clone())?;

    let machine = PositionStateMachine::new(
        ExecutionConfig::from_settings(&settings),
        Box::new(evaluator),
        gateway.clone(),
    );
    let (worker, worker_task) = spawn_position_worker(machine);
    let worker = Arc::new(worker);
    bus.subscribe(worker.clone())?;

    let poller = RestTradePoller::new(
        settings.feed_url.clone(),
        settings.requests_per_minute,
        Duration::from_millis(settings.poll_interval_ms),
    )?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let aggregator = build_aggregator(&settings, bus.clone(), &poller, clock.now_secs()).await?;
    let first_end = aggregator.current_end();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (trade_tx, trade_rx) = mpsc::channel(TRADE_CHANNEL_CAPACITY);
    let (tick_tx, tick_rx) = mpsc::channel(16);

    let mut aggregator_task = spawn_aggregator(aggregator, trade_rx, tick_rx, shutdown_rx.clone());
    let clock_task = spawn_clock(clock, first_end, settings.bucket_secs, tick_tx, shutdown_rx.clone());
    let mut poller_task = {
        let poller = poller.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { poller.run(TradeIngestor::new(trade_tx), shutdown).await })
    };

    tracing::info!("Press Ctrl+C to stop");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        result = &mut poller_task => {
            tracing::error!(ok = result.is_ok(), "Trade poller exited");
        }
        result = &mut aggregator_task => {
            tracing::error!(ok = result.is_ok(), "Aggregator exited");
        }
    }

    shutdown_tx.send(true).ok();
    if !poller_task.is_finished() {
        if let Ok(ingestor) = poller_task.await {
            let stats = ingestor.stats();
            tracing::info!(
                accepted = stats.accepted,
                rejected = stats.rejected,
                duplicates = stats.duplicates,
                "Feed stopped"
            );
        }
    }
    if !aggregator_task.is_finished() {
        if let Ok(aggregator) = aggregator_task.await {
            let stats = aggregator.stats();
            tracing::info!(
                published = stats.published,
                late_dropped = stats.late_dropped,
                out_of_range = stats.out_of_range,
                empty_skipped = stats.empty_skipped,
                "Aggregator stopped"
            );
        }
    }
    clock_task.await.ok();

    worker.close();
    let machine = worker_task.await.context("Position worker panicked")?;
    tracing::info!(
        state = ?machine.state(),
        orders = machine.records().len(),
        quote = %gateway.balance_of(&settings.quote_currency),
        base = %gateway.balance_of(&settings.base_currency),
        "Session ended"
    );
    for record in machine.records() {
        tracing::info!(
            index = record.index,
            side = %record.side,
            price = %record.price,
            size = %record.size,
            timestamp = record.timestamp,
            "Trade record"
        );
    }

    Ok(())
}

/// Build the live aggregator, replaying recent history first when asked.
///
/// The backfill window ends with the bucket containing `now`, which is then
/// handed to the live stream instead of being published from history.
async fn build_aggregator(
    settings: &Settings,
    bus: Arc<CandleBus>,
    poller: &RestTradePoller,
    now: i64,
) -> Result<CandleAggregator> {
    let duration = settings.bucket_secs;
    let count = settings.backfill_buckets;

    if count == 0 {
        return Ok(CandleAggregator::starting_at(duration, now, bus)?);
    }

    let origin = align_down(now, duration) - (count as i64 - 1) * duration;
    let mut aggregator = CandleAggregator::new(duration, origin, bus)?;

    let (history, rejected) = match poller.fetch().await {
        Ok(records) => partition_decoded(records),
        Err(e) => {
            tracing::warn!(error = %e, "History fetch failed, starting without backfill");
            (Vec::new(), 0)
        }
    };

    let stats = aggregator
        .backfill(&history, origin, duration, count, now)
        .context("Backfill failed")?;
    tracing::info!(
        published = stats.published,
        replayed = stats.replayed_trades,
        rejected,
        out_of_window = stats.out_of_window,
        handed_over = stats.discarded_overlap,
        "History replayed"
    );

    Ok(aggregator)
}
