use crate::models::{Trade, TradeSide};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Market scenario types for synthetic trade generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    /// Steady uptrend with noise
    Uptrend,
    /// Steady downtrend with noise
    Downtrend,
    /// Mean-reverting chop around the base price
    Sideways,
    /// Large swings (±3% per bucket)
    Volatile,
    /// Every 50th bucket has no trades at all
    WithGaps,
}

impl MarketScenario {
    pub fn all() -> [MarketScenario; 5] {
        [
            MarketScenario::Uptrend,
            MarketScenario::Downtrend,
            MarketScenario::Sideways,
            MarketScenario::Volatile,
            MarketScenario::WithGaps,
        ]
    }
}

/// Generates synthetic trade streams for backtesting
pub struct SyntheticTradeGenerator {
    rng: StdRng,
    base_price: f64,
    max_trades_per_bucket: u32,
}

impl SyntheticTradeGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 250.0,
            max_trades_per_bucket: 8,
        }
    }

    /// Generate trades covering `num_buckets` buckets of `bucket_secs` from
    /// `start_time`, in ascending timestamp order.
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        start_time: i64,
        num_buckets: usize,
        bucket_secs: i64,
    ) -> Vec<Trade> {
        let mut trades = Vec::new();
        let mut price = self.base_price;

        for bucket in 0..num_buckets {
            price = self.step(scenario, price);

            if scenario == MarketScenario::WithGaps && bucket % 50 == 49 {
                continue;
            }

            let bucket_start = start_time + bucket as i64 * bucket_secs;
            let count = self.rng.gen_range(1..=self.max_trades_per_bucket);
            let mut offsets: Vec<i64> = (0..count)
                .map(|_| self.rng.gen_range(0..bucket_secs.max(1)))
                .collect();
            offsets.sort_unstable();

            for offset in offsets {
                let trade_price = price * (1.0 + self.rng.gen_range(-0.001..0.001));
                let amount = self.rng.gen_range(0.01..2.0);
                let side = if self.rng.gen_bool(0.5) {
                    TradeSide::Buy
                } else {
                    TradeSide::Sell
                };

                trades.push(Trade {
                    id: format!("syn-{}", trades.len()),
                    timestamp: bucket_start + offset,
                    price: to_decimal(trade_price, 2),
                    amount: to_decimal(amount, 4),
                    side: Some(side),
                });
            }
        }

        trades
    }

    /// Advance the reference price by one bucket
    fn step(&mut self, scenario: MarketScenario, price: f64) -> f64 {
        let next = match scenario {
            MarketScenario::Uptrend => price * (1.001 + self.rng.gen_range(-0.0005..0.0005)),
            MarketScenario::Downtrend => price * (0.999 + self.rng.gen_range(-0.0005..0.0005)),
            MarketScenario::Sideways | MarketScenario::WithGaps => {
                // 10% pull to mean
                let reversion = (self.base_price - price) * 0.1;
                price + reversion + price * self.rng.gen_range(-0.01..0.01)
            }
            MarketScenario::Volatile => price * (1.0 + self.rng.gen_range(-0.03..0.03)),
        };

        // Prevent price from going too low
        next.max(self.base_price * 0.2)
    }
}

fn to_decimal(value: f64, dp: u32) -> Decimal {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(dp))
        .unwrap_or(Decimal::ZERO)
}
