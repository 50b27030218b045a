use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Candle, OrderSide, TradeRecord};

const INITIAL_AMOUNT: f64 = 1.0;

/// An entry record and the record that closed it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub entry: TradeRecord,
    pub exit: TradeRecord,
    /// Exit value over entry value; above 1.0 is a win
    pub profit: f64,
}

impl ClosedTrade {
    fn new(entry: TradeRecord, exit: TradeRecord) -> Self {
        let profit = ratio(entry.side, to_f64(entry.price), to_f64(exit.price));
        Self {
            entry,
            exit,
            profit,
        }
    }

    pub fn is_short(&self) -> bool {
        self.entry.side == OrderSide::Sell
    }
}

/// Value multiple of holding a position opened at `entry` and marked at `mark`
fn ratio(entry_side: OrderSide, entry: f64, mark: f64) -> f64 {
    if entry <= 0.0 || mark <= 0.0 {
        return 1.0;
    }
    match entry_side {
        OrderSide::Buy => mark / entry,
        OrderSide::Sell => entry / mark,
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Performance of one backtest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    /// Closed entry/exit pairs; a position still open at the end is not counted
    pub number_of_trades: usize,
    /// Product of every closed trade's profit
    pub total_profit: f64,
    /// Last close over first close
    pub buy_and_hold_profit: f64,
    pub profitable_trades_ratio: f64,
    /// Largest peak-to-trough fall of the candle-by-candle equity curve, as a fraction
    pub max_drawdown: f64,
    pub reward_risk_ratio: f64,
    /// Fees paid over all closed trades starting from an amount of 1.0
    pub linear_transaction_cost: f64,
    pub fee_pct: f64,
    pub fee_fixed: f64,
    pub trades: Vec<ClosedTrade>,
}

impl BacktestReport {
    /// Score the records a state machine produced over `candles`.
    ///
    /// Record indices are ordinals into `candles`.
    pub fn from_records(records: &[TradeRecord], candles: &[Candle], fee_pct: f64, fee_fixed: f64) -> Self {
        let trades: Vec<ClosedTrade> = records
            .chunks_exact(2)
            .map(|pair| ClosedTrade::new(pair[0].clone(), pair[1].clone()))
            .collect();

        let number_of_trades = trades.len();
        let total_profit = trades.iter().map(|t| t.profit).product::<f64>();

        let buy_and_hold_profit = match (candles.first(), candles.last()) {
            (Some(first), Some(last)) => ratio(OrderSide::Buy, to_f64(first.close), to_f64(last.close)),
            _ => 1.0,
        };

        let profitable = trades.iter().filter(|t| t.profit > 1.0).count();
        let profitable_trades_ratio = if number_of_trades > 0 {
            profitable as f64 / number_of_trades as f64
        } else {
            0.0
        };

        let max_drawdown = Self::calculate_drawdown(&Self::equity_curve(&trades, candles));

        let reward_risk_ratio = if max_drawdown > 0.0 {
            total_profit / max_drawdown
        } else if number_of_trades > 0 {
            f64::INFINITY
        } else {
            0.0
        };

        let linear_transaction_cost = Self::calculate_transaction_cost(&trades, fee_pct, fee_fixed);

        Self {
            number_of_trades,
            total_profit,
            buy_and_hold_profit,
            profitable_trades_ratio,
            max_drawdown,
            reward_risk_ratio,
            linear_transaction_cost,
            fee_pct,
            fee_fixed,
            trades,
        }
    }

    /// Account value at every candle close, starting at 1.0. Flat between
    /// trades, marked to the close while a trade is open.
    fn equity_curve(trades: &[ClosedTrade], candles: &[Candle]) -> Vec<f64> {
        let mut values = vec![INITIAL_AMOUNT; candles.len()];
        let mut value = INITIAL_AMOUNT;
        let mut filled_to = 0;

        for trade in trades {
            let entry_index = trade.entry.index.min(candles.len());
            let exit_index = trade.exit.index.min(candles.len().saturating_sub(1));

            for slot in values.iter_mut().take(entry_index + 1).skip(filled_to) {
                *slot = value;
            }

            let entry_price = to_f64(trade.entry.price);
            let start_value = value;
            for i in (entry_index + 1)..=exit_index {
                value = start_value * ratio(trade.entry.side, entry_price, to_f64(candles[i].close));
                values[i] = value;
            }
            value = start_value * trade.profit;
            if let Some(slot) = values.get_mut(exit_index) {
                *slot = value;
            }
            filled_to = exit_index + 1;
        }

        for slot in values.iter_mut().skip(filled_to) {
            *slot = value;
        }

        values
    }

    /// Largest (peak - value) / peak along the curve
    fn calculate_drawdown(values: &[f64]) -> f64 {
        let mut peak = INITIAL_AMOUNT;
        let mut max_dd = 0.0;

        for &value in values {
            if value > peak {
                peak = value;
            }
            if peak > 0.0 {
                let drawdown = (peak - value) / peak;
                if drawdown > max_dd {
                    max_dd = drawdown;
                }
            }
        }

        max_dd
    }

    /// Percent-plus-fixed fee on the amount traded at each entry and exit,
    /// compounding the traded amount through the trades
    fn calculate_transaction_cost(trades: &[ClosedTrade], fee_pct: f64, fee_fixed: f64) -> f64 {
        let order_cost = |amount: f64| amount * fee_pct + fee_fixed;
        let mut amount = INITIAL_AMOUNT;
        let mut total = 0.0;

        for trade in trades {
            total += order_cost(amount);
            amount *= trade.profit;
            total += order_cost(amount);
        }

        total
    }

    pub fn print_report(&self) {
        println!("\n╔═══════════════════════════════════════════════╗");
        println!("║            BACKTEST RESULT                    ║");
        println!("╚═══════════════════════════════════════════════╝\n");

        println!("  Number of trades:        {}", self.number_of_trades);
        println!("  Total profit:            {:.4}", self.total_profit);
        println!("  Buy-and-hold profit:     {:.4}", self.buy_and_hold_profit);
        println!(
            "  Profitable trades:       {:.1}%",
            self.profitable_trades_ratio * 100.0
        );
        println!("  Max drawdown:            {:.2}%", self.max_drawdown * 100.0);
        println!("  Reward/risk ratio:       {:.4}", self.reward_risk_ratio);
        println!(
            "  Transaction cost:        {:.6} ({:.3}% + {} fixed)",
            self.linear_transaction_cost,
            self.fee_pct * 100.0,
            self.fee_fixed
        );

        if !self.trades.is_empty() {
            println!("\n  {:>6} {:>6} {:>5} {:>14} {:>14} {:>8}", "entry", "exit", "side", "entry price", "exit price", "profit");
            for trade in &self.trades {
                println!(
                    "  {:>6} {:>6} {:>5} {:>14} {:>14} {:>8.4}",
                    trade.entry.index,
                    trade.exit.index,
                    if trade.is_short() { "SHORT" } else { "LONG" },
                    trade.entry.price,
                    trade.exit.price,
                    trade.profit
                );
            }
        }
        println!();
    }
}
