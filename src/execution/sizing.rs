use rust_decimal::Decimal;

use crate::config::Settings;

/// Turns an available balance into an order size
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSizing {
    /// Share of the balance committed per order, in (0, 1]
    pub balance_fraction: Decimal,
    /// Exchange size step; sizes are rounded down to a multiple of it
    pub granularity: Decimal,
    /// Smallest order the exchange accepts
    pub min_order_size: Decimal,
}

impl Default for OrderSizing {
    fn default() -> Self {
        Self {
            balance_fraction: Decimal::new(95, 2),
            granularity: Decimal::new(1, 4),
            min_order_size: Decimal::new(1, 2),
        }
    }
}

impl OrderSizing {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            balance_fraction: settings.balance_fraction,
            granularity: settings.order_granularity,
            min_order_size: settings.min_order_size,
        }
    }

    /// Size of a buy paid from `quote_balance` at `best_ask`
    pub fn buy_size(&self, quote_balance: Decimal, best_ask: Decimal) -> Decimal {
        if best_ask <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.floor_to_granularity(quote_balance * self.balance_fraction / best_ask)
    }

    /// Size of a sell out of `base_balance`
    pub fn sell_size(&self, base_balance: Decimal) -> Decimal {
        self.floor_to_granularity(base_balance * self.balance_fraction)
    }

    pub fn meets_minimum(&self, size: Decimal) -> bool {
        size > Decimal::ZERO && size >= self.min_order_size
    }

    pub fn floor_to_granularity(&self, size: Decimal) -> Decimal {
        if size <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        if self.granularity <= Decimal::ZERO {
            return size;
        }
        (size / self.granularity).floor() * self.granularity
    }
}
