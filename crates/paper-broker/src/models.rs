use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperBrokerConfig {
    pub symbol: String,
    pub starting_balance: Decimal,
    pub starting_price: Decimal,
    pub tick_size: Decimal,
    pub tick_value: Decimal,
    pub slippage_ticks: u32,
    /// Randomize slippage between 0.5x and 1.5x of `slippage_ticks`
    pub realistic_slippage: bool,
    pub commission_per_contract: Decimal,
    /// Largest price move per feed step, in points
    pub volatility: Decimal,
    pub price_floor: Decimal,
    pub price_ceiling: Decimal,
    pub update_interval: Duration,
}

impl Default for PaperBrokerConfig {
    fn default() -> Self {
        Self {
            symbol: "MES".to_string(),
            starting_balance: Decimal::from(50_000),
            starting_price: Decimal::from(6_300),
            tick_size: Decimal::new(25, 2),
            tick_value: Decimal::new(125, 2),
            slippage_ticks: 1,
            realistic_slippage: true,
            commission_per_contract: Decimal::new(250, 2),
            volatility: Decimal::from(2),
            price_floor: Decimal::from(6_000),
            price_ceiling: Decimal::from(7_000),
            update_interval: Duration::from_secs(1),
        }
    }
}

/// Running account statistics of the simulated venue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperStatistics {
    pub total_fills: u64,
    pub closing_fills: u64,
    pub winning_fills: u64,
    pub losing_fills: u64,
    pub realized_pnl: Decimal,
    pub commission_paid: Decimal,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
    pub peak_balance: Decimal,
    pub max_drawdown: Decimal,
}

impl PaperStatistics {
    pub fn win_rate(&self) -> f64 {
        if self.closing_fills == 0 {
            0.0
        } else {
            self.winning_fills as f64 / self.closing_fills as f64 * 100.0
        }
    }
}
