use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggregate statistics over a window of closed trades.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub breakeven_trades: u32,
    /// Percent, 0-100
    pub win_rate: f64,
    pub total_pnl: Decimal,
    pub gross_profit: Decimal,
    /// Sum of losing trades (negative or zero)
    pub gross_loss: Decimal,
    /// 0 when there are no losing trades
    pub profit_factor: f64,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
    pub total_commission: Decimal,
    /// Mean over sample standard deviation of per-trade P&L
    pub sharpe_ratio: f64,
    pub max_drawdown: Decimal,
    pub max_win_streak: u32,
    pub max_loss_streak: u32,
    /// Positive for a winning run, negative for a losing run
    pub current_streak: i32,
    pub total_alerts: u64,
    pub executed_trades: u64,
    /// Percent of valid alerts that became trades; 0 when there were no alerts
    pub execution_rate: f64,
    pub avg_duration_minutes: f64,
    /// Mean points between alert price and entry fill
    pub avg_entry_slippage: Decimal,
}
