use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_daily_trades: u32,
    /// Maximum contracts held across all open positions
    pub max_position_size: u32,
    pub min_account_balance: Decimal,
    /// Realized loss for the day at which new entries halt (positive number)
    pub daily_loss_limit: Decimal,
    pub max_consecutive_losses: u32,
    pub enable_circuit_breaker: bool,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_daily_trades: 10,
            max_position_size: 5,
            min_account_balance: Decimal::from(1_000),
            daily_loss_limit: Decimal::from(500),
            max_consecutive_losses: 3,
            enable_circuit_breaker: true,
        }
    }
}

/// Point-in-time inputs for a pre-trade check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub daily_trade_count: u32,
    pub open_quantity: u32,
    pub account_balance: Decimal,
    pub market_open: bool,
    pub daily_realized_pnl: Decimal,
    pub consecutive_losses: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitBreaker {
    DailyLossLimit,
    ConsecutiveLosses,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskCheck {
    pub can_trade: bool,
    pub reason: String,
    pub breaker: Option<CircuitBreaker>,
    pub suggested_action: Option<String>,
}

impl RiskCheck {
    pub(crate) fn approve() -> Self {
        Self {
            can_trade: true,
            reason: "Trade meets all risk criteria".to_string(),
            breaker: None,
            suggested_action: None,
        }
    }

    pub(crate) fn reject(reason: String, suggested_action: &str) -> Self {
        Self {
            can_trade: false,
            reason,
            breaker: None,
            suggested_action: Some(suggested_action.to_string()),
        }
    }

    pub(crate) fn tripped(breaker: CircuitBreaker, reason: String) -> Self {
        Self {
            can_trade: false,
            reason,
            breaker: Some(breaker),
            suggested_action: Some("Trading halted until the next session".to_string()),
        }
    }
}
