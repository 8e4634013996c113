use rust_decimal::Decimal;

use crate::models::{CircuitBreaker, RiskCheck, RiskLimits, RiskSnapshot};

/// Synchronous pre-trade gates. A failed gate is returned as a value and is
/// never retried.
#[derive(Debug, Clone)]
pub struct RiskManager {
    limits: RiskLimits,
}

impl RiskManager {
    pub fn new(limits: RiskLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn check_trade_risk(&self, snapshot: &RiskSnapshot, new_quantity: u32) -> RiskCheck {
        let limits = &self.limits;

        if !snapshot.market_open {
            return RiskCheck::reject(
                "Market session is closed".to_string(),
                "Wait for the market to open",
            );
        }

        if snapshot.daily_trade_count >= limits.max_daily_trades {
            return RiskCheck::reject(
                format!(
                    "Daily trade limit reached ({}/{})",
                    snapshot.daily_trade_count, limits.max_daily_trades
                ),
                "No new entries until tomorrow",
            );
        }

        let total_quantity = snapshot.open_quantity.saturating_add(new_quantity);
        if total_quantity > limits.max_position_size {
            return RiskCheck::reject(
                format!(
                    "Position size {} + {} would exceed maximum {}",
                    snapshot.open_quantity, new_quantity, limits.max_position_size
                ),
                "Close existing positions before opening new ones",
            );
        }

        if snapshot.account_balance < limits.min_account_balance {
            return RiskCheck::reject(
                format!(
                    "Account balance {} below minimum {}",
                    snapshot.account_balance, limits.min_account_balance
                ),
                "Fund the account",
            );
        }

        if limits.enable_circuit_breaker {
            if let Some(check) = self.check_circuit_breakers(snapshot) {
                tracing::warn!(reason = %check.reason, "Circuit breaker tripped");
                return check;
            }
        }

        RiskCheck::approve()
    }

    fn check_circuit_breakers(&self, snapshot: &RiskSnapshot) -> Option<RiskCheck> {
        let limits = &self.limits;

        if limits.daily_loss_limit > Decimal::ZERO
            && snapshot.daily_realized_pnl <= -limits.daily_loss_limit
        {
            return Some(RiskCheck::tripped(
                CircuitBreaker::DailyLossLimit,
                format!(
                    "Daily loss {} reached limit {}",
                    snapshot.daily_realized_pnl, limits.daily_loss_limit
                ),
            ));
        }

        if limits.max_consecutive_losses > 0
            && snapshot.consecutive_losses >= limits.max_consecutive_losses
        {
            return Some(RiskCheck::tripped(
                CircuitBreaker::ConsecutiveLosses,
                format!(
                    "{} consecutive losing trades (max {})",
                    snapshot.consecutive_losses, limits.max_consecutive_losses
                ),
            ));
        }

        None
    }
}
