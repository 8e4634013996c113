#[cfg(test)]
mod risk_manager_tests {
    use crate::manager::RiskManager;
    use crate::models::{CircuitBreaker, RiskLimits, RiskSnapshot};
    use rust_decimal_macros::dec;

    fn healthy_snapshot() -> RiskSnapshot {
        RiskSnapshot {
            daily_trade_count: 0,
            open_quantity: 0,
            account_balance: dec!(50000),
            market_open: true,
            daily_realized_pnl: dec!(0),
            consecutive_losses: 0,
        }
    }

    #[test]
    fn test_approves_healthy_trade() {
        let manager = RiskManager::new(RiskLimits::default());
        let check = manager.check_trade_risk(&healthy_snapshot(), 3);
        assert!(check.can_trade);
        assert!(check.breaker.is_none());
    }

    #[test]
    fn test_daily_trade_limit() {
        let manager = RiskManager::new(RiskLimits::default());
        let snapshot = RiskSnapshot {
            daily_trade_count: 10,
            ..healthy_snapshot()
        };
        let check = manager.check_trade_risk(&snapshot, 1);
        assert!(!check.can_trade);
        assert!(check.reason.contains("Daily trade limit"));

        let snapshot = RiskSnapshot {
            daily_trade_count: 9,
            ..healthy_snapshot()
        };
        assert!(manager.check_trade_risk(&snapshot, 1).can_trade);
    }

    #[test]
    fn test_aggregate_position_size() {
        let manager = RiskManager::new(RiskLimits::default());
        let snapshot = RiskSnapshot {
            open_quantity: 3,
            ..healthy_snapshot()
        };
        // 3 open + 2 new == 5 is allowed
        assert!(manager.check_trade_risk(&snapshot, 2).can_trade);
        let check = manager.check_trade_risk(&snapshot, 3);
        assert!(!check.can_trade);
        assert!(check.reason.contains("exceed maximum 5"));
    }

    #[test]
    fn test_min_balance_and_market_hours() {
        let manager = RiskManager::new(RiskLimits::default());

        let poor = RiskSnapshot {
            account_balance: dec!(999.99),
            ..healthy_snapshot()
        };
        assert!(!manager.check_trade_risk(&poor, 1).can_trade);

        let closed = RiskSnapshot {
            market_open: false,
            ..healthy_snapshot()
        };
        let check = manager.check_trade_risk(&closed, 1);
        assert!(!check.can_trade);
        assert_eq!(check.reason, "Market session is closed");
    }

    #[test]
    fn test_daily_loss_breaker() {
        let manager = RiskManager::new(RiskLimits::default());
        let snapshot = RiskSnapshot {
            daily_realized_pnl: dec!(-500),
            ..healthy_snapshot()
        };
        let check = manager.check_trade_risk(&snapshot, 1);
        assert!(!check.can_trade);
        assert_eq!(check.breaker, Some(CircuitBreaker::DailyLossLimit));

        let snapshot = RiskSnapshot {
            daily_realized_pnl: dec!(-499.99),
            ..healthy_snapshot()
        };
        assert!(manager.check_trade_risk(&snapshot, 1).can_trade);
    }

    #[test]
    fn test_consecutive_loss_breaker() {
        let manager = RiskManager::new(RiskLimits::default());
        let snapshot = RiskSnapshot {
            consecutive_losses: 3,
            ..healthy_snapshot()
        };
        let check = manager.check_trade_risk(&snapshot, 1);
        assert_eq!(check.breaker, Some(CircuitBreaker::ConsecutiveLosses));
    }

    #[test]
    fn test_breakers_can_be_disabled() {
        let manager = RiskManager::new(RiskLimits {
            enable_circuit_breaker: false,
            ..RiskLimits::default()
        });
        let snapshot = RiskSnapshot {
            consecutive_losses: 7,
            daily_realized_pnl: dec!(-2000),
            ..healthy_snapshot()
        };
        assert!(manager.check_trade_risk(&snapshot, 1).can_trade);
    }
}
