use alert_core::SizeMapping;
use broker_trait::{ExecutionError, OrderStatus};
use risk_manager::RiskCheck;
use rust_decimal::Decimal;
use std::time::Duration;
use trade_store::StoreError;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Contract traded on the venue
    pub symbol: String,
    /// Dollar value of one point per contract
    pub tick_value: Decimal,
    pub size_mapping: SizeMapping,
    pub enable_auto_trading: bool,
    pub poll_interval: Duration,
    /// Upper bound on waiting for any single order to fill
    pub fill_timeout: Duration,
    /// Extra attempts for a failed position write before the tick gives up
    pub persist_retries: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            symbol: "MES".to_string(),
            tick_value: Decimal::new(125, 2),
            size_mapping: SizeMapping::default(),
            enable_auto_trading: false,
            poll_interval: Duration::from_secs(5),
            fill_timeout: Duration::from_secs(30),
            persist_retries: 3,
        }
    }
}

/// Result of handing a valid alert to the executor.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Executed {
        trade_id: i64,
        quantity: u32,
        fill_price: Decimal,
    },
    Skipped(RiskCheck),
    Disabled,
    Failed(String),
}

impl ExecutionOutcome {
    /// Value written to the alert's processing_status column.
    pub fn processing_status(&self) -> &'static str {
        match self {
            ExecutionOutcome::Executed { .. } => "executed",
            ExecutionOutcome::Skipped(_) => "skipped_risk",
            ExecutionOutcome::Disabled => "not_executed",
            ExecutionOutcome::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Order {order_id} not filled after {waited:?} (status: {status:?})")]
    FillTimeout {
        order_id: String,
        waited: Duration,
        status: OrderStatus,
    },

    #[error("Order {0} was {1:?}: not filled")]
    OrderNotFilled(String, OrderStatus),
}
