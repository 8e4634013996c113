use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Order types (venue-agnostic)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => f.write_str("BUY"),
            OrderSide::Sell => f.write_str("SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderInfo {
    pub order_id: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: u32,
    pub stop_price: Option<Decimal>,
    pub status: OrderStatus,
    pub fill_price: Option<Decimal>,
    pub filled_at: Option<DateTime<Utc>>,
    pub commission: Decimal,
    pub created_at: DateTime<Utc>,
}

impl OrderInfo {
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionError {
    #[error("Order rejected: {0}")]
    Rejected(String),
    #[error("Order not found: {0}")]
    NotFound(String),
    #[error("Venue unavailable: {0}")]
    Unavailable(String),
    #[error("Timed out: {0}")]
    Timeout(String),
}

// ---------------------------------------------------------------------------
// Venue trait
// ---------------------------------------------------------------------------

/// An execution venue trading a single futures contract.
#[async_trait]
pub trait ExecutionVenue: Send + Sync {
    /// Latest traded price for the symbol
    async fn get_current_price(&self, symbol: &str) -> Result<Decimal, ExecutionError>;

    /// Submit a market order
    async fn place_market_order(
        &self,
        side: OrderSide,
        quantity: u32,
    ) -> Result<OrderInfo, ExecutionError>;

    /// Submit a resting stop order
    async fn place_stop_order(
        &self,
        side: OrderSide,
        quantity: u32,
        stop_price: Decimal,
    ) -> Result<OrderInfo, ExecutionError>;

    /// Get an order by ID
    async fn get_order(&self, order_id: &str) -> Result<OrderInfo, ExecutionError>;

    /// Cancel a working order by ID
    async fn cancel_order(&self, order_id: &str) -> Result<(), ExecutionError>;

    /// Account cash balance including realized P&L
    async fn get_account_balance(&self) -> Result<Decimal, ExecutionError>;

    async fn is_market_open(&self) -> Result<bool, ExecutionError>;

    /// Whether this is a paper/simulated account
    fn is_paper(&self) -> bool;

    /// Venue name for logging
    fn venue_name(&self) -> &str;
}
