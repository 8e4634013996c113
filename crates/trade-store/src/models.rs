use alert_core::{SizeCode, TradeLevels, TradeStatus};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of recording an inbound alert. Duplicates are detected by the
/// unique message id constraint, so concurrent deliveries are safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertInsert {
    Inserted(i64),
    Duplicate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAlert {
    pub id: i64,
    pub message_id: String,
    pub author: String,
    pub channel_id: u64,
    pub raw_content: String,
    pub received_at: DateTime<Utc>,
    pub is_valid: bool,
    pub levels: Option<TradeLevels>,
    pub error_message: Option<String>,
    pub processing_status: String,
}

/// Which order leg a fill belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillLeg {
    Entry,
    Target1,
    Target2,
    Stop,
}

/// A fully closed trade as consumed by performance aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub trade_id: i64,
    pub alert_id: i64,
    pub size_code: SizeCode,
    pub planned_entry_price: Decimal,
    pub entry_price: Decimal,
    pub quantity: u32,
    pub realized_pnl: Decimal,
    pub commission: Decimal,
    pub entry_time: Option<DateTime<Utc>>,
    pub exit_time: DateTime<Utc>,
    pub exit_status: TradeStatus,
}

impl ClosedTrade {
    pub fn net_pnl(&self) -> Decimal {
        self.realized_pnl - self.commission
    }
}

/// Daily aggregate; derived from trades and never edited by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub date: NaiveDate,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub net_pnl: Decimal,
    pub commission_paid: Decimal,
    pub win_rate: f64,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
    pub max_drawdown: Decimal,
}

impl PerformanceRecord {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            gross_profit: Decimal::ZERO,
            gross_loss: Decimal::ZERO,
            net_pnl: Decimal::ZERO,
            commission_paid: Decimal::ZERO,
            win_rate: 0.0,
            avg_win: Decimal::ZERO,
            avg_loss: Decimal::ZERO,
            largest_win: Decimal::ZERO,
            largest_loss: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventLevel::Info => "INFO",
            EventLevel::Warning => "WARNING",
            EventLevel::Error => "ERROR",
        })
    }
}

/// Row for the persistent system log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    pub level: EventLevel,
    pub component: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub alert_id: Option<i64>,
    pub trade_id: Option<i64>,
}

impl SystemEvent {
    pub fn new(level: EventLevel, component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            component: component.into(),
            message: message.into(),
            details: None,
            alert_id: None,
            trade_id: None,
        }
    }

    pub fn info(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Info, component, message)
    }

    pub fn warning(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Warning, component, message)
    }

    pub fn error(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(EventLevel::Error, component, message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_alert(mut self, alert_id: i64) -> Self {
        self.alert_id = Some(alert_id);
        self
    }

    pub fn with_trade(mut self, trade_id: Option<i64>) -> Self {
        self.trade_id = trade_id;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSystemEvent {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub component: String,
    pub message: String,
    pub details: Option<String>,
    pub alert_id: Option<i64>,
    pub trade_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemStats {
    pub total_alerts: i64,
    pub valid_alerts: i64,
    pub total_trades: i64,
    pub open_trades: i64,
    pub closed_trades: i64,
    pub total_realized_pnl: Decimal,
    pub last_alert_at: Option<DateTime<Utc>>,
}
