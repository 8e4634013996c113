use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{SizeCode, TradeLevels};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    Pending,
    EntrySubmitted,
    EntryFilled,
    Target1Hit,
    Target2Hit,
    StoppedOut,
    Cancelled,
    Error,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "PENDING",
            TradeStatus::EntrySubmitted => "ENTRY_SUBMITTED",
            TradeStatus::EntryFilled => "ENTRY_FILLED",
            TradeStatus::Target1Hit => "TARGET1_HIT",
            TradeStatus::Target2Hit => "TARGET2_HIT",
            TradeStatus::StoppedOut => "STOPPED_OUT",
            TradeStatus::Cancelled => "CANCELLED",
            TradeStatus::Error => "ERROR",
        }
    }

    /// States in which a live position is being monitored for exits.
    pub fn is_monitorable(&self) -> bool {
        matches!(self, TradeStatus::EntryFilled | TradeStatus::Target1Hit)
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "PENDING" => TradeStatus::Pending,
            "ENTRY_SUBMITTED" => TradeStatus::EntrySubmitted,
            "ENTRY_FILLED" => TradeStatus::EntryFilled,
            "TARGET1_HIT" => TradeStatus::Target1Hit,
            "TARGET2_HIT" => TradeStatus::Target2Hit,
            "STOPPED_OUT" => TradeStatus::StoppedOut,
            "CANCELLED" => TradeStatus::Cancelled,
            "ERROR" => TradeStatus::Error,
            other => return Err(format!("unknown trade status: {other}")),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Full,
    Half,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Full => "FULL",
            PositionStatus::Half => "HALF",
            PositionStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PositionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FULL" => Ok(PositionStatus::Full),
            "HALF" => Ok(PositionStatus::Half),
            "CLOSED" => Ok(PositionStatus::Closed),
            other => Err(format!("unknown position status: {other}")),
        }
    }
}

/// Exit condition observed at a polled price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitSignal {
    Stop,
    Target1,
    Target2,
}

/// A long position opened from one alert.
///
/// `current_quantity` only decreases, `realized_pnl` only accumulates, and once
/// target 1 is taken the stop sits at the entry fill price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub trade_id: Option<i64>,
    pub alert_id: i64,
    pub symbol: String,
    pub size_code: SizeCode,
    /// Price quoted in the alert. `entry_price` becomes the actual fill.
    pub planned_entry_price: Decimal,
    pub entry_price: Decimal,
    pub stop_price: Decimal,
    pub target_1_price: Decimal,
    pub target_2_price: Decimal,
    pub full_quantity: u32,
    pub current_quantity: u32,
    pub status: PositionStatus,
    pub trade_status: TradeStatus,
    pub realized_pnl: Decimal,
    pub commission: Decimal,
    pub entry_order_id: Option<String>,
    pub stop_order_id: Option<String>,
    pub entry_fill_time: Option<DateTime<Utc>>,
    pub target_1_fill_price: Option<Decimal>,
    pub target_1_fill_time: Option<DateTime<Utc>>,
    pub target_2_fill_price: Option<Decimal>,
    pub target_2_fill_time: Option<DateTime<Utc>>,
    pub stop_fill_price: Option<Decimal>,
    pub stop_fill_time: Option<DateTime<Utc>>,
    pub exit_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Position {
    pub fn new(alert_id: i64, symbol: impl Into<String>, levels: &TradeLevels, quantity: u32) -> Self {
        Self {
            trade_id: None,
            alert_id,
            symbol: symbol.into(),
            size_code: levels.size,
            planned_entry_price: levels.price,
            entry_price: levels.price,
            stop_price: levels.stop,
            target_1_price: levels.target_1,
            target_2_price: levels.target_2,
            full_quantity: quantity,
            current_quantity: quantity,
            status: PositionStatus::Full,
            trade_status: TradeStatus::Pending,
            realized_pnl: Decimal::ZERO,
            commission: Decimal::ZERO,
            entry_order_id: None,
            stop_order_id: None,
            entry_fill_time: None,
            target_1_fill_price: None,
            target_1_fill_time: None,
            target_2_fill_price: None,
            target_2_fill_time: None,
            stop_fill_price: None,
            stop_fill_time: None,
            exit_time: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status != PositionStatus::Closed
    }

    /// Points of slippage between the alert price and the entry fill.
    pub fn entry_slippage(&self) -> Decimal {
        self.entry_price - self.planned_entry_price
    }

    pub fn pnl_for(&self, exit_price: Decimal, quantity: u32, tick_value: Decimal) -> Decimal {
        (exit_price - self.entry_price) * Decimal::from(quantity) * tick_value
    }

    pub fn unrealized_pnl(&self, price: Decimal, tick_value: Decimal) -> Decimal {
        self.pnl_for(price, self.current_quantity, tick_value)
    }

    /// The stop is evaluated first; target 2 is only reachable after target 1.
    pub fn check_exit(&self, price: Decimal) -> Option<ExitSignal> {
        if !self.is_open() || !self.trade_status.is_monitorable() {
            return None;
        }
        if price <= self.stop_price {
            return Some(ExitSignal::Stop);
        }
        match self.trade_status {
            TradeStatus::EntryFilled if price >= self.target_1_price => Some(ExitSignal::Target1),
            TradeStatus::Target1Hit if price >= self.target_2_price => Some(ExitSignal::Target2),
            _ => None,
        }
    }

    /// Contracts closed at target 1: half the position rounded down, or the
    /// whole thing when only one contract is held.
    pub fn target1_exit_quantity(&self) -> u32 {
        if self.current_quantity <= 1 {
            self.current_quantity
        } else {
            self.current_quantity / 2
        }
    }

    pub fn mark_entry_submitted(&mut self, order_id: impl Into<String>) {
        self.entry_order_id = Some(order_id.into());
        self.trade_status = TradeStatus::EntrySubmitted;
    }

    pub fn apply_entry_fill(&mut self, fill_price: Decimal, filled_at: DateTime<Utc>, commission: Decimal) {
        self.entry_price = fill_price;
        self.entry_fill_time = Some(filled_at);
        self.commission += commission;
        self.trade_status = TradeStatus::EntryFilled;
    }

    /// Closes the target 1 quantity and moves the stop to breakeven.
    /// Returns the realized P&L of this leg.
    pub fn apply_target1(
        &mut self,
        fill_price: Decimal,
        quantity: u32,
        filled_at: DateTime<Utc>,
        tick_value: Decimal,
        commission: Decimal,
    ) -> Decimal {
        let quantity = quantity.min(self.current_quantity);
        let pnl = self.pnl_for(fill_price, quantity, tick_value);

        self.realized_pnl += pnl;
        self.commission += commission;
        self.current_quantity -= quantity;
        self.stop_price = self.entry_price;
        self.target_1_fill_price = Some(fill_price);
        self.target_1_fill_time = Some(filled_at);
        self.trade_status = TradeStatus::Target1Hit;

        if self.current_quantity == 0 {
            self.close(filled_at);
        } else {
            self.status = PositionStatus::Half;
        }
        pnl
    }

    pub fn apply_target2(
        &mut self,
        fill_price: Decimal,
        filled_at: DateTime<Utc>,
        tick_value: Decimal,
        commission: Decimal,
    ) -> Decimal {
        let pnl = self.pnl_for(fill_price, self.current_quantity, tick_value);

        self.realized_pnl += pnl;
        self.commission += commission;
        self.target_2_fill_price = Some(fill_price);
        self.target_2_fill_time = Some(filled_at);
        self.trade_status = TradeStatus::Target2Hit;
        self.close(filled_at);
        pnl
    }

    /// Closes the remainder. Callers pass the stop price, or the venue's fill
    /// when a resting stop order executed.
    pub fn apply_stop(
        &mut self,
        exit_price: Decimal,
        filled_at: DateTime<Utc>,
        tick_value: Decimal,
        commission: Decimal,
    ) -> Decimal {
        let pnl = self.pnl_for(exit_price, self.current_quantity, tick_value);

        self.realized_pnl += pnl;
        self.commission += commission;
        self.stop_fill_price = Some(exit_price);
        self.stop_fill_time = Some(filled_at);
        self.trade_status = TradeStatus::StoppedOut;
        self.close(filled_at);
        pnl
    }

    fn close(&mut self, at: DateTime<Utc>) {
        self.current_quantity = 0;
        self.status = PositionStatus::Closed;
        self.stop_order_id = None;
        self.exit_time = Some(at);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionEventKind {
    EntrySubmitted,
    EntryFilled,
    Target1Hit,
    Target2Hit,
    StoppedOut,
}

impl PositionEventKind {
    pub fn is_closing(&self, position: &Position) -> bool {
        !matches!(self, PositionEventKind::EntrySubmitted | PositionEventKind::EntryFilled)
            && !position.is_open()
    }

    pub fn label(&self) -> &'static str {
        match self {
            PositionEventKind::EntrySubmitted => "Entry Submitted",
            PositionEventKind::EntryFilled => "Entry Filled",
            PositionEventKind::Target1Hit => "Target 1 Hit",
            PositionEventKind::Target2Hit => "Target 2 Hit",
            PositionEventKind::StoppedOut => "Stopped Out",
        }
    }
}

/// Published on every lifecycle transition with a snapshot taken after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionEvent {
    pub kind: PositionEventKind,
    pub position: Position,
    pub price: Decimal,
    pub leg_quantity: u32,
    pub leg_pnl: Decimal,
    pub timestamp: DateTime<Utc>,
}
