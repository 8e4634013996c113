use async_trait::async_trait;
use broker_trait::{ExecutionError, ExecutionVenue, OrderInfo, OrderSide, OrderStatus, OrderType};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::models::{PaperBrokerConfig, PaperStatistics};

/// Filled and cancelled orders kept queryable; working orders are never dropped.
const ORDER_HISTORY: usize = 256;

/// Simulated venue: synthetic random-walk price, immediate market fills with
/// slippage and commission, and resting stop orders that trigger on price updates.
pub struct PaperBroker {
    config: PaperBrokerConfig,
    state: Mutex<PaperState>,
}

struct PaperState {
    price: Decimal,
    balance: Decimal,
    net_quantity: i64,
    avg_cost: Decimal,
    orders: HashMap<String, OrderInfo>,
    /// Terminal order ids, oldest first
    closed: VecDeque<String>,
    next_order_id: u64,
    stats: PaperStatistics,
    rng: StdRng,
}

impl PaperBroker {
    pub fn new(config: PaperBrokerConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic price walk and slippage, for reproducible runs.
    pub fn with_seed(config: PaperBrokerConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: PaperBrokerConfig, rng: StdRng) -> Self {
        let state = PaperState {
            price: config.starting_price,
            balance: config.starting_balance,
            net_quantity: 0,
            avg_cost: Decimal::ZERO,
            orders: HashMap::new(),
            closed: VecDeque::new(),
            next_order_id: 1,
            stats: PaperStatistics {
                peak_balance: config.starting_balance,
                ..Default::default()
            },
            rng,
        };

        tracing::info!(
            symbol = %config.symbol,
            balance = %config.starting_balance,
            price = %config.starting_price,
            "Paper broker initialized"
        );

        Self {
            config,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &PaperBrokerConfig {
        &self.config
    }

    /// Force the market price and trigger any resting orders it crosses.
    pub async fn set_price(&self, price: Decimal) -> usize {
        let mut state = self.state.lock().await;
        state.price = price;
        state.trigger_resting_orders(&self.config)
    }

    /// Advance the synthetic price by one random-walk step.
    pub async fn step_price(&self) -> Decimal {
        let mut state = self.state.lock().await;
        let swing: f64 = state.rng.gen_range(-1.0..1.0);
        // slight upward drift
        let change = self.config.volatility * Decimal::from_f64(swing + 0.05).unwrap_or(Decimal::ZERO);
        let next = round_to_tick(state.price + change, self.config.tick_size)
            .max(self.config.price_floor)
            .min(self.config.price_ceiling);
        state.price = next;
        state.trigger_resting_orders(&self.config);
        next
    }

    /// Drive the random walk until shutdown is signalled.
    pub fn spawn_price_feed(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let broker = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(broker.config.update_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let price = broker.step_price().await;
                        tracing::trace!(%price, "Paper price update");
                    }
                    _ = shutdown.changed() => {
                        tracing::debug!("Paper price feed stopping");
                        break;
                    }
                }
            }
        })
    }

    pub async fn statistics(&self) -> PaperStatistics {
        self.state.lock().await.stats.clone()
    }

    /// Signed net contracts held (positive is long).
    pub async fn position_quantity(&self) -> i64 {
        self.state.lock().await.net_quantity
    }
}

impl PaperState {
    fn next_id(&mut self) -> String {
        let id = format!("PAPER-{:06}", self.next_order_id);
        self.next_order_id += 1;
        id
    }

    fn retire(&mut self, order_id: &str) {
        self.closed.push_back(order_id.to_string());
        while self.closed.len() > ORDER_HISTORY {
            if let Some(oldest) = self.closed.pop_front() {
                self.orders.remove(&oldest);
            }
        }
    }

    fn slippage(&mut self, config: &PaperBrokerConfig) -> Decimal {
        let base = config.tick_size * Decimal::from(config.slippage_ticks);
        if !config.realistic_slippage || base.is_zero() {
            return base;
        }
        let factor: f64 = self.rng.gen_range(0.5..1.5);
        round_to_tick(
            base * Decimal::from_f64(factor).unwrap_or(Decimal::ONE),
            config.tick_size,
        )
    }

    /// Books a fill against the net position and returns its commission.
    fn book_fill(
        &mut self,
        config: &PaperBrokerConfig,
        side: OrderSide,
        quantity: u32,
        price: Decimal,
    ) -> Decimal {
        let signed = match side {
            OrderSide::Buy => i64::from(quantity),
            OrderSide::Sell => -i64::from(quantity),
        };
        let commission = config.commission_per_contract * Decimal::from(quantity);
        let mut realized: Option<Decimal> = None;

        if self.net_quantity != 0 && self.net_quantity.signum() != signed.signum() {
            let closing = signed.abs().min(self.net_quantity.abs());
            let direction = Decimal::from(self.net_quantity.signum());
            realized = Some(
                (price - self.avg_cost) * Decimal::from(closing) * config.tick_value * direction,
            );
            self.net_quantity += closing * signed.signum();
            let opening = signed.abs() - closing;
            if opening > 0 {
                self.net_quantity = opening * signed.signum();
                self.avg_cost = price;
            } else if self.net_quantity == 0 {
                self.avg_cost = Decimal::ZERO;
            }
        } else {
            let held = Decimal::from(self.net_quantity.abs());
            let added = Decimal::from(signed.abs());
            self.avg_cost = (self.avg_cost * held + price * added) / (held + added);
            self.net_quantity += signed;
        }

        let stats = &mut self.stats;
        stats.total_fills += 1;
        stats.commission_paid += commission;
        self.balance -= commission;

        if let Some(pnl) = realized {
            stats.closing_fills += 1;
            stats.realized_pnl += pnl;
            if pnl > Decimal::ZERO {
                stats.winning_fills += 1;
                stats.largest_win = stats.largest_win.max(pnl);
            } else if pnl < Decimal::ZERO {
                stats.losing_fills += 1;
                stats.largest_loss = stats.largest_loss.min(pnl);
            }
            self.balance += pnl;
        }

        stats.peak_balance = stats.peak_balance.max(self.balance);
        stats.max_drawdown = stats.max_drawdown.max(stats.peak_balance - self.balance);
        commission
    }

    fn trigger_resting_orders(&mut self, config: &PaperBrokerConfig) -> usize {
        let price = self.price;
        let triggered: Vec<String> = self
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Pending && o.order_type == OrderType::Stop)
            .filter(|o| match (o.side, o.stop_price) {
                (OrderSide::Sell, Some(stop)) => price <= stop,
                (OrderSide::Buy, Some(stop)) => price >= stop,
                _ => false,
            })
            .map(|o| o.order_id.clone())
            .collect();

        for order_id in &triggered {
            let Some((side, quantity, stop)) = self
                .orders
                .get(order_id)
                .map(|o| (o.side, o.quantity, o.stop_price.unwrap_or(price)))
            else {
                continue;
            };
            let commission = self.book_fill(config, side, quantity, stop);
            if let Some(order) = self.orders.get_mut(order_id) {
                order.status = OrderStatus::Filled;
                order.fill_price = Some(stop);
                order.filled_at = Some(Utc::now());
                order.commission = commission;
            }
            self.retire(order_id);
            tracing::info!(order_id = %order_id, %side, quantity, fill = %stop, "Paper stop order triggered");
        }

        triggered.len()
    }
}

fn round_to_tick(price: Decimal, tick_size: Decimal) -> Decimal {
    if tick_size.is_zero() {
        price
    } else {
        (price / tick_size).round() * tick_size
    }
}

#[async_trait]
impl ExecutionVenue for PaperBroker {
    async fn get_current_price(&self, symbol: &str) -> Result<Decimal, ExecutionError> {
        if !symbol.eq_ignore_ascii_case(&self.config.symbol) {
            return Err(ExecutionError::Unavailable(format!(
                "no paper feed for {} (trading {})",
                symbol, self.config.symbol
            )));
        }
        Ok(self.state.lock().await.price)
    }

    async fn place_market_order(
        &self,
        side: OrderSide,
        quantity: u32,
    ) -> Result<OrderInfo, ExecutionError> {
        if quantity == 0 {
            return Err(ExecutionError::Rejected("quantity must be positive".into()));
        }

        let mut state = self.state.lock().await;
        let slippage = state.slippage(&self.config);
        let fill_price = match side {
            OrderSide::Buy => state.price + slippage,
            OrderSide::Sell => state.price - slippage,
        };
        let commission = state.book_fill(&self.config, side, quantity, fill_price);

        let now = Utc::now();
        let order = OrderInfo {
            order_id: state.next_id(),
            side,
            order_type: OrderType::Market,
            quantity,
            stop_price: None,
            status: OrderStatus::Filled,
            fill_price: Some(fill_price),
            filled_at: Some(now),
            commission,
            created_at: now,
        };
        state.orders.insert(order.order_id.clone(), order.clone());
        state.retire(&order.order_id);

        tracing::debug!(
            order_id = %order.order_id,
            %side,
            quantity,
            fill = %fill_price,
            %slippage,
            "Paper market order filled"
        );
        Ok(order)
    }

    async fn place_stop_order(
        &self,
        side: OrderSide,
        quantity: u32,
        stop_price: Decimal,
    ) -> Result<OrderInfo, ExecutionError> {
        if quantity == 0 {
            return Err(ExecutionError::Rejected("quantity must be positive".into()));
        }

        let mut state = self.state.lock().await;
        let marketable = match side {
            OrderSide::Sell => stop_price >= state.price,
            OrderSide::Buy => stop_price <= state.price,
        };
        if marketable {
            return Err(ExecutionError::Rejected(format!(
                "{} stop {} is on the wrong side of market {}",
                side, stop_price, state.price
            )));
        }

        let order = OrderInfo {
            order_id: state.next_id(),
            side,
            order_type: OrderType::Stop,
            quantity,
            stop_price: Some(stop_price),
            status: OrderStatus::Pending,
            fill_price: None,
            filled_at: None,
            commission: Decimal::ZERO,
            created_at: Utc::now(),
        };
        state.orders.insert(order.order_id.clone(), order.clone());

        tracing::debug!(order_id = %order.order_id, %side, quantity, stop = %stop_price, "Paper stop order resting");
        Ok(order)
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderInfo, ExecutionError> {
        self.state
            .lock()
            .await
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| ExecutionError::NotFound(order_id.to_string()))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), ExecutionError> {
        let mut state = self.state.lock().await;
        let order = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| ExecutionError::NotFound(order_id.to_string()))?;

        match order.status {
            OrderStatus::Pending => {
                order.status = OrderStatus::Cancelled;
                state.retire(order_id);
                Ok(())
            }
            OrderStatus::Cancelled => Ok(()),
            status => Err(ExecutionError::Rejected(format!(
                "order {} is already {:?}",
                order_id, status
            ))),
        }
    }

    async fn get_account_balance(&self) -> Result<Decimal, ExecutionError> {
        Ok(self.state.lock().await.balance)
    }

    async fn is_market_open(&self) -> Result<bool, ExecutionError> {
        Ok(true)
    }

    fn is_paper(&self) -> bool {
        true
    }

    fn venue_name(&self) -> &str {
        "paper"
    }
}
