use alert_core::{ExitSignal, Position, PositionEvent, PositionEventKind};
use broker_trait::{ExecutionVenue, OrderInfo, OrderSide};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::Instrument;
use trade_store::TradeStore;

use crate::models::{ExecutorConfig, ExecutorError};
use crate::orders::{
    cancel_resting_stop, ensure_protective_stop, resting_stop_fill, wait_for_fill, withdraw_order,
};

/// Shared by the executor and every monitor task.
pub(crate) struct MonitorContext {
    pub venue: Arc<dyn ExecutionVenue>,
    pub store: TradeStore,
    pub events: broadcast::Sender<PositionEvent>,
    pub config: ExecutorConfig,
}

impl MonitorContext {
    pub fn publish(
        &self,
        kind: PositionEventKind,
        position: &Position,
        price: Decimal,
        leg_quantity: u32,
        leg_pnl: Decimal,
    ) {
        let event = PositionEvent {
            kind,
            position: position.clone(),
            price,
            leg_quantity,
            leg_pnl,
            timestamp: Utc::now(),
        };
        if self.events.send(event).is_err() {
            tracing::debug!(alert_id = position.alert_id, "No subscribers for position event");
        }
    }

    /// Write the full position row, retrying transient failures. Returns
    /// false when the write was abandoned.
    pub async fn save_with_retry(&self, position: &Position) -> bool {
        let retries = self.config.persist_retries;
        for attempt in 0..=retries {
            match self.store.save_position(position).await {
                Ok(()) => return true,
                Err(e) if e.is_retryable() && attempt < retries => {
                    tracing::warn!(
                        alert_id = position.alert_id,
                        "Failed to persist position (attempt {}/{}): {}",
                        attempt + 1,
                        retries + 1,
                        e
                    );
                    time::sleep(Duration::from_millis(100 * u64::from(attempt + 1))).await;
                }
                Err(e) => {
                    tracing::error!(alert_id = position.alert_id, "Failed to persist position: {}", e);
                    return false;
                }
            }
        }
        false
    }
}

pub(crate) struct PositionHandle {
    pub snapshot: watch::Receiver<Position>,
    pub cancel: Option<oneshot::Sender<()>>,
    pub task: JoinHandle<()>,
}

/// Active positions keyed by alert id.
pub(crate) type Registry = Arc<Mutex<HashMap<i64, PositionHandle>>>;

/// Start a monitor task unless one already owns this position. The registry
/// lock is held across spawn and insert so a task that finishes immediately
/// cannot remove itself before it is registered.
pub(crate) async fn spawn_monitor(
    ctx: &Arc<MonitorContext>,
    registry: &Registry,
    position: Position,
    shutdown: watch::Receiver<bool>,
) -> bool {
    let alert_id = position.alert_id;
    let mut active = registry.lock().await;
    if active.contains_key(&alert_id) {
        return false;
    }

    let span = tracing::info_span!("position", alert_id, trade_id = ?position.trade_id);
    let (snapshot_tx, snapshot_rx) = watch::channel(position.clone());
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let monitor = PositionMonitor {
        ctx: Arc::clone(ctx),
        registry: Arc::clone(registry),
        position,
        snapshot: snapshot_tx,
        dirty: false,
        unsettled_exit: None,
    };
    let task = tokio::spawn(monitor.run(cancel_rx, shutdown).instrument(span));

    active.insert(
        alert_id,
        PositionHandle {
            snapshot: snapshot_rx,
            cancel: Some(cancel_tx),
            task,
        },
    );
    true
}

/// Sole owner of one open position for the lifetime of its task.
struct PositionMonitor {
    ctx: Arc<MonitorContext>,
    registry: Registry,
    position: Position,
    snapshot: watch::Sender<Position>,
    /// Set when the in-memory position is ahead of the store
    dirty: bool,
    unsettled_exit: Option<UnsettledExit>,
}

/// Exit order that outlived its fill timeout and could not be cancelled.
#[derive(Debug, Clone)]
struct UnsettledExit {
    order_id: String,
    signal: ExitSignal,
    quantity: u32,
}

impl PositionMonitor {
    async fn run(mut self, mut cancel: oneshot::Receiver<()>, mut shutdown: watch::Receiver<bool>) {
        let alert_id = self.position.alert_id;
        tracing::info!(
            alert_id,
            trade_id = ?self.position.trade_id,
            quantity = self.position.current_quantity,
            status = %self.position.trade_status,
            "Monitoring position"
        );

        let mut ticker = time::interval(self.ctx.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut cancel => {
                    tracing::info!(alert_id, "Position monitor cancelled");
                    break;
                }
                _ = shutdown.changed() => break,
            }

            if self.dirty {
                self.persist().await;
            }

            match self.step().await {
                Ok(Some(event)) => {
                    self.persist().await;
                    self.snapshot.send_replace(self.position.clone());
                    self.ctx.publish(
                        event.kind,
                        &self.position,
                        event.price,
                        event.quantity,
                        event.pnl,
                    );
                    if !self.position.is_open() {
                        tracing::info!(
                            alert_id,
                            realized_pnl = %self.position.realized_pnl,
                            commission = %self.position.commission,
                            status = %self.position.trade_status,
                            "Position closed"
                        );
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(alert_id, "Position check failed, skipping tick: {}", e);
                }
            }
        }

        if self.dirty {
            self.persist().await;
        }
        self.registry.lock().await.remove(&alert_id);
        tracing::debug!(alert_id, "Position monitor stopped");
    }

    async fn persist(&mut self) {
        self.dirty = !self.ctx.save_with_retry(&self.position).await;
    }

    /// One polling tick. A filled resting stop wins over anything the price
    /// says; otherwise the stop is evaluated before either target.
    async fn step(&mut self) -> Result<Option<Transition>, ExecutorError> {
        if let Some(transition) = self.settle_unsettled_exit().await? {
            return Ok(Some(transition));
        }

        let ctx = Arc::clone(&self.ctx);
        let venue = ctx.venue.as_ref();

        let had_stop = self.position.stop_order_id.is_some();
        if let Some(order) = resting_stop_fill(venue, &mut self.position).await? {
            return Ok(Some(self.apply_stop_fill(order)));
        }
        if had_stop && self.position.stop_order_id.is_none() {
            self.dirty = true;
        }

        let price = venue.get_current_price(&self.position.symbol).await?;
        let Some(signal) = self.position.check_exit(price) else {
            if self.position.stop_order_id.is_none() {
                match ensure_protective_stop(venue, &mut self.position).await {
                    Ok(true) => self.dirty = true,
                    Ok(false) => {}
                    Err(e) => tracing::debug!(alert_id = self.position.alert_id, "Protective stop not placed: {}", e),
                }
            }
            return Ok(None);
        };

        if let Some(order) = cancel_resting_stop(venue, &mut self.position).await? {
            return Ok(Some(self.apply_stop_fill(order)));
        }
        self.dirty = true;

        let quantity = match signal {
            ExitSignal::Target1 => self.position.target1_exit_quantity(),
            ExitSignal::Stop | ExitSignal::Target2 => self.position.current_quantity,
        };
        let order = self.market_exit(signal, quantity).await?;
        Ok(Some(self.apply_exit(signal, quantity, order, price).await))
    }

    /// Sell at market and wait for the fill. An order still working after the
    /// fill timeout is cancelled, and if the cancel is refused because it
    /// filled in the meantime that fill is used.
    async fn market_exit(&mut self, signal: ExitSignal, quantity: u32) -> Result<OrderInfo, ExecutorError> {
        let ctx = Arc::clone(&self.ctx);
        let venue = ctx.venue.as_ref();
        let alert_id = self.position.alert_id;

        let order = venue.place_market_order(OrderSide::Sell, quantity).await?;
        let order_id = order.order_id.clone();
        let err = match wait_for_fill(venue, order, ctx.config.fill_timeout).await {
            Ok(order) => return Ok(order),
            Err(e @ ExecutorError::OrderNotFilled(..)) => return Err(e),
            Err(e) => e,
        };

        match withdraw_order(venue, &order_id).await {
            Ok(Some(order)) => {
                tracing::info!(alert_id, order_id = %order_id, "Exit order filled while being cancelled");
                Ok(order)
            }
            Ok(None) => {
                tracing::warn!(alert_id, order_id = %order_id, "Exit order cancelled: {}", err);
                Err(err)
            }
            Err(cancel_err) => {
                tracing::warn!(
                    alert_id,
                    order_id = %order_id,
                    "Exit order could not be cancelled, holding further exits: {}",
                    cancel_err
                );
                self.unsettled_exit = Some(UnsettledExit {
                    order_id,
                    signal,
                    quantity,
                });
                Err(err)
            }
        }
    }

    /// An exit order from an earlier tick may still be working. No new order
    /// is sent until it is withdrawn or its fill has been applied.
    async fn settle_unsettled_exit(&mut self) -> Result<Option<Transition>, ExecutorError> {
        let Some(exit) = self.unsettled_exit.clone() else {
            return Ok(None);
        };

        let ctx = Arc::clone(&self.ctx);
        let filled = withdraw_order(ctx.venue.as_ref(), &exit.order_id).await?;
        self.unsettled_exit = None;
        let Some(order) = filled else {
            tracing::info!(alert_id = self.position.alert_id, order_id = %exit.order_id, "Stale exit order withdrawn");
            return Ok(None);
        };

        let level = match exit.signal {
            ExitSignal::Stop => self.position.stop_price,
            ExitSignal::Target1 => self.position.target_1_price,
            ExitSignal::Target2 => self.position.target_2_price,
        };
        Ok(Some(self.apply_exit(exit.signal, exit.quantity, order, level).await))
    }

    /// Fold a filled exit order into the position. Stops realize at the stop
    /// level; targets realize at the fill.
    async fn apply_exit(
        &mut self,
        signal: ExitSignal,
        quantity: u32,
        order: OrderInfo,
        price: Decimal,
    ) -> Transition {
        let tick_value = self.ctx.config.tick_value;
        let filled_at = order.filled_at.unwrap_or_else(Utc::now);
        self.dirty = true;

        let transition = match signal {
            ExitSignal::Stop => {
                let stop = self.position.stop_price;
                let pnl = self.position.apply_stop(stop, filled_at, tick_value, order.commission);
                Transition::new(PositionEventKind::StoppedOut, stop, quantity, pnl)
            }
            ExitSignal::Target1 => {
                let fill = order.fill_price.unwrap_or(price);
                let pnl = self
                    .position
                    .apply_target1(fill, quantity, filled_at, tick_value, order.commission);
                if self.position.is_open() {
                    if let Err(e) = ensure_protective_stop(self.ctx.venue.as_ref(), &mut self.position).await {
                        tracing::warn!(
                            alert_id = self.position.alert_id,
                            "Breakeven stop not placed, monitor will enforce it: {}",
                            e
                        );
                    }
                }
                Transition::new(PositionEventKind::Target1Hit, fill, quantity, pnl)
            }
            ExitSignal::Target2 => {
                let fill = order.fill_price.unwrap_or(price);
                let pnl = self
                    .position
                    .apply_target2(fill, filled_at, tick_value, order.commission);
                Transition::new(PositionEventKind::Target2Hit, fill, quantity, pnl)
            }
        };

        tracing::info!(
            alert_id = self.position.alert_id,
            event = transition.kind.label(),
            price = %transition.price,
            quantity = transition.quantity,
            pnl = %transition.pnl,
            remaining = self.position.current_quantity,
            "Position transition"
        );
        transition
    }

    fn apply_stop_fill(&mut self, order: OrderInfo) -> Transition {
        let quantity = self.position.current_quantity;
        let fill = order.fill_price.unwrap_or(self.position.stop_price);
        self.position.stop_order_id = None;
        let pnl = self.position.apply_stop(
            fill,
            order.filled_at.unwrap_or_else(Utc::now),
            self.ctx.config.tick_value,
            order.commission,
        );
        self.dirty = true;
        tracing::info!(
            alert_id = self.position.alert_id,
            order_id = %order.order_id,
            fill = %fill,
            quantity,
            pnl = %pnl,
            "Resting stop executed"
        );
        Transition::new(PositionEventKind::StoppedOut, fill, quantity, pnl)
    }
}

struct Transition {
    kind: PositionEventKind,
    price: Decimal,
    quantity: u32,
    pnl: Decimal,
}

impl Transition {
    fn new(kind: PositionEventKind, price: Decimal, quantity: u32, pnl: Decimal) -> Self {
        Self {
            kind,
            price,
            quantity,
            pnl,
        }
    }
}
