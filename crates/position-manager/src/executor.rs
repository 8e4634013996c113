use alert_core::{Position, PositionEvent, PositionEventKind, TradeLevels, TradeStatus};
use broker_trait::{ExecutionVenue, OrderSide};
use chrono::Utc;
use risk_manager::{RiskManager, RiskSnapshot};
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use trade_store::{SystemEvent, TradeStore};

use crate::models::{ExecutionOutcome, ExecutorConfig, ExecutorError};
use crate::monitor::{spawn_monitor, MonitorContext, PositionHandle, Registry};
use crate::orders::{ensure_protective_stop, wait_for_fill};

const COMPONENT: &str = "position_manager";
const EVENT_CAPACITY: usize = 256;

/// Turns valid alerts into positions and owns the task monitoring each one.
pub struct TradeExecutor {
    ctx: Arc<MonitorContext>,
    risk: RiskManager,
    registry: Registry,
    shutdown: watch::Receiver<bool>,
}

impl TradeExecutor {
    pub fn new(
        config: ExecutorConfig,
        venue: Arc<dyn ExecutionVenue>,
        store: TradeStore,
        risk: RiskManager,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            ctx: Arc::new(MonitorContext {
                venue,
                store,
                events,
                config,
            }),
            risk,
            registry: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.ctx.config
    }

    /// Lifecycle events for every position, in transition order per position.
    pub fn subscribe(&self) -> broadcast::Receiver<PositionEvent> {
        self.ctx.events.subscribe()
    }

    /// Risk-check, enter and start monitoring a position for a valid alert.
    /// The alert's processing status is updated with the outcome.
    pub async fn handle_alert(&self, alert_id: i64, levels: &TradeLevels) -> ExecutionOutcome {
        let outcome = self.execute(alert_id, levels).await;
        if let Err(e) = self
            .ctx
            .store
            .mark_alert_processing(alert_id, outcome.processing_status())
            .await
        {
            tracing::warn!(alert_id, "Failed to update alert status: {}", e);
        }
        outcome
    }

    async fn execute(&self, alert_id: i64, levels: &TradeLevels) -> ExecutionOutcome {
        if !self.ctx.config.enable_auto_trading {
            tracing::info!(alert_id, "Auto trading disabled; alert recorded only");
            return ExecutionOutcome::Disabled;
        }

        let quantity = self.ctx.config.size_mapping.quantity_for(levels.size);

        let snapshot = match self.risk_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!(alert_id, "Could not gather risk inputs: {}", e);
                self.record(
                    SystemEvent::error(COMPONENT, format!("Risk inputs unavailable: {}", e))
                        .with_alert(alert_id),
                )
                .await;
                return ExecutionOutcome::Failed(e.to_string());
            }
        };

        let check = self.risk.check_trade_risk(&snapshot, quantity);
        if !check.can_trade {
            tracing::warn!(alert_id, reason = %check.reason, "Risk check failed; alert not executed");
            self.record(
                SystemEvent::warning(COMPONENT, format!("Risk check failed: {}", check.reason))
                    .with_alert(alert_id)
                    .with_details(json!({
                        "quantity": quantity,
                        "daily_trade_count": snapshot.daily_trade_count,
                        "open_quantity": snapshot.open_quantity,
                        "account_balance": snapshot.account_balance.to_string(),
                        "daily_realized_pnl": snapshot.daily_realized_pnl.to_string(),
                        "consecutive_losses": snapshot.consecutive_losses,
                        "circuit_breaker": check.breaker.map(|b| format!("{:?}", b)),
                    })),
            )
            .await;
            return ExecutionOutcome::Skipped(check);
        }

        match self.open_position(alert_id, levels, quantity).await {
            Ok(position) => ExecutionOutcome::Executed {
                trade_id: position.trade_id.unwrap_or_default(),
                quantity,
                fill_price: position.entry_price,
            },
            Err(e) => {
                tracing::error!(alert_id, "Entry failed: {}", e);
                self.record(
                    SystemEvent::error(COMPONENT, format!("Entry failed: {}", e)).with_alert(alert_id),
                )
                .await;
                ExecutionOutcome::Failed(e.to_string())
            }
        }
    }

    async fn open_position(
        &self,
        alert_id: i64,
        levels: &TradeLevels,
        quantity: u32,
    ) -> Result<Position, ExecutorError> {
        let ctx = &self.ctx;
        let venue = ctx.venue.as_ref();

        let mut position = Position::new(alert_id, ctx.config.symbol.as_str(), levels, quantity);
        position.trade_id = Some(ctx.store.insert_trade(&position).await?);

        tracing::info!(
            "Executing {} BUY {} @ ~{} (alert {}, stop {}, targets {}/{})",
            ctx.config.symbol,
            quantity,
            levels.price,
            alert_id,
            levels.stop,
            levels.target_1,
            levels.target_2
        );

        let order = match venue.place_market_order(OrderSide::Buy, quantity).await {
            Ok(order) => order,
            Err(e) => {
                position.trade_status = TradeStatus::Error;
                ctx.save_with_retry(&position).await;
                return Err(e.into());
            }
        };

        position.mark_entry_submitted(order.order_id.as_str());
        ctx.save_with_retry(&position).await;
        ctx.publish(
            PositionEventKind::EntrySubmitted,
            &position,
            levels.price,
            quantity,
            Decimal::ZERO,
        );

        let fill = match wait_for_fill(venue, order, ctx.config.fill_timeout).await {
            Ok(fill) => fill,
            Err(e) => {
                self.abandon_entry(&mut position).await;
                return Err(e);
            }
        };

        let fill_price = fill.fill_price.unwrap_or(levels.price);
        position.apply_entry_fill(
            fill_price,
            fill.filled_at.unwrap_or_else(Utc::now),
            fill.commission,
        );

        if let Err(e) = ensure_protective_stop(venue, &mut position).await {
            tracing::warn!(alert_id, "Protective stop not placed, monitor will enforce it: {}", e);
        }
        ctx.save_with_retry(&position).await;
        ctx.publish(
            PositionEventKind::EntryFilled,
            &position,
            fill_price,
            quantity,
            Decimal::ZERO,
        );

        tracing::info!(
            alert_id,
            trade_id = ?position.trade_id,
            fill = %fill_price,
            slippage = %position.entry_slippage(),
            "Entry filled"
        );
        self.record(
            SystemEvent::info(
                COMPONENT,
                format!("Entered {} {} @ {}", quantity, ctx.config.symbol, fill_price),
            )
            .with_alert(alert_id)
            .with_trade(position.trade_id),
        )
        .await;

        spawn_monitor(ctx, &self.registry, position.clone(), self.shutdown.clone()).await;
        Ok(position)
    }

    /// Roll back an entry whose fill was never confirmed. When the cancel
    /// fails the order may still be live, so the trade stays ENTRY_SUBMITTED
    /// for manual review.
    async fn abandon_entry(&self, position: &mut Position) {
        if let Some(order_id) = position.entry_order_id.as_deref() {
            if let Err(e) = self.ctx.venue.cancel_order(order_id).await {
                tracing::error!(
                    alert_id = position.alert_id,
                    "Could not cancel entry order {}, needs manual review: {}",
                    order_id,
                    e
                );
                return;
            }
        }
        position.trade_status = TradeStatus::Cancelled;
        self.ctx.save_with_retry(position).await;
    }

    /// Point-in-time risk inputs: daily counters from the store, open
    /// quantity from the active set, balance and session from the venue.
    pub async fn risk_snapshot(&self) -> Result<RiskSnapshot, ExecutorError> {
        let today = Utc::now().date_naive();
        let store = &self.ctx.store;
        let venue = self.ctx.venue.as_ref();

        let lookback = self.risk.limits().max_consecutive_losses.max(1);
        let recent = store.recent_closed_pnls(lookback).await?;
        let consecutive_losses = recent.iter().take_while(|pnl| **pnl < Decimal::ZERO).count();

        Ok(RiskSnapshot {
            daily_trade_count: store.daily_trade_count(today).await?,
            open_quantity: self.open_quantity().await,
            account_balance: venue.get_account_balance().await?,
            market_open: venue.is_market_open().await?,
            daily_realized_pnl: store.daily_realized_pnl(today).await?,
            consecutive_losses: u32::try_from(consecutive_losses).unwrap_or(u32::MAX),
        })
    }

    pub async fn daily_trade_count(&self) -> Result<u32, ExecutorError> {
        Ok(self.ctx.store.daily_trade_count(Utc::now().date_naive()).await?)
    }

    /// Realized P&L net of commission for today's trades.
    pub async fn daily_pnl(&self) -> Result<Decimal, ExecutorError> {
        Ok(self.ctx.store.daily_realized_pnl(Utc::now().date_naive()).await?)
    }

    /// Latest snapshot of every monitored position.
    pub async fn active_positions(&self) -> Vec<Position> {
        self.registry
            .lock()
            .await
            .values()
            .map(|handle| handle.snapshot.borrow().clone())
            .filter(Position::is_open)
            .collect()
    }

    pub async fn open_quantity(&self) -> u32 {
        self.active_positions()
            .await
            .iter()
            .map(|p| p.current_quantity)
            .sum()
    }

    /// Stop monitoring one position. Its resting stop stays at the venue.
    pub async fn cancel_position(&self, alert_id: i64) -> bool {
        let mut registry = self.registry.lock().await;
        match registry.get_mut(&alert_id).and_then(|h| h.cancel.take()) {
            Some(cancel) => cancel.send(()).is_ok(),
            None => false,
        }
    }

    /// Pick up positions left open by a previous run.
    pub async fn resume_open_positions(&self) -> Result<usize, ExecutorError> {
        let open = self.ctx.store.get_open_trades().await?;
        let mut resumed = 0;

        for mut position in open {
            let alert_id = position.alert_id;
            if !position.trade_status.is_monitorable() || position.current_quantity == 0 {
                tracing::warn!(
                    alert_id,
                    status = %position.trade_status,
                    "Entry was never confirmed; marking trade cancelled"
                );
                position.trade_status = TradeStatus::Cancelled;
                self.ctx.save_with_retry(&position).await;
                continue;
            }

            match ensure_protective_stop(self.ctx.venue.as_ref(), &mut position).await {
                Ok(true) => {
                    self.ctx.save_with_retry(&position).await;
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(alert_id, "Protective stop not restored: {}", e),
            }

            if spawn_monitor(&self.ctx, &self.registry, position, self.shutdown.clone()).await {
                resumed += 1;
            }
        }

        if resumed > 0 {
            tracing::info!(resumed, "Resumed monitoring of open positions");
        }
        Ok(resumed)
    }

    /// Cancel every monitor and wait for the tasks to finish.
    pub async fn shutdown(&self) -> usize {
        let handles: Vec<PositionHandle> = self
            .registry
            .lock()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        let count = handles.len();

        for mut handle in handles {
            if let Some(cancel) = handle.cancel.take() {
                let _ = cancel.send(());
            }
            if let Err(e) = handle.task.await {
                tracing::warn!("Position monitor task failed: {}", e);
            }
        }

        tracing::info!(count, "Position monitors stopped");
        count
    }

    async fn record(&self, event: SystemEvent) {
        if let Err(e) = self.ctx.store.log_system_event(&event).await {
            tracing::warn!("Failed to write system log: {}", e);
        }
    }
}
