use alert_core::{
    AlertParser, MessageMetadata, Position, PositionEvent, PositionEventKind, PositionStatus,
    TradeLevels, TradeStatus,
};
use async_trait::async_trait;
use broker_trait::{ExecutionError, ExecutionVenue, OrderInfo, OrderSide, OrderStatus, OrderType};
use chrono::Utc;
use paper_broker::{PaperBroker, PaperBrokerConfig};
use risk_manager::{CircuitBreaker, RiskLimits, RiskManager};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use trade_store::{AlertInsert, EventLevel, TradeStore};

use crate::{ExecutionOutcome, ExecutorConfig, TradeExecutor};

const ALERT_A: &str = "🚨 ES long 6326: A\nStop: 6316";
const ALERT_B: &str = "🚨 ES long 6326: B\nStop: 6316";

struct Harness {
    executor: TradeExecutor,
    broker: Arc<PaperBroker>,
    store: TradeStore,
    events: broadcast::Receiver<PositionEvent>,
    _shutdown: watch::Sender<bool>,
}

fn test_config() -> ExecutorConfig {
    ExecutorConfig {
        enable_auto_trading: true,
        poll_interval: Duration::from_millis(10),
        fill_timeout: Duration::from_millis(200),
        ..Default::default()
    }
}

fn exact_broker() -> Arc<PaperBroker> {
    Arc::new(PaperBroker::with_seed(
        PaperBrokerConfig {
            starting_price: dec!(6326),
            slippage_ticks: 0,
            realistic_slippage: false,
            commission_per_contract: Decimal::ZERO,
            ..Default::default()
        },
        7,
    ))
}

async fn harness_with(limits: RiskLimits, config: ExecutorConfig, store: TradeStore) -> Harness {
    let broker = exact_broker();
    harness_on(broker.clone(), broker, limits, config, store)
}

/// Executor trading on `venue`; `broker` is the paper market behind it.
fn harness_on(
    venue: Arc<dyn ExecutionVenue>,
    broker: Arc<PaperBroker>,
    limits: RiskLimits,
    config: ExecutorConfig,
    store: TradeStore,
) -> Harness {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let executor = TradeExecutor::new(config, venue, store.clone(), RiskManager::new(limits), shutdown_rx);
    let events = executor.subscribe();
    Harness {
        executor,
        broker,
        store,
        events,
        _shutdown: shutdown_tx,
    }
}

async fn harness() -> Harness {
    let store = TradeStore::in_memory().await.unwrap();
    harness_with(RiskLimits::default(), test_config(), store).await
}

async fn insert_alert(store: &TradeStore, message_id: &str, text: &str) -> (i64, TradeLevels) {
    let parsed = AlertParser::default().parse(text);
    let meta = MessageMetadata {
        message_id: message_id.to_string(),
        channel_id: 1,
        author: "trader".to_string(),
        timestamp: Utc::now(),
    };
    let AlertInsert::Inserted(id) = store.insert_alert(&meta, &parsed).await.unwrap() else {
        panic!("expected a fresh insert");
    };
    (id, parsed.levels().unwrap().clone())
}

async fn next_event(events: &mut broadcast::Receiver<PositionEvent>) -> PositionEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("no position event within 2s")
        .unwrap()
}

async fn wait_until_flat(executor: &TradeExecutor) {
    for _ in 0..200 {
        if executor.active_positions().await.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("positions still active");
}

async fn enter(h: &mut Harness, message_id: &str, text: &str) -> i64 {
    let (alert_id, levels) = insert_alert(&h.store, message_id, text).await;
    let outcome = h.executor.handle_alert(alert_id, &levels).await;
    assert!(
        matches!(outcome, ExecutionOutcome::Executed { .. }),
        "unexpected outcome {:?}",
        outcome
    );
    assert_eq!(next_event(&mut h.events).await.kind, PositionEventKind::EntrySubmitted);
    assert_eq!(next_event(&mut h.events).await.kind, PositionEventKind::EntryFilled);
    alert_id
}

#[tokio::test]
async fn test_two_lot_target1_then_breakeven_stop() {
    let mut h = harness().await;
    let alert_id = enter(&mut h, "m1", ALERT_B).await;

    let active = h.executor.active_positions().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].entry_price, dec!(6326));
    assert!(active[0].stop_order_id.is_some());
    assert_eq!(h.executor.open_quantity().await, 2);

    h.broker.set_price(dec!(6333)).await;
    let t1 = next_event(&mut h.events).await;
    assert_eq!(t1.kind, PositionEventKind::Target1Hit);
    assert_eq!(t1.leg_quantity, 1);
    assert_eq!(t1.leg_pnl, dec!(8.75));
    assert_eq!(t1.position.current_quantity, 1);
    assert_eq!(t1.position.status, PositionStatus::Half);
    assert_eq!(t1.position.stop_price, t1.position.entry_price);

    // back to entry: the breakeven stop closes the rest for zero
    h.broker.set_price(dec!(6326)).await;
    let stop = next_event(&mut h.events).await;
    assert_eq!(stop.kind, PositionEventKind::StoppedOut);
    assert_eq!(stop.leg_pnl, Decimal::ZERO);
    assert_eq!(stop.position.current_quantity, 0);
    assert_eq!(stop.position.realized_pnl, dec!(8.75));

    wait_until_flat(&h.executor).await;
    let stored = h.store.get_trade(t1.position.trade_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.trade_status, TradeStatus::StoppedOut);
    assert_eq!(stored.status, PositionStatus::Closed);
    assert_eq!(stored.realized_pnl, dec!(8.75));

    let alert = h.store.get_alert(alert_id).await.unwrap().unwrap();
    assert_eq!(alert.processing_status, "executed");
}

#[tokio::test]
async fn test_two_lot_runs_to_target2() {
    let mut h = harness().await;
    enter(&mut h, "m1", ALERT_B).await;

    h.broker.set_price(dec!(6333)).await;
    assert_eq!(next_event(&mut h.events).await.kind, PositionEventKind::Target1Hit);

    h.broker.set_price(dec!(6338)).await;
    let t2 = next_event(&mut h.events).await;
    assert_eq!(t2.kind, PositionEventKind::Target2Hit);
    assert_eq!(t2.leg_pnl, dec!(15));
    assert_eq!(t2.position.realized_pnl, dec!(23.75));
    assert_eq!(t2.position.status, PositionStatus::Closed);

    wait_until_flat(&h.executor).await;
    assert!(h.store.get_open_trades().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_single_contract_closes_at_target1() {
    let mut h = harness().await;
    enter(&mut h, "m1", ALERT_A).await;

    h.broker.set_price(dec!(6333)).await;
    let t1 = next_event(&mut h.events).await;
    assert_eq!(t1.kind, PositionEventKind::Target1Hit);
    assert_eq!(t1.leg_quantity, 1);
    assert_eq!(t1.position.status, PositionStatus::Closed);
    assert_eq!(t1.position.current_quantity, 0);

    wait_until_flat(&h.executor).await;
    assert_eq!(h.executor.open_quantity().await, 0);
}

#[tokio::test]
async fn test_protective_stop_realizes_loss() {
    let mut h = harness().await;
    enter(&mut h, "m1", ALERT_A).await;

    h.broker.set_price(dec!(6310)).await;
    let stop = next_event(&mut h.events).await;
    assert_eq!(stop.kind, PositionEventKind::StoppedOut);
    assert_eq!(stop.price, dec!(6316));
    assert_eq!(stop.leg_pnl, dec!(-12.5));

    wait_until_flat(&h.executor).await;
}

#[tokio::test]
async fn test_disabled_trading_records_only() {
    let store = TradeStore::in_memory().await.unwrap();
    let config = ExecutorConfig {
        enable_auto_trading: false,
        ..test_config()
    };
    let h = harness_with(RiskLimits::default(), config, store).await;
    let (alert_id, levels) = insert_alert(&h.store, "m1", ALERT_A).await;

    let outcome = h.executor.handle_alert(alert_id, &levels).await;
    assert!(matches!(outcome, ExecutionOutcome::Disabled));
    assert_eq!(h.store.get_system_stats().await.unwrap().total_trades, 0);
    let alert = h.store.get_alert(alert_id).await.unwrap().unwrap();
    assert_eq!(alert.processing_status, "not_executed");
}

#[tokio::test]
async fn test_position_limit_skips_second_alert() {
    let store = TradeStore::in_memory().await.unwrap();
    let limits = RiskLimits {
        max_position_size: 2,
        ..Default::default()
    };
    let mut h = harness_with(limits, test_config(), store).await;
    enter(&mut h, "m1", ALERT_B).await;

    let (alert_id, levels) = insert_alert(&h.store, "m2", "🚨 ES long 6327: A\nStop: 6317").await;
    let outcome = h.executor.handle_alert(alert_id, &levels).await;
    let ExecutionOutcome::Skipped(check) = outcome else {
        panic!("expected a risk skip, got {:?}", outcome);
    };
    assert!(!check.can_trade);

    let events = h.store.get_system_events(10).await.unwrap();
    assert!(events
        .iter()
        .any(|e| e.level == EventLevel::Warning.to_string() && e.alert_id == Some(alert_id)));
    let alert = h.store.get_alert(alert_id).await.unwrap().unwrap();
    assert_eq!(alert.processing_status, "skipped_risk");
}

#[tokio::test]
async fn test_consecutive_losses_trip_breaker() {
    let store = TradeStore::in_memory().await.unwrap();
    let limits = RiskLimits {
        max_consecutive_losses: 1,
        ..Default::default()
    };
    let mut h = harness_with(limits, test_config(), store).await;
    enter(&mut h, "m1", ALERT_A).await;

    h.broker.set_price(dec!(6310)).await;
    assert_eq!(next_event(&mut h.events).await.kind, PositionEventKind::StoppedOut);
    wait_until_flat(&h.executor).await;

    h.broker.set_price(dec!(6326)).await;
    let (alert_id, levels) = insert_alert(&h.store, "m2", ALERT_A).await;
    let outcome = h.executor.handle_alert(alert_id, &levels).await;
    let ExecutionOutcome::Skipped(check) = outcome else {
        panic!("expected the breaker to trip, got {:?}", outcome);
    };
    assert_eq!(check.breaker, Some(CircuitBreaker::ConsecutiveLosses));
}

#[tokio::test]
async fn test_price_failures_skip_ticks() {
    let store = TradeStore::in_memory().await.unwrap();
    let config = ExecutorConfig {
        symbol: "NQ".to_string(),
        ..test_config()
    };
    let mut h = harness_with(RiskLimits::default(), config, store).await;
    enter(&mut h, "m1", ALERT_A).await;

    // the paper feed has no NQ price, but the monitor keeps running
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.executor.active_positions().await.len(), 1);

    // resting stop is still honoured
    h.broker.set_price(dec!(6300)).await;
    assert_eq!(next_event(&mut h.events).await.kind, PositionEventKind::StoppedOut);
    wait_until_flat(&h.executor).await;
}

#[tokio::test]
async fn test_cancel_position_stops_monitoring() {
    let mut h = harness().await;
    let alert_id = enter(&mut h, "m1", ALERT_A).await;

    assert!(h.executor.cancel_position(alert_id).await);
    wait_until_flat(&h.executor).await;
    assert!(!h.executor.cancel_position(alert_id).await);

    // still open in the store
    assert_eq!(h.store.get_open_trades().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_shutdown_joins_monitors() {
    let mut h = harness().await;
    enter(&mut h, "m1", ALERT_A).await;
    enter(&mut h, "m2", "🚨 ES long 6326: A\nStop: 6320").await;

    assert_eq!(h.executor.shutdown().await, 2);
    assert!(h.executor.active_positions().await.is_empty());
    assert_eq!(h.store.get_open_trades().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_resume_open_positions() {
    let store = TradeStore::in_memory().await.unwrap();

    let (filled_id, levels) = insert_alert(&store, "m1", ALERT_B).await;
    let mut filled = Position::new(filled_id, "MES", &levels, 2);
    filled.trade_id = Some(store.insert_trade(&filled).await.unwrap());
    filled.mark_entry_submitted("PAPER-OLD-1");
    filled.apply_entry_fill(dec!(6326), Utc::now(), Decimal::ZERO);
    filled.stop_order_id = Some("PAPER-OLD-2".to_string());
    store.save_position(&filled).await.unwrap();

    let (pending_id, levels) = insert_alert(&store, "m2", ALERT_A).await;
    let mut pending = Position::new(pending_id, "MES", &levels, 1);
    pending.trade_id = Some(store.insert_trade(&pending).await.unwrap());
    pending.mark_entry_submitted("PAPER-OLD-3");
    store.save_position(&pending).await.unwrap();

    let mut h = harness_with(RiskLimits::default(), test_config(), store).await;
    assert_eq!(h.executor.resume_open_positions().await.unwrap(), 1);

    let active = h.executor.active_positions().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].alert_id, filled_id);
    assert_ne!(active[0].stop_order_id.as_deref(), Some("PAPER-OLD-2"));

    let abandoned = h.store.get_trade(pending.trade_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(abandoned.trade_status, TradeStatus::Cancelled);

    h.broker.set_price(dec!(6333)).await;
    let t1 = next_event(&mut h.events).await;
    assert_eq!(t1.kind, PositionEventKind::Target1Hit);
    assert_eq!(t1.position.alert_id, filled_id);

    h.executor.shutdown().await;
}

/// Accepts orders but never fills them.
struct StuckVenue;

#[async_trait]
impl ExecutionVenue for StuckVenue {
    async fn get_current_price(&self, _symbol: &str) -> Result<Decimal, ExecutionError> {
        Ok(dec!(6326))
    }

    async fn place_market_order(
        &self,
        side: OrderSide,
        quantity: u32,
    ) -> Result<OrderInfo, ExecutionError> {
        Ok(pending_order(side, quantity))
    }

    async fn place_stop_order(
        &self,
        side: OrderSide,
        quantity: u32,
        _stop_price: Decimal,
    ) -> Result<OrderInfo, ExecutionError> {
        Ok(pending_order(side, quantity))
    }

    async fn get_order(&self, _order_id: &str) -> Result<OrderInfo, ExecutionError> {
        Ok(pending_order(OrderSide::Buy, 1))
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<(), ExecutionError> {
        Ok(())
    }

    async fn get_account_balance(&self) -> Result<Decimal, ExecutionError> {
        Ok(dec!(50000))
    }

    async fn is_market_open(&self) -> Result<bool, ExecutionError> {
        Ok(true)
    }

    fn is_paper(&self) -> bool {
        true
    }

    fn venue_name(&self) -> &str {
        "stuck"
    }
}

fn pending_order(side: OrderSide, quantity: u32) -> OrderInfo {
    OrderInfo {
        order_id: "STUCK-1".to_string(),
        side,
        order_type: OrderType::Market,
        quantity,
        stop_price: None,
        status: OrderStatus::Pending,
        fill_price: None,
        filled_at: None,
        commission: Decimal::ZERO,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_unfilled_entry_is_rolled_back() {
    let store = TradeStore::in_memory().await.unwrap();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let config = ExecutorConfig {
        fill_timeout: Duration::from_millis(50),
        ..test_config()
    };
    let executor = TradeExecutor::new(
        config,
        Arc::new(StuckVenue),
        store.clone(),
        RiskManager::new(RiskLimits::default()),
        shutdown_rx,
    );

    let (alert_id, levels) = insert_alert(&store, "m1", ALERT_A).await;
    let outcome = executor.handle_alert(alert_id, &levels).await;
    assert!(matches!(outcome, ExecutionOutcome::Failed(_)));
    assert!(executor.active_positions().await.is_empty());
    assert!(store.get_open_trades().await.unwrap().is_empty());

    let events = store.get_system_events(10).await.unwrap();
    assert!(events.iter().any(|e| e.level == EventLevel::Error.to_string()));
}

/// Paper market whose sell market orders can be held unfilled, and which can
/// refuse stop orders. Held sells are tracked here; everything else goes to
/// the paper broker.
struct HeldExitVenue {
    inner: Arc<PaperBroker>,
    hold_sells: bool,
    reject_stops: bool,
    /// Report a held sell as filled when asked to cancel it
    fill_on_cancel: bool,
    exits: std::sync::Mutex<Vec<OrderInfo>>,
}

impl HeldExitVenue {
    fn new(inner: Arc<PaperBroker>) -> Self {
        Self {
            inner,
            hold_sells: false,
            reject_stops: false,
            fill_on_cancel: false,
            exits: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn exit_statuses(&self) -> Vec<OrderStatus> {
        self.exits.lock().unwrap().iter().map(|o| o.status).collect()
    }
}

#[async_trait]
impl ExecutionVenue for HeldExitVenue {
    async fn get_current_price(&self, symbol: &str) -> Result<Decimal, ExecutionError> {
        self.inner.get_current_price(symbol).await
    }

    async fn place_market_order(
        &self,
        side: OrderSide,
        quantity: u32,
    ) -> Result<OrderInfo, ExecutionError> {
        if side == OrderSide::Buy || !self.hold_sells {
            return self.inner.place_market_order(side, quantity).await;
        }
        let mut exits = self.exits.lock().unwrap();
        let mut order = pending_order(side, quantity);
        order.order_id = format!("EXIT-{}", exits.len() + 1);
        exits.push(order.clone());
        Ok(order)
    }

    async fn place_stop_order(
        &self,
        side: OrderSide,
        quantity: u32,
        stop_price: Decimal,
    ) -> Result<OrderInfo, ExecutionError> {
        if self.reject_stops {
            return Err(ExecutionError::Rejected("stop orders not accepted".to_string()));
        }
        self.inner.place_stop_order(side, quantity, stop_price).await
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderInfo, ExecutionError> {
        let held = self
            .exits
            .lock()
            .unwrap()
            .iter()
            .find(|o| o.order_id == order_id)
            .cloned();
        match held {
            Some(order) => Ok(order),
            None => self.inner.get_order(order_id).await,
        }
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), ExecutionError> {
        if !order_id.starts_with("EXIT-") {
            return self.inner.cancel_order(order_id).await;
        }
        let price = self.inner.get_current_price(&self.inner.config().symbol).await?;
        let mut exits = self.exits.lock().unwrap();
        let order = exits
            .iter_mut()
            .find(|o| o.order_id == order_id)
            .ok_or_else(|| ExecutionError::NotFound(order_id.to_string()))?;
        if order.is_terminal() {
            return Err(ExecutionError::Rejected(format!("{} is {:?}", order_id, order.status)));
        }
        if self.fill_on_cancel {
            order.status = OrderStatus::Filled;
            order.fill_price = Some(price);
            order.filled_at = Some(Utc::now());
            return Err(ExecutionError::Rejected(format!("{} already filled", order_id)));
        }
        order.status = OrderStatus::Cancelled;
        Ok(())
    }

    async fn get_account_balance(&self) -> Result<Decimal, ExecutionError> {
        self.inner.get_account_balance().await
    }

    async fn is_market_open(&self) -> Result<bool, ExecutionError> {
        self.inner.is_market_open().await
    }

    fn is_paper(&self) -> bool {
        true
    }

    fn venue_name(&self) -> &str {
        "held-exit"
    }
}

async fn held_exit_harness(venue: HeldExitVenue) -> (Harness, Arc<HeldExitVenue>) {
    let store = TradeStore::in_memory().await.unwrap();
    let broker = venue.inner.clone();
    let venue = Arc::new(venue);
    let h = harness_on(venue.clone(), broker, RiskLimits::default(), test_config(), store);
    (h, venue)
}

#[tokio::test]
async fn test_timed_out_exit_orders_are_cancelled() {
    let mut venue = HeldExitVenue::new(exact_broker());
    venue.hold_sells = true;
    let (mut h, venue) = held_exit_harness(venue).await;
    enter(&mut h, "m1", ALERT_B).await;

    // target 1 keeps signalling while every exit order sits unfilled
    h.broker.set_price(dec!(6333)).await;
    tokio::time::sleep(Duration::from_millis(900)).await;

    let statuses = venue.exit_statuses();
    assert!(statuses.len() >= 2, "expected retried exits, got {:?}", statuses);
    let working = statuses.iter().filter(|s| **s == OrderStatus::Pending).count();
    assert!(working <= 1, "exit orders piled up: {:?}", statuses);
    assert!(statuses[..statuses.len() - 1]
        .iter()
        .all(|s| *s == OrderStatus::Cancelled));

    let active = h.executor.active_positions().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].current_quantity, 2);
    assert_eq!(active[0].trade_status, TradeStatus::EntryFilled);
    assert!(h.events.try_recv().is_err());

    h.executor.shutdown().await;
}

#[tokio::test]
async fn test_exit_filled_during_cancel_is_applied() {
    let mut venue = HeldExitVenue::new(exact_broker());
    venue.hold_sells = true;
    venue.fill_on_cancel = true;
    let (mut h, venue) = held_exit_harness(venue).await;
    enter(&mut h, "m1", ALERT_B).await;

    h.broker.set_price(dec!(6333)).await;
    let t1 = next_event(&mut h.events).await;
    assert_eq!(t1.kind, PositionEventKind::Target1Hit);
    assert_eq!(t1.price, dec!(6333));
    assert_eq!(t1.leg_quantity, 1);
    assert_eq!(t1.leg_pnl, dec!(8.75));
    assert_eq!(t1.position.current_quantity, 1);

    // the late fill closed the leg; nothing was re-sent
    assert_eq!(venue.exit_statuses(), vec![OrderStatus::Filled]);
    assert!(t1.position.stop_order_id.is_some());

    h.executor.shutdown().await;
}

#[tokio::test]
async fn test_polled_stop_without_resting_order_realizes_at_stop() {
    let mut venue = HeldExitVenue::new(exact_broker());
    venue.reject_stops = true;
    let (mut h, _venue) = held_exit_harness(venue).await;
    enter(&mut h, "m1", ALERT_A).await;
    assert!(h.executor.active_positions().await[0].stop_order_id.is_none());

    // gap through the stop; the market sell fills at 6310
    h.broker.set_price(dec!(6310)).await;
    let stop = next_event(&mut h.events).await;
    assert_eq!(stop.kind, PositionEventKind::StoppedOut);
    assert_eq!(stop.price, dec!(6316));
    assert_eq!(stop.leg_pnl, dec!(-12.5));
    assert_eq!(stop.position.realized_pnl, dec!(-12.5));

    wait_until_flat(&h.executor).await;
    let stored = h.store.get_trade(stop.position.trade_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(stored.trade_status, TradeStatus::StoppedOut);
    assert_eq!(stored.stop_fill_price, Some(dec!(6316)));
    assert_eq!(stored.realized_pnl, dec!(-12.5));
}

#[tokio::test]
async fn test_store_outage_does_not_stop_monitor() {
    let store = TradeStore::in_memory().await.unwrap();
    let config = ExecutorConfig {
        persist_retries: 1,
        ..test_config()
    };
    let mut h = harness_with(RiskLimits::default(), config, store).await;
    enter(&mut h, "m1", ALERT_B).await;

    sqlx::query(
        "CREATE TRIGGER hold_trade_updates BEFORE UPDATE ON trades \
         BEGIN SELECT RAISE(ABORT, 'database is locked'); END",
    )
    .execute(h.store.pool())
    .await
    .unwrap();

    // the transition still happens and is published while writes fail
    h.broker.set_price(dec!(6333)).await;
    let t1 = next_event(&mut h.events).await;
    assert_eq!(t1.kind, PositionEventKind::Target1Hit);
    let trade_id = t1.position.trade_id.unwrap();
    let stored = h.store.get_trade(trade_id).await.unwrap().unwrap();
    assert_eq!(stored.trade_status, TradeStatus::EntryFilled);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let active = h.executor.active_positions().await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].current_quantity, 1);

    // once the store recovers a later tick writes the pending state
    sqlx::query("DROP TRIGGER hold_trade_updates")
        .execute(h.store.pool())
        .await
        .unwrap();
    let mut stored = h.store.get_trade(trade_id).await.unwrap().unwrap();
    for _ in 0..200 {
        if stored.trade_status == TradeStatus::Target1Hit {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        stored = h.store.get_trade(trade_id).await.unwrap().unwrap();
    }
    assert_eq!(stored.trade_status, TradeStatus::Target1Hit);
    assert_eq!(stored.current_quantity, 1);
    assert_eq!(stored.stop_price, dec!(6326));

    h.executor.shutdown().await;
}
