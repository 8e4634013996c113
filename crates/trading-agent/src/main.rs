use std::sync::Arc;
use std::time::Duration;

use alert_core::{AlertParser, MessageMetadata};
use analytics::PerformanceTracker;
use anyhow::{Context, Result};
use broker_trait::ExecutionVenue;
use discord_monitor::{run_discord_monitor, AlertCallback, AlertIngestor, ValidAlert};
use notification_service::{Notification, NotificationService};
use paper_broker::PaperBroker;
use position_manager::{ExecutionOutcome, TradeExecutor};
use risk_manager::RiskManager;
use tokio::signal::unix::SignalKind;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time;
use trade_store::{SystemEvent, TradeStore};

mod config;
mod daily_summary;
mod metrics;

use config::AgentConfig;
use daily_summary::DailySummaryScheduler;
use metrics::AgentMetrics;

const METRICS_STATE_KEY: &str = "agent_metrics";
const TASK_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

type AlertQueue = mpsc::UnboundedReceiver<(ValidAlert, MessageMetadata)>;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting TradeStream alert trading agent");

    // 2. Load configuration
    let config = AgentConfig::from_env()?;
    config.log_summary();

    // 3. Storage
    let store = TradeStore::connect(&config.database_url)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;
    record(&store, SystemEvent::info("agent", "Trading agent started")).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 4. Paper venue with its simulated price feed
    let broker = Arc::new(PaperBroker::new(config.paper_config()));
    let price_feed = broker.spawn_price_feed(shutdown_rx.clone());
    let venue: Arc<dyn ExecutionVenue> = broker;
    tracing::info!("Execution venue: {}", venue.venue_name());

    // 5. Notifications
    let notifier = Arc::new(NotificationService::new(&config.notifications));
    tracing::info!(channels = notifier.channel_count(), "Notification service initialized");

    // 6. Executor, resuming anything left open by a previous run
    let executor = Arc::new(TradeExecutor::new(
        config.executor_config(),
        Arc::clone(&venue),
        store.clone(),
        RiskManager::new(config.risk.clone()),
        shutdown_rx.clone(),
    ));
    let tracker = Arc::new(PerformanceTracker::new(store.clone()));

    let metrics = Arc::new(Mutex::new(AgentMetrics::new()));
    match store.load_state(METRICS_STATE_KEY).await {
        Ok(Some(saved)) => match serde_json::from_str(&saved) {
            Ok(json) => metrics.lock().await.restore_from_json(&json),
            Err(e) => tracing::warn!("Ignoring unreadable metrics state: {}", e),
        },
        Ok(None) => {}
        Err(e) => tracing::warn!("Failed to load metrics state: {}", e),
    }

    // Subscribers attach before any position can publish
    let mut tasks: Vec<(&str, JoinHandle<()>)> = vec![
        (
            "notification relay",
            tokio::spawn(
                Arc::clone(&notifier).run_event_relay(executor.subscribe(), shutdown_rx.clone()),
            ),
        ),
        (
            "performance refresher",
            tokio::spawn(
                Arc::clone(&tracker).run_refresher(executor.subscribe(), shutdown_rx.clone()),
            ),
        ),
        (
            "metrics relay",
            tokio::spawn(metrics::run_metrics_relay(
                Arc::clone(&metrics),
                executor.subscribe(),
                shutdown_rx.clone(),
            )),
        ),
    ];

    match executor.resume_open_positions().await {
        Ok(0) => {}
        Ok(n) => tracing::info!("Resumed {} open position(s)", n),
        Err(e) => tracing::error!("Failed to resume open positions: {}", e),
    }

    // 7. Ingestion: the callback only enqueues, one consumer executes in order
    let (alert_tx, alert_rx) = mpsc::unbounded_channel();
    let callback: AlertCallback = Arc::new(move |alert, metadata| {
        if alert_tx.send((alert, metadata)).is_err() {
            tracing::warn!("Alert queue closed; alert not executed");
        }
    });
    let ingestor = Arc::new(AlertIngestor::new(
        config.monitor_filter(),
        AlertParser::new(&config.alert_instrument),
        store.clone(),
        callback,
    ));

    tasks.push((
        "alert consumer",
        tokio::spawn(run_alert_consumer(
            alert_rx,
            Arc::clone(&executor),
            Arc::clone(&notifier),
            Arc::clone(&venue),
            Arc::clone(&metrics),
            shutdown_rx.clone(),
        )),
    ));

    // 8. Periodic work
    tasks.push((
        "status logger",
        tokio::spawn(run_status_logger(
            config.status_log_interval,
            config.performance_window_days,
            Arc::clone(&ingestor),
            Arc::clone(&executor),
            Arc::clone(&tracker),
            Arc::clone(&metrics),
            shutdown_rx.clone(),
        )),
    ));
    tasks.push((
        "daily summary",
        tokio::spawn(
            DailySummaryScheduler {
                tracker: Arc::clone(&tracker),
                store: store.clone(),
                executor: Arc::clone(&executor),
                venue: Arc::clone(&venue),
                notifier: Arc::clone(&notifier),
                send_at: config.daily_summary_time,
            }
            .run(shutdown_rx.clone()),
        ),
    ));

    // 9. Discord gateway
    let mut discord = tokio::spawn({
        let token = config.discord_token.clone();
        let ingestor = Arc::clone(&ingestor);
        let shutdown = shutdown_rx.clone();
        async move { run_discord_monitor(&token, ingestor, shutdown).await }
    });

    tracing::info!("Agent running. Waiting for alerts...");

    // 10. Run until a signal arrives or the gateway client gives up
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let discord_finished = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT");
            false
        }
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
            false
        }
        result = &mut discord => {
            let message = match result {
                Ok(Ok(())) => "Discord monitor exited".to_string(),
                Ok(Err(e)) => format!("Discord client error: {}", e),
                Err(e) => format!("Discord monitor task failed: {}", e),
            };
            tracing::error!("{}; shutting down", message);
            record(&store, SystemEvent::error("discord_monitor", message.clone())).await;
            notifier
                .notify_and_wait(&Notification::SystemError {
                    component: "discord_monitor".to_string(),
                    message,
                })
                .await;
            true
        }
    };

    // 11. Graceful shutdown
    tracing::info!("Shutting down...");
    let _ = shutdown_tx.send(true);

    if !discord_finished {
        match time::timeout(TASK_DRAIN_TIMEOUT, discord).await {
            Ok(Ok(Err(e))) => tracing::warn!("Discord client stopped with error: {}", e),
            Ok(Err(e)) => tracing::warn!("Discord monitor task failed: {}", e),
            Err(_) => tracing::warn!("Discord monitor did not stop in time"),
            Ok(Ok(Ok(()))) => {}
        }
    }

    let stopped = executor.shutdown().await;
    tracing::info!("Stopped {} position monitor(s); resting stops remain at the venue", stopped);

    for (name, task) in tasks {
        match time::timeout(TASK_DRAIN_TIMEOUT, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("{} task failed: {}", name, e),
            Err(_) => tracing::warn!("{} did not stop in time", name),
        }
    }
    if let Err(e) = price_feed.await {
        tracing::warn!("Price feed task failed: {}", e);
    }

    let final_metrics = metrics.lock().await;
    final_metrics.log_metrics();
    if let Err(e) = store
        .save_state(METRICS_STATE_KEY, &final_metrics.to_json().to_string())
        .await
    {
        tracing::warn!("Failed to persist metrics: {}", e);
    }
    let stats = ingestor.stats().await;
    tracing::info!(
        messages = stats.messages_processed,
        valid = stats.valid_alerts,
        invalid = stats.invalid_alerts,
        duplicates = stats.duplicate_messages,
        "Final ingestion stats"
    );

    record(&store, SystemEvent::info("agent", "Trading agent stopped")).await;
    tracing::info!("Trading agent stopped");
    Ok(())
}

/// Executes queued alerts one at a time so every risk check sees the
/// positions opened before it.
async fn run_alert_consumer(
    mut alerts: AlertQueue,
    executor: Arc<TradeExecutor>,
    notifier: Arc<NotificationService>,
    venue: Arc<dyn ExecutionVenue>,
    metrics: Arc<Mutex<AgentMetrics>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let (alert, metadata) = tokio::select! {
            next = alerts.recv() => match next {
                Some(item) => item,
                None => break,
            },
            _ = shutdown.changed() => break,
        };

        tracing::info!(
            alert_id = alert.alert_id,
            message_id = %metadata.message_id,
            author = %metadata.author,
            "Processing alert"
        );

        notifier.notify(Notification::AlertReceived {
            alert_id: alert.alert_id,
            levels: alert.levels.clone(),
            quantity: executor.config().size_mapping.quantity_for(alert.levels.size),
            account_balance: venue.get_account_balance().await.ok(),
        });

        let outcome = executor.handle_alert(alert.alert_id, &alert.levels).await;
        match &outcome {
            ExecutionOutcome::Executed {
                trade_id,
                quantity,
                fill_price,
            } => {
                tracing::info!(alert_id = alert.alert_id, trade_id, quantity, fill = %fill_price, "Alert executed");
            }
            ExecutionOutcome::Skipped(check) => {
                tracing::info!(
                    alert_id = alert.alert_id,
                    reason = %check.reason,
                    action = ?check.suggested_action,
                    "Alert skipped by risk check"
                );
            }
            ExecutionOutcome::Disabled => {}
            ExecutionOutcome::Failed(reason) => {
                notifier.notify(Notification::SystemError {
                    component: "position_manager".to_string(),
                    message: format!("Alert {} failed to execute: {}", alert.alert_id, reason),
                });
            }
        }
        metrics.lock().await.record_outcome(&outcome);
    }
    tracing::debug!("Alert consumer stopped");
}

async fn run_status_logger(
    every: Duration,
    window_days: u32,
    ingestor: Arc<AlertIngestor>,
    executor: Arc<TradeExecutor>,
    tracker: Arc<PerformanceTracker>,
    metrics: Arc<Mutex<AgentMetrics>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = time::interval(every);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.changed() => break,
        }

        let stats = ingestor.stats().await;
        let positions = executor.active_positions().await;
        let open_contracts: u32 = positions.iter().map(|p| p.current_quantity).sum();
        let daily_pnl = match executor.daily_pnl().await {
            Ok(pnl) => pnl.to_string(),
            Err(e) => {
                tracing::warn!("Failed to read daily P&L: {}", e);
                "unknown".to_string()
            }
        };

        tracing::info!(
            messages = stats.messages_processed,
            valid_alerts = stats.valid_alerts,
            invalid_alerts = stats.invalid_alerts,
            duplicates = stats.duplicate_messages,
            connection_errors = stats.connection_errors,
            last_alert = ?stats.last_alert_time,
            active_positions = positions.len(),
            open_contracts,
            daily_pnl = %daily_pnl,
            "Agent status"
        );

        match tracker.calculate_performance_metrics(window_days).await {
            Ok(perf) => tracing::info!(
                window_days,
                trades = perf.total_trades,
                win_rate = perf.win_rate,
                total_pnl = %perf.total_pnl,
                profit_factor = perf.profit_factor,
                max_drawdown = %perf.max_drawdown,
                execution_rate = perf.execution_rate,
                "Performance window"
            ),
            Err(e) => tracing::warn!("Failed to compute performance metrics: {:#}", e),
        }

        metrics.lock().await.log_metrics();
    }
}

async fn record(store: &TradeStore, event: SystemEvent) {
    if let Err(e) = store.log_system_event(&event).await {
        tracing::warn!("Failed to write system log: {}", e);
    }
}
