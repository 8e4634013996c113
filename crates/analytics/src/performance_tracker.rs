use alert_core::PositionEvent;
use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use trade_store::{PerformanceRecord, TradeStore};

use crate::metrics::{compute_metrics, daily_record};
use crate::models::PerformanceMetrics;

pub struct PerformanceTracker {
    store: TradeStore,
}

impl PerformanceTracker {
    pub fn new(store: TradeStore) -> Self {
        Self { store }
    }

    /// Metrics over the trailing `days` window ending now.
    pub async fn calculate_performance_metrics(&self, days: u32) -> Result<PerformanceMetrics> {
        let end = Utc::now();
        let start = end - Duration::days(i64::from(days));

        let trades = self.store.closed_trades_between(start, end).await?;
        let total_alerts = self.store.count_valid_alerts_between(start, end).await?;
        let executed = self.store.count_executed_trades_between(start, end).await?;

        let metrics = compute_metrics(
            &trades,
            u64::try_from(total_alerts).unwrap_or_default(),
            u64::try_from(executed).unwrap_or_default(),
        );

        tracing::debug!(
            days,
            trades = metrics.total_trades,
            win_rate = metrics.win_rate,
            total_pnl = %metrics.total_pnl,
            "Performance metrics calculated"
        );
        Ok(metrics)
    }

    /// Recompute and persist the daily aggregate for `date`.
    pub async fn refresh_daily_performance(&self, date: NaiveDate) -> Result<PerformanceRecord> {
        let trades = self.store.closed_trades_on(date).await?;
        let record = daily_record(date, &trades);
        self.store.upsert_daily_performance(&record).await?;

        tracing::info!(
            %date,
            trades = record.total_trades,
            net_pnl = %record.net_pnl,
            win_rate = record.win_rate,
            "Daily performance updated"
        );
        Ok(record)
    }

    /// Stored aggregate for `date`, computing it when missing.
    pub async fn get_daily_summary(&self, date: NaiveDate) -> Result<PerformanceRecord> {
        match self.store.get_daily_summary(date).await? {
            Some(record) => Ok(record),
            None => self.refresh_daily_performance(date).await,
        }
    }

    /// Refresh today's aggregate whenever a position closes.
    pub async fn run_refresher(
        self: Arc<Self>,
        mut events: broadcast::Receiver<PositionEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) if event.kind.is_closing(&event.position) => {
                        let date = event.timestamp.date_naive();
                        if let Err(e) = self.refresh_daily_performance(date).await {
                            tracing::warn!(alert_id = event.position.alert_id, "Failed to refresh daily performance: {:#}", e);
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Performance refresher lagged; recomputing today");
                        if let Err(e) = self.refresh_daily_performance(Utc::now().date_naive()).await {
                            tracing::warn!("Failed to refresh daily performance: {:#}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.changed() => break,
            }
        }
        tracing::debug!("Performance refresher stopped");
    }
}
