use analytics::PerformanceTracker;
use anyhow::{Context, Result};
use broker_trait::ExecutionVenue;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use notification_service::{DailySummaryReport, Notification, NotificationService};
use position_manager::TradeExecutor;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time;
use trade_store::{SystemEvent, TradeStore};

/// agent_state key holding the date of the last summary sent.
pub const LAST_SUMMARY_KEY: &str = "last_daily_summary";

const COMPONENT: &str = "daily_summary";

/// Due once per UTC date, at or after `send_at`.
pub fn summary_due(now: DateTime<Utc>, send_at: NaiveTime, last_sent: Option<NaiveDate>) -> bool {
    now.time() >= send_at && last_sent.map_or(true, |date| date < now.date_naive())
}

pub async fn build_report(
    tracker: &PerformanceTracker,
    store: &TradeStore,
    date: NaiveDate,
    open_positions: usize,
    account_balance: Option<Decimal>,
) -> Result<DailySummaryReport> {
    let record = tracker
        .refresh_daily_performance(date)
        .await
        .context("refreshing daily performance")?;

    let start = date.and_time(NaiveTime::default()).and_utc();
    let alerts = store
        .count_valid_alerts_between(start, start + Duration::days(1))
        .await
        .context("counting alerts")?;

    Ok(DailySummaryReport {
        date,
        total_trades: record.total_trades,
        winning_trades: record.winning_trades,
        losing_trades: record.losing_trades,
        win_rate: record.win_rate,
        net_pnl: record.net_pnl,
        gross_profit: record.gross_profit,
        gross_loss: record.gross_loss,
        commission_paid: record.commission_paid,
        max_drawdown: record.max_drawdown,
        account_balance,
        open_positions,
        alerts_received: u64::try_from(alerts).unwrap_or_default(),
    })
}

pub struct DailySummaryScheduler {
    pub tracker: Arc<PerformanceTracker>,
    pub store: TradeStore,
    pub executor: Arc<TradeExecutor>,
    pub venue: Arc<dyn ExecutionVenue>,
    pub notifier: Arc<NotificationService>,
    pub send_at: NaiveTime,
}

impl DailySummaryScheduler {
    /// Check once a minute; a restart after the send time catches up the
    /// same day, never twice.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut last_sent = match self.store.load_state(LAST_SUMMARY_KEY).await {
            Ok(value) => value.and_then(|v| v.parse::<NaiveDate>().ok()),
            Err(e) => {
                tracing::warn!("Failed to load last summary date: {}", e);
                None
            }
        };

        let mut interval = time::interval(std::time::Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => break,
            }

            let now = Utc::now();
            if !summary_due(now, self.send_at, last_sent) {
                continue;
            }

            let date = now.date_naive();
            if let Err(e) = self.send(date).await {
                tracing::warn!(%date, "Daily summary failed, retrying next check: {:#}", e);
                continue;
            }

            last_sent = Some(date);
            if let Err(e) = self.store.save_state(LAST_SUMMARY_KEY, &date.to_string()).await {
                tracing::warn!("Failed to persist last summary date: {}", e);
            }
        }
        tracing::debug!("Daily summary scheduler stopped");
    }

    async fn send(&self, date: NaiveDate) -> Result<()> {
        let open_positions = self.executor.active_positions().await.len();
        let balance = self.venue.get_account_balance().await.ok();
        let report = build_report(&self.tracker, &self.store, date, open_positions, balance).await?;

        tracing::info!(
            %date,
            trades = report.total_trades,
            net_pnl = %report.net_pnl,
            win_rate = report.win_rate,
            alerts = report.alerts_received,
            "Daily summary"
        );

        let delivered = self
            .notifier
            .notify_and_wait(&Notification::DailySummary(report))
            .await;

        let event = SystemEvent::info(COMPONENT, format!("Daily summary for {}", date))
            .with_details(serde_json::json!({ "delivered": delivered }));
        if let Err(e) = self.store.log_system_event(&event).await {
            tracing::warn!("Failed to write system log: {}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_core::{AlertParser, MessageMetadata, Position};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn test_summary_due() {
        let send_at = NaiveTime::from_hms_opt(17, 0, 0).unwrap();
        let today = at(0, 0).date_naive();
        let yesterday = today.pred_opt().unwrap();

        assert!(!summary_due(at(16, 59), send_at, None));
        assert!(summary_due(at(17, 0), send_at, None));
        assert!(summary_due(at(23, 0), send_at, Some(yesterday)));
        assert!(!summary_due(at(17, 1), send_at, Some(today)));
    }

    #[tokio::test]
    async fn test_build_report_from_store() {
        let store = TradeStore::in_memory().await.unwrap();
        let tracker = PerformanceTracker::new(store.clone());
        let now = Utc::now();

        let parsed = AlertParser::default().parse("🚨 ES long 6326: B\nStop: 6316");
        let meta = MessageMetadata {
            message_id: "m-1".to_string(),
            channel_id: 1,
            author: "TraderJoe".to_string(),
            timestamp: now,
        };
        let alert_id = match store.insert_alert(&meta, &parsed).await.unwrap() {
            trade_store::AlertInsert::Inserted(id) => id,
            trade_store::AlertInsert::Duplicate => panic!("fresh store"),
        };

        let levels = parsed.result.clone().unwrap();
        let mut position = Position::new(alert_id, "MES", &levels, 2);
        position.trade_id = Some(store.insert_trade(&position).await.unwrap());
        position.apply_entry_fill(dec!(6326), now, Decimal::ZERO);
        position.apply_target1(dec!(6333), 1, now, dec!(1.25), Decimal::ZERO);
        position.apply_stop(dec!(6326), now, dec!(1.25), Decimal::ZERO);
        store.save_position(&position).await.unwrap();

        let report = build_report(&tracker, &store, now.date_naive(), 0, Some(dec!(50008.75)))
            .await
            .unwrap();
        assert_eq!(report.total_trades, 1);
        assert_eq!(report.winning_trades, 1);
        assert_eq!(report.net_pnl, dec!(8.75));
        assert_eq!(report.alerts_received, 1);
        assert_eq!(report.account_balance, Some(dec!(50008.75)));
    }
}
