use alert_core::{AlertParser, MessageMetadata};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use trade_store::{AlertInsert, StoreError, SystemEvent, TradeStore};

use crate::models::{InboundMessage, IngestOutcome, MonitorFilter, MonitorStats, ValidAlert};

const COMPONENT: &str = "discord_monitor";

/// Invoked once per newly stored valid alert.
pub type AlertCallback = Arc<dyn Fn(ValidAlert, MessageMetadata) + Send + Sync>;

#[derive(Default)]
struct Counters {
    messages_processed: AtomicU64,
    valid_alerts: AtomicU64,
    invalid_alerts: AtomicU64,
    duplicate_messages: AtomicU64,
    connection_errors: AtomicU64,
}

/// Filters, parses and stores inbound messages, forwarding valid alerts.
pub struct AlertIngestor {
    filter: MonitorFilter,
    parser: AlertParser,
    store: TradeStore,
    callback: AlertCallback,
    counters: Counters,
    last_alert_time: RwLock<Option<DateTime<Utc>>>,
}

impl AlertIngestor {
    pub fn new(
        filter: MonitorFilter,
        parser: AlertParser,
        store: TradeStore,
        callback: AlertCallback,
    ) -> Self {
        Self {
            filter,
            parser,
            store,
            callback,
            counters: Counters::default(),
            last_alert_time: RwLock::new(None),
        }
    }

    pub fn filter(&self) -> &MonitorFilter {
        &self.filter
    }

    /// Storage is the source of truth for de-duplication: the unique message
    /// id decides which of several concurrent deliveries wins.
    pub async fn process_message(
        &self,
        message: &InboundMessage,
    ) -> Result<IngestOutcome, StoreError> {
        if !self.filter.matches(message) {
            return Ok(IngestOutcome::Ignored);
        }
        self.counters.messages_processed.fetch_add(1, Ordering::Relaxed);

        let parsed = self.parser.parse(&message.content);
        let metadata = MessageMetadata {
            message_id: message.message_id.clone(),
            channel_id: message.channel_id,
            author: message.author.clone(),
            timestamp: message.timestamp,
        };

        let alert_id = match self.store.insert_alert(&metadata, &parsed).await? {
            AlertInsert::Inserted(id) => id,
            AlertInsert::Duplicate => {
                self.counters.duplicate_messages.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(message_id = %message.message_id, "Duplicate message ignored");
                return Ok(IngestOutcome::Duplicate);
            }
        };

        match &parsed.result {
            Ok(levels) => {
                self.counters.valid_alerts.fetch_add(1, Ordering::Relaxed);
                *self.last_alert_time.write().await = Some(Utc::now());
                tracing::info!(alert_id, author = %message.author, "{}", parsed.summary());

                (self.callback)(
                    ValidAlert {
                        alert_id,
                        levels: levels.clone(),
                        raw_text: parsed.raw_text.clone(),
                    },
                    metadata,
                );

                self.record(
                    SystemEvent::info(COMPONENT, parsed.summary())
                        .with_alert(alert_id)
                        .with_details(json!({ "message_id": message.message_id })),
                )
                .await;
                Ok(IngestOutcome::Valid(alert_id))
            }
            Err(e) => {
                self.counters.invalid_alerts.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(alert_id, author = %message.author, "Invalid alert: {}", e);
                self.record(
                    SystemEvent::warning(COMPONENT, format!("Invalid alert: {}", e))
                        .with_alert(alert_id)
                        .with_details(json!({
                            "message_id": message.message_id,
                            "content": message.content,
                        })),
                )
                .await;
                Ok(IngestOutcome::Invalid(e.clone()))
            }
        }
    }

    pub fn record_connection_error(&self) {
        self.counters.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn stats(&self) -> MonitorStats {
        let c = &self.counters;
        MonitorStats {
            messages_processed: c.messages_processed.load(Ordering::Relaxed),
            valid_alerts: c.valid_alerts.load(Ordering::Relaxed),
            invalid_alerts: c.invalid_alerts.load(Ordering::Relaxed),
            duplicate_messages: c.duplicate_messages.load(Ordering::Relaxed),
            connection_errors: c.connection_errors.load(Ordering::Relaxed),
            last_alert_time: *self.last_alert_time.read().await,
        }
    }

    async fn record(&self, event: SystemEvent) {
        if let Err(e) = self.store.log_system_event(&event).await {
            tracing::warn!("Failed to write system log: {}", e);
        }
    }
}
