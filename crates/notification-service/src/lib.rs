mod smtp;
mod templates;

pub use smtp::SmtpNotifier;
pub use templates::{EmailTemplate, RenderedEmail};

use alert_core::{PositionEvent, TradeLevels};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// End-of-day figures for the summary email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySummaryReport {
    pub date: NaiveDate,
    pub total_trades: u32,
    pub winning_trades: u32,
    pub losing_trades: u32,
    pub win_rate: f64,
    pub net_pnl: Decimal,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub commission_paid: Decimal,
    pub max_drawdown: Decimal,
    pub account_balance: Option<Decimal>,
    pub open_positions: usize,
    pub alerts_received: u64,
}

/// Events that trigger notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Notification {
    AlertReceived {
        alert_id: i64,
        levels: TradeLevels,
        quantity: u32,
        account_balance: Option<Decimal>,
    },
    PositionUpdate(PositionEvent),
    DailySummary(DailySummaryReport),
    SystemError {
        component: String,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    AlertConfirmation,
    TradeExecution,
    DailySummary,
    SystemError,
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::AlertReceived { .. } => NotificationKind::AlertConfirmation,
            Notification::PositionUpdate(_) => NotificationKind::TradeExecution,
            Notification::DailySummary(_) => NotificationKind::DailySummary,
            Notification::SystemError { .. } => NotificationKind::SystemError,
        }
    }
}

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, email: &RenderedEmail) -> Result<(), NotificationError>;
    fn name(&self) -> &str;
}

/// Errors from the notification system.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("SMTP error: {0}")]
    Smtp(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy)]
pub struct NotificationToggles {
    pub alert_confirmations: bool,
    pub trade_executions: bool,
    pub daily_summaries: bool,
    pub system_errors: bool,
}

impl Default for NotificationToggles {
    fn default() -> Self {
        Self {
            alert_confirmations: true,
            trade_executions: true,
            daily_summaries: true,
            system_errors: true,
        }
    }
}

impl NotificationToggles {
    pub fn allows(&self, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::AlertConfirmation => self.alert_confirmations,
            NotificationKind::TradeExecution => self.trade_executions,
            NotificationKind::DailySummary => self.daily_summaries,
            NotificationKind::SystemError => self.system_errors,
        }
    }
}

/// Configuration for the notification service.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    pub smtp_to: Vec<String>,
    pub smtp_tls: SmtpTls,
    pub toggles: NotificationToggles,
    pub send_timeout: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SmtpTls {
    #[default]
    StartTls,
    Tls,
    None,
}

impl std::str::FromStr for SmtpTls {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "starttls" => Ok(SmtpTls::StartTls),
            "tls" => Ok(SmtpTls::Tls),
            "none" => Ok(SmtpTls::None),
            other => Err(format!("unknown TLS mode {:?} (use starttls, tls or none)", other)),
        }
    }
}

impl Default for NotificationConfig {
    /// Email disabled until a host, sender and recipient are set.
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            smtp_from: None,
            smtp_to: Vec::new(),
            smtp_tls: SmtpTls::default(),
            toggles: NotificationToggles::default(),
            send_timeout: Duration::from_secs(30),
        }
    }
}

impl NotificationConfig {
    pub fn email_enabled(&self) -> bool {
        self.smtp_host.is_some() && self.smtp_from.is_some() && !self.smtp_to.is_empty()
    }
}

/// Dispatches notifications to all configured channels. Failures are logged
/// and never reach the caller.
pub struct NotificationService {
    channels: Arc<Vec<Box<dyn NotificationChannel>>>,
    toggles: NotificationToggles,
    send_timeout: Duration,
}

impl NotificationService {
    pub fn new(config: &NotificationConfig) -> Self {
        let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();

        if config.email_enabled() {
            match SmtpNotifier::new(config) {
                Ok(notifier) => {
                    tracing::info!(
                        "Email notifications enabled (SMTP -> {} recipients)",
                        config.smtp_to.len()
                    );
                    channels.push(Box::new(notifier));
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize SMTP notifier: {}", e);
                }
            }
        }

        if channels.is_empty() {
            tracing::info!("No notification channels configured (set SMTP_HOST)");
        }

        Self::with_channels(channels, config.toggles, config.send_timeout)
    }

    pub fn with_channels(
        channels: Vec<Box<dyn NotificationChannel>>,
        toggles: NotificationToggles,
        send_timeout: Duration,
    ) -> Self {
        Self {
            channels: Arc::new(channels),
            toggles,
            send_timeout,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Send to all channels without waiting (fire-and-forget via tokio::spawn).
    pub fn notify(&self, notification: Notification) {
        if !self.should_send(&notification) {
            return;
        }
        let channels = Arc::clone(&self.channels);
        let timeout = self.send_timeout;
        tokio::spawn(async move {
            let email = EmailTemplate::render(&notification);
            deliver(&channels, &email, timeout).await;
        });
    }

    /// Send to all channels, awaiting completion. Returns the number of
    /// channels that accepted the message.
    pub async fn notify_and_wait(&self, notification: &Notification) -> usize {
        if !self.should_send(notification) {
            return 0;
        }
        let email = EmailTemplate::render(notification);
        deliver(&self.channels, &email, self.send_timeout).await
    }

    fn should_send(&self, notification: &Notification) -> bool {
        if self.channels.is_empty() {
            return false;
        }
        let kind = notification.kind();
        if !self.toggles.allows(kind) {
            tracing::debug!(?kind, "Notification category disabled");
            return false;
        }
        true
    }

    /// Forward position lifecycle events as trade execution notifications.
    pub async fn run_event_relay(
        self: Arc<Self>,
        mut events: broadcast::Receiver<PositionEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => self.notify(Notification::PositionUpdate(event)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Notification relay lagged; events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = shutdown.changed() => break,
            }
        }
        tracing::debug!("Notification relay stopped");
    }
}

async fn deliver(
    channels: &[Box<dyn NotificationChannel>],
    email: &RenderedEmail,
    timeout: Duration,
) -> usize {
    let mut delivered = 0;
    for channel in channels.iter() {
        let result = tokio::time::timeout(timeout, channel.send(email))
            .await
            .unwrap_or(Err(NotificationError::Timeout(timeout)));
        match result {
            Ok(()) => {
                delivered += 1;
                tracing::debug!("Sent notification via {}", channel.name());
            }
            Err(e) => {
                tracing::warn!("Failed to send notification via {}: {}", channel.name(), e)
            }
        }
    }
    delivered
}
