use chrono::{DateTime, Utc};
use serenity::{
    async_trait,
    model::{channel::Message, event::ResumedEvent, gateway::Ready},
    prelude::*,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::Instrument;

use crate::ingestor::AlertIngestor;
use crate::models::{InboundMessage, IngestOutcome};

/// Serenity event handler feeding gateway messages to the ingestor.
pub struct DiscordHandler {
    ingestor: Arc<AlertIngestor>,
    bot_user_id: AtomicU64,
}

impl DiscordHandler {
    pub fn new(ingestor: Arc<AlertIngestor>) -> Self {
        Self {
            ingestor,
            bot_user_id: AtomicU64::new(0),
        }
    }
}

fn inbound(msg: &Message) -> InboundMessage {
    InboundMessage {
        message_id: msg.id.to_string(),
        channel_id: msg.channel_id.get(),
        author: msg.author.display_name().to_string(),
        author_username: msg.author.name.clone(),
        content: msg.content.clone(),
        timestamp: DateTime::from_timestamp(msg.timestamp.unix_timestamp(), 0)
            .unwrap_or_else(Utc::now),
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn message(&self, _ctx: Context, msg: Message) {
        if msg.author.id.get() == self.bot_user_id.load(Ordering::Relaxed) {
            return;
        }

        let message = inbound(&msg);
        let span = tracing::info_span!("discord_monitor", message_id = %message.message_id);
        match self.ingestor.process_message(&message).instrument(span).await {
            Ok(IngestOutcome::Ignored) => {}
            Ok(outcome) => {
                tracing::debug!(message_id = %message.message_id, ?outcome, "Message processed");
            }
            Err(e) => {
                tracing::error!(message_id = %message.message_id, "Failed to store message: {}", e);
            }
        }
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        self.bot_user_id.store(ready.user.id.get(), Ordering::Relaxed);
        let filter = self.ingestor.filter();
        tracing::info!(
            channel_id = filter.channel_id,
            authors = ?filter.target_authors,
            "{} is connected and monitoring",
            ready.user.name
        );
    }

    async fn resume(&self, _ctx: Context, _event: ResumedEvent) {
        tracing::info!("Discord gateway session resumed");
    }
}

/// Run the gateway client until it fails or shutdown is signalled.
pub async fn run_discord_monitor(
    token: &str,
    ingestor: Arc<AlertIngestor>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), serenity::Error> {
    let intents = GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(token, intents)
        .event_handler(DiscordHandler::new(Arc::clone(&ingestor)))
        .await?;

    tracing::info!("Discord monitor starting...");
    let shard_manager = client.shard_manager.clone();

    tokio::select! {
        result = client.start() => {
            if let Err(e) = result {
                ingestor.record_connection_error();
                tracing::error!("Discord client error: {}", e);
                return Err(e);
            }
        }
        _ = shutdown.changed() => {
            tracing::info!("Stopping Discord monitor...");
        }
    }

    shard_manager.shutdown_all().await;
    tracing::info!("Discord monitor stopped");
    Ok(())
}
