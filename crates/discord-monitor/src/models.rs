use alert_core::{ParseError, TradeLevels};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message as delivered by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub message_id: String,
    pub channel_id: u64,
    /// Display name shown in the channel
    pub author: String,
    pub author_username: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Which messages reach the parser: one channel, a set of authors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorFilter {
    pub channel_id: u64,
    pub target_authors: Vec<String>,
}

impl MonitorFilter {
    /// Author names match case-insensitively against either the display
    /// name or the account username.
    pub fn matches(&self, message: &InboundMessage) -> bool {
        if message.channel_id != self.channel_id {
            return false;
        }
        self.target_authors.iter().any(|target| {
            target.eq_ignore_ascii_case(message.author.trim())
                || target.eq_ignore_ascii_case(message.author_username.trim())
        })
    }
}

/// Handed to the alert callback for every newly stored valid alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidAlert {
    pub alert_id: i64,
    pub levels: TradeLevels,
    pub raw_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Wrong channel or author
    Ignored,
    /// Message id already stored
    Duplicate,
    Invalid(ParseError),
    Valid(i64),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStats {
    pub messages_processed: u64,
    pub valid_alerts: u64,
    pub invalid_alerts: u64,
    pub duplicate_messages: u64,
    pub connection_errors: u64,
    pub last_alert_time: Option<DateTime<Utc>>,
}
