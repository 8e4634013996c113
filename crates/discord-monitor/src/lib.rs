mod handler;
mod ingestor;
mod models;

pub use handler::{run_discord_monitor, DiscordHandler};
pub use ingestor::{AlertCallback, AlertIngestor};
pub use models::{InboundMessage, IngestOutcome, MonitorFilter, MonitorStats, ValidAlert};
