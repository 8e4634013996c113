use alert_core::SizeMapping;
use chrono::NaiveTime;
use discord_monitor::MonitorFilter;
use notification_service::{NotificationConfig, NotificationToggles, SmtpTls};
use paper_broker::PaperBrokerConfig;
use position_manager::ExecutorConfig;
use risk_manager::RiskLimits;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// One missing or unparseable setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub key: &'static str,
    pub reason: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.reason)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration ({} problem(s)): {}", .0.len(), join_fields(.0))]
    Invalid(Vec<FieldError>),
}

fn join_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    // Discord
    pub discord_token: String,
    pub discord_channel_id: u64,
    pub discord_target_authors: Vec<String>,

    // Trading
    pub trading_symbol: String,
    pub contract_name: String,
    pub alert_instrument: String,
    pub tick_size: Decimal,
    pub tick_value: Decimal,
    pub size_mapping: SizeMapping,
    pub enable_auto_trading: bool,
    pub price_poll_interval: Duration,
    pub order_fill_timeout: Duration,

    pub risk: RiskLimits,

    // Paper venue
    pub paper_starting_balance: Decimal,
    pub paper_starting_price: Decimal,
    pub paper_slippage_ticks: u32,
    pub paper_realistic_slippage: bool,
    pub paper_commission_per_contract: Decimal,
    pub paper_volatility: Decimal,

    pub notifications: NotificationConfig,
    /// UTC time of day the daily summary goes out
    pub daily_summary_time: NaiveTime,

    pub database_url: String,

    pub performance_window_days: u32,
    pub status_log_interval: Duration,
}

/// Accumulates every problem instead of stopping at the first.
struct Loader<F> {
    lookup: F,
    errors: Vec<FieldError>,
}

impl<F: Fn(&str) -> Option<String>> Loader<F> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn fail(&mut self, key: &'static str, reason: impl Into<String>) {
        self.errors.push(FieldError {
            key,
            reason: reason.into(),
        });
    }

    fn required(&mut self, key: &'static str) -> String {
        match self.raw(key) {
            Some(value) => value,
            None => {
                self.fail(key, "required but not set");
                String::new()
            }
        }
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.raw(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&mut self, key: &'static str, default: T) -> T
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.raw(key) {
            None => default,
            Some(value) => match value.parse() {
                Ok(parsed) => parsed,
                Err(e) => {
                    self.fail(key, format!("{:?}: {}", value, e));
                    default
                }
            },
        }
    }

    fn flag(&mut self, key: &'static str, default: bool) -> bool {
        match self.raw(key).map(|v| v.to_lowercase()) {
            None => default,
            Some(v) => match v.as_str() {
                "true" | "1" | "yes" | "on" => true,
                "false" | "0" | "no" | "off" => false,
                _ => {
                    self.fail(key, format!("{:?} is not a boolean", v));
                    default
                }
            },
        }
    }

    fn positive_decimal(&mut self, key: &'static str, default: Decimal) -> Decimal {
        let value = self.parse(key, default);
        if value <= Decimal::ZERO {
            self.fail(key, "must be greater than zero");
        }
        value
    }

    fn positive_u32(&mut self, key: &'static str, default: u32) -> u32 {
        let value = self.parse(key, default);
        if value == 0 {
            self.fail(key, "must be greater than zero");
        }
        value
    }

    fn seconds(&mut self, key: &'static str, default: u64) -> Duration {
        let value: u64 = self.parse(key, default);
        if value == 0 {
            self.fail(key, "must be at least 1 second");
        }
        Duration::from_secs(value.max(1))
    }
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut env = Loader {
            lookup,
            errors: Vec::new(),
        };

        let discord_token = env.required("DISCORD_TOKEN");
        let channel = env.required("DISCORD_CHANNEL_ID");
        let discord_channel_id = if channel.is_empty() {
            0
        } else {
            match channel.parse::<u64>() {
                Ok(id) if id > 0 => id,
                _ => {
                    env.fail("DISCORD_CHANNEL_ID", format!("{:?} is not a channel id", channel));
                    0
                }
            }
        };
        let discord_target_authors: Vec<String> = env
            .required("DISCORD_TARGET_AUTHORS")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if discord_target_authors.is_empty() && env.raw("DISCORD_TARGET_AUTHORS").is_some() {
            env.fail("DISCORD_TARGET_AUTHORS", "no author names given");
        }

        let size_mapping = match env.raw("SIZE_MAPPING") {
            None => SizeMapping::default(),
            Some(value) => value.parse().unwrap_or_else(|e| {
                env.fail("SIZE_MAPPING", format!("{:?}: {}", value, e));
                SizeMapping::default()
            }),
        };

        let daily_summary_time = match env.raw("DAILY_SUMMARY_TIME") {
            None => NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
            Some(value) => NaiveTime::parse_from_str(&value, "%H:%M").unwrap_or_else(|_| {
                env.fail("DAILY_SUMMARY_TIME", format!("{:?} is not HH:MM", value));
                NaiveTime::default()
            }),
        };

        let risk = RiskLimits {
            max_daily_trades: env.positive_u32("MAX_DAILY_TRADES", 10),
            max_position_size: env.positive_u32("MAX_POSITION_SIZE", 5),
            min_account_balance: env.parse("MIN_ACCOUNT_BALANCE", Decimal::from(1_000)),
            daily_loss_limit: env.positive_decimal("DAILY_LOSS_LIMIT", Decimal::from(500)),
            max_consecutive_losses: env.positive_u32("MAX_CONSECUTIVE_LOSSES", 3),
            enable_circuit_breaker: env.flag("ENABLE_CIRCUIT_BREAKER", true),
        };

        let notifications = NotificationConfig {
            smtp_host: env.raw("SMTP_HOST"),
            smtp_port: env.parse("SMTP_PORT", 587),
            smtp_username: env.raw("SMTP_USERNAME"),
            smtp_password: env.raw("SMTP_PASSWORD"),
            smtp_from: env.raw("SMTP_FROM_ADDRESS"),
            smtp_to: env
                .string("NOTIFICATION_EMAIL_TO", "")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            smtp_tls: env.parse("SMTP_TLS", SmtpTls::StartTls),
            toggles: NotificationToggles {
                alert_confirmations: env.flag("EMAIL_ALERT_CONFIRMATIONS", true),
                trade_executions: env.flag("EMAIL_TRADE_EXECUTIONS", true),
                daily_summaries: env.flag("EMAIL_DAILY_SUMMARIES", true),
                system_errors: env.flag("EMAIL_SYSTEM_ERRORS", true),
            },
            ..NotificationConfig::default()
        };
        if notifications.smtp_port == 0 {
            env.fail("SMTP_PORT", "must be greater than zero");
        }

        let config = Self {
            discord_token,
            discord_channel_id,
            discord_target_authors,

            trading_symbol: env.string("TRADING_SYMBOL", "MES"),
            contract_name: env.string("CONTRACT_NAME", "Micro E-mini S&P 500"),
            alert_instrument: env.string("ALERT_INSTRUMENT", "ES"),
            tick_size: env.positive_decimal("TICK_SIZE", Decimal::new(25, 2)),
            tick_value: env.positive_decimal("TICK_VALUE", Decimal::new(125, 2)),
            size_mapping,
            enable_auto_trading: env.flag("ENABLE_AUTO_TRADING", false),
            price_poll_interval: env.seconds("PRICE_POLL_INTERVAL_SECS", 5),
            order_fill_timeout: env.seconds("ORDER_FILL_TIMEOUT_SECS", 30),

            risk,

            paper_starting_balance: env.positive_decimal("PAPER_STARTING_BALANCE", Decimal::from(50_000)),
            paper_starting_price: env.positive_decimal("PAPER_STARTING_PRICE", Decimal::from(6_300)),
            paper_slippage_ticks: env.parse("PAPER_SLIPPAGE_TICKS", 1),
            paper_realistic_slippage: env.flag("PAPER_REALISTIC_SLIPPAGE", true),
            paper_commission_per_contract: env.parse("PAPER_COMMISSION_PER_CONTRACT", Decimal::new(250, 2)),
            paper_volatility: env.parse("PAPER_VOLATILITY", Decimal::from(2)),

            notifications,
            daily_summary_time,

            database_url: env.string("DATABASE_URL", "sqlite:data/trading_data.db"),

            performance_window_days: env.positive_u32("PERFORMANCE_WINDOW_DAYS", 30),
            status_log_interval: env.seconds("STATUS_LOG_INTERVAL_SECS", 300),
        };

        if config.paper_commission_per_contract < Decimal::ZERO {
            env.fail("PAPER_COMMISSION_PER_CONTRACT", "must not be negative");
        }

        if env.errors.is_empty() {
            Ok(config)
        } else {
            Err(ConfigError::Invalid(env.errors))
        }
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            symbol: self.trading_symbol.clone(),
            tick_value: self.tick_value,
            size_mapping: self.size_mapping,
            enable_auto_trading: self.enable_auto_trading,
            poll_interval: self.price_poll_interval,
            fill_timeout: self.order_fill_timeout,
            ..ExecutorConfig::default()
        }
    }

    /// The simulated market wanders up to 5% either side of the starting price.
    pub fn paper_config(&self) -> PaperBrokerConfig {
        let band = self.paper_starting_price * Decimal::new(5, 2);
        PaperBrokerConfig {
            symbol: self.trading_symbol.clone(),
            starting_balance: self.paper_starting_balance,
            starting_price: self.paper_starting_price,
            tick_size: self.tick_size,
            tick_value: self.tick_value,
            slippage_ticks: self.paper_slippage_ticks,
            realistic_slippage: self.paper_realistic_slippage,
            commission_per_contract: self.paper_commission_per_contract,
            volatility: self.paper_volatility,
            price_floor: self.paper_starting_price - band,
            price_ceiling: self.paper_starting_price + band,
            ..PaperBrokerConfig::default()
        }
    }

    pub fn monitor_filter(&self) -> MonitorFilter {
        MonitorFilter {
            channel_id: self.discord_channel_id,
            target_authors: self.discord_target_authors.clone(),
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("Configuration loaded:");
        tracing::info!("  Channel: {}", self.discord_channel_id);
        tracing::info!("  Authors: {}", self.discord_target_authors.join(", "));
        tracing::info!(
            "  Contract: {} ({}) from {} alerts",
            self.trading_symbol,
            self.contract_name,
            self.alert_instrument
        );
        tracing::info!(
            "  Sizes: A={} B={} C={}",
            self.size_mapping.a,
            self.size_mapping.b,
            self.size_mapping.c
        );
        tracing::info!("  Auto trading: {}", self.enable_auto_trading);
        tracing::info!(
            "  Risk: {} trades/day, {} contracts max, ${} daily loss limit, breaker {}",
            self.risk.max_daily_trades,
            self.risk.max_position_size,
            self.risk.daily_loss_limit,
            if self.risk.enable_circuit_breaker { "on" } else { "off" }
        );
        tracing::info!(
            "  Paper account: ${} starting at {}",
            self.paper_starting_balance,
            self.paper_starting_price
        );
        tracing::info!(
            "  Email: {} (daily summary {} UTC)",
            if self.notifications.email_enabled() { "enabled" } else { "disabled" },
            self.daily_summary_time.format("%H:%M")
        );
        tracing::info!("  Database: {}", self.database_url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AgentConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AgentConfig::from_lookup(|key| vars.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("DISCORD_TOKEN", "token"),
        ("DISCORD_CHANNEL_ID", "1234567890"),
        ("DISCORD_TARGET_AUTHORS", "TraderJoe, Alice"),
    ];

    fn errors(result: Result<AgentConfig, ConfigError>) -> Vec<FieldError> {
        match result {
            Err(ConfigError::Invalid(errors)) => errors,
            Ok(_) => panic!("expected invalid configuration"),
        }
    }

    #[test]
    fn test_defaults() {
        let config = load(&REQUIRED).unwrap();
        assert_eq!(config.discord_channel_id, 1234567890);
        assert_eq!(config.discord_target_authors, vec!["TraderJoe", "Alice"]);
        assert_eq!(config.trading_symbol, "MES");
        assert_eq!(config.alert_instrument, "ES");
        assert_eq!(config.tick_value, dec!(1.25));
        assert_eq!(config.size_mapping, SizeMapping::default());
        assert!(!config.enable_auto_trading);
        assert_eq!(config.price_poll_interval, Duration::from_secs(5));
        assert_eq!(config.risk.max_daily_trades, 10);
        assert_eq!(config.risk.daily_loss_limit, dec!(500));
        assert_eq!(config.paper_commission_per_contract, dec!(2.50));
        assert_eq!(config.daily_summary_time, NaiveTime::from_hms_opt(17, 0, 0).unwrap());
        assert_eq!(config.database_url, "sqlite:data/trading_data.db");
        assert!(!config.notifications.email_enabled());

        let executor = config.executor_config();
        assert_eq!(executor.symbol, "MES");
        assert_eq!(executor.fill_timeout, Duration::from_secs(30));

        let paper = config.paper_config();
        assert_eq!(paper.price_floor, dec!(5985));
        assert_eq!(paper.price_ceiling, dec!(6615));
    }

    #[test]
    fn test_missing_required_reported_together() {
        let errors = errors(load(&[]));
        let keys: Vec<&str> = errors.iter().map(|e| e.key).collect();
        assert_eq!(
            keys,
            vec!["DISCORD_TOKEN", "DISCORD_CHANNEL_ID", "DISCORD_TARGET_AUTHORS"]
        );
    }

    #[test]
    fn test_invalid_values_collected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("TICK_VALUE", "abc"),
            ("SIZE_MAPPING", "A:1,B:2"),
            ("ENABLE_AUTO_TRADING", "maybe"),
            ("DAILY_SUMMARY_TIME", "5pm"),
            ("PRICE_POLL_INTERVAL_SECS", "0"),
        ]);

        let errors = errors(load(&pairs));
        let keys: Vec<&str> = errors.iter().map(|e| e.key).collect();
        assert_eq!(errors.len(), 5);
        assert!(keys.contains(&"TICK_VALUE"));
        assert!(keys.contains(&"SIZE_MAPPING"));
        assert!(keys.contains(&"ENABLE_AUTO_TRADING"));
        assert!(keys.contains(&"DAILY_SUMMARY_TIME"));
        assert!(keys.contains(&"PRICE_POLL_INTERVAL_SECS"));

        let message = ConfigError::Invalid(errors).to_string();
        assert!(message.contains("5 problem(s)"));
    }

    #[test]
    fn test_bad_channel_id() {
        let errors = errors(load(&[
            ("DISCORD_TOKEN", "token"),
            ("DISCORD_CHANNEL_ID", "general"),
            ("DISCORD_TARGET_AUTHORS", " , "),
        ]));
        let keys: Vec<&str> = errors.iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["DISCORD_CHANNEL_ID", "DISCORD_TARGET_AUTHORS"]);
    }

    #[test]
    fn test_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("TRADING_SYMBOL", "ES"),
            ("TICK_VALUE", "12.50"),
            ("SIZE_MAPPING", "A:2, B:4, C:6"),
            ("ENABLE_AUTO_TRADING", "true"),
            ("MAX_CONSECUTIVE_LOSSES", "2"),
            ("ENABLE_CIRCUIT_BREAKER", "no"),
            ("DAILY_SUMMARY_TIME", "21:30"),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_FROM_ADDRESS", "agent@example.com"),
            ("NOTIFICATION_EMAIL_TO", "me@example.com, desk@example.com,"),
            ("SMTP_PORT", "465"),
            ("SMTP_TLS", "TLS"),
            ("EMAIL_DAILY_SUMMARIES", "off"),
        ]);

        let config = load(&pairs).unwrap();
        assert_eq!(config.trading_symbol, "ES");
        assert_eq!(config.tick_value, dec!(12.50));
        assert_eq!(config.size_mapping.quantity_for(alert_core::SizeCode::C), 6);
        assert!(config.enable_auto_trading);
        assert_eq!(config.risk.max_consecutive_losses, 2);
        assert!(!config.risk.enable_circuit_breaker);
        assert_eq!(config.daily_summary_time, NaiveTime::from_hms_opt(21, 30, 0).unwrap());
        assert!(config.notifications.email_enabled());
        assert_eq!(config.notifications.smtp_to.len(), 2);
        assert_eq!(config.notifications.smtp_port, 465);
        assert_eq!(config.notifications.smtp_tls, SmtpTls::Tls);
        assert!(!config.notifications.toggles.daily_summaries);
        assert!(config.notifications.toggles.trade_executions);
    }

    #[test]
    fn test_invalid_email_settings_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("SMTP_PORT", "abc"),
            ("SMTP_TLS", "sslv9"),
            ("EMAIL_DAILY_SUMMARIES", "maybe"),
        ]);

        let problems = errors(load(&pairs));
        let keys: Vec<&str> = problems.iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["SMTP_PORT", "SMTP_TLS", "EMAIL_DAILY_SUMMARIES"]);
        assert!(problems[1].reason.contains("sslv9"));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("SMTP_PORT", "0"));
        let problems = errors(load(&pairs));
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].key, "SMTP_PORT");
    }
}
