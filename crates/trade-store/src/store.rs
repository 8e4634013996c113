use alert_core::{MessageMetadata, ParsedAlert, Position, TradeLevels, TradeStatus};
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, TimeZone, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::error::StoreError;
use crate::models::{
    AlertInsert, ClosedTrade, FillLeg, PerformanceRecord, StoredAlert, StoredSystemEvent,
    SystemEvent, SystemStats,
};

/// Durable record of alerts, trades, daily performance and system events.
#[derive(Clone)]
pub struct TradeStore {
    pool: SqlitePool,
}

impl TradeStore {
    /// Open (creating if needed) the database at `database_url` and apply the schema.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        if let Some(dir) = options
            .get_filename()
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
        {
            std::fs::create_dir_all(dir)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        tracing::info!(database_url, "Trade store ready");
        Ok(store)
    }

    /// Private in-memory database on a single pinned connection.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        // sqlx runs one statement per query
        for stmt in schema_statements(include_str!("../schema.sql")) {
            sqlx::query(&stmt).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // -----------------------------------------------------------------------
    // Alerts
    // -----------------------------------------------------------------------

    pub async fn insert_alert(
        &self,
        metadata: &MessageMetadata,
        parsed: &ParsedAlert,
    ) -> Result<AlertInsert, StoreError> {
        let levels = parsed.levels();
        let status = if parsed.is_valid() { "received" } else { "invalid" };

        let result: Result<(i64,), sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO alerts (
                message_id, author, channel_id, raw_content, received_at, is_valid,
                instrument, price, size, modifier, stop_loss, target_1, target_2,
                error_message, processing_status
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&metadata.message_id)
        .bind(&metadata.author)
        .bind(metadata.channel_id.to_string())
        .bind(&parsed.raw_text)
        .bind(encode_ts(&metadata.timestamp))
        .bind(parsed.is_valid())
        .bind(levels.map(|l| l.instrument.clone()))
        .bind(levels.map(|l| to_f64(l.price)))
        .bind(levels.map(|l| l.size.as_str()))
        .bind(levels.and_then(|l| l.modifier.clone()))
        .bind(levels.map(|l| to_f64(l.stop)))
        .bind(levels.map(|l| to_f64(l.target_1)))
        .bind(levels.map(|l| to_f64(l.target_2)))
        .bind(parsed.error_message())
        .bind(status)
        .fetch_one(&self.pool)
        .await;

        match result.map_err(StoreError::from) {
            Ok((id,)) => Ok(AlertInsert::Inserted(id)),
            Err(e) if e.is_unique_violation() => Ok(AlertInsert::Duplicate),
            Err(e) => Err(e),
        }
    }

    pub async fn get_alert(&self, alert_id: i64) -> Result<Option<StoredAlert>, StoreError> {
        let row: Option<AlertRow> = sqlx::query_as("SELECT * FROM alerts WHERE id = ?")
            .bind(alert_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(AlertRow::into_alert).transpose()
    }

    pub async fn get_recent_alerts(&self, limit: u32) -> Result<Vec<StoredAlert>, StoreError> {
        let rows: Vec<AlertRow> = sqlx::query_as("SELECT * FROM alerts ORDER BY id DESC LIMIT ?")
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(AlertRow::into_alert).collect()
    }

    pub async fn mark_alert_processing(&self, alert_id: i64, status: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE alerts SET processing_status = ? WHERE id = ?")
            .bind(status)
            .bind(alert_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count_valid_alerts_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM alerts WHERE is_valid = 1 AND received_at >= ? AND received_at < ?",
        )
        .bind(encode_ts(&start))
        .bind(encode_ts(&end))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Trades
    // -----------------------------------------------------------------------

    pub async fn insert_trade(&self, position: &Position) -> Result<i64, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO trades (
                alert_id, symbol, size_code, planned_entry_price, entry_price, stop_price,
                target_1_price, target_2_price, full_quantity, current_quantity,
                status, trade_status, realized_pnl, commission, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(position.alert_id)
        .bind(&position.symbol)
        .bind(position.size_code.as_str())
        .bind(to_f64(position.planned_entry_price))
        .bind(to_f64(position.entry_price))
        .bind(to_f64(position.stop_price))
        .bind(to_f64(position.target_1_price))
        .bind(to_f64(position.target_2_price))
        .bind(i64::from(position.full_quantity))
        .bind(i64::from(position.current_quantity))
        .bind(position.status.as_str())
        .bind(position.trade_status.as_str())
        .bind(to_f64(position.realized_pnl))
        .bind(to_f64(position.commission))
        .bind(encode_ts(&position.created_at))
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn update_trade_status(&self, trade_id: i64, status: TradeStatus) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE trades SET trade_status = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(trade_id)
        .execute(&self.pool)
        .await?;
        ensure_updated(result.rows_affected(), trade_id)
    }

    pub async fn update_trade_fill(
        &self,
        trade_id: i64,
        leg: FillLeg,
        price: Decimal,
        filled_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let sql = match leg {
            FillLeg::Entry => "UPDATE trades SET entry_price = ?, entry_fill_time = ?, updated_at = datetime('now') WHERE id = ?",
            FillLeg::Target1 => "UPDATE trades SET target_1_fill_price = ?, target_1_fill_time = ?, updated_at = datetime('now') WHERE id = ?",
            FillLeg::Target2 => "UPDATE trades SET target_2_fill_price = ?, target_2_fill_time = ?, updated_at = datetime('now') WHERE id = ?",
            FillLeg::Stop => "UPDATE trades SET stop_fill_price = ?, stop_fill_time = ?, updated_at = datetime('now') WHERE id = ?",
        };

        let result = sqlx::query(sql)
            .bind(to_f64(price))
            .bind(encode_ts(&filled_at))
            .bind(trade_id)
            .execute(&self.pool)
            .await?;
        ensure_updated(result.rows_affected(), trade_id)
    }

    pub async fn update_trade_pnl(
        &self,
        trade_id: i64,
        realized_pnl: Decimal,
        commission: Decimal,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE trades SET realized_pnl = ?, commission = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(to_f64(realized_pnl))
        .bind(to_f64(commission))
        .bind(trade_id)
        .execute(&self.pool)
        .await?;
        ensure_updated(result.rows_affected(), trade_id)
    }

    /// Write every mutable column of the position snapshot.
    pub async fn save_position(&self, position: &Position) -> Result<(), StoreError> {
        let trade_id = position.trade_id.ok_or_else(|| {
            StoreError::NotFound(format!("position for alert {} has no trade id", position.alert_id))
        })?;

        let result = sqlx::query(
            r#"
            UPDATE trades SET
                entry_price = ?, stop_price = ?, current_quantity = ?, status = ?,
                trade_status = ?, realized_pnl = ?, commission = ?, entry_order_id = ?,
                stop_order_id = ?, entry_fill_time = ?, target_1_fill_price = ?,
                target_1_fill_time = ?, target_2_fill_price = ?, target_2_fill_time = ?,
                stop_fill_price = ?, stop_fill_time = ?, exit_time = ?,
                updated_at = datetime('now')
            WHERE id = ?
            "#,
        )
        .bind(to_f64(position.entry_price))
        .bind(to_f64(position.stop_price))
        .bind(i64::from(position.current_quantity))
        .bind(position.status.as_str())
        .bind(position.trade_status.as_str())
        .bind(to_f64(position.realized_pnl))
        .bind(to_f64(position.commission))
        .bind(&position.entry_order_id)
        .bind(&position.stop_order_id)
        .bind(position.entry_fill_time.as_ref().map(encode_ts))
        .bind(position.target_1_fill_price.map(to_f64))
        .bind(position.target_1_fill_time.as_ref().map(encode_ts))
        .bind(position.target_2_fill_price.map(to_f64))
        .bind(position.target_2_fill_time.as_ref().map(encode_ts))
        .bind(position.stop_fill_price.map(to_f64))
        .bind(position.stop_fill_time.as_ref().map(encode_ts))
        .bind(position.exit_time.as_ref().map(encode_ts))
        .bind(trade_id)
        .execute(&self.pool)
        .await?;

        ensure_updated(result.rows_affected(), trade_id)
    }

    pub async fn get_trade(&self, trade_id: i64) -> Result<Option<Position>, StoreError> {
        let row: Option<TradeRow> = sqlx::query_as("SELECT * FROM trades WHERE id = ?")
            .bind(trade_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TradeRow::into_position).transpose()
    }

    /// Trades whose position has not been closed, oldest first.
    pub async fn get_open_trades(&self) -> Result<Vec<Position>, StoreError> {
        let rows: Vec<TradeRow> = sqlx::query_as(
            r#"
            SELECT * FROM trades
            WHERE status != 'CLOSED'
              AND trade_status IN ('PENDING', 'ENTRY_SUBMITTED', 'ENTRY_FILLED', 'TARGET1_HIT')
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TradeRow::into_position).collect()
    }

    pub async fn closed_trades_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ClosedTrade>, StoreError> {
        let rows: Vec<TradeRow> = sqlx::query_as(
            r#"
            SELECT * FROM trades
            WHERE status = 'CLOSED' AND exit_time >= ? AND exit_time < ?
            ORDER BY exit_time ASC, id ASC
            "#,
        )
        .bind(encode_ts(&start))
        .bind(encode_ts(&end))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| row.into_position().and_then(closed_trade))
            .collect()
    }

    pub async fn closed_trades_on(&self, date: NaiveDate) -> Result<Vec<ClosedTrade>, StoreError> {
        let (start, end) = day_bounds(date);
        self.closed_trades_between(start, end).await
    }

    /// Trades whose entry filled inside the window.
    pub async fn count_executed_trades_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM trades WHERE entry_fill_time >= ? AND entry_fill_time < ?",
        )
        .bind(encode_ts(&start))
        .bind(encode_ts(&end))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Entries submitted on `date`, excluding ones that never reached the venue.
    pub async fn daily_trade_count(&self, date: NaiveDate) -> Result<u32, StoreError> {
        let (start, end) = day_bounds(date);
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM trades
            WHERE created_at >= ? AND created_at < ?
              AND trade_status NOT IN ('PENDING', 'CANCELLED', 'ERROR')
            "#,
        )
        .bind(encode_ts(&start))
        .bind(encode_ts(&end))
        .fetch_one(&self.pool)
        .await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Realized P&L net of commission for trades opened on `date`.
    pub async fn daily_realized_pnl(&self, date: NaiveDate) -> Result<Decimal, StoreError> {
        let (start, end) = day_bounds(date);
        let (pnl,): (f64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(realized_pnl - commission), 0.0) FROM trades
            WHERE created_at >= ? AND created_at < ?
            "#,
        )
        .bind(encode_ts(&start))
        .bind(encode_ts(&end))
        .fetch_one(&self.pool)
        .await?;
        Ok(to_decimal(pnl))
    }

    /// Net P&L of the most recently closed trades, newest first.
    pub async fn recent_closed_pnls(&self, limit: u32) -> Result<Vec<Decimal>, StoreError> {
        let rows: Vec<(f64,)> = sqlx::query_as(
            r#"
            SELECT realized_pnl - commission FROM trades
            WHERE status = 'CLOSED'
            ORDER BY exit_time DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(pnl,)| to_decimal(pnl)).collect())
    }

    // -----------------------------------------------------------------------
    // Performance
    // -----------------------------------------------------------------------

    pub async fn upsert_daily_performance(&self, record: &PerformanceRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO performance (
                date, total_trades, winning_trades, losing_trades, gross_profit, gross_loss,
                net_pnl, commission_paid, win_rate, avg_win, avg_loss, largest_win,
                largest_loss, max_drawdown, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))
            ON CONFLICT(date) DO UPDATE SET
                total_trades = excluded.total_trades,
                winning_trades = excluded.winning_trades,
                losing_trades = excluded.losing_trades,
                gross_profit = excluded.gross_profit,
                gross_loss = excluded.gross_loss,
                net_pnl = excluded.net_pnl,
                commission_paid = excluded.commission_paid,
                win_rate = excluded.win_rate,
                avg_win = excluded.avg_win,
                avg_loss = excluded.avg_loss,
                largest_win = excluded.largest_win,
                largest_loss = excluded.largest_loss,
                max_drawdown = excluded.max_drawdown,
                updated_at = datetime('now')
            "#,
        )
        .bind(record.date.to_string())
        .bind(i64::from(record.total_trades))
        .bind(i64::from(record.winning_trades))
        .bind(i64::from(record.losing_trades))
        .bind(to_f64(record.gross_profit))
        .bind(to_f64(record.gross_loss))
        .bind(to_f64(record.net_pnl))
        .bind(to_f64(record.commission_paid))
        .bind(record.win_rate)
        .bind(to_f64(record.avg_win))
        .bind(to_f64(record.avg_loss))
        .bind(to_f64(record.largest_win))
        .bind(to_f64(record.largest_loss))
        .bind(to_f64(record.max_drawdown))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_daily_summary(&self, date: NaiveDate) -> Result<Option<PerformanceRecord>, StoreError> {
        let row: Option<PerformanceRow> = sqlx::query_as("SELECT * FROM performance WHERE date = ?")
            .bind(date.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(PerformanceRow::into_record).transpose()
    }

    // -----------------------------------------------------------------------
    // System log and agent state
    // -----------------------------------------------------------------------

    pub async fn log_system_event(&self, event: &SystemEvent) -> Result<i64, StoreError> {
        let details = event
            .details
            .as_ref()
            .map(serde_json::Value::to_string);

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO system_log (timestamp, level, component, message, details, alert_id, trade_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(encode_ts(&Utc::now()))
        .bind(event.level.to_string())
        .bind(&event.component)
        .bind(&event.message)
        .bind(details)
        .bind(event.alert_id)
        .bind(event.trade_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    pub async fn get_system_events(&self, limit: u32) -> Result<Vec<StoredSystemEvent>, StoreError> {
        let rows: Vec<(i64, String, String, String, String, Option<String>, Option<i64>, Option<i64>)> =
            sqlx::query_as(
                r#"
                SELECT id, timestamp, level, component, message, details, alert_id, trade_id
                FROM system_log ORDER BY id DESC LIMIT ?
                "#,
            )
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|(id, timestamp, level, component, message, details, alert_id, trade_id)| {
                Ok(StoredSystemEvent {
                    id,
                    timestamp: decode_ts(&timestamp)?,
                    level,
                    component,
                    message,
                    details,
                    alert_id,
                    trade_id,
                })
            })
            .collect()
    }

    pub async fn get_system_stats(&self) -> Result<SystemStats, StoreError> {
        let (total_alerts, valid_alerts, last_alert_at): (i64, i64, Option<String>) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(is_valid), 0), MAX(received_at) FROM alerts",
        )
        .fetch_one(&self.pool)
        .await?;

        let (total_trades, open_trades, closed_trades, total_realized_pnl): (i64, i64, i64, f64) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    COALESCE(SUM(CASE WHEN status != 'CLOSED'
                        AND trade_status IN ('ENTRY_SUBMITTED', 'ENTRY_FILLED', 'TARGET1_HIT') THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'CLOSED' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(realized_pnl - commission), 0.0)
                FROM trades
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(SystemStats {
            total_alerts,
            valid_alerts,
            total_trades,
            open_trades,
            closed_trades,
            total_realized_pnl: to_decimal(total_realized_pnl),
            last_alert_at: last_alert_at.as_deref().map(decode_ts).transpose()?,
        })
    }

    pub async fn save_state(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO agent_state (key, value, updated_at) VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_state(&self, key: &str) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM agent_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: i64,
    message_id: String,
    author: String,
    channel_id: String,
    raw_content: String,
    received_at: String,
    is_valid: bool,
    instrument: Option<String>,
    price: Option<f64>,
    size: Option<String>,
    modifier: Option<String>,
    stop_loss: Option<f64>,
    target_1: Option<f64>,
    target_2: Option<f64>,
    error_message: Option<String>,
    processing_status: String,
}

impl AlertRow {
    fn into_alert(self) -> Result<StoredAlert, StoreError> {
        let levels = match (self.is_valid, self.instrument, self.price, self.size, self.stop_loss) {
            (true, Some(instrument), Some(price), Some(size), Some(stop)) => {
                let price = to_decimal(price);
                let mut levels = TradeLevels::new(
                    instrument,
                    price,
                    size.parse()
                        .map_err(|_| StoreError::Corrupt(format!("alert {}: size {}", self.id, size)))?,
                    self.modifier,
                    to_decimal(stop),
                );
                if let Some(t1) = self.target_1 {
                    levels.target_1 = to_decimal(t1);
                }
                if let Some(t2) = self.target_2 {
                    levels.target_2 = to_decimal(t2);
                }
                Some(levels)
            }
            (true, ..) => {
                return Err(StoreError::Corrupt(format!(
                    "alert {} is valid but missing levels",
                    self.id
                )))
            }
            _ => None,
        };

        Ok(StoredAlert {
            id: self.id,
            channel_id: self.channel_id.parse().map_err(|_| {
                StoreError::Corrupt(format!("alert {}: channel id {}", self.id, self.channel_id))
            })?,
            message_id: self.message_id,
            author: self.author,
            raw_content: self.raw_content,
            received_at: decode_ts(&self.received_at)?,
            is_valid: self.is_valid,
            levels,
            error_message: self.error_message,
            processing_status: self.processing_status,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TradeRow {
    id: i64,
    alert_id: i64,
    symbol: String,
    size_code: String,
    planned_entry_price: f64,
    entry_price: f64,
    stop_price: f64,
    target_1_price: f64,
    target_2_price: f64,
    full_quantity: i64,
    current_quantity: i64,
    status: String,
    trade_status: String,
    realized_pnl: f64,
    commission: f64,
    entry_order_id: Option<String>,
    stop_order_id: Option<String>,
    entry_fill_time: Option<String>,
    target_1_fill_price: Option<f64>,
    target_1_fill_time: Option<String>,
    target_2_fill_price: Option<f64>,
    target_2_fill_time: Option<String>,
    stop_fill_price: Option<f64>,
    stop_fill_time: Option<String>,
    exit_time: Option<String>,
    created_at: String,
}

impl TradeRow {
    fn into_position(self) -> Result<Position, StoreError> {
        let id = self.id;
        let corrupt = |what: &str| StoreError::Corrupt(format!("trade {}: {}", id, what));

        Ok(Position {
            trade_id: Some(id),
            alert_id: self.alert_id,
            size_code: self
                .size_code
                .parse()
                .map_err(|_| corrupt("size code"))?,
            symbol: self.symbol,
            planned_entry_price: to_decimal(self.planned_entry_price),
            entry_price: to_decimal(self.entry_price),
            stop_price: to_decimal(self.stop_price),
            target_1_price: to_decimal(self.target_1_price),
            target_2_price: to_decimal(self.target_2_price),
            full_quantity: u32::try_from(self.full_quantity).map_err(|_| corrupt("full quantity"))?,
            current_quantity: u32::try_from(self.current_quantity)
                .map_err(|_| corrupt("current quantity"))?,
            status: self.status.parse().map_err(|e: String| corrupt(&e))?,
            trade_status: self.trade_status.parse().map_err(|e: String| corrupt(&e))?,
            realized_pnl: to_decimal(self.realized_pnl),
            commission: to_decimal(self.commission),
            entry_order_id: self.entry_order_id,
            stop_order_id: self.stop_order_id,
            entry_fill_time: decode_opt_ts(self.entry_fill_time)?,
            target_1_fill_price: self.target_1_fill_price.map(to_decimal),
            target_1_fill_time: decode_opt_ts(self.target_1_fill_time)?,
            target_2_fill_price: self.target_2_fill_price.map(to_decimal),
            target_2_fill_time: decode_opt_ts(self.target_2_fill_time)?,
            stop_fill_price: self.stop_fill_price.map(to_decimal),
            stop_fill_time: decode_opt_ts(self.stop_fill_time)?,
            exit_time: decode_opt_ts(self.exit_time)?,
            created_at: decode_ts(&self.created_at)?,
        })
    }
}

fn closed_trade(position: Position) -> Result<ClosedTrade, StoreError> {
    let trade_id = position.trade_id.unwrap_or_default();
    let exit_time = position
        .exit_time
        .ok_or_else(|| StoreError::Corrupt(format!("closed trade {} has no exit time", trade_id)))?;

    Ok(ClosedTrade {
        trade_id,
        alert_id: position.alert_id,
        size_code: position.size_code,
        planned_entry_price: position.planned_entry_price,
        entry_price: position.entry_price,
        quantity: position.full_quantity,
        realized_pnl: position.realized_pnl,
        commission: position.commission,
        entry_time: position.entry_fill_time,
        exit_time,
        exit_status: position.trade_status,
    })
}

#[derive(sqlx::FromRow)]
struct PerformanceRow {
    date: String,
    total_trades: i64,
    winning_trades: i64,
    losing_trades: i64,
    gross_profit: f64,
    gross_loss: f64,
    net_pnl: f64,
    commission_paid: f64,
    win_rate: f64,
    avg_win: f64,
    avg_loss: f64,
    largest_win: f64,
    largest_loss: f64,
    max_drawdown: f64,
}

impl PerformanceRow {
    fn into_record(self) -> Result<PerformanceRecord, StoreError> {
        let count = |v: i64| u32::try_from(v).unwrap_or_default();
        Ok(PerformanceRecord {
            date: self
                .date
                .parse()
                .map_err(|_| StoreError::Corrupt(format!("performance date {}", self.date)))?,
            total_trades: count(self.total_trades),
            winning_trades: count(self.winning_trades),
            losing_trades: count(self.losing_trades),
            gross_profit: to_decimal(self.gross_profit),
            gross_loss: to_decimal(self.gross_loss),
            net_pnl: to_decimal(self.net_pnl),
            commission_paid: to_decimal(self.commission_paid),
            win_rate: self.win_rate,
            avg_win: to_decimal(self.avg_win),
            avg_loss: to_decimal(self.avg_loss),
            largest_win: to_decimal(self.largest_win),
            largest_loss: to_decimal(self.largest_loss),
            max_drawdown: to_decimal(self.max_drawdown),
        })
    }
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

/// Split a schema script into statements. `--` comment lines are dropped
/// first so punctuation inside them cannot end a statement.
pub(crate) fn schema_statements(script: &str) -> Vec<String> {
    let code: String = script
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    code.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fixed-width UTC timestamps so text comparison orders chronologically.
fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {}: {}", raw, e)))
}

fn decode_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.as_deref().map(decode_ts).transpose()
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(6).normalize())
        .unwrap_or_default()
}

pub(crate) fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&date.and_time(NaiveTime::default()));
    (start, start + chrono::Duration::days(1))
}

fn ensure_updated(rows_affected: u64, trade_id: i64) -> Result<(), StoreError> {
    if rows_affected == 0 {
        Err(StoreError::NotFound(format!("trade {}", trade_id)))
    } else {
        Ok(())
    }
}
