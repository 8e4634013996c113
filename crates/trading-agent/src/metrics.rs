use alert_core::{PositionEvent, PositionEventKind};
use position_manager::ExecutionOutcome;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};

const RECENT_WINDOW: usize = 20;

/// Running counters for the agent, persisted across restarts.
#[derive(Debug, Default)]
pub struct AgentMetrics {
    pub alerts_handled: u64,
    pub trades_executed: u64,
    pub trades_skipped: u64,
    pub trades_failed: u64,
    pub alerts_not_traded: u64,
    pub target1_hits: u64,
    pub target2_hits: u64,
    pub stop_outs: u64,
    pub total_pnl: Decimal,
    pub winning_trades: u64,
    pub losing_trades: u64,

    // Rolling window of closed positions
    recent_trades: VecDeque<Decimal>,
}

impl AgentMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_outcome(&mut self, outcome: &ExecutionOutcome) {
        self.alerts_handled += 1;
        match outcome {
            ExecutionOutcome::Executed { .. } => self.trades_executed += 1,
            ExecutionOutcome::Skipped(_) => self.trades_skipped += 1,
            ExecutionOutcome::Disabled => self.alerts_not_traded += 1,
            ExecutionOutcome::Failed(_) => self.trades_failed += 1,
        }
    }

    pub fn record_event(&mut self, event: &PositionEvent) {
        match event.kind {
            PositionEventKind::Target1Hit => self.target1_hits += 1,
            PositionEventKind::Target2Hit => self.target2_hits += 1,
            PositionEventKind::StoppedOut => self.stop_outs += 1,
            PositionEventKind::EntrySubmitted | PositionEventKind::EntryFilled => {}
        }

        if event.kind.is_closing(&event.position) {
            self.record_trade_result(event.position.realized_pnl - event.position.commission);
        }
    }

    /// Breakeven closes count toward P&L but not toward either side.
    pub fn record_trade_result(&mut self, net_pnl: Decimal) {
        self.total_pnl += net_pnl;
        if net_pnl > Decimal::ZERO {
            self.winning_trades += 1;
        } else if net_pnl < Decimal::ZERO {
            self.losing_trades += 1;
        }

        self.recent_trades.push_back(net_pnl);
        if self.recent_trades.len() > RECENT_WINDOW {
            self.recent_trades.pop_front();
        }
    }

    /// Win rate over the last 20 closed positions (0-100%)
    pub fn recent_win_rate(&self) -> f64 {
        if self.recent_trades.is_empty() {
            return 0.0;
        }
        let wins = self.recent_trades.iter().filter(|p| **p > Decimal::ZERO).count() as f64;
        (wins / self.recent_trades.len() as f64) * 100.0
    }

    pub fn recent_avg_pnl(&self) -> Decimal {
        if self.recent_trades.is_empty() {
            return Decimal::ZERO;
        }
        self.recent_trades.iter().sum::<Decimal>() / Decimal::from(self.recent_trades.len())
    }

    pub fn overall_win_rate(&self) -> f64 {
        let total = self.winning_trades + self.losing_trades;
        if total == 0 {
            return 0.0;
        }
        (self.winning_trades as f64 / total as f64) * 100.0
    }

    pub fn log_metrics(&self) {
        tracing::info!(
            alerts_handled = self.alerts_handled,
            trades_executed = self.trades_executed,
            trades_skipped = self.trades_skipped,
            trades_failed = self.trades_failed,
            alerts_not_traded = self.alerts_not_traded,
            target1_hits = self.target1_hits,
            target2_hits = self.target2_hits,
            stop_outs = self.stop_outs,
            total_pnl = %self.total_pnl.round_dp(2),
            overall_win_rate = self.overall_win_rate(),
            recent_win_rate = self.recent_win_rate(),
            recent_avg_pnl = %self.recent_avg_pnl().round_dp(2),
            "Agent metrics summary"
        );
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "alerts_handled": self.alerts_handled,
            "trades_executed": self.trades_executed,
            "trades_skipped": self.trades_skipped,
            "trades_failed": self.trades_failed,
            "alerts_not_traded": self.alerts_not_traded,
            "target1_hits": self.target1_hits,
            "target2_hits": self.target2_hits,
            "stop_outs": self.stop_outs,
            "total_pnl": self.total_pnl.to_string(),
            "winning_trades": self.winning_trades,
            "losing_trades": self.losing_trades,
        })
    }

    /// Restore counters from persisted JSON. Unknown or missing keys keep
    /// their current value; the rolling window starts empty.
    pub fn restore_from_json(&mut self, json: &serde_json::Value) {
        let counters: [(&str, &mut u64); 10] = [
            ("alerts_handled", &mut self.alerts_handled),
            ("trades_executed", &mut self.trades_executed),
            ("trades_skipped", &mut self.trades_skipped),
            ("trades_failed", &mut self.trades_failed),
            ("alerts_not_traded", &mut self.alerts_not_traded),
            ("target1_hits", &mut self.target1_hits),
            ("target2_hits", &mut self.target2_hits),
            ("stop_outs", &mut self.stop_outs),
            ("winning_trades", &mut self.winning_trades),
            ("losing_trades", &mut self.losing_trades),
        ];
        for (key, slot) in counters {
            if let Some(v) = json.get(key).and_then(|v| v.as_u64()) {
                *slot = v;
            }
        }
        if let Some(v) = json
            .get("total_pnl")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
        {
            self.total_pnl = v;
        }
        tracing::info!(
            alerts = self.alerts_handled,
            trades = self.trades_executed,
            "Restored metrics from persisted state"
        );
    }
}

/// Keep the counters current from the executor's event stream.
pub async fn run_metrics_relay(
    metrics: Arc<Mutex<AgentMetrics>>,
    mut events: broadcast::Receiver<PositionEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => metrics.lock().await.record_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Metrics relay lagged; some events not counted");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = shutdown.changed() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_core::{AlertParser, Position};
    use chrono::Utc;
    use risk_manager::RiskCheck;
    use rust_decimal_macros::dec;

    fn closed_position(pnl: Decimal) -> Position {
        let levels = AlertParser::default()
            .parse("🚨 ES long 6326: A\nStop: 6316")
            .result
            .unwrap();
        let mut position = Position::new(1, "MES", &levels, 1);
        position.apply_entry_fill(dec!(6326), Utc::now(), Decimal::ZERO);
        let exit = dec!(6326) + pnl / dec!(1.25);
        position.apply_stop(exit, Utc::now(), dec!(1.25), Decimal::ZERO);
        position
    }

    #[test]
    fn test_outcomes_counted() {
        let mut metrics = AgentMetrics::new();
        metrics.record_outcome(&ExecutionOutcome::Executed {
            trade_id: 1,
            quantity: 2,
            fill_price: dec!(6326),
        });
        metrics.record_outcome(&ExecutionOutcome::Skipped(RiskCheck {
            can_trade: false,
            reason: "Daily trade limit reached".to_string(),
            breaker: None,
            suggested_action: None,
        }));
        metrics.record_outcome(&ExecutionOutcome::Failed("venue down".to_string()));
        metrics.record_outcome(&ExecutionOutcome::Disabled);

        assert_eq!(metrics.alerts_handled, 4);
        assert_eq!(metrics.trades_executed, 1);
        assert_eq!(metrics.trades_skipped, 1);
        assert_eq!(metrics.trades_failed, 1);
        assert_eq!(metrics.alerts_not_traded, 1);
    }

    #[test]
    fn test_closing_events_update_pnl() {
        let mut metrics = AgentMetrics::new();
        for pnl in [dec!(-12.5), dec!(25), Decimal::ZERO] {
            let position = closed_position(pnl);
            metrics.record_event(&PositionEvent {
                kind: PositionEventKind::StoppedOut,
                price: position.stop_fill_price.unwrap_or_default(),
                leg_quantity: 1,
                leg_pnl: position.realized_pnl,
                timestamp: Utc::now(),
                position,
            });
        }

        assert_eq!(metrics.stop_outs, 3);
        assert_eq!(metrics.winning_trades, 1);
        assert_eq!(metrics.losing_trades, 1);
        assert_eq!(metrics.total_pnl, dec!(12.5));
        assert!((metrics.overall_win_rate() - 50.0).abs() < 1e-9);
        assert!((metrics.recent_win_rate() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_restore_from_json() {
        let mut metrics = AgentMetrics::new();
        metrics.record_outcome(&ExecutionOutcome::Disabled);
        metrics.record_trade_result(dec!(8.75));

        let mut restored = AgentMetrics::new();
        restored.restore_from_json(&metrics.to_json());
        assert_eq!(restored.alerts_handled, 1);
        assert_eq!(restored.winning_trades, 1);
        assert_eq!(restored.total_pnl, dec!(8.75));
        assert_eq!(restored.recent_avg_pnl(), Decimal::ZERO);
    }
}
