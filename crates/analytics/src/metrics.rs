use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use trade_store::{ClosedTrade, PerformanceRecord};

use crate::models::PerformanceMetrics;

/// Aggregates closed trades, which must be ordered by exit time.
/// P&L figures are net of commission.
pub fn compute_metrics(
    trades: &[ClosedTrade],
    total_alerts: u64,
    executed_trades: u64,
) -> PerformanceMetrics {
    let execution_rate = if total_alerts == 0 {
        0.0
    } else {
        executed_trades as f64 / total_alerts as f64 * 100.0
    };

    let mut metrics = PerformanceMetrics {
        total_alerts,
        executed_trades,
        execution_rate,
        ..Default::default()
    };

    if trades.is_empty() {
        return metrics;
    }

    let pnls: Vec<Decimal> = trades.iter().map(ClosedTrade::net_pnl).collect();

    for pnl in &pnls {
        if *pnl > Decimal::ZERO {
            metrics.winning_trades += 1;
            metrics.gross_profit += *pnl;
            metrics.largest_win = metrics.largest_win.max(*pnl);
        } else if *pnl < Decimal::ZERO {
            metrics.losing_trades += 1;
            metrics.gross_loss += *pnl;
            metrics.largest_loss = metrics.largest_loss.min(*pnl);
        } else {
            metrics.breakeven_trades += 1;
        }
    }

    metrics.total_trades = pnls.len() as u32;
    metrics.total_pnl = pnls.iter().copied().sum();
    metrics.total_commission = trades.iter().map(|t| t.commission).sum();
    metrics.win_rate = metrics.winning_trades as f64 / metrics.total_trades as f64 * 100.0;

    if metrics.winning_trades > 0 {
        metrics.avg_win = metrics.gross_profit / Decimal::from(metrics.winning_trades);
    }
    if metrics.losing_trades > 0 {
        metrics.avg_loss = metrics.gross_loss / Decimal::from(metrics.losing_trades);
        metrics.profit_factor = (metrics.gross_profit / metrics.gross_loss.abs())
            .to_f64()
            .unwrap_or(0.0);
    }

    metrics.sharpe_ratio = sharpe_ratio(&pnls);
    metrics.max_drawdown = max_drawdown(&pnls);

    let streaks = streaks(&pnls);
    metrics.max_win_streak = streaks.max_win;
    metrics.max_loss_streak = streaks.max_loss;
    metrics.current_streak = streaks.current;

    let durations: Vec<f64> = trades
        .iter()
        .filter_map(|t| t.entry_time.map(|entry| (t.exit_time - entry).num_seconds() as f64 / 60.0))
        .collect();
    if !durations.is_empty() {
        metrics.avg_duration_minutes = durations.iter().sum::<f64>() / durations.len() as f64;
    }

    let slippage: Decimal = trades
        .iter()
        .map(|t| t.entry_price - t.planned_entry_price)
        .sum();
    metrics.avg_entry_slippage = slippage / Decimal::from(metrics.total_trades);

    metrics
}

/// Daily aggregate row for `date` from that day's closed trades.
pub fn daily_record(date: NaiveDate, trades: &[ClosedTrade]) -> PerformanceRecord {
    let metrics = compute_metrics(trades, 0, 0);
    PerformanceRecord {
        date,
        total_trades: metrics.total_trades,
        winning_trades: metrics.winning_trades,
        losing_trades: metrics.losing_trades,
        gross_profit: metrics.gross_profit,
        gross_loss: metrics.gross_loss,
        net_pnl: metrics.total_pnl,
        commission_paid: metrics.total_commission,
        win_rate: metrics.win_rate,
        avg_win: metrics.avg_win,
        avg_loss: metrics.avg_loss,
        largest_win: metrics.largest_win,
        largest_loss: metrics.largest_loss,
        max_drawdown: metrics.max_drawdown,
    }
}

/// Largest peak-to-trough decline of cumulative P&L starting from zero.
fn max_drawdown(pnls: &[Decimal]) -> Decimal {
    let mut cumulative = Decimal::ZERO;
    let mut peak = Decimal::ZERO;
    let mut worst = Decimal::ZERO;

    for pnl in pnls {
        cumulative += *pnl;
        peak = peak.max(cumulative);
        worst = worst.max(peak - cumulative);
    }
    worst
}

fn sharpe_ratio(pnls: &[Decimal]) -> f64 {
    if pnls.len() < 2 {
        return 0.0;
    }
    let values: Vec<f64> = pnls.iter().filter_map(|p| p.to_f64()).collect();
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();

    if std_dev > 0.0 {
        mean / std_dev
    } else {
        0.0
    }
}

struct Streaks {
    max_win: u32,
    max_loss: u32,
    current: i32,
}

/// Breakeven trades neither extend nor break a run.
fn streaks(pnls: &[Decimal]) -> Streaks {
    let mut result = Streaks {
        max_win: 0,
        max_loss: 0,
        current: 0,
    };

    for pnl in pnls {
        if *pnl > Decimal::ZERO {
            result.current = if result.current > 0 { result.current + 1 } else { 1 };
            result.max_win = result.max_win.max(result.current as u32);
        } else if *pnl < Decimal::ZERO {
            result.current = if result.current < 0 { result.current - 1 } else { -1 };
            result.max_loss = result.max_loss.max(result.current.unsigned_abs());
        }
    }

    result
}
