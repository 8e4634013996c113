use alert_core::{PositionEvent, PositionEventKind, TradeLevels};
use chrono::Utc;
use rust_decimal::Decimal;

use crate::{DailySummaryReport, Notification};

const GREEN: &str = "#22c55e";
const RED: &str = "#ef4444";

/// Subject plus HTML and plain text bodies for one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

pub struct EmailTemplate;

impl EmailTemplate {
    pub fn render(notification: &Notification) -> RenderedEmail {
        let (subject, header_color, rows, text) = match notification {
            Notification::AlertReceived {
                alert_id,
                levels,
                quantity,
                account_balance,
            } => alert_received(*alert_id, levels, *quantity, *account_balance),
            Notification::PositionUpdate(event) => position_update(event),
            Notification::DailySummary(report) => daily_summary(report),
            Notification::SystemError { component, message } => (
                format!("System Error: {}", component),
                RED,
                vec![
                    ("Component".to_string(), escape(component), None),
                    ("Error".to_string(), escape(message), None),
                ],
                format!("System error in {}\n\n{}", component, message),
            ),
        };

        let html = wrap(&subject, header_color, &rows);
        RenderedEmail {
            subject,
            html,
            text,
        }
    }
}

type Row = (String, String, Option<&'static str>);

fn alert_received(
    alert_id: i64,
    levels: &TradeLevels,
    quantity: u32,
    account_balance: Option<Decimal>,
) -> (String, &'static str, Vec<Row>, String) {
    let rr = levels.risk_reward();
    let modifier = levels
        .modifier
        .as_deref()
        .map(|m| format!(" {}", m))
        .unwrap_or_default();
    let subject = format!(
        "Trading Alert: {} LONG {} (size {})",
        levels.instrument, levels.price, levels.size
    );

    let mut rows = vec![
        ("Alert".to_string(), format!("#{}", alert_id), None),
        ("Entry".to_string(), format!("{}", levels.price), None),
        ("Size".to_string(), format!("{}{} ({} contracts)", levels.size, escape(&modifier), quantity), None),
        ("Stop".to_string(), format!("{}", levels.stop), Some(RED)),
        ("Target 1".to_string(), format!("{}", levels.target_1), Some(GREEN)),
        ("Target 2".to_string(), format!("{}", levels.target_2), Some(GREEN)),
        ("Risk".to_string(), format!("{} pts", rr.risk_points), None),
        ("R/R".to_string(), format!("{} / {}", rr.ratio_1, rr.ratio_2), None),
    ];
    if let Some(balance) = account_balance {
        rows.push(("Account Balance".to_string(), format!("${:.2}", balance), None));
    }

    let text = format!(
        "New alert #{alert_id}\n\
         {} LONG {} size {}{modifier} ({quantity} contracts)\n\
         Stop: {}\nTarget 1: {}\nTarget 2: {}\n\
         Risk: {} pts  R/R: {} / {}",
        levels.instrument,
        levels.price,
        levels.size,
        levels.stop,
        levels.target_1,
        levels.target_2,
        rr.risk_points,
        rr.ratio_1,
        rr.ratio_2,
    );

    (subject, "#3b82f6", rows, text)
}

fn position_update(event: &PositionEvent) -> (String, &'static str, Vec<Row>, String) {
    let position = &event.position;
    let label = event.kind.label();
    let subject = format!(
        "{}: {} {} @ {}",
        label, position.symbol, event.leg_quantity, event.price
    );
    let color = match event.kind {
        PositionEventKind::StoppedOut if event.leg_pnl < Decimal::ZERO => RED,
        PositionEventKind::StoppedOut => "#f97316",
        PositionEventKind::Target1Hit | PositionEventKind::Target2Hit => GREEN,
        PositionEventKind::EntrySubmitted | PositionEventKind::EntryFilled => "#1e293b",
    };

    let mut rows = vec![
        ("Symbol".to_string(), escape(&position.symbol), None),
        ("Alert".to_string(), format!("#{}", position.alert_id), None),
        ("Price".to_string(), format!("{}", event.price), None),
        ("Quantity".to_string(), event.leg_quantity.to_string(), None),
        ("Entry".to_string(), format!("{}", position.entry_price), None),
        ("Stop".to_string(), format!("{}", position.stop_price), None),
        ("Remaining".to_string(), position.current_quantity.to_string(), None),
    ];
    let mut text = format!(
        "{} for alert #{}\n{} {} @ {}\nEntry: {}  Stop: {}  Remaining: {}",
        label,
        position.alert_id,
        position.symbol,
        event.leg_quantity,
        event.price,
        position.entry_price,
        position.stop_price,
        position.current_quantity,
    );

    let realizes = matches!(
        event.kind,
        PositionEventKind::Target1Hit | PositionEventKind::Target2Hit | PositionEventKind::StoppedOut
    );
    if realizes {
        rows.push((
            "Leg P&amp;L".to_string(),
            signed_dollars(event.leg_pnl),
            Some(pnl_color(event.leg_pnl)),
        ));
        rows.push((
            "Realized P&amp;L".to_string(),
            signed_dollars(position.realized_pnl),
            Some(pnl_color(position.realized_pnl)),
        ));
        text.push_str(&format!(
            "\nLeg P&L: {}\nRealized P&L: {}",
            signed_dollars(event.leg_pnl),
            signed_dollars(position.realized_pnl)
        ));
    }

    (subject, color, rows, text)
}

fn daily_summary(report: &DailySummaryReport) -> (String, &'static str, Vec<Row>, String) {
    let subject = format!(
        "Daily Summary {}: {} ({} trades)",
        report.date,
        signed_dollars(report.net_pnl),
        report.total_trades
    );

    let mut rows = vec![
        ("Date".to_string(), report.date.to_string(), None),
        (
            "Net P&amp;L".to_string(),
            signed_dollars(report.net_pnl),
            Some(pnl_color(report.net_pnl)),
        ),
        ("Trades".to_string(), report.total_trades.to_string(), None),
        (
            "Wins / Losses".to_string(),
            format!("{} / {}", report.winning_trades, report.losing_trades),
            None,
        ),
        ("Win Rate".to_string(), format!("{:.1}%", report.win_rate), None),
        ("Gross Profit".to_string(), format!("${:.2}", report.gross_profit), Some(GREEN)),
        ("Gross Loss".to_string(), format!("${:.2}", report.gross_loss), Some(RED)),
        ("Commission".to_string(), format!("${:.2}", report.commission_paid), None),
        ("Max Drawdown".to_string(), format!("${:.2}", report.max_drawdown), None),
        ("Alerts".to_string(), report.alerts_received.to_string(), None),
        ("Open Positions".to_string(), report.open_positions.to_string(), None),
    ];
    if let Some(balance) = report.account_balance {
        rows.push(("Account Balance".to_string(), format!("${:.2}", balance), None));
    }

    let text = format!(
        "Daily summary for {}\n\
         Net P&L: {}\nTrades: {} ({} wins, {} losses, {:.1}% win rate)\n\
         Gross profit: ${:.2}  Gross loss: ${:.2}  Commission: ${:.2}\n\
         Max drawdown: ${:.2}\nAlerts: {}  Open positions: {}",
        report.date,
        signed_dollars(report.net_pnl),
        report.total_trades,
        report.winning_trades,
        report.losing_trades,
        report.win_rate,
        report.gross_profit,
        report.gross_loss,
        report.commission_paid,
        report.max_drawdown,
        report.alerts_received,
        report.open_positions,
    );

    (subject, "#1e293b", rows, text)
}

fn pnl_color(value: Decimal) -> &'static str {
    if value >= Decimal::ZERO {
        GREEN
    } else {
        RED
    }
}

fn signed_dollars(value: Decimal) -> String {
    if value >= Decimal::ZERO {
        format!("+${:.2}", value)
    } else {
        format!("-${:.2}", value.abs())
    }
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn wrap(title: &str, header_color: &str, rows: &[Row]) -> String {
    let body_rows: String = rows
        .iter()
        .enumerate()
        .map(|(i, (label, value, color))| {
            let shade = if i % 2 == 1 { r#" style="background:#f8fafc;""# } else { "" };
            let value_color = color.map(|c| format!("color:{};", c)).unwrap_or_default();
            format!(
                r#"  <tr{shade}><td style="padding:8px 12px;color:#94a3b8;">{label}</td><td style="padding:8px 12px;font-weight:600;{value_color}">{value}</td></tr>
"#
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><meta name="viewport" content="width=device-width,initial-scale=1"></head>
<body style="margin:0;padding:0;background:#f1f5f9;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;">
<table width="100%" cellpadding="0" cellspacing="0" style="background:#f1f5f9;padding:32px 0;">
  <tr><td align="center">
    <table width="600" cellpadding="0" cellspacing="0" style="background:#ffffff;border-radius:8px;overflow:hidden;box-shadow:0 1px 3px rgba(0,0,0,0.1);">
      <tr><td>
        <div style="background:{header_color};color:#fff;padding:12px 20px;border-radius:8px 8px 0 0;font-size:18px;font-weight:700;">{title}</div>
<table style="width:100%;border-collapse:collapse;">
{body_rows}</table>
      </td></tr>
      <tr><td style="padding:16px 20px;border-top:1px solid #e2e8f0;">
        <p style="margin:0;color:#94a3b8;font-size:12px;">Sent at {ts} UTC</p>
      </td></tr>
    </table>
    <p style="color:#94a3b8;font-size:11px;margin-top:16px;">TradeStream Notification Service</p>
  </td></tr>
</table>
</body>
</html>"#,
        title = escape(title),
        ts = Utc::now().format("%Y-%m-%d %H:%M:%S"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_core::{Position, SizeCode};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn test_alert_email_contains_levels() {
        let email = EmailTemplate::render(&Notification::AlertReceived {
            alert_id: 12,
            levels: TradeLevels::new("ES", dec!(6326), SizeCode::B, Some("risky".into()), dec!(6316)),
            quantity: 2,
            account_balance: Some(dec!(50000)),
        });

        assert_eq!(email.subject, "Trading Alert: ES LONG 6326 (size B)");
        assert!(email.html.contains("6333"));
        assert!(email.html.contains("6338"));
        assert!(email.html.contains("$50000.00"));
        assert!(email.text.contains("size B risky (2 contracts)"));
        assert!(email.text.contains("Risk: 10 pts"));
    }

    #[test]
    fn test_target_email_shows_pnl() {
        let levels = TradeLevels::new("ES", dec!(6326), SizeCode::B, None, dec!(6316));
        let mut position = Position::new(3, "MES", &levels, 2);
        position.apply_entry_fill(dec!(6326), Utc::now(), Decimal::ZERO);
        let pnl = position.apply_target1(dec!(6333), 1, Utc::now(), dec!(1.25), Decimal::ZERO);

        let email = EmailTemplate::render(&Notification::PositionUpdate(PositionEvent {
            kind: PositionEventKind::Target1Hit,
            position,
            price: dec!(6333),
            leg_quantity: 1,
            leg_pnl: pnl,
            timestamp: Utc::now(),
        }));

        assert!(email.subject.starts_with("Target 1 Hit"));
        assert!(email.html.contains("+$8.75"));
        assert!(email.html.contains(GREEN));
        assert!(email.text.contains("Leg P&L: +$8.75"));
    }

    #[test]
    fn test_daily_summary_negative_pnl() {
        let email = EmailTemplate::render(&Notification::DailySummary(DailySummaryReport {
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            total_trades: 2,
            winning_trades: 0,
            losing_trades: 2,
            win_rate: 0.0,
            net_pnl: dec!(-35),
            gross_profit: Decimal::ZERO,
            gross_loss: dec!(-35),
            commission_paid: dec!(10),
            max_drawdown: dec!(35),
            account_balance: None,
            open_positions: 0,
            alerts_received: 3,
        }));

        assert_eq!(email.subject, "Daily Summary 2026-03-02: -$35.00 (2 trades)");
        assert!(email.html.contains(RED));
        assert!(!email.html.contains("Account Balance"));
    }

    #[test]
    fn test_system_error_is_escaped() {
        let email = EmailTemplate::render(&Notification::SystemError {
            component: "discord".into(),
            message: "<gateway> closed".into(),
        });
        assert!(email.html.contains("&lt;gateway&gt; closed"));
        assert!(email.text.contains("<gateway> closed"));
    }
}
