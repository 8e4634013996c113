use regex::{Regex, RegexBuilder};
use rust_decimal::Decimal;

use crate::error::ParseError;
use crate::types::{ParsedAlert, SizeCode, TradeLevels};

pub const DEFAULT_INSTRUMENT: &str = "ES";
pub const DEFAULT_MAX_STOP_DISTANCE: Decimal = Decimal::from_parts(50, 0, 0, false, 0);

/// Parses alerts of the form
///
/// ```text
/// 🚨 ES long 6326: A GAMMA
/// Stop: 6316
/// ```
///
/// The siren prefix and the modifier keyword are optional, matching is
/// case-insensitive, and the stop must sit on a line after the alert line.
#[derive(Debug, Clone)]
pub struct AlertParser {
    instrument: String,
    max_stop_distance: Decimal,
    alert_line: Regex,
    price: Regex,
    size: Regex,
    stop: Regex,
}

impl Default for AlertParser {
    fn default() -> Self {
        Self::new(DEFAULT_INSTRUMENT)
    }
}

impl AlertParser {
    pub fn new(instrument: &str) -> Self {
        let instrument = instrument.trim().to_uppercase();
        let marker = format!(r"(?:🚨\s*)?\b{}\s+long\b(.*)$", regex::escape(&instrument));

        Self {
            alert_line: case_insensitive(&marker),
            price: case_insensitive(r"^\s*(\d+)"),
            size: case_insensitive(r"^\s*:\s*([a-z]+)(?:\s+([a-z]+))?"),
            stop: case_insensitive(r"\bstop\s*:\s*(\d+)"),
            instrument,
            max_stop_distance: DEFAULT_MAX_STOP_DISTANCE,
        }
    }

    pub fn with_max_stop_distance(mut self, max: Decimal) -> Self {
        self.max_stop_distance = max;
        self
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn parse(&self, text: &str) -> ParsedAlert {
        ParsedAlert {
            raw_text: text.to_string(),
            result: self.extract(text),
        }
    }

    fn extract(&self, text: &str) -> Result<TradeLevels, ParseError> {
        let lines: Vec<&str> = text.lines().collect();

        let (line_idx, rest) = lines
            .iter()
            .enumerate()
            .find_map(|(idx, line)| {
                self.alert_line
                    .captures(line)
                    .and_then(|caps| caps.get(1))
                    .map(|m| (idx, m.as_str()))
            })
            .ok_or(ParseError::NotAnAlert)?;

        let price_caps = self.price.captures(rest).ok_or(ParseError::MissingPrice)?;
        let price_match = price_caps.get(1).ok_or(ParseError::MissingPrice)?;
        let price = parse_points(price_match.as_str()).ok_or(ParseError::MissingPrice)?;

        let after_price = &rest[price_match.end()..];
        let size_caps = self.size.captures(after_price).ok_or(ParseError::MissingSize)?;
        let size: SizeCode = size_caps
            .get(1)
            .ok_or(ParseError::MissingSize)?
            .as_str()
            .parse()?;
        let modifier = size_caps.get(2).map(|m| m.as_str().to_uppercase());

        let stop = lines[line_idx + 1..]
            .iter()
            .find_map(|line| self.stop.captures(line))
            .and_then(|caps| caps.get(1))
            .and_then(|m| parse_points(m.as_str()))
            .ok_or(ParseError::MissingStop)?;

        if stop >= price {
            return Err(ParseError::StopNotBelowEntry { stop, price });
        }
        let distance = price - stop;
        if distance > self.max_stop_distance {
            return Err(ParseError::StopTooFar {
                distance,
                max: self.max_stop_distance,
            });
        }

        Ok(TradeLevels::new(
            self.instrument.clone(),
            price,
            size,
            modifier,
            stop,
        ))
    }
}

fn case_insensitive(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|e| panic!("invalid built-in alert pattern {pattern}: {e}"))
}

fn parse_points(digits: &str) -> Option<Decimal> {
    digits.parse::<i64>().ok().map(Decimal::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_standard_alert() {
        let parser = AlertParser::default();
        let alert = parser.parse("🚨 ES long 6326: A\nStop: 6316");

        assert!(alert.is_valid());
        let levels = alert.levels().unwrap();
        assert_eq!(levels.price, dec!(6326));
        assert_eq!(levels.size, SizeCode::A);
        assert_eq!(levels.stop, dec!(6316));
        assert_eq!(levels.target_1, dec!(6333));
        assert_eq!(levels.target_2, dec!(6338));
        assert_eq!(levels.modifier, None);
    }

    #[test]
    fn test_parse_with_modifier_and_case() {
        let parser = AlertParser::default();
        let alert = parser.parse("es LONG 5900: b gamma\nsome chatter\nstop: 5880");

        let levels = alert.levels().unwrap();
        assert_eq!(levels.size, SizeCode::B);
        assert_eq!(levels.modifier.as_deref(), Some("GAMMA"));
        assert_eq!(levels.stop, dec!(5880));
        assert_eq!(levels.target_2 - levels.price, dec!(12));
    }

    #[test]
    fn test_targets_follow_price() {
        let parser = AlertParser::default();
        for price in [4100_i64, 5000, 6326, 7999] {
            let text = format!("🚨 ES long {}: C\nStop: {}", price, price - 10);
            let levels = parser.parse(&text).result.unwrap();
            assert_eq!(levels.target_1, Decimal::from(price + 7));
            assert_eq!(levels.target_2, Decimal::from(price + 12));
        }
    }

    #[test]
    fn test_rejects_non_alert() {
        let parser = AlertParser::default();
        assert_eq!(
            parser.parse("good morning, ES looks weak today").result,
            Err(ParseError::NotAnAlert)
        );
        assert_eq!(
            parser.parse("🚨 NQ long 21000: A\nStop: 20990").result,
            Err(ParseError::NotAnAlert)
        );
    }

    #[test]
    fn test_rejects_missing_fields() {
        let parser = AlertParser::default();
        assert_eq!(
            parser.parse("🚨 ES long soon\nStop: 6316").result,
            Err(ParseError::MissingPrice)
        );
        assert_eq!(
            parser.parse("🚨 ES long 6326\nStop: 6316").result,
            Err(ParseError::MissingSize)
        );
        assert_eq!(
            parser.parse("🚨 ES long 6326: A").result,
            Err(ParseError::MissingStop)
        );
    }

    #[test]
    fn test_stop_must_follow_alert_line() {
        let parser = AlertParser::default();
        assert_eq!(
            parser.parse("Stop: 6316\n🚨 ES long 6326: A").result,
            Err(ParseError::MissingStop)
        );
    }

    #[test]
    fn test_rejects_invalid_size() {
        let parser = AlertParser::default();
        assert_eq!(
            parser.parse("🚨 ES long 6326: D\nStop: 6316").result,
            Err(ParseError::InvalidSize("D".to_string()))
        );
    }

    #[test]
    fn test_rejects_stop_at_or_above_entry() {
        let parser = AlertParser::default();
        assert_eq!(
            parser.parse("🚨 ES long 6326: A\nStop: 6326").result,
            Err(ParseError::StopNotBelowEntry {
                stop: dec!(6326),
                price: dec!(6326)
            })
        );
        assert!(matches!(
            parser.parse("🚨 ES long 6326: A\nStop: 6330").result,
            Err(ParseError::StopNotBelowEntry { .. })
        ));
    }

    #[test]
    fn test_rejects_stop_too_far() {
        let parser = AlertParser::default();
        assert_eq!(
            parser.parse("🚨 ES long 6326: A\nStop: 6200").result,
            Err(ParseError::StopTooFar {
                distance: dec!(126),
                max: dec!(50)
            })
        );

        let wide = AlertParser::default().with_max_stop_distance(dec!(200));
        assert!(wide.parse("🚨 ES long 6326: A\nStop: 6200").is_valid());
    }

    #[test]
    fn test_custom_instrument() {
        let parser = AlertParser::new("nq");
        assert_eq!(parser.instrument(), "NQ");
        let levels = parser.parse("NQ long 21000: A\nStop: 20980").result.unwrap();
        assert_eq!(levels.instrument, "NQ");
        assert_eq!(levels.target_1, dec!(21007));
    }

    #[test]
    fn test_summary() {
        let parser = AlertParser::default();
        let summary = parser.parse("🚨 ES long 6326: A\nStop: 6316").summary();
        assert!(summary.contains("T1 6333"));
        assert!(summary.contains("T2 6338"));

        let invalid = parser.parse("hello");
        assert_eq!(invalid.summary(), "Invalid alert: Not a long alert");
        assert_eq!(invalid.error_message().as_deref(), Some("Not a long alert"));
    }
}
