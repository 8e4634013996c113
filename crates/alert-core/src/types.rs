use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ParseError, SizeMappingError};

/// Fixed point offset of the first profit target above entry.
pub const TARGET_1_OFFSET: Decimal = Decimal::from_parts(7, 0, 0, false, 0);
/// Fixed point offset of the second profit target above entry.
pub const TARGET_2_OFFSET: Decimal = Decimal::from_parts(12, 0, 0, false, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SizeCode {
    A,
    B,
    C,
}

impl SizeCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeCode::A => "A",
            SizeCode::B => "B",
            SizeCode::C => "C",
        }
    }
}

impl fmt::Display for SizeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizeCode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(SizeCode::A),
            "B" => Ok(SizeCode::B),
            "C" => Ok(SizeCode::C),
            other => Err(ParseError::InvalidSize(other.to_string())),
        }
    }
}

/// Contracts traded per size code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeMapping {
    pub a: u32,
    pub b: u32,
    pub c: u32,
}

impl Default for SizeMapping {
    fn default() -> Self {
        Self { a: 1, b: 2, c: 3 }
    }
}

impl SizeMapping {
    pub fn quantity_for(&self, size: SizeCode) -> u32 {
        match size {
            SizeCode::A => self.a,
            SizeCode::B => self.b,
            SizeCode::C => self.c,
        }
    }
}

/// Parses `A:1,B:2,C:3`. Every code must be present with a positive quantity.
impl FromStr for SizeMapping {
    type Err = SizeMappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (mut a, mut b, mut c) = (None, None, None);

        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (code, qty) = entry
                .split_once(':')
                .ok_or_else(|| SizeMappingError::Malformed(entry.to_string()))?;
            let qty: i64 = qty
                .trim()
                .parse()
                .map_err(|_| SizeMappingError::Malformed(entry.to_string()))?;
            if qty <= 0 {
                return Err(SizeMappingError::NonPositive(code.trim().to_string()));
            }
            let qty = u32::try_from(qty).map_err(|_| SizeMappingError::Malformed(entry.to_string()))?;
            match code.parse::<SizeCode>() {
                Ok(SizeCode::A) => a = Some(qty),
                Ok(SizeCode::B) => b = Some(qty),
                Ok(SizeCode::C) => c = Some(qty),
                Err(_) => return Err(SizeMappingError::Malformed(entry.to_string())),
            }
        }

        Ok(Self {
            a: a.ok_or(SizeMappingError::Missing("A"))?,
            b: b.ok_or(SizeMappingError::Missing("B"))?,
            c: c.ok_or(SizeMappingError::Missing("C"))?,
        })
    }
}

/// Validated price levels extracted from an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeLevels {
    pub instrument: String,
    pub price: Decimal,
    pub size: SizeCode,
    pub modifier: Option<String>,
    pub stop: Decimal,
    pub target_1: Decimal,
    pub target_2: Decimal,
}

impl TradeLevels {
    pub fn new(
        instrument: impl Into<String>,
        price: Decimal,
        size: SizeCode,
        modifier: Option<String>,
        stop: Decimal,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            price,
            size,
            modifier,
            stop,
            target_1: price + TARGET_1_OFFSET,
            target_2: price + TARGET_2_OFFSET,
        }
    }

    pub fn risk_reward(&self) -> RiskReward {
        let risk_points = self.price - self.stop;
        let reward_1_points = self.target_1 - self.price;
        let reward_2_points = self.target_2 - self.price;
        let (ratio_1, ratio_2) = if risk_points > Decimal::ZERO {
            (reward_1_points / risk_points, reward_2_points / risk_points)
        } else {
            (Decimal::ZERO, Decimal::ZERO)
        };

        RiskReward {
            risk_points,
            reward_1_points,
            reward_2_points,
            ratio_1: ratio_1.round_dp(2),
            ratio_2: ratio_2.round_dp(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskReward {
    pub risk_points: Decimal,
    pub reward_1_points: Decimal,
    pub reward_2_points: Decimal,
    pub ratio_1: Decimal,
    pub ratio_2: Decimal,
}

/// Outcome of running the parser over one message. Never mutated after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAlert {
    pub raw_text: String,
    pub result: Result<TradeLevels, ParseError>,
}

impl ParsedAlert {
    pub fn is_valid(&self) -> bool {
        self.result.is_ok()
    }

    pub fn levels(&self) -> Option<&TradeLevels> {
        self.result.as_ref().ok()
    }

    pub fn error_message(&self) -> Option<String> {
        self.result.as_ref().err().map(|e| e.to_string())
    }

    /// One-line human summary used in logs and the alert log table.
    pub fn summary(&self) -> String {
        match &self.result {
            Ok(levels) => {
                let rr = levels.risk_reward();
                let modifier = levels
                    .modifier
                    .as_deref()
                    .map(|m| format!(" {}", m.to_uppercase()))
                    .unwrap_or_default();
                format!(
                    "{} LONG {} size {}{} | stop {} | T1 {} | T2 {} | risk {} pts | R/R {}/{}",
                    levels.instrument,
                    levels.price,
                    levels.size,
                    modifier,
                    levels.stop,
                    levels.target_1,
                    levels.target_2,
                    rr.risk_points,
                    rr.ratio_1,
                    rr.ratio_2
                )
            }
            Err(e) => format!("Invalid alert: {}", e),
        }
    }
}

/// Source metadata of an inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub message_id: String,
    pub channel_id: u64,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}
