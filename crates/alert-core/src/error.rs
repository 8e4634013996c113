use rust_decimal::Decimal;
use thiserror::Error;

/// Reasons an inbound message is not a tradeable alert.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Not a long alert")]
    NotAnAlert,

    #[error("Could not extract entry price")]
    MissingPrice,

    #[error("Could not extract size")]
    MissingSize,

    #[error("Invalid size code: {0}")]
    InvalidSize(String),

    #[error("Could not extract stop loss")]
    MissingStop,

    #[error("Stop {stop} is not below entry {price}")]
    StopNotBelowEntry { stop: Decimal, price: Decimal },

    #[error("Stop distance {distance} exceeds maximum {max} points")]
    StopTooFar { distance: Decimal, max: Decimal },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SizeMappingError {
    #[error("Malformed size mapping entry: {0}")]
    Malformed(String),

    #[error("Size mapping has no quantity for {0}")]
    Missing(&'static str),

    #[error("Size mapping quantity for {0} must be positive")]
    NonPositive(String),
}
