mod executor;
mod models;
mod monitor;
mod orders;

#[cfg(test)]
mod tests;

pub use executor::TradeExecutor;
pub use models::{ExecutionOutcome, ExecutorConfig, ExecutorError};
