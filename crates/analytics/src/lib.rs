pub mod metrics;
pub mod models;
pub mod performance_tracker;

pub use metrics::{compute_metrics, daily_record};
pub use models::*;
pub use performance_tracker::PerformanceTracker;
