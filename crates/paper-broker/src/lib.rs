pub mod client;
pub mod models;

pub use broker_trait::ExecutionVenue;
pub use client::PaperBroker;
pub use models::*;
