mod error;
mod models;
mod store;

pub use error::StoreError;
pub use models::*;
pub use store::TradeStore;
