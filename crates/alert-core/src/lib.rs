pub mod error;
pub mod parser;
pub mod position;
pub mod types;

pub use error::*;
pub use parser::AlertParser;
pub use position::*;
pub use types::*;
