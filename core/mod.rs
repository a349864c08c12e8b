// Core module: connection states, outcome types and the error taxonomy (NO I/O)
pub mod error;
pub mod types;

pub use error::*;
pub use types::*;
