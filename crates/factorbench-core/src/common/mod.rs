pub mod error;
pub mod factor;
pub mod types;

pub use error::{Error, Result};
