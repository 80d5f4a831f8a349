pub mod config;
pub mod error;
pub mod lending;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use error::{CirculationError, Result};
