pub mod types;
pub mod payload;
pub mod config;
pub mod error;

pub use types::*;
pub use payload::*;
pub use config::{Config, FileConfig};
pub use error::PulseError;
