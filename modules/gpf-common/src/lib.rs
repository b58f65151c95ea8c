pub mod config;
pub mod error;
pub mod json;

pub use config::{Config, Route, SizeTimeout, TimeoutSpec, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use error::{GpfError, Result};
