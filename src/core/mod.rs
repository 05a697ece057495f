pub mod config;
pub mod error;
pub mod status;
pub mod types;

pub use config::ScoutConfig;
pub use error::{ConfigError, EvaluatorError, ExportError, HostError, ScoutError, StoreError};
pub use status::{Status, StatusLine};
