use thiserror::Error;

use super::types::{ExportFormat, Mode};

/// Failures talking to the host page.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("cdp command failed: {0}")]
    Cdp(String),

    #[error("page script failed: {0}")]
    Script(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("item {0} is not on the page")]
    MissingItem(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("no active session in store")]
    NoSession,
}

#[derive(Debug, Error)]
pub enum EvaluatorError {
    #[error("evaluator unavailable")]
    Unavailable,

    #[error("evaluator request failed: {0}")]
    Request(String),

    #[error("evaluator reply not understood: {0:?}")]
    Unparseable(String),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("xlsx encoding failed: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("{format:?} export is not available for {mode} records")]
    Unsupported { format: ExportFormat, mode: Mode },
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be between {min} and {max} (got {value})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{max_field} must be greater than {min_field}")]
    MaxNotGreater {
        min_field: &'static str,
        max_field: &'static str,
    },

    #[error("unknown config key '{0}'")]
    UnknownKey(String),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

/// Top-level controller failure. Anything reaching this type ends the run
/// through the flush-and-clear abort path.
#[derive(Debug, Error)]
pub enum ScoutError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("a session is already active (page {page} of {mode} run); resume or stop it first")]
    SessionActive { mode: Mode, page: u32 },
}
