pub mod core;
pub mod export;
pub mod features;
pub mod pipeline;
pub mod scraping;

// --- Primary core exports ---
pub use core::types;
pub use core::types::*;
pub use core::{ScoutConfig, Status, StatusLine};

pub use export::{FileSink, ResultSink};
pub use features::{Evaluator, LlmEvaluator, NoEvaluator, SessionStore};
pub use pipeline::{Controller, RunOutcome, StartRequest};
pub use scraping::{CdpHost, HostPage};
