pub mod controller;
pub mod processor;

pub use controller::{Controller, ControllerState, RunOutcome, RunSummary, StartRequest};
pub use processor::{ItemOutcome, ItemProcessor, SkipReason};
