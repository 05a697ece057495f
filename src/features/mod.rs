pub mod evaluator;
pub mod session_store;

pub use evaluator::{Evaluator, LlmEvaluator, NoEvaluator, Triage, Verdict};
pub use session_store::{JsonFileStore, KeyValueStore, MemoryStore, SessionStore};
