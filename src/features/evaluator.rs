//! Relevance evaluator: an optional external judge consulted before
//! full-detail extraction.
//!
//! Two shapes are supported:
//! * binary: `evaluate_summary` → keep / reject
//! * three-tier: `triage` → reject / keep / defer, where defer buys exactly one
//!   `evaluate_detail` round-trip on the full detail text.
//!
//! The evaluator may hold a running conversation for the current page; the
//! controller calls [`Evaluator::reset`] before every new page. Availability is
//! checked before every use and every failure is treated as keep by the caller.

use crate::core::config::EvaluatorConfig;
use crate::core::error::EvaluatorError;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Triage {
    Reject,
    Keep,
    Defer,
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    fn is_available(&self) -> bool;

    /// Drop any per-page context.
    async fn reset(&self);

    async fn evaluate_summary(&self, summary: &str) -> Result<Verdict, EvaluatorError>;

    async fn triage(&self, summary: &str) -> Result<Triage, EvaluatorError>;

    /// Only ever called once per item, after a defer.
    async fn evaluate_detail(&self, detail: &str) -> Result<Verdict, EvaluatorError>;
}

/// Stand-in when no evaluator is configured: never available.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEvaluator;

#[async_trait]
impl Evaluator for NoEvaluator {
    fn is_available(&self) -> bool {
        false
    }

    async fn reset(&self) {}

    async fn evaluate_summary(&self, _summary: &str) -> Result<Verdict, EvaluatorError> {
        Err(EvaluatorError::Unavailable)
    }

    async fn triage(&self, _summary: &str) -> Result<Triage, EvaluatorError> {
        Err(EvaluatorError::Unavailable)
    }

    async fn evaluate_detail(&self, _detail: &str) -> Result<Verdict, EvaluatorError> {
        Err(EvaluatorError::Unavailable)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reply parsing
// ─────────────────────────────────────────────────────────────────────────────

fn first_keyword(reply: &str) -> String {
    reply
        .split(|c: char| !c.is_ascii_alphabetic())
        .find(|w| !w.is_empty())
        .unwrap_or_default()
        .to_ascii_uppercase()
}

/// Map a free-text reply to a three-tier decision by its first keyword.
pub fn parse_triage(reply: &str) -> Result<Triage, EvaluatorError> {
    match first_keyword(reply).as_str() {
        "KEEP" | "ACCEPT" | "YES" | "RELEVANT" => Ok(Triage::Keep),
        "REJECT" | "NO" | "SKIP" | "IRRELEVANT" => Ok(Triage::Reject),
        "DEFER" | "MORE" | "MAYBE" | "UNSURE" => Ok(Triage::Defer),
        _ => Err(EvaluatorError::Unparseable(reply.chars().take(120).collect())),
    }
}

/// Binary decision. A defer-like answer here counts as keep: there is no
/// second round-trip to spend.
pub fn parse_verdict(reply: &str) -> Result<Verdict, EvaluatorError> {
    match parse_triage(reply)? {
        Triage::Reject => Ok(Verdict::Reject),
        Triage::Keep | Triage::Defer => Ok(Verdict::Keep),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI-compatible evaluator
// ─────────────────────────────────────────────────────────────────────────────

/// Messages kept in the running page conversation (excluding the system prompt).
const MAX_HISTORY: usize = 24;

/// Chat-completions evaluator. Works against OpenAI or any compatible local
/// endpoint (Ollama / LM Studio).
pub struct LlmEvaluator {
    http: reqwest::Client,
    cfg: EvaluatorConfig,
    api_key: Option<String>,
    history: Mutex<Vec<Value>>,
}

impl LlmEvaluator {
    pub fn new(http: reqwest::Client, cfg: EvaluatorConfig) -> Self {
        let api_key = cfg.resolve_api_key();
        Self {
            http,
            cfg,
            api_key,
            history: Mutex::new(Vec::new()),
        }
    }

    fn system_prompt(&self) -> String {
        let criteria = self
            .cfg
            .criteria
            .as_deref()
            .unwrap_or("Keep listings that look relevant to a software engineer.");
        format!(
            "You screen search listings for a user. Their criteria:\n{}\n\n\
             Reply with exactly one word. KEEP if the listing matches, REJECT if it does not. \
             When asked for a triage you may also reply DEFER if the short summary is not \
             enough and you need the full description.",
            criteria
        )
    }

    fn truncate(&self, text: &str) -> String {
        let max = self.cfg.resolve_max_chars();
        if text.chars().count() > max {
            let mut t: String = text.chars().take(max).collect();
            t.push_str("\n…[truncated]");
            t
        } else {
            text.to_string()
        }
    }

    /// POST the chat body, retrying transport errors, 429 and 5xx.
    async fn post_with_retry(&self, url: &str, body: &Value, api_key: &str) -> Result<Value, EvaluatorError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(300))
            .with_max_interval(Duration::from_secs(2))
            .with_max_elapsed_time(Some(Duration::from_secs(8)))
            .build();

        retry(policy, move || async move {
            let builder = self
                .http
                .post(url)
                .timeout(self.cfg.resolve_timeout())
                .json(body);
            // Key-less local endpoints work without the header.
            let builder = if api_key.is_empty() {
                builder
            } else {
                builder.bearer_auth(api_key)
            };
            let response = builder.send().await.map_err(|e| {
                debug!("evaluator: request failed, may retry: {}", e);
                backoff::Error::transient(EvaluatorError::Request(e.to_string()))
            })?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                let err = EvaluatorError::Request(format!(
                    "status={} body={}",
                    status,
                    text.chars().take(300).collect::<String>()
                ));
                return Err(if status.is_server_error() || status.as_u16() == 429 {
                    backoff::Error::transient(err)
                } else {
                    backoff::Error::permanent(err)
                });
            }

            response.json::<Value>().await.map_err(|e| {
                backoff::Error::permanent(EvaluatorError::Request(format!(
                    "response json parse failed: {}",
                    e
                )))
            })
        })
        .await
    }

    async fn ask(&self, instruction: &str, text: &str) -> Result<String, EvaluatorError> {
        let api_key = self.api_key.clone().ok_or(EvaluatorError::Unavailable)?;
        let user = json!({
            "role": "user",
            "content": format!("{}\n\n{}", instruction, self.truncate(text)),
        });

        let mut messages = vec![json!({"role": "system", "content": self.system_prompt()})];
        if let Ok(history) = self.history.lock() {
            messages.extend(history.iter().cloned());
        }
        messages.push(user.clone());

        let url = format!(
            "{}/chat/completions",
            self.cfg.resolve_base_url().trim_end_matches('/')
        );
        let body = json!({
            "model": self.cfg.resolve_model(),
            "temperature": 0.0,
            "messages": messages,
        });

        let value = self.post_with_retry(&url, &body, api_key.trim()).await?;

        let content = value
            .get("choices")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EvaluatorError::Unparseable(value.to_string()))?;

        if let Ok(mut history) = self.history.lock() {
            history.push(user);
            history.push(json!({"role": "assistant", "content": content}));
            let excess = history.len().saturating_sub(MAX_HISTORY);
            history.drain(..excess);
        }
        debug!("evaluator: reply {:?}", content);
        Ok(content)
    }
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn reset(&self) {
        if let Ok(mut history) = self.history.lock() {
            if !history.is_empty() {
                info!("evaluator: resetting page conversation ({} messages)", history.len());
            }
            history.clear();
        }
    }

    async fn evaluate_summary(&self, summary: &str) -> Result<Verdict, EvaluatorError> {
        let reply = self
            .ask("Listing summary. Answer KEEP or REJECT.", summary)
            .await?;
        parse_verdict(&reply)
    }

    async fn triage(&self, summary: &str) -> Result<Triage, EvaluatorError> {
        let reply = self
            .ask(
                "Listing summary. Answer KEEP, REJECT, or DEFER if you need the full description.",
                summary,
            )
            .await?;
        parse_triage(&reply)
    }

    async fn evaluate_detail(&self, detail: &str) -> Result<Verdict, EvaluatorError> {
        let reply = self
            .ask(
                "Full listing for the item you deferred. Answer KEEP or REJECT; DEFER is no longer allowed.",
                detail,
            )
            .await?;
        let verdict = parse_verdict(&reply);
        if matches!(parse_triage(&reply), Ok(Triage::Defer)) {
            warn!("evaluator: deferred again on full detail, counting as keep");
        }
        verdict
    }
}
