//! Item Processor: one identifier in, one record or one skip out.
//!
//! Nothing here propagates. Host failures become [`SkipReason::Failed`],
//! evaluator failures count as keep, and a detail pane that never confirms
//! the item becomes [`SkipReason::DetailTimeout`]. A stop that lands while
//! the evaluator is answering drops the call and ends as
//! [`SkipReason::Cancelled`].

use crate::core::config::{EvaluatorMode, ScoutConfig};
use crate::core::error::HostError;
use crate::core::types::{DetailSnapshot, JobRecord, Mode, PersonRecord, Record, SummarySnapshot};
use crate::features::evaluator::{Evaluator, Triage, Verdict};
use crate::scraping::discovery::{ensure_rendered, RenderPolicy};
use crate::scraping::host::HostPage;
use crate::scraping::humanize::Humanizer;
use crate::scraping::poll::{poll_until, until_cancelled, PollOutcome};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NotRendered,
    SeenBefore,
    Rejected,
    DetailTimeout,
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Record(Record),
    Skipped(SkipReason),
}

/// Evaluator gate result before any detail has been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Keep,
    Reject,
    /// Read the detail, then ask once more.
    Defer,
}

pub struct ItemProcessor {
    host: Arc<dyn HostPage>,
    evaluator: Arc<dyn Evaluator>,
    humanizer: Humanizer,
    mode: Mode,
    evaluator_mode: EvaluatorMode,
    skip_seen: bool,
    render: RenderPolicy,
    detail_interval: Duration,
    detail_attempts: u32,
}

impl ItemProcessor {
    pub fn new(
        host: Arc<dyn HostPage>,
        evaluator: Arc<dyn Evaluator>,
        config: &ScoutConfig,
        mode: Mode,
    ) -> Self {
        Self {
            host,
            evaluator,
            humanizer: Humanizer::new(config.timing.clone()),
            mode,
            evaluator_mode: config.evaluator.mode,
            skip_seen: config.skip_seen,
            render: config.polling.render_policy(),
            detail_interval: config.polling.detail_interval(),
            detail_attempts: config.polling.detail_attempts.max(1),
        }
    }

    pub async fn process(&self, id: &str, cancel: &CancellationToken) -> ItemOutcome {
        match self.try_process(id, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("processor: item {} failed: {}", id, e);
                ItemOutcome::Skipped(SkipReason::Failed(e.to_string()))
            }
        }
    }

    async fn try_process(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<ItemOutcome, HostError> {
        let host = self.host.as_ref();

        if !ensure_rendered(host, id, &self.render, cancel).await? {
            if cancel.is_cancelled() {
                return Ok(ItemOutcome::Skipped(SkipReason::Cancelled));
            }
            info!("processor: item {} never rendered, skipping", id);
            return Ok(ItemOutcome::Skipped(SkipReason::NotRendered));
        }

        let summary = host.summary(id).await?;
        if self.skip_seen && summary.seen {
            debug!("processor: item {} already seen, skipping", id);
            return Ok(ItemOutcome::Skipped(SkipReason::SeenBefore));
        }
        if cancel.is_cancelled() {
            return Ok(ItemOutcome::Skipped(SkipReason::Cancelled));
        }

        let Some(gate) = self.gate(&summary, cancel).await else {
            return Ok(ItemOutcome::Skipped(SkipReason::Cancelled));
        };
        if gate == Gate::Reject {
            info!("processor: item {} rejected on summary", id);
            return Ok(ItemOutcome::Skipped(SkipReason::Rejected));
        }
        if cancel.is_cancelled() {
            return Ok(ItemOutcome::Skipped(SkipReason::Cancelled));
        }

        let detail = if self.mode.has_detail_view() {
            match self.read_detail(id, cancel).await? {
                PollOutcome::Found(d) => Some(d),
                PollOutcome::TimedOut => {
                    warn!("processor: detail pane never showed item {}, skipping", id);
                    return Ok(ItemOutcome::Skipped(SkipReason::DetailTimeout));
                }
                PollOutcome::Cancelled => return Ok(ItemOutcome::Skipped(SkipReason::Cancelled)),
            }
        } else {
            None
        };

        if gate == Gate::Defer {
            let text = detail
                .as_ref()
                .map(DetailSnapshot::evaluation_text)
                .unwrap_or_else(|| summary.text.clone());
            match self.second_look(id, &text, cancel).await {
                None => return Ok(ItemOutcome::Skipped(SkipReason::Cancelled)),
                Some(Verdict::Reject) => return Ok(ItemOutcome::Skipped(SkipReason::Rejected)),
                Some(Verdict::Keep) => {}
            }
        }

        Ok(ItemOutcome::Record(self.merge(&summary, detail.as_ref())))
    }

    /// `None` when a stop lands while the evaluator is still answering.
    async fn gate(&self, summary: &SummarySnapshot, cancel: &CancellationToken) -> Option<Gate> {
        if self.evaluator_mode == EvaluatorMode::Off || !self.evaluator.is_available() {
            return Some(Gate::Keep);
        }
        let gate = match self.evaluator_mode {
            EvaluatorMode::Off => Gate::Keep,
            EvaluatorMode::Binary => {
                match until_cancelled(self.evaluator.evaluate_summary(&summary.text), cancel).await? {
                    Ok(Verdict::Keep) => Gate::Keep,
                    Ok(Verdict::Reject) => Gate::Reject,
                    Err(e) => {
                        warn!("processor: evaluator failed on {}, keeping: {}", summary.id, e);
                        Gate::Keep
                    }
                }
            }
            EvaluatorMode::ThreeTier => {
                match until_cancelled(self.evaluator.triage(&summary.text), cancel).await? {
                    Ok(Triage::Keep) => Gate::Keep,
                    Ok(Triage::Reject) => Gate::Reject,
                    Ok(Triage::Defer) => {
                        debug!("processor: evaluator deferred on {}", summary.id);
                        Gate::Defer
                    }
                    Err(e) => {
                        warn!("processor: evaluator failed on {}, keeping: {}", summary.id, e);
                        Gate::Keep
                    }
                }
            }
        };
        Some(gate)
    }

    /// The single round-trip a defer buys.
    async fn second_look(&self, id: &str, text: &str, cancel: &CancellationToken) -> Option<Verdict> {
        if !self.evaluator.is_available() {
            return Some(Verdict::Keep);
        }
        let verdict = match until_cancelled(self.evaluator.evaluate_detail(text), cancel).await? {
            Ok(v) => {
                info!("processor: item {} {:?} after full detail", id, v);
                v
            }
            Err(e) => {
                warn!("processor: detail evaluation failed on {}, keeping: {}", id, e);
                Verdict::Keep
            }
        };
        Some(verdict)
    }

    /// Select the item, wait for the pane to show it, expand and read it.
    async fn read_detail(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome<DetailSnapshot>, HostError> {
        let host = self.host.as_ref();
        host.select(id).await?;

        // The pane header can switch before the body does, so the body's own
        // id is checked too and a mismatch is polled again.
        let shown = poll_until(
            move || async move {
                match host.detail_item_id().await {
                    Ok(Some(shown)) if shown == id => {}
                    Ok(_) => return None,
                    Err(e) => {
                        debug!("processor: detail probe for {} failed: {}", id, e);
                        return None;
                    }
                }
                if let Err(e) = host.expand_detail().await {
                    debug!("processor: could not expand detail of {}: {}", id, e);
                }
                match host.read_detail().await {
                    Ok(detail) if detail.id.is_empty() || detail.id == id => Some(Ok(detail)),
                    Ok(detail) => {
                        debug!("processor: detail pane still shows {}, waiting for {}", detail.id, id);
                        None
                    }
                    Err(e) => Some(Err(e)),
                }
            },
            self.detail_interval,
            self.detail_attempts,
            cancel,
        )
        .await;
        let mut detail = match shown {
            PollOutcome::Found(read) => read?,
            PollOutcome::TimedOut => return Ok(PollOutcome::TimedOut),
            PollOutcome::Cancelled => return Ok(PollOutcome::Cancelled),
        };
        if detail.id.is_empty() {
            detail.id = id.to_string();
        }

        if !self.humanizer.review_item(host, cancel).await {
            return Ok(PollOutcome::Cancelled);
        }
        Ok(PollOutcome::Found(detail))
    }

    fn merge(&self, summary: &SummarySnapshot, detail: Option<&DetailSnapshot>) -> Record {
        match self.mode {
            Mode::Jobs => Record::Job(JobRecord::merge(summary, detail, Utc::now())),
            Mode::People => Record::Person(PersonRecord::from_summary(summary)),
        }
    }
}
