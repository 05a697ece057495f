//! Scripted fakes of the host page, the evaluator and the result sink.
#![allow(dead_code)]

use async_trait::async_trait;
use listing_scout::core::config::{EvaluatorMode, ScoutConfig};
use listing_scout::core::error::{EvaluatorError, ExportError, HostError, StoreError};
use listing_scout::core::status::StatusLine;
use listing_scout::export::ResultSink;
use listing_scout::features::evaluator::{Evaluator, Triage, Verdict};
use listing_scout::features::session_store::{KeyValueStore, MemoryStore, SessionStore};
use listing_scout::pipeline::Controller;
use listing_scout::scraping::host::{HostPage, ScrollRegion};
use listing_scout::types::{DetailSnapshot, ExportFormat, Mode, PageKind, Record, SummarySnapshot};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub const JOBS_URL: &str = "https://www.linkedin.com/jobs/search/?keywords=rust";
pub const PEOPLE_URL: &str = "https://www.linkedin.com/search/results/people/?keywords=rust";
/// Id of the job a lagging detail pane still shows.
pub const STALE_JOB: &str = "STALE-999";
pub const FEED_URL: &str = "https://www.linkedin.com/feed/";

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

/// Identifier of item `index` on `page`.
pub fn item_id(page: u32, index: usize) -> String {
    format!("p{}-{}", page, index)
}

/// Evaluator-visible tag carried by every summary text.
pub fn tag(id: &str) -> String {
    format!("[{}]", id)
}

// ─────────────────────────────────────────────────────────────────────────────
// Host
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct HostState {
    url: String,
    polls_since_nav: usize,
    selected: Option<String>,
    navigations: Vec<String>,
    selects: Vec<String>,
    summaries: Vec<String>,
}

/// A virtualized listing with `items_per_page[page - 1]` items per page.
///
/// Placeholders appear in batches of ten per poll after each navigation, so
/// discovery has to wait for the count to settle.
pub struct FakeHost {
    mode: Mode,
    items_per_page: Vec<usize>,
    state: Mutex<HostState>,
    pub failing: HashSet<String>,
    pub seen: HashSet<String>,
    /// Items the detail pane never switches to.
    pub stale_detail: HashSet<String>,
    /// Items whose pane still shows the previous job for this many reads
    /// while the pane header already names the new one. `usize::MAX` never
    /// catches up.
    pub pane_lag: Mutex<HashMap<String, usize>>,
    /// URL the host lands on after any navigation, instead of the requested one.
    pub navigate_override: Option<String>,
    /// Reading this item's summary fires the token (a stop arriving mid-item).
    pub cancel_on: Mutex<Option<(String, CancellationToken)>>,
    /// Reading this item's summary hangs forever after notifying `hung`.
    pub hang_on: Mutex<Option<String>>,
    pub hung: Arc<Notify>,
}

impl FakeHost {
    pub fn new(url: &str, items_per_page: Vec<usize>) -> Self {
        let mode = PageKind::from_url(url)
            .mode()
            .unwrap_or(Mode::Jobs);
        Self {
            mode,
            items_per_page,
            state: Mutex::new(HostState {
                url: url.to_string(),
                ..Default::default()
            }),
            failing: HashSet::new(),
            seen: HashSet::new(),
            stale_detail: HashSet::new(),
            pane_lag: Mutex::new(HashMap::new()),
            navigate_override: None,
            cancel_on: Mutex::new(None),
            hang_on: Mutex::new(None),
            hung: Arc::new(Notify::new()),
        }
    }

    pub fn jobs(items_per_page: Vec<usize>) -> Self {
        Self::new(JOBS_URL, items_per_page)
    }

    fn page(&self) -> u32 {
        let url = self.state.lock().unwrap().url.clone();
        self.mode.page_from_url(&url)
    }

    fn page_items(&self) -> Vec<String> {
        let page = self.page();
        let n = self
            .items_per_page
            .get(page as usize - 1)
            .copied()
            .unwrap_or(0);
        (0..n).map(|i| item_id(page, i)).collect()
    }

    pub fn set_url(&self, url: &str) {
        self.state.lock().unwrap().url = url.to_string();
    }

    pub fn url(&self) -> String {
        self.state.lock().unwrap().url.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn selects(&self) -> Vec<String> {
        self.state.lock().unwrap().selects.clone()
    }

    pub fn summaries(&self) -> Vec<String> {
        self.state.lock().unwrap().summaries.clone()
    }

    fn check_present(&self, id: &str) -> Result<(), HostError> {
        if self.page_items().iter().any(|i| i == id) {
            Ok(())
        } else {
            Err(HostError::MissingItem(id.to_string()))
        }
    }
}

#[async_trait]
impl HostPage for FakeHost {
    async fn current_url(&self) -> Result<String, HostError> {
        Ok(self.url())
    }

    async fn placeholder_ids(&self) -> Result<Vec<String>, HostError> {
        let all = self.page_items();
        let mut st = self.state.lock().unwrap();
        st.polls_since_nav += 1;
        let visible = (st.polls_since_nav * 10).min(all.len());
        Ok(all[..visible].to_vec())
    }

    async fn rendered_ids(&self) -> Result<Vec<String>, HostError> {
        Ok(self.page_items())
    }

    async fn is_rendered(&self, id: &str) -> Result<bool, HostError> {
        Ok(self.page_items().iter().any(|i| i == id))
    }

    async fn scroll_into_view(&self, id: &str) -> Result<(), HostError> {
        self.check_present(id)
    }

    async fn summary(&self, id: &str) -> Result<SummarySnapshot, HostError> {
        self.state.lock().unwrap().summaries.push(id.to_string());

        let hang = self.hang_on.lock().unwrap().as_deref() == Some(id);
        if hang {
            *self.hang_on.lock().unwrap() = None;
            self.hung.notify_one();
            std::future::pending::<()>().await;
        }
        if self.failing.contains(id) {
            return Err(HostError::Script(format!("card {} has no title", id)));
        }
        self.check_present(id)?;
        if let Some((cancel_id, token)) = self.cancel_on.lock().unwrap().as_ref() {
            if cancel_id == id {
                token.cancel();
            }
        }
        Ok(SummarySnapshot {
            id: id.to_string(),
            title: format!("Title {}", id),
            subtitle: match self.mode {
                Mode::Jobs => "Acme".into(),
                Mode::People => "2nd".into(),
            },
            headline: format!("Headline {}", id),
            location: "Remote".into(),
            link: format!("https://www.linkedin.com/jobs/view/{}/", id),
            seen: self.seen.contains(id),
            text: format!("{} Rust engineer at Acme", tag(id)),
        })
    }

    async fn select(&self, id: &str) -> Result<(), HostError> {
        self.check_present(id)?;
        let mut st = self.state.lock().unwrap();
        st.selects.push(id.to_string());
        if !self.stale_detail.contains(id) {
            st.selected = Some(id.to_string());
        }
        Ok(())
    }

    async fn detail_item_id(&self) -> Result<Option<String>, HostError> {
        Ok(self.state.lock().unwrap().selected.clone())
    }

    async fn expand_detail(&self) -> Result<(), HostError> {
        Ok(())
    }

    async fn read_detail(&self) -> Result<DetailSnapshot, HostError> {
        let selected = self
            .state
            .lock()
            .unwrap()
            .selected
            .clone()
            .ok_or_else(|| HostError::Script("no detail pane".into()))?;
        if let Some(left) = self.pane_lag.lock().unwrap().get_mut(&selected) {
            if *left > 0 {
                if *left != usize::MAX {
                    *left -= 1;
                }
                return Ok(DetailSnapshot {
                    id: STALE_JOB.into(),
                    title: "Stale previous job".into(),
                    company: "Previous Co".into(),
                    description: format!("{} Previous description.", tag(STALE_JOB)),
                    ..Default::default()
                });
            }
        }
        Ok(DetailSnapshot {
            id: selected.clone(),
            title: format!("Title {}", selected),
            company: "Acme Corp".into(),
            workplace_type: "Remote".into(),
            employment_type: "Full-time".into(),
            description: format!("{} Full description of the role.", tag(&selected)),
            ..Default::default()
        })
    }

    async fn has_next_page(&self) -> Result<bool, HostError> {
        Ok((self.page() as usize) < self.items_per_page.len())
    }

    async fn navigate(&self, url: &str) -> Result<(), HostError> {
        let mut st = self.state.lock().unwrap();
        st.navigations.push(url.to_string());
        st.url = self
            .navigate_override
            .clone()
            .unwrap_or_else(|| url.to_string());
        st.polls_since_nav = 0;
        st.selected = None;
        Ok(())
    }

    async fn scroll_by(&self, _region: ScrollRegion, _pixels: i64) -> Result<(), HostError> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Evaluator
// ─────────────────────────────────────────────────────────────────────────────

/// Decisions keyed by item id; anything unscripted is kept.
#[derive(Default)]
pub struct ScriptedEvaluator {
    pub available: bool,
    pub failing: bool,
    pub triage: HashMap<String, Triage>,
    pub detail: HashMap<String, Verdict>,
    /// Summary evaluations never answer.
    pub stall: bool,
    pub triage_calls: Mutex<Vec<String>>,
    pub detail_calls: Mutex<Vec<String>>,
    pub resets: AtomicUsize,
}

impl ScriptedEvaluator {
    pub fn available() -> Self {
        Self {
            available: true,
            ..Default::default()
        }
    }

    fn id_in(&self, text: &str, keys: impl Iterator<Item = String>) -> Option<String> {
        keys.into_iter().find(|id| text.contains(&tag(id)))
    }

    pub fn detail_calls_for(&self, id: &str) -> usize {
        self.detail_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.contains(&tag(id)))
            .count()
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Evaluator for ScriptedEvaluator {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }

    async fn evaluate_summary(&self, summary: &str) -> Result<Verdict, EvaluatorError> {
        self.triage_calls.lock().unwrap().push(summary.to_string());
        if self.stall {
            std::future::pending::<()>().await;
        }
        if self.failing {
            return Err(EvaluatorError::Request("connection refused".into()));
        }
        Ok(
            match self
                .id_in(summary, self.triage.keys().cloned())
                .and_then(|id| self.triage.get(&id).copied())
            {
                Some(Triage::Reject) => Verdict::Reject,
                _ => Verdict::Keep,
            },
        )
    }

    async fn triage(&self, summary: &str) -> Result<Triage, EvaluatorError> {
        self.triage_calls.lock().unwrap().push(summary.to_string());
        if self.stall {
            std::future::pending::<()>().await;
        }
        if self.failing {
            return Err(EvaluatorError::Request("connection refused".into()));
        }
        Ok(self
            .id_in(summary, self.triage.keys().cloned())
            .and_then(|id| self.triage.get(&id).copied())
            .unwrap_or(Triage::Keep))
    }

    async fn evaluate_detail(&self, detail: &str) -> Result<Verdict, EvaluatorError> {
        self.detail_calls.lock().unwrap().push(detail.to_string());
        if self.failing {
            return Err(EvaluatorError::Request("connection refused".into()));
        }
        Ok(self
            .id_in(detail, self.detail.keys().cloned())
            .and_then(|id| self.detail.get(&id).copied())
            .unwrap_or(Verdict::Keep))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sink and store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Flush {
    pub mode: Mode,
    pub records: Vec<Record>,
    pub formats: Vec<ExportFormat>,
}

impl Flush {
    pub fn ids(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| match r {
                Record::Job(j) => j.job_id.clone(),
                Record::Person(p) => p.name.trim_start_matches("Title ").to_string(),
            })
            .collect()
    }
}

#[derive(Default)]
pub struct MemorySink {
    pub flushes: Mutex<Vec<Flush>>,
    /// Every flush fails with a write error while set.
    pub failing: AtomicBool,
}

impl MemorySink {
    pub fn flushes(&self) -> Vec<Flush> {
        self.flushes.lock().unwrap().clone()
    }

    pub fn only(&self) -> Flush {
        let flushes = self.flushes();
        assert_eq!(flushes.len(), 1, "expected exactly one flush");
        flushes[0].clone()
    }
}

impl ResultSink for MemorySink {
    fn flush(
        &self,
        mode: Mode,
        records: &[Record],
        formats: &[ExportFormat],
    ) -> Result<Vec<PathBuf>, ExportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ExportError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "output directory is read-only",
            )));
        }
        self.flushes.lock().unwrap().push(Flush {
            mode,
            records: records.to_vec(),
            formats: formats.to_vec(),
        });
        Ok(formats
            .iter()
            .map(|f| PathBuf::from(format!("{}.{}", mode.label(), f.extension())))
            .collect())
    }
}

/// Memory backend that records the result-buffer length on every write and
/// the keys of every batched write.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    pub result_lengths: Mutex<Vec<usize>>,
    /// Keys written by single `set` calls, in order.
    pub single_writes: Mutex<Vec<String>>,
    pub batches: Mutex<Vec<Vec<String>>>,
    pub clears: AtomicUsize,
}

impl RecordingStore {
    fn note_results(&self, key: &str, value: &Value) {
        if key == "results" {
            let len = value.as_array().map(|a| a.len()).unwrap_or(0);
            self.result_lengths.lock().unwrap().push(len);
        }
    }
}

impl KeyValueStore for RecordingStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.note_results(key, &value);
        self.single_writes.lock().unwrap().push(key.to_string());
        self.inner.set(key, value)
    }

    fn set_many(&self, entries: Vec<(&str, Value)>) -> Result<(), StoreError> {
        for (key, value) in &entries {
            self.note_results(key, value);
        }
        self.batches
            .lock()
            .unwrap()
            .push(entries.iter().map(|(k, _)| k.to_string()).collect());
        self.inner.set_many(entries)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wiring
// ─────────────────────────────────────────────────────────────────────────────

pub fn test_config(mode: EvaluatorMode) -> ScoutConfig {
    let mut cfg = ScoutConfig::default();
    cfg.evaluator.mode = mode;
    cfg
}

pub struct Rig {
    pub host: Arc<FakeHost>,
    pub store: SessionStore,
    pub evaluator: Arc<ScriptedEvaluator>,
    pub sink: Arc<MemorySink>,
    pub config: ScoutConfig,
}

impl Rig {
    pub fn new(host: FakeHost, evaluator: ScriptedEvaluator, config: ScoutConfig) -> Self {
        Self::with_store(host, evaluator, config, SessionStore::in_memory())
    }

    pub fn with_store(
        host: FakeHost,
        evaluator: ScriptedEvaluator,
        config: ScoutConfig,
        store: SessionStore,
    ) -> Self {
        Self {
            host: Arc::new(host),
            store,
            evaluator: Arc::new(evaluator),
            sink: Arc::new(MemorySink::default()),
            config,
        }
    }

    /// A fresh controller over the same host, store, evaluator and sink.
    pub fn controller(&self) -> Controller {
        let (status, _rx) = StatusLine::new();
        Controller::new(
            self.host.clone(),
            self.store.clone(),
            self.evaluator.clone(),
            self.sink.clone(),
            self.config.clone(),
            status,
        )
    }
}
