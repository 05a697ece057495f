//! Session Controller: the per-item state machine.
//!
//! ```text
//! Idle ─start─▶ DiscoveringPage ─items─▶ ProcessingItem(0) ─▶ … ─▶ ProcessingItem(n)
//!                    │ zero items                                      │
//!                    ▼                                                 ▼
//!                Finishing ◀──── done / no next page ──────────── AdvancingPage
//!                    ▲                                                 │ more pages
//!                 Stopped ◀── stop() from any state      navigate, then resume path
//! ```
//!
//! The store is the only state that crosses a navigation. After every page
//! change the controller drops what it knows and re-enters through the same
//! path a restarted process uses: read the cursor, check the page kind, and
//! continue at `ProcessingItem(item_index)` when the current page's ids are
//! cached, otherwise at `DiscoveringPage`.

use super::processor::{ItemOutcome, ItemProcessor, SkipReason};
use crate::core::config::ScoutConfig;
use crate::core::error::{ScoutError, StoreError};
use crate::core::status::{Status, StatusLine};
use crate::core::types::{ExportFormat, Mode, PageKind, Session, SessionCursor};
use crate::export::ResultSink;
use crate::features::evaluator::Evaluator;
use crate::features::session_store::SessionStore;
use crate::scraping::discovery::discover_items;
use crate::scraping::host::HostPage;
use crate::scraping::humanize::Humanizer;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    DiscoveringPage,
    ProcessingItem(usize),
    AdvancingPage,
    Finishing,
    Stopped,
}

fn log_state(state: ControllerState) {
    info!("controller_state={:?}", state);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub pages: u32,
    pub formats: Vec<ExportFormat>,
}

/// What a finished run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub mode: Option<Mode>,
    pub records: usize,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Target reached, no further pages, or a page with zero items.
    Completed(RunSummary),
    Stopped(RunSummary),
    /// `start` on a page that is not a supported search listing.
    WrongPage { found: PageKind },
    /// `resume` / `abandon` with nothing persisted.
    NoSession,
    /// Navigation mismatch, an unclassified error or a failed export. Data was
    /// flushed, or kept in the store when the export itself failed.
    Aborted { reason: String, summary: RunSummary },
}

impl RunOutcome {
    fn into_summary(self) -> RunSummary {
        match self {
            RunOutcome::Completed(s) | RunOutcome::Stopped(s) => s,
            RunOutcome::Aborted { summary, .. } => summary,
            RunOutcome::WrongPage { .. } | RunOutcome::NoSession => RunSummary::default(),
        }
    }
}

/// How the page cycle ended, before Finishing.
#[derive(Debug)]
enum Ending {
    Completed,
    NoItems { page: u32 },
    Stopped,
    Mismatch { expected: Mode, found: PageKind },
    Failed(ScoutError),
}

enum PageEnd {
    Done,
    NoItems,
    Navigated,
    Stopped,
}

/// Drives one run. `stop` is sticky: build a new controller for the next run.
pub struct Controller {
    host: Arc<dyn HostPage>,
    store: SessionStore,
    evaluator: Arc<dyn Evaluator>,
    sink: Arc<dyn ResultSink>,
    config: ScoutConfig,
    cancel: CancellationToken,
    status: StatusLine,
}

impl Controller {
    pub fn new(
        host: Arc<dyn HostPage>,
        store: SessionStore,
        evaluator: Arc<dyn Evaluator>,
        sink: Arc<dyn ResultSink>,
        config: ScoutConfig,
        status: StatusLine,
    ) -> Self {
        Self {
            host,
            store,
            evaluator,
            sink,
            config,
            cancel: CancellationToken::new(),
            status,
        }
    }

    /// Handle for stopping from another task (Ctrl-C).
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn status(&self) -> &StatusLine {
        &self.status
    }

    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!("controller: stop requested");
            self.cancel.cancel();
        }
    }

    /// Begin a new session on the page the host currently shows.
    pub async fn start(&self, request: StartRequest) -> Result<RunOutcome, ScoutError> {
        if let Some(existing) = self.store.load_cursor() {
            return Err(ScoutError::SessionActive {
                mode: existing.mode,
                page: existing.current_page,
            });
        }

        let url = self.host.current_url().await?;
        let found = PageKind::from_url(&url);
        let Some(mode) = found.mode() else {
            warn!("controller: cannot start on {} ({:?})", url, found);
            self.status.set(Status::WrongPage { expected: None });
            log_state(ControllerState::Idle);
            return Ok(RunOutcome::WrongPage { found });
        };

        let mut formats: Vec<ExportFormat> = Vec::new();
        for format in request.formats {
            if !format.supports(mode) {
                warn!("controller: {:?} export is not available for {}, dropping it", format, mode);
            } else if !formats.contains(&format) {
                formats.push(format);
            }
        }
        if formats.is_empty() {
            formats.push(ExportFormat::Xlsx);
        }

        let session = Session::new(mode, &url, request.pages, formats);
        info!(
            "controller: starting {} run at page {} for {} page(s)",
            mode, session.cursor.start_page, session.cursor.target_pages
        );
        self.store.begin(&session)?;
        Ok(self.run().await)
    }

    /// Continue the persisted session from the store alone.
    pub async fn resume(&self) -> Result<RunOutcome, ScoutError> {
        if !self.store.is_active() {
            info!("controller: nothing to resume");
            return Ok(RunOutcome::NoSession);
        }
        Ok(self.run().await)
    }

    /// Flush and clear a persisted session that nothing is driving.
    pub async fn abandon(&self) -> RunOutcome {
        if !self.store.is_active() {
            return RunOutcome::NoSession;
        }
        log_state(ControllerState::Stopped);
        self.finish(Ending::Stopped).await
    }

    async fn run(&self) -> RunOutcome {
        let ending = match self.drive().await {
            Ok(ending) => ending,
            Err(e) => {
                error!("controller: run aborted: {}", e);
                Ending::Failed(e)
            }
        };
        if matches!(ending, Ending::Stopped) {
            log_state(ControllerState::Stopped);
        }
        self.finish(ending).await
    }

    async fn drive(&self) -> Result<Ending, ScoutError> {
        loop {
            let cursor = self.store.load_cursor().ok_or(StoreError::NoSession)?;

            let found = self.host.page_kind().await?;
            let expected = cursor.mode.expected_page_kind();
            if found != expected {
                warn!(
                    "controller: expected {:?} but host shows {:?}, ending session",
                    expected, found
                );
                return Ok(Ending::Mismatch {
                    expected: cursor.mode,
                    found,
                });
            }

            match self.run_page(&cursor).await? {
                PageEnd::Navigated => continue,
                PageEnd::Done => return Ok(Ending::Completed),
                PageEnd::NoItems => {
                    return Ok(Ending::NoItems {
                        page: cursor.current_page,
                    })
                }
                PageEnd::Stopped => return Ok(Ending::Stopped),
            }
        }
    }

    async fn run_page(&self, cursor: &SessionCursor) -> Result<PageEnd, ScoutError> {
        let host = self.host.as_ref();
        let humanizer = Humanizer::new(self.config.timing.clone());
        let page = cursor.current_page;

        let (ids, start_index) = match cursor.cached_ids() {
            Some(ids) => {
                info!(
                    "controller: resuming page {} at item {}/{}",
                    page,
                    cursor.item_index,
                    ids.len()
                );
                (ids.to_vec(), cursor.item_index)
            }
            None => {
                log_state(ControllerState::DiscoveringPage);
                self.status.set(Status::Discovering { page });
                self.evaluator.reset().await;

                let ids =
                    discover_items(host, &self.config.polling.discovery_policy(), &self.cancel)
                        .await?;
                if self.cancel.is_cancelled() {
                    return Ok(PageEnd::Stopped);
                }
                if ids.is_empty() {
                    warn!("controller: page {} has no items", page);
                    self.status.set(Status::NoItems { page });
                    return Ok(PageEnd::NoItems);
                }
                self.store.cache_item_ids(page, &ids)?;
                if !humanizer.scan_page(host, &self.cancel).await {
                    return Ok(PageEnd::Stopped);
                }
                (ids, 0)
            }
        };

        let processor = ItemProcessor::new(
            Arc::clone(&self.host),
            Arc::clone(&self.evaluator),
            &self.config,
            cursor.mode,
        );

        let mut index = start_index;
        while index < ids.len() {
            if self.cancel.is_cancelled() {
                return Ok(PageEnd::Stopped);
            }
            log_state(ControllerState::ProcessingItem(index));
            self.status.set(Status::Processing {
                page: cursor.pages_done(),
                pages_total: cursor.target_pages,
                item: index,
                items: ids.len(),
                collected: self.store.results_len(),
            });

            match processor.process(&ids[index], &self.cancel).await {
                ItemOutcome::Record(record) => {
                    let total = self.store.append_record_and_advance(&record, index + 1)?;
                    info!("controller: item {} collected ({} total)", index, total);
                }
                ItemOutcome::Skipped(SkipReason::Cancelled) => return Ok(PageEnd::Stopped),
                ItemOutcome::Skipped(reason) => {
                    info!("controller: item {} skipped: {:?}", index, reason);
                    self.store.set_item_index(index + 1)?;
                }
            }

            index += 1;

            if index < ids.len() && !humanizer.pause_between_items(&self.cancel).await {
                return Ok(PageEnd::Stopped);
            }
        }

        log_state(ControllerState::AdvancingPage);
        if cursor.pages_done() >= cursor.target_pages {
            info!("controller: reached {} page(s)", cursor.target_pages);
            return Ok(PageEnd::Done);
        }
        if self.cancel.is_cancelled() {
            return Ok(PageEnd::Stopped);
        }
        if !host.has_next_page().await? {
            info!("controller: no page after {}", page);
            return Ok(PageEnd::Done);
        }

        let next = page + 1;
        self.status.set(Status::Advancing { next_page: next });
        self.store.advance_to_page(next)?;
        let url = cursor.mode.page_url(&cursor.base_url, next);
        info!("controller: navigating to page {}: {}", next, url);
        host.navigate(&url).await?;
        Ok(PageEnd::Navigated)
    }

    /// Flush, clear, settle. Runs on every terminal path.
    ///
    /// A failed export keeps the session in the store so `abandon` can retry
    /// the flush; nothing collected is dropped.
    async fn finish(&self, ending: Ending) -> RunOutcome {
        log_state(ControllerState::Finishing);
        if matches!(ending, Ending::Stopped) {
            self.status.set(Status::Stopping);
        }

        let cursor = self.store.load_cursor();
        let records = self.store.results();
        let mode = cursor.as_ref().map(|c| c.mode);
        let mut export_error: Option<ScoutError> = None;

        let files = match (&cursor, records.is_empty()) {
            (Some(c), false) => match self.sink.flush(c.mode, &records, &c.formats) {
                Ok(files) => files,
                Err(e) => {
                    error!("controller: export failed, keeping session for retry: {}", e);
                    export_error = Some(ScoutError::Export(e));
                    Vec::new()
                }
            },
            _ => Vec::new(),
        };

        if export_error.is_none() {
            if let Err(e) = self.store.clear() {
                error!("controller: failed to clear session: {}", e);
            }
        }
        tokio::time::sleep(self.config.polling.settle_delay()).await;

        let summary = RunSummary {
            mode,
            records: records.len(),
            files,
        };

        let (status, outcome) = match ending {
            Ending::Completed => (Status::Done { records: summary.records }, RunOutcome::Completed(summary)),
            Ending::NoItems { page } if summary.records == 0 => {
                (Status::NoItems { page }, RunOutcome::Completed(summary))
            }
            Ending::NoItems { .. } => (Status::Done { records: summary.records }, RunOutcome::Completed(summary)),
            Ending::Stopped => (Status::Done { records: summary.records }, RunOutcome::Stopped(summary)),
            Ending::Mismatch { expected, found } => (
                Status::WrongPage {
                    expected: Some(expected),
                },
                RunOutcome::Aborted {
                    reason: format!("expected a {} listing, host shows {:?}", expected, found),
                    summary,
                },
            ),
            Ending::Failed(e) => (
                Status::Error(e.to_string()),
                RunOutcome::Aborted {
                    reason: e.to_string(),
                    summary,
                },
            ),
        };
        let (status, outcome) = match export_error {
            Some(e) => (
                Status::Error(e.to_string()),
                RunOutcome::Aborted {
                    reason: e.to_string(),
                    summary: outcome.into_summary(),
                },
            ),
            None => (status, outcome),
        };
        self.status.set(status);
        log_state(ControllerState::Idle);
        outcome
    }
}
