//! [`HostPage`] over a live chromiumoxide tab.
//!
//! Page scripts only locate elements and hand back attributes or `outerHTML`;
//! field extraction happens in [`super::extract`].

use super::browser_manager::wait_until_stable;
use super::extract::{
    job_id_from_url, parse_job_card, parse_job_detail, parse_person_card, placeholder_selector,
    rendered_selector, selectors,
};
use super::host::{HostPage, ScrollRegion};
use crate::core::error::HostError;
use crate::core::types::{DetailSnapshot, Mode, PageKind, SummarySnapshot};
use async_trait::async_trait;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// JSON-encode `s` for embedding as a JS string literal.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// JS expression evaluating to the first element under `sel` whose `attr` equals `id`, or null.
fn find_by_attr(sel: &str, attr: &str, id: &str) -> String {
    format!(
        "(Array.from(document.querySelectorAll({sel})).find(e => e.getAttribute({attr}) === {id}) || null)",
        sel = js_str(sel),
        attr = js_str(attr),
        id = js_str(id),
    )
}

pub struct CdpHost {
    page: Page,
}

impl CdpHost {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn eval<T: DeserializeOwned>(&self, js: String) -> Result<T, HostError> {
        self.page
            .evaluate(js)
            .await
            .map_err(|e| HostError::Cdp(e.to_string()))?
            .into_value::<T>()
            .map_err(|e| HostError::Script(e.to_string()))
    }

    /// Listing layout of the current tab. Non-listing pages read as jobs;
    /// the controller never drives those.
    async fn mode(&self) -> Result<Mode, HostError> {
        Ok(self.page_kind().await?.mode().unwrap_or(Mode::Jobs))
    }

    async fn ids(&self, sel: &str, attr: &str) -> Result<Vec<String>, HostError> {
        let js = format!(
            "(() => Array.from(document.querySelectorAll({sel})).map(e => e.getAttribute({attr})).filter(Boolean))()",
            sel = js_str(sel),
            attr = js_str(attr),
        );
        self.eval(js).await
    }

    async fn placeholder_html(&self, id: &str) -> Result<Option<String>, HostError> {
        let (sel, attr) = placeholder_selector(self.mode().await?);
        let js = format!(
            "(() => {{ const el = {}; return el ? el.outerHTML : null; }})()",
            find_by_attr(sel, attr, id)
        );
        self.eval(js).await
    }

    async fn detail_html(&self) -> Result<Option<String>, HostError> {
        let js = format!(
            "(() => {{ const el = document.querySelector({}); return el ? el.outerHTML : null; }})()",
            js_str(selectors::JOB_DETAIL)
        );
        self.eval(js).await
    }
}

#[async_trait]
impl HostPage for CdpHost {
    async fn current_url(&self) -> Result<String, HostError> {
        self.page
            .url()
            .await
            .map(Option::unwrap_or_default)
            .map_err(|e| HostError::Cdp(e.to_string()))
    }

    async fn page_kind(&self) -> Result<PageKind, HostError> {
        Ok(PageKind::from_url(&self.current_url().await?))
    }

    async fn placeholder_ids(&self) -> Result<Vec<String>, HostError> {
        let (sel, attr) = placeholder_selector(self.mode().await?);
        self.ids(sel, attr).await
    }

    async fn rendered_ids(&self) -> Result<Vec<String>, HostError> {
        let (sel, attr) = rendered_selector(self.mode().await?);
        self.ids(sel, attr).await
    }

    async fn is_rendered(&self, id: &str) -> Result<bool, HostError> {
        let (sel, attr) = rendered_selector(self.mode().await?);
        self.eval(format!("(() => !!{})()", find_by_attr(sel, attr, id)))
            .await
    }

    async fn scroll_into_view(&self, id: &str) -> Result<(), HostError> {
        let (sel, attr) = placeholder_selector(self.mode().await?);
        let js = format!(
            "(() => {{ const el = {}; if (!el) return false; el.scrollIntoView({{block: 'center', behavior: 'smooth'}}); return true; }})()",
            find_by_attr(sel, attr, id)
        );
        if self.eval::<bool>(js).await? {
            Ok(())
        } else {
            Err(HostError::MissingItem(id.to_string()))
        }
    }

    async fn summary(&self, id: &str) -> Result<SummarySnapshot, HostError> {
        let html = self
            .placeholder_html(id)
            .await?
            .ok_or_else(|| HostError::MissingItem(id.to_string()))?;
        Ok(match self.mode().await? {
            Mode::Jobs => parse_job_card(&html, id),
            Mode::People => parse_person_card(&html, id),
        })
    }

    async fn select(&self, id: &str) -> Result<(), HostError> {
        if self.mode().await? == Mode::People {
            return Ok(());
        }
        let js = format!(
            "(() => {{ const li = {}; if (!li) return false; \
               const t = li.querySelector('a.job-card-container__link') || li.querySelector('.job-card-container') || li; \
               t.click(); return true; }})()",
            find_by_attr(selectors::JOB_PLACEHOLDER, selectors::JOB_PLACEHOLDER_ATTR, id)
        );
        if self.eval::<bool>(js).await? {
            Ok(())
        } else {
            Err(HostError::MissingItem(id.to_string()))
        }
    }

    async fn detail_item_id(&self) -> Result<Option<String>, HostError> {
        if self.mode().await? == Mode::People {
            return Ok(None);
        }
        // The URL switches on click, the pane body only once it re-renders.
        let pane = self
            .detail_html()
            .await?
            .map(|html| parse_job_detail(&html).id)
            .filter(|id| !id.is_empty());
        if pane.is_some() {
            return Ok(pane);
        }
        Ok(job_id_from_url(&self.current_url().await?))
    }

    async fn expand_detail(&self) -> Result<(), HostError> {
        let js = format!(
            "(() => {{ let n = 0; document.querySelectorAll({}).forEach(b => {{ \
               if (b.getAttribute('aria-expanded') !== 'true') {{ b.click(); n++; }} }}); return n; }})()",
            js_str(selectors::JOB_SEE_MORE)
        );
        let clicked: u32 = self.eval(js).await?;
        debug!("cdp_host: expanded {} detail sections", clicked);
        Ok(())
    }

    async fn read_detail(&self) -> Result<DetailSnapshot, HostError> {
        let html = self
            .detail_html()
            .await?
            .ok_or_else(|| HostError::Script("detail pane not found".into()))?;
        Ok(parse_job_detail(&html))
    }

    async fn has_next_page(&self) -> Result<bool, HostError> {
        let js = format!(
            "(() => {{ const b = document.querySelector({}); \
               return !!b && !b.disabled && b.getAttribute('aria-disabled') !== 'true'; }})()",
            js_str(selectors::NEXT_PAGE)
        );
        self.eval(js).await
    }

    async fn navigate(&self, url: &str) -> Result<(), HostError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| HostError::Navigation(format!("{}: {}", url, e)))?;
        wait_until_stable(&self.page, Duration::from_millis(1500), Duration::from_secs(15)).await;
        Ok(())
    }

    async fn scroll_by(&self, region: ScrollRegion, pixels: i64) -> Result<(), HostError> {
        let target = match (region, self.mode().await?) {
            (ScrollRegion::List, Mode::Jobs) => Some(selectors::JOB_LIST_SCROLLER),
            (ScrollRegion::Detail, Mode::Jobs) => Some(selectors::JOB_DETAIL),
            (_, Mode::People) => None,
        };
        let js = match target {
            Some(sel) => format!(
                "(() => {{ const el = document.querySelector({}); \
                   (el || window).scrollBy({{top: {}, behavior: 'smooth'}}); return true; }})()",
                js_str(sel),
                pixels
            ),
            None => format!(
                "(() => {{ window.scrollBy({{top: {}, behavior: 'smooth'}}); return true; }})()",
                pixels
            ),
        };
        self.eval::<bool>(js).await.map(|_| ())
    }
}
