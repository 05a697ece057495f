//! The host page as seen by the scraping core.
//!
//! Everything site-specific (selectors, scripts, click targets) lives behind
//! this trait. `CdpHost` drives a live browser tab; tests drive scripted fakes.

use crate::core::error::HostError;
use crate::core::types::{DetailSnapshot, PageKind, SummarySnapshot};
use async_trait::async_trait;

/// Scroll targets used by the human-pacing layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollRegion {
    /// The result list (left rail for jobs, main column for people).
    List,
    /// The detail pane of the selected item.
    Detail,
}

#[async_trait]
pub trait HostPage: Send + Sync {
    async fn current_url(&self) -> Result<String, HostError>;

    async fn page_kind(&self) -> Result<PageKind, HostError> {
        Ok(PageKind::from_url(&self.current_url().await?))
    }

    /// Identifiers carried by list placeholders, rendered or not, in DOM order.
    async fn placeholder_ids(&self) -> Result<Vec<String>, HostError>;

    /// Identifiers of fully rendered entries only.
    async fn rendered_ids(&self) -> Result<Vec<String>, HostError>;

    async fn is_rendered(&self, id: &str) -> Result<bool, HostError>;

    async fn scroll_into_view(&self, id: &str) -> Result<(), HostError>;

    async fn summary(&self, id: &str) -> Result<SummarySnapshot, HostError>;

    /// Bring `id` into the detail pane (click the card).
    async fn select(&self, id: &str) -> Result<(), HostError>;

    /// Identifier of the item the detail pane currently shows.
    async fn detail_item_id(&self) -> Result<Option<String>, HostError>;

    /// Expand collapsed sections ("see more") of the detail pane.
    async fn expand_detail(&self) -> Result<(), HostError>;

    async fn read_detail(&self) -> Result<DetailSnapshot, HostError>;

    async fn has_next_page(&self) -> Result<bool, HostError>;

    /// Load `url`. Any in-page state is gone afterwards.
    async fn navigate(&self, url: &str) -> Result<(), HostError>;

    async fn scroll_by(&self, region: ScrollRegion, pixels: i64) -> Result<(), HostError>;
}

/// Host for offline operations (flushing a session nothing is driving).
/// Every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedHost;

#[async_trait]
impl HostPage for DetachedHost {
    async fn current_url(&self) -> Result<String, HostError> {
        Err(HostError::Cdp("no browser attached".into()))
    }
    async fn placeholder_ids(&self) -> Result<Vec<String>, HostError> {
        Err(HostError::Cdp("no browser attached".into()))
    }
    async fn rendered_ids(&self) -> Result<Vec<String>, HostError> {
        Err(HostError::Cdp("no browser attached".into()))
    }
    async fn is_rendered(&self, id: &str) -> Result<bool, HostError> {
        Err(HostError::MissingItem(id.to_string()))
    }
    async fn scroll_into_view(&self, id: &str) -> Result<(), HostError> {
        Err(HostError::MissingItem(id.to_string()))
    }
    async fn summary(&self, id: &str) -> Result<SummarySnapshot, HostError> {
        Err(HostError::MissingItem(id.to_string()))
    }
    async fn select(&self, id: &str) -> Result<(), HostError> {
        Err(HostError::MissingItem(id.to_string()))
    }
    async fn detail_item_id(&self) -> Result<Option<String>, HostError> {
        Ok(None)
    }
    async fn expand_detail(&self) -> Result<(), HostError> {
        Ok(())
    }
    async fn read_detail(&self) -> Result<DetailSnapshot, HostError> {
        Err(HostError::Cdp("no browser attached".into()))
    }
    async fn has_next_page(&self) -> Result<bool, HostError> {
        Ok(false)
    }
    async fn navigate(&self, url: &str) -> Result<(), HostError> {
        Err(HostError::Navigation(format!("{}: no browser attached", url)))
    }
    async fn scroll_by(&self, _region: ScrollRegion, _pixels: i64) -> Result<(), HostError> {
        Ok(())
    }
}
