//! Page/list discovery against a virtualized result list.
//!
//! The host renders a sliding window of entries; the rest are inert
//! placeholders that still carry the identifier attribute. Right after a
//! navigation the placeholders are still being inserted, so one snapshot can
//! under-count. Discovery polls the placeholder count and accepts it once it
//! has held for `stable_polls` consecutive reads, or when `max_polls` runs out.
//! This is best-effort: eventually stable, not guaranteed complete.

use super::host::HostPage;
use super::poll::{poll_until, sleep_cancellable};
use crate::core::error::HostError;
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryPolicy {
    pub poll_interval: Duration,
    /// Consecutive equal non-zero counts required to accept.
    pub stable_polls: u32,
    pub max_polls: u32,
}

impl Default for DiscoveryPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            stable_polls: 3,
            max_polls: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RenderPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_millis(300),
        }
    }
}

/// Deduplicate, keeping first-seen order.
pub fn dedupe_ordered(ids: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| !id.trim().is_empty())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Enumerate every item identifier on the current page.
///
/// Zero placeholders after the poll budget falls back to whatever is rendered.
/// Cancellation stops further polls and returns the last observation.
pub async fn discover_items(
    host: &dyn HostPage,
    policy: &DiscoveryPolicy,
    cancel: &CancellationToken,
) -> Result<Vec<String>, HostError> {
    let mut last: Vec<String> = Vec::new();
    let mut last_count: Option<usize> = None;
    let mut streak = 0u32;
    let max_polls = policy.max_polls.max(1);

    for poll in 1..=max_polls {
        let ids = dedupe_ordered(host.placeholder_ids().await?);
        let count = ids.len();

        if count > 0 && last_count == Some(count) {
            streak += 1;
        } else {
            streak = if count > 0 { 1 } else { 0 };
        }
        last_count = Some(count);
        last = ids;
        debug!("discovery: poll {} count={} streak={}", poll, count, streak);

        if streak >= policy.stable_polls {
            info!("discovery: {} items stable after {} polls", count, poll);
            break;
        }
        if poll == max_polls {
            info!("discovery: poll budget exhausted at {} items", count);
            break;
        }
        if !sleep_cancellable(policy.poll_interval, cancel).await {
            info!("discovery: cancelled after {} polls", poll);
            break;
        }
    }

    if last.is_empty() {
        let rendered = dedupe_ordered(host.rendered_ids().await?);
        if !rendered.is_empty() {
            warn!(
                "discovery: no placeholders, falling back to {} rendered items",
                rendered.len()
            );
        }
        return Ok(rendered);
    }
    Ok(last)
}

/// Make sure `id` is rendered, scrolling it into view if needed.
///
/// Returns `false` when it never rendered within the attempt budget.
pub async fn ensure_rendered(
    host: &dyn HostPage,
    id: &str,
    policy: &RenderPolicy,
    cancel: &CancellationToken,
) -> Result<bool, HostError> {
    if host.is_rendered(id).await? {
        return Ok(true);
    }
    host.scroll_into_view(id).await?;
    let outcome = poll_until(
        move || async move {
            match host.is_rendered(id).await {
                Ok(true) => Some(()),
                Ok(false) => None,
                Err(e) => {
                    debug!("discovery: render probe for {} failed: {}", id, e);
                    None
                }
            }
        },
        policy.delay,
        policy.attempts,
        cancel,
    )
    .await;
    Ok(outcome.found().is_some())
}
