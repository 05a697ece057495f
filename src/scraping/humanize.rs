//! Human pacing: randomized dwell times and scroll passes.
//!
//! Every wait here is cancellable.

use super::host::{HostPage, ScrollRegion};
use super::poll::sleep_cancellable;
use crate::core::config::TimingConfig;
use rand::distr::{Distribution, Uniform};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Uniform pick in `[min_secs, max_secs]`. Degenerate ranges collapse to `min`.
pub fn pick_duration(min_secs: f64, max_secs: f64) -> Duration {
    let lo = (min_secs.max(0.0) * 1000.0) as u64;
    let hi = (max_secs.max(0.0) * 1000.0) as u64;
    if hi <= lo {
        return Duration::from_millis(lo);
    }
    let ms = {
        let mut rng = rand::rng();
        Uniform::new_inclusive(lo, hi)
            .map(|d| d.sample(&mut rng))
            .unwrap_or(lo)
    };
    Duration::from_millis(ms)
}

/// One scroll step of a reading pass: distance, then the pause after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ScrollStep {
    pixels: i64,
    pause: Duration,
}

/// Plan scroll steps whose pauses fit inside `budget`.
fn plan_scroll(budget: Duration) -> Vec<ScrollStep> {
    let mut rng = rand::rng();
    let (Ok(dist), Ok(pause), Ok(back), Ok(chance)) = (
        Uniform::new(180i64, 620),
        Uniform::new(250u64, 1200),
        Uniform::new(50i64, 200),
        Uniform::new(0u8, 5),
    ) else {
        return Vec::new();
    };

    let mut steps = Vec::new();
    let mut spent = Duration::ZERO;
    loop {
        let step_pause = Duration::from_millis(pause.sample(&mut rng));
        if spent + step_pause > budget {
            break;
        }
        spent += step_pause;
        let pixels = if chance.sample(&mut rng) == 0 && !steps.is_empty() {
            -back.sample(&mut rng)
        } else {
            dist.sample(&mut rng)
        };
        steps.push(ScrollStep {
            pixels,
            pause: step_pause,
        });
    }
    steps
}

#[derive(Debug, Clone)]
pub struct Humanizer {
    timing: TimingConfig,
}

impl Humanizer {
    pub fn new(timing: TimingConfig) -> Self {
        Self { timing }
    }

    /// Pause between two items. `false` when cancelled.
    pub async fn pause_between_items(&self, cancel: &CancellationToken) -> bool {
        let wait = pick_duration(self.timing.pause_min_secs, self.timing.pause_max_secs);
        debug!("humanize: pausing {}ms before next item", wait.as_millis());
        sleep_cancellable(wait, cancel).await
    }

    /// Skim the result list after discovery.
    pub async fn scan_page(&self, host: &dyn HostPage, cancel: &CancellationToken) -> bool {
        let budget = pick_duration(self.timing.page_scan_min_secs, self.timing.page_scan_max_secs);
        info!("humanize: scanning page for {}ms", budget.as_millis());
        self.read_region(host, ScrollRegion::List, budget, cancel).await
    }

    /// Read through the selected item's detail.
    pub async fn review_item(&self, host: &dyn HostPage, cancel: &CancellationToken) -> bool {
        let budget = pick_duration(self.timing.review_min_secs, self.timing.review_max_secs);
        debug!("humanize: reviewing item for {}ms", budget.as_millis());
        self.read_region(host, ScrollRegion::Detail, budget, cancel).await
    }

    async fn read_region(
        &self,
        host: &dyn HostPage,
        region: ScrollRegion,
        budget: Duration,
        cancel: &CancellationToken,
    ) -> bool {
        let steps = plan_scroll(budget);
        let mut spent = Duration::ZERO;
        for step in steps {
            if cancel.is_cancelled() {
                return false;
            }
            if let Err(e) = host.scroll_by(region, step.pixels).await {
                debug!("humanize: scroll {:?} failed: {}", region, e);
            }
            if !sleep_cancellable(step.pause, cancel).await {
                return false;
            }
            spent += step.pause;
        }
        sleep_cancellable(budget.saturating_sub(spent), cancel).await
    }
}
