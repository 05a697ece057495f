//! Bounded polling primitive shared by every wait-for-DOM site.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Found(T),
    TimedOut,
    Cancelled,
}

impl<T> PollOutcome<T> {
    pub fn found(self) -> Option<T> {
        match self {
            PollOutcome::Found(v) => Some(v),
            _ => None,
        }
    }
}

/// Run `probe` up to `max_attempts` times, `interval` apart, until it yields
/// `Some`.
///
/// Never loops unbounded: the worst case is `max_attempts` probes and
/// `max_attempts - 1` sleeps. Cancellation is observed between probes and
/// during the sleep; a probe already running is allowed to finish.
pub async fn poll_until<T, F, Fut>(
    mut probe: F,
    interval: Duration,
    max_attempts: u32,
    cancel: &CancellationToken,
) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let attempts = max_attempts.max(1);
    for attempt in 1..=attempts {
        if cancel.is_cancelled() {
            return PollOutcome::Cancelled;
        }
        if let Some(v) = probe().await {
            return PollOutcome::Found(v);
        }
        if attempt == attempts {
            break;
        }
        tokio::select! {
            _ = cancel.cancelled() => return PollOutcome::Cancelled,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    PollOutcome::TimedOut
}

/// Sleep for `duration` unless cancelled first. Returns `false` when cancelled.
pub async fn sleep_cancellable(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Drive `fut` unless `cancel` fires first, in which case `fut` is dropped
/// mid-flight along with any retries it was running.
pub async fn until_cancelled<F: Future>(fut: F, cancel: &CancellationToken) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}
