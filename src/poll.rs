//! Bounded polling primitive
//!
//! `poll_until` runs a check immediately, then once per interval, until the
//! check reports done, fails, the timeout elapses, or the token is cancelled.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{Error, Result};

/// Interval and timeout for one wait
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollSettings {
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Deployment stabilization and external readiness: 1s interval, 5 minutes
pub const STABILITY: PollSettings =
    PollSettings::new(Duration::from_secs(1), Duration::from_secs(300));

/// Poll `check` until it returns `Ok(true)`
///
/// `Ok(false)` means "not yet". Errors from `check` end the wait unchanged,
/// running out of time yields [`Error::DeadlineExceeded`] naming `what`, and
/// cancellation yields [`Error::Cancelled`].
pub async fn poll_until<F, Fut>(
    what: &str,
    settings: PollSettings,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + settings.timeout;
    let mut attempts: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        attempts += 1;
        let done = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep_until(deadline) => {
                return Err(Error::deadline(what, settings.timeout));
            }
            result = check() => result?,
        };
        if done {
            trace!(what, attempts, "Poll condition met");
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(Error::deadline(what, settings.timeout));
        }
        let pause = settings.interval.min(deadline - now);

        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = sleep(pause) => {}
        }

        if Instant::now() >= deadline {
            return Err(Error::deadline(what, settings.timeout));
        }
    }
}
