//! Bounded polling
//!
//! Status convergence and deletion convergence both use [`poll_until`]:
//! re-check at a fixed interval, no backoff, fail once the deadline passes.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::{Error, Result};

/// Poll `check` every `interval` until it returns `true`.
///
/// Errors from `check` are returned immediately. Returns [`Error::Timeout`]
/// naming `what` when `timeout` elapses first.
pub async fn poll_until<F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if check().await? {
            debug!(what, attempts, "Condition reached");
            return Ok(());
        }
        if Instant::now() + interval >= deadline {
            return Err(Error::timeout(format!(
                "waiting for {} after {:?}",
                what, timeout
            )));
        }
        tokio::time::sleep(interval).await;
    }
}
