use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Repeatedly evaluates `predicate` until it returns true or `timeout`
/// elapses, sleeping `interval` between evaluations. Returns whether the
/// predicate was satisfied. The predicate always runs at least once.
pub async fn poll_until<F, Fut>(mut predicate: F, timeout: Duration, interval: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if predicate().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(interval).await;
    }
}
