/*!

Bounded polling for eventually consistent provider state.

!*/

use log::trace;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

/// The result of one poll.
#[derive(Debug)]
pub enum Poll<T, E> {
    NotReady,
    Ready(T),
    /// Polling again cannot help.
    PermanentError(E),
}

/// The result of [`wait_until`]. A timeout is a value, not an error: callers decide whether it
/// is fatal.
#[derive(Debug)]
pub enum WaitOutcome<T, E> {
    Ready(T),
    TimedOut,
    Error(E),
}

impl<T, E> WaitOutcome<T, E> {
    pub fn is_ready(&self) -> bool {
        matches!(self, WaitOutcome::Ready(_))
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, WaitOutcome::TimedOut)
    }
}

/// Call `poll` until it reports ready or a permanent error, sleeping `interval` between polls,
/// for at most `limit` in total. The first poll happens immediately.
pub async fn wait_until<F, Fut, T, E>(
    what: &str,
    interval: Duration,
    limit: Duration,
    mut poll: F,
) -> WaitOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Poll<T, E>>,
{
    let mut attempts = 0u32;
    let polling = async {
        loop {
            attempts += 1;
            match poll().await {
                Poll::Ready(value) => return Ok(value),
                Poll::PermanentError(e) => return Err(e),
                Poll::NotReady => {
                    trace!("'{}' not ready after {} polls", what, attempts);
                    sleep(interval).await;
                }
            }
        }
    };
    match timeout(limit, polling).await {
        Ok(Ok(value)) => WaitOutcome::Ready(value),
        Ok(Err(e)) => WaitOutcome::Error(e),
        Err(_) => WaitOutcome::TimedOut,
    }
}
