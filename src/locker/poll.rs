//! Background poll loop with a completion signal.

use crate::error::{ExecLockError, Result};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Outcome of one poll iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Poll {
    /// The lock is ours; stop polling.
    Granted,
    /// Not yet; sleep one interval.
    Pending,
    /// State changed (e.g. a coordinator was just started); poll again now.
    RetryNow,
}

/// Run `step` on a background thread until it reports [`Poll::Granted`] or
/// fails, blocking the calling thread on the loop's completion signal.
pub(crate) fn block_until_granted<F>(label: &str, interval: Duration, mut step: F) -> Result<()>
where
    F: FnMut() -> Result<Poll> + Send + 'static,
{
    let (done_tx, done_rx) = mpsc::channel();

    thread::Builder::new()
        .name(format!("execlock-poll-{}", label))
        .spawn(move || {
            let outcome = loop {
                match step() {
                    Ok(Poll::Granted) => break Ok(()),
                    Ok(Poll::Pending) => thread::sleep(interval),
                    Ok(Poll::RetryNow) => {}
                    Err(e) => break Err(e),
                }
            };
            let _ = done_tx.send(outcome);
        })
        .map_err(|e| ExecLockError::LockError(format!("failed to start poll thread: {}", e)))?;

    done_rx.recv().map_err(|_| {
        ExecLockError::LockError(format!(
            "poll thread for '{}' exited without a result",
            label
        ))
    })?
}
