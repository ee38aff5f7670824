//! # runner: wall-clock bounded execution of a single remote operation
//!
//! Remote calls can wedge forever on a stalled connection, or block a thread
//! outright. [`BoundedRunner`] runs each attempt on a dedicated OS thread with its
//! own single-threaded tokio runtime and waits for it up to a deadline. If the
//! attempt finishes in time its result is returned at once.
//!
//! Otherwise the attempt is cancelled. The runner waits a short grace period for
//! the attempt thread to confirm that the attempt's future was dropped, releasing
//! whatever it held. An attempt that does not stop within the grace period is
//! blocked outside any await point; its thread is abandoned and left to finish on
//! its own, and whatever it eventually produces is discarded. Either way the
//! deadline miss counts as a timeout: a fresh attempt with the same inputs is
//! started (`restart`) or the run ends without a result.
//!
//! Restarts are an explicit loop, uncapped unless [`BoundedRunner::max_attempts`] is
//! set.

use std::future::Future;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

/// Upper bound on the wait for a cancelled attempt to confirm it stopped.
const CANCEL_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum RunnerError<E> {
    /// The attempt completed in time but returned an error.
    #[error("operation failed: {0}")]
    Operation(E),
    #[error("operation panicked: {0}")]
    Panicked(String),
    #[error("operation timed out {attempts} times in a row")]
    AttemptsExhausted { attempts: u32 },
    #[error("cannot start attempt thread: {0}")]
    Spawn(#[source] io::Error),
}

/// How a bounded run ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome<T> {
    Completed(T),
    /// Deadline hit with restarts disabled; the attempt was killed and no result exists.
    TimedOut,
}

impl<T> RunOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            RunOutcome::Completed(v) => Some(v),
            RunOutcome::TimedOut => None,
        }
    }
}

/// What the attempt thread reports back.
enum AttemptEnd<T, E> {
    Finished(Result<T, E>),
    Panicked(String),
    /// The attempt was cancelled and its future dropped.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct BoundedRunner {
    deadline: Duration,
    restart: bool,
    max_attempts: Option<u32>,
}

impl BoundedRunner {
    pub fn new(deadline: Duration, restart: bool) -> Self {
        Self {
            deadline,
            restart,
            max_attempts: None,
        }
    }

    /// Stop restarting after `attempts` consecutive timeouts.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Run `operation` under the deadline.
    ///
    /// `operation` is called once per attempt and must build an identical attempt
    /// each time. Errors returned by a completed attempt are not retried here. A
    /// result that arrives after the deadline is never returned.
    pub async fn run<F, Fut, T, E>(
        &self,
        mut operation: F,
    ) -> Result<RunOutcome<T>, RunnerError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let started = Instant::now();
            let (cancel_tx, cancel_rx) = oneshot::channel();
            let (done_tx, mut done_rx) = oneshot::channel();
            spawn_attempt(operation(), cancel_rx, done_tx).map_err(RunnerError::Spawn)?;

            match tokio::time::timeout(self.deadline, &mut done_rx).await {
                Ok(Ok(AttemptEnd::Finished(Ok(value)))) => {
                    debug!(
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Attempt completed"
                    );
                    return Ok(RunOutcome::Completed(value));
                }
                Ok(Ok(AttemptEnd::Finished(Err(e)))) => {
                    debug!(attempt, "Attempt returned an error");
                    return Err(RunnerError::Operation(e));
                }
                Ok(Ok(AttemptEnd::Panicked(message))) => {
                    error!(attempt, error = %message, "Attempt panicked");
                    return Err(RunnerError::Panicked(message));
                }
                Ok(Ok(AttemptEnd::Cancelled)) | Ok(Err(_)) => {
                    error!(attempt, "Attempt thread exited without a result");
                    return Err(RunnerError::Panicked(
                        "attempt thread exited without a result".to_string(),
                    ));
                }
                Err(_elapsed) => {
                    let _ = cancel_tx.send(());
                    match tokio::time::timeout(CANCEL_GRACE, done_rx).await {
                        Ok(_) => debug!(attempt, "Timed out attempt stopped"),
                        Err(_) => warn!(
                            attempt,
                            grace_ms = CANCEL_GRACE.as_millis() as u64,
                            "Timed out attempt is blocked, abandoning its thread"
                        ),
                    }
                    warn!(
                        attempt,
                        deadline_secs = self.deadline.as_secs_f64(),
                        restart = self.restart,
                        "Attempt exceeded its deadline and was killed"
                    );
                }
            }

            if !self.restart {
                return Ok(RunOutcome::TimedOut);
            }
            if let Some(max) = self.max_attempts {
                if attempt >= max {
                    error!(attempts = attempt, "Giving up after repeated timeouts");
                    return Err(RunnerError::AttemptsExhausted { attempts: attempt });
                }
            }
        }
    }
}

/// Drive `attempt` to completion on its own thread, unless `cancel` fires first.
///
/// The outcome is sent on `done` once the attempt's runtime, and with it the
/// attempt's future, has been dropped.
fn spawn_attempt<Fut, T, E>(
    attempt: Fut,
    cancel: oneshot::Receiver<()>,
    done: oneshot::Sender<AttemptEnd<T, E>>,
) -> io::Result<()>
where
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    thread::Builder::new()
        .name("bounded-attempt".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = done.send(AttemptEnd::Panicked(format!(
                        "cannot build attempt runtime: {e}"
                    )));
                    return;
                }
            };

            let end = runtime.block_on(async move {
                let task = tokio::spawn(attempt);
                tokio::select! {
                    joined = task => match joined {
                        Ok(result) => AttemptEnd::Finished(result),
                        Err(join_error) => AttemptEnd::Panicked(join_error.to_string()),
                    },
                    _ = cancel => AttemptEnd::Cancelled,
                }
            });
            // drops every task still alive on this runtime
            drop(runtime);
            let _ = done.send(end);
        })
        .map(|_detached| ())
}
