//! Retry strategies used while polling asynchronous tasks.
//!
//! Policies compose around a [`Retryable`]: [`UnlimitedRetryStrategy`] keeps
//! attempting at a fixed interval until the operation is ready or fails
//! fatally, [`AttemptRetryStrategy`] gives up after a fixed number of
//! transient errors, and [`ErrorTolerance`] turns a run of more than
//! `tolerated` consecutive transient errors into a fatal one.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

/// Outcome of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T, E> {
    /// Finished with a result.
    Ready(T),
    /// Remote side is still working. Not an error.
    Pending,
    /// Failed in a way worth trying again.
    Transient(E),
    /// Failed for good.
    Fatal(E),
}

#[async_trait]
pub trait Retryable: Send {
    type Output: Send;
    type Error: Send;

    async fn attempt(&mut self) -> Attempt<Self::Output, Self::Error>;
}

// ---------------------------------------------------------------------------
// UnlimitedRetryStrategy
// ---------------------------------------------------------------------------

/// Attempt forever at a fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct UnlimitedRetryStrategy {
    delay: Duration,
}

impl UnlimitedRetryStrategy {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub async fn run<R: Retryable>(&self, retryable: &mut R) -> Result<R::Output, R::Error> {
        let mut attempts: u64 = 0;
        loop {
            attempts += 1;
            match retryable.attempt().await {
                Attempt::Ready(output) => return Ok(output),
                Attempt::Fatal(error) => return Err(error),
                Attempt::Pending => tracing::trace!(attempts, "Still pending"),
                Attempt::Transient(_) => tracing::debug!(attempts, "Retrying after transient error"),
            }
            tokio::time::sleep(self.delay).await;
        }
    }
}

// ---------------------------------------------------------------------------
// AttemptRetryStrategy
// ---------------------------------------------------------------------------

/// Attempt at a fixed interval until `max_attempts` transient errors have
/// been seen, then return the last one. Pending outcomes do not use up
/// attempts.
#[derive(Debug, Clone, Copy)]
pub struct AttemptRetryStrategy {
    max_attempts: usize,
    delay: Duration,
}

impl AttemptRetryStrategy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub async fn run<R>(&self, retryable: &mut R) -> Result<R::Output, R::Error>
    where
        R: Retryable,
        R::Error: fmt::Display,
    {
        let mut failures = 0;
        loop {
            match retryable.attempt().await {
                Attempt::Ready(output) => return Ok(output),
                Attempt::Fatal(error) => return Err(error),
                Attempt::Pending => tracing::trace!(failures, "Still pending"),
                Attempt::Transient(error) => {
                    failures += 1;
                    if failures >= self.max_attempts {
                        tracing::error!(attempts = failures, error = %error, "Giving up after attempts");
                        return Err(error);
                    }
                    tracing::debug!(attempts = failures, max_attempts = self.max_attempts, error = %error, "Retrying");
                }
            }
            tokio::time::sleep(self.delay).await;
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorTolerance
// ---------------------------------------------------------------------------

/// Bounded tolerance for consecutive transient errors.
///
/// Any non-transient outcome resets the counter. The transient error that
/// pushes the count past `tolerated` is returned as fatal.
pub struct ErrorTolerance<R> {
    inner: R,
    tolerated: usize,
    consecutive: usize,
}

impl<R> ErrorTolerance<R> {
    pub fn new(inner: R, tolerated: usize) -> Self {
        Self {
            inner,
            tolerated,
            consecutive: 0,
        }
    }

    pub fn consecutive_errors(&self) -> usize {
        self.consecutive
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[async_trait]
impl<R> Retryable for ErrorTolerance<R>
where
    R: Retryable,
    R::Error: fmt::Display,
{
    type Output = R::Output;
    type Error = R::Error;

    async fn attempt(&mut self) -> Attempt<Self::Output, Self::Error> {
        match self.inner.attempt().await {
            Attempt::Transient(error) => {
                self.consecutive += 1;
                if self.consecutive > self.tolerated {
                    tracing::error!(
                        consecutive = self.consecutive,
                        tolerated = self.tolerated,
                        error = %error,
                        "Giving up after consecutive errors"
                    );
                    Attempt::Fatal(error)
                } else {
                    tracing::warn!(
                        consecutive = self.consecutive,
                        tolerated = self.tolerated,
                        error = %error,
                        "Tolerating error"
                    );
                    Attempt::Transient(error)
                }
            }
            other => {
                self.consecutive = 0;
                other
            }
        }
    }
}
