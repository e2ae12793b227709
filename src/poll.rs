//! Generic poll-until-terminal loop.
//!
//! The query adapters and the training adapter both wait on asynchronous
//! external operations by polling a status endpoint at a fixed interval.
//! This module implements that loop once: fetch status, classify it, sleep
//! between attempts, and stop on a terminal state, on cancellation, or
//! after an optional maximum number of status checks.

use async_trait::async_trait;
use snafu::prelude::*;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Classification of an external operation's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Still queued or running; keep polling.
    Running,
    /// Terminal: the operation succeeded.
    Succeeded,
    /// Terminal: the operation failed.
    Failed,
    /// Terminal: the operation was cancelled or stopped externally.
    Cancelled,
}

impl StatusClass {
    pub fn is_terminal(self) -> bool {
        !matches!(self, StatusClass::Running)
    }
}

/// How often and how long to poll.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    /// Fixed delay between status checks.
    pub interval: Duration,
    /// Maximum number of status checks before giving up.
    /// `None` polls until a terminal state (the external service's SLA
    /// becomes ours).
    pub max_attempts: Option<u32>,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

/// A source of status for one in-flight external operation.
///
/// A source wraps exactly one execution handle; it is consumed by a single
/// poll sequence and never reused.
#[async_trait]
pub trait StatusSource {
    /// The raw status record returned alongside the classification.
    type Status: Send;
    /// The error type for status fetches.
    type Error: std::error::Error + Send + 'static;

    async fn fetch(&mut self) -> Result<(StatusClass, Self::Status), Self::Error>;
}

/// Errors from the poll loop.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PollError<E: std::error::Error + 'static> {
    /// A status fetch failed.
    #[snafu(display("Status fetch failed"))]
    Status { source: E },

    /// The operation was still running after the configured attempts.
    #[snafu(display("Operation still running after {attempts} status checks"))]
    Exhausted { attempts: u32 },

    /// Shutdown was requested while waiting between status checks.
    #[snafu(display("Cancelled while polling"))]
    Cancelled,
}

/// Terminal result of a poll sequence.
#[derive(Debug, Clone)]
pub struct Terminal<S> {
    pub class: StatusClass,
    pub status: S,
    /// Number of status checks performed, including the terminal one.
    pub polls: u32,
}

/// Poll `source` until it reports a terminal status.
///
/// Sleeps `policy.interval` between checks, never after the terminal one.
/// A status source that reports terminal on the Nth fetch results in
/// exactly N fetches and N-1 sleeps.
pub async fn poll_until_terminal<S: StatusSource>(
    source: &mut S,
    policy: PollPolicy,
    cancel: &CancellationToken,
) -> Result<Terminal<S::Status>, PollError<S::Error>> {
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let (class, status) = source.fetch().await.context(StatusSnafu)?;

        if class.is_terminal() {
            debug!("[poll] terminal {:?} after {} checks", class, attempts);
            return Ok(Terminal {
                class,
                status,
                polls: attempts,
            });
        }

        if let Some(max) = policy.max_attempts {
            if attempts >= max {
                return ExhaustedSnafu { attempts }.fail();
            }
        }

        debug!(
            "[poll] still running, waiting {}s before next check",
            policy.interval.as_secs()
        );
        tokio::select! {
            _ = cancel.cancelled() => return CancelledSnafu.fail(),
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use tokio::time::Instant;

    /// Reports `Running` for `running_for` fetches, then a terminal class.
    struct Scripted {
        running_for: u32,
        terminal: StatusClass,
        fetches: u32,
    }

    #[derive(Debug, Snafu)]
    #[snafu(display("scripted fetch error"))]
    struct FetchFailed;

    #[async_trait]
    impl StatusSource for Scripted {
        type Status = String;
        type Error = FetchFailed;

        async fn fetch(&mut self) -> Result<(StatusClass, String), FetchFailed> {
            self.fetches += 1;
            if self.fetches > self.running_for {
                Ok((self.terminal, "terminal".to_string()))
            } else {
                Ok((StatusClass::Running, "running".to_string()))
            }
        }
    }

    /// Never reaches a terminal state.
    struct Stuck;

    #[async_trait]
    impl StatusSource for Stuck {
        type Status = ();
        type Error = FetchFailed;

        async fn fetch(&mut self) -> Result<(StatusClass, ()), FetchFailed> {
            Ok((StatusClass::Running, ()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_after_exact_poll_count() {
        let mut source = Scripted {
            running_for: 4,
            terminal: StatusClass::Succeeded,
            fetches: 0,
        };
        let policy = PollPolicy::new(Duration::from_secs(2), None);
        let started = Instant::now();

        let terminal = poll_until_terminal(&mut source, policy, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(terminal.polls, 5);
        assert_eq!(source.fetches, 5);
        assert_eq!(terminal.class, StatusClass::Succeeded);
        // 4 sleeps of 2s between the 5 checks, none after the terminal one
        assert_eq!(started.elapsed(), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_terminal_never_sleeps() {
        let mut source = Scripted {
            running_for: 0,
            terminal: StatusClass::Failed,
            fetches: 0,
        };
        let policy = PollPolicy::new(Duration::from_secs(30), None);
        let started = Instant::now();

        let terminal = poll_until_terminal(&mut source, policy, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(terminal.polls, 1);
        assert_eq!(terminal.class, StatusClass::Failed);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_attempts() {
        let policy = PollPolicy::new(Duration::from_millis(10), Some(3));

        let err = poll_until_terminal(&mut Stuck, policy, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            PollError::Exhausted { attempts } => assert_eq!(attempts, 3),
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_wins_over_sleep() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let policy = PollPolicy::new(Duration::from_secs(3600), None);

        let err = poll_until_terminal(&mut Stuck, policy, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::Cancelled));
    }

    #[tokio::test]
    async fn test_fetch_error_propagates() {
        struct Failing;

        #[async_trait]
        impl StatusSource for Failing {
            type Status = Infallible;
            type Error = FetchFailed;

            async fn fetch(&mut self) -> Result<(StatusClass, Infallible), FetchFailed> {
                Err(FetchFailed)
            }
        }

        let policy = PollPolicy::new(Duration::from_millis(1), None);
        let err = poll_until_terminal(&mut Failing, policy, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Status { .. }));
    }
}
