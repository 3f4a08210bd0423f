//! Bounded polling of server-side jobs until they reach a terminal state.
//!
//! Corpus analysis, language model training and asynchronous recognition all
//! follow the same shape: submit work, then query its status until it is done.
//! [`await_completion`] implements that loop once. Callers supply a status
//! fetch, a classifier mapping a status snapshot to [`Readiness`], and a
//! [`PollPolicy`].
//!
//! Only "still pending" is retried. A transport error, a terminal failure or
//! an unrecognised status ends the loop on first occurrence. When the attempt
//! budget runs out while the job is still pending the result is
//! [`PollError::Timeout`] carrying the last snapshot. A fetch error on the last
//! attempt is reported as that error, not as a timeout.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use rust_speech::{await_completion, PollPolicy, Readiness};
//!
//! # async fn fetch(id: &str) -> Result<String, rust_speech::Error> { Ok("ready".into()) }
//! #[tokio::main]
//! async fn main() {
//!     let policy = PollPolicy::new(Duration::from_millis(500), 10);
//!     let status = await_completion(
//!         "job-1",
//!         || fetch("job-1"),
//!         |s: &String| match s.as_str() {
//!             "ready" => Readiness::Ready,
//!             "pending" => Readiness::Pending,
//!             other => Readiness::Unexpected(other.to_string()),
//!         },
//!         policy,
//!     )
//!     .await;
//!     println!("{status:?}");
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::Error;

/// Default wait between two status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Default number of status checks, the first one included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// How often and how many times to check a job's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two consecutive status fetches.
    pub interval: Duration,
    /// Maximum number of status fetches, including the first one.
    /// Zero is treated as one.
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_MAX_ATTEMPTS)
    }
}

/// Classification of one status snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Not done yet; poll again.
    Pending,
    /// Terminal success.
    Ready,
    /// Terminal failure reported by the server.
    Failed(String),
    /// A status outside the known set.
    Unexpected(String),
}

/// Kind of a polling failure, stable across snapshot types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollErrorKind {
    MissingParameter,
    Transport,
    NoResource,
    Timeout,
    DomainFailure,
    UnexpectedStatus,
}

impl PollErrorKind {
    /// Stable error code, for the kinds that have one.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            PollErrorKind::NoResource => Some("ERR_NO_CORPORA"),
            PollErrorKind::Timeout => Some("ERR_TIMEOUT"),
            _ => None,
        }
    }
}

/// Why a poll did not end in a ready snapshot.
#[derive(Error, Debug)]
pub enum PollError<S> {
    /// Parameter validation or status request failed.
    #[error(transparent)]
    Request(#[from] Error),

    /// The precondition found nothing to wait for.
    #[error("No corpora found for this custom model")]
    NoResource,

    /// Still pending after every attempt.
    #[error("Timed out after {attempts} attempts while still pending")]
    Timeout {
        attempts: u32,
        /// Last snapshot observed.
        last: S,
    },

    /// The server reported a terminal failure.
    #[error("Job failed: {reason}")]
    Failed { reason: String, snapshot: S },

    /// The server reported a status outside the known set.
    #[error("Unexpected status: {status}")]
    UnexpectedStatus { status: String, snapshot: S },
}

impl<S> PollError<S> {
    pub fn kind(&self) -> PollErrorKind {
        match self {
            PollError::Request(Error::MissingParameter(_)) => PollErrorKind::MissingParameter,
            PollError::Request(_) => PollErrorKind::Transport,
            PollError::NoResource => PollErrorKind::NoResource,
            PollError::Timeout { .. } => PollErrorKind::Timeout,
            PollError::Failed { .. } => PollErrorKind::DomainFailure,
            PollError::UnexpectedStatus { .. } => PollErrorKind::UnexpectedStatus,
        }
    }

    /// `ERR_NO_CORPORA`, `ERR_TIMEOUT`, or `None`.
    pub fn code(&self) -> Option<&'static str> {
        self.kind().code()
    }

    /// The snapshot that ended the poll, if one was fetched.
    pub fn snapshot(&self) -> Option<&S> {
        match self {
            PollError::Timeout { last, .. } => Some(last),
            PollError::Failed { snapshot, .. } | PollError::UnexpectedStatus { snapshot, .. } => {
                Some(snapshot)
            }
            PollError::Request(_) | PollError::NoResource => None,
        }
    }
}

/// Polls `fetch_status` until `classify` reports a terminal state or the
/// policy's attempt budget is spent.
///
/// Exactly one status request is in flight at a time. Dropping the returned
/// future cancels the poll.
pub async fn await_completion<S, F, Fut, C>(
    handle: &str,
    mut fetch_status: F,
    classify: C,
    policy: PollPolicy,
) -> Result<S, PollError<S>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S, Error>>,
    C: Fn(&S) -> Readiness,
{
    let max_attempts = policy.attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let snapshot = fetch_status().await?;

        match classify(&snapshot) {
            Readiness::Ready => {
                info!(handle = %handle, attempt, "Job ready");
                return Ok(snapshot);
            }
            Readiness::Failed(reason) => {
                warn!(handle = %handle, attempt, reason = %reason, "Job failed");
                return Err(PollError::Failed { reason, snapshot });
            }
            Readiness::Unexpected(status) => {
                warn!(handle = %handle, attempt, status = %status, "Unexpected job status");
                return Err(PollError::UnexpectedStatus { status, snapshot });
            }
            Readiness::Pending if attempt >= max_attempts => {
                info!(handle = %handle, attempts = attempt, "Job still pending, giving up");
                return Err(PollError::Timeout {
                    attempts: attempt,
                    last: snapshot,
                });
            }
            Readiness::Pending => {
                debug!(
                    handle = %handle,
                    attempt,
                    max_attempts,
                    interval_ms = policy.interval.as_millis() as u64,
                    "Job pending"
                );
                tokio::time::sleep(policy.interval).await;
            }
        }
    }
}

/// Like [`await_completion`], but first awaits a one-shot precondition.
///
/// `Ok(false)` from the precondition fails with [`PollError::NoResource`]
/// before any status fetch. The precondition is never retried.
pub async fn await_completion_if<S, P, F, Fut, C>(
    precondition: P,
    handle: &str,
    fetch_status: F,
    classify: C,
    policy: PollPolicy,
) -> Result<S, PollError<S>>
where
    P: Future<Output = Result<bool, Error>>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S, Error>>,
    C: Fn(&S) -> Readiness,
{
    if !precondition.await? {
        info!(handle = %handle, "Nothing to wait for");
        return Err(PollError::NoResource);
    }
    await_completion(handle, fetch_status, classify, policy).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    fn classify(status: &&'static str) -> Readiness {
        match *status {
            "pending" | "training" => Readiness::Pending,
            "ready" | "available" => Readiness::Ready,
            "failed" => Readiness::Failed("training failed".to_string()),
            other => Readiness::Unexpected(other.to_string()),
        }
    }

    /// A fetch that replays `script`, repeating the last entry once exhausted.
    fn scripted(
        script: Vec<Result<&'static str, ()>>,
    ) -> (
        Arc<AtomicU32>,
        impl FnMut() -> std::future::Ready<Result<&'static str, Error>>,
    ) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let fetch = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) as usize;
            let step = script[n.min(script.len() - 1)];
            std::future::ready(step.map_err(|_| Error::Api {
                status: 503,
                message: "unavailable".to_string(),
            }))
        };
        (calls, fetch)
    }

    fn policy(times: u32) -> PollPolicy {
        PollPolicy::new(Duration::from_millis(10), times)
    }

    #[test]
    fn test_default_policy() {
        let p = PollPolicy::default();
        assert_eq!(p.interval, Duration::from_millis(5000));
        assert_eq!(p.max_attempts, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_on_third_attempt() {
        let (calls, fetch) = scripted(vec![Ok("pending"), Ok("training"), Ok("ready")]);
        let result = await_completion("cid", fetch, classify, policy(3)).await;
        assert_eq!(result.unwrap(), "ready");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_pending_times_out_after_exactly_n_fetches() {
        for n in [1, 2, 5, 30] {
            let (calls, fetch) = scripted(vec![Ok("pending")]);
            let err = await_completion("cid", fetch, classify, policy(n))
                .await
                .unwrap_err();
            assert_eq!(err.code(), Some("ERR_TIMEOUT"));
            assert_eq!(err.snapshot(), Some(&"pending"));
            match err {
                PollError::Timeout { attempts, .. } => assert_eq!(attempts, n),
                other => panic!("expected timeout, got {other:?}"),
            }
            assert_eq!(calls.load(Ordering::SeqCst), n);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_stops_fetching() {
        let (calls, fetch) = scripted(vec![Ok("pending"), Ok("available"), Ok("pending")]);
        let result = await_completion("cid", fetch, classify, policy(10)).await;
        assert_eq!(result.unwrap(), "available");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_not_retried() {
        let (calls, fetch) = scripted(vec![Ok("pending"), Err(()), Ok("ready")]);
        let err = await_completion("cid", fetch, classify, policy(10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), PollErrorKind::Transport);
        assert_eq!(err.code(), None);
        assert!(err.snapshot().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_on_last_attempt_wins_over_timeout() {
        let (calls, fetch) = scripted(vec![Ok("pending"), Err(())]);
        let err = await_completion("cid", fetch, classify, policy(2))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), PollErrorKind::Transport);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_domain_failure_aborts() {
        let (calls, fetch) = scripted(vec![Ok("training"), Ok("failed")]);
        let err = await_completion("cid", fetch, classify, policy(10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), PollErrorKind::DomainFailure);
        assert_eq!(err.to_string(), "Job failed: training failed");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_status_aborts() {
        let (calls, fetch) = scripted(vec![Ok("upgrading")]);
        let err = await_completion("cid", fetch, classify, policy(10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), PollErrorKind::UnexpectedStatus);
        assert_eq!(err.snapshot(), Some(&"upgrading"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_fetches_once() {
        let (calls, fetch) = scripted(vec![Ok("pending")]);
        let err = await_completion("cid", fetch, classify, policy(0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), PollErrorKind::Timeout);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_interval_between_attempts() {
        let start = tokio::time::Instant::now();
        let (_, fetch) = scripted(vec![Ok("pending")]);
        let _ = await_completion(
            "cid",
            fetch,
            classify,
            PollPolicy::new(Duration::from_secs(5), 4),
        )
        .await;
        // Three sleeps between four attempts, none after the last.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(15), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(20), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_precondition_false_skips_fetching() {
        let (calls, fetch) = scripted(vec![Ok("ready")]);
        let err = await_completion_if(
            async { Ok(false) },
            "cid",
            fetch,
            classify,
            policy(3),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), PollErrorKind::NoResource);
        assert_eq!(err.code(), Some("ERR_NO_CORPORA"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_precondition_error_propagates() {
        let (calls, fetch) = scripted(vec![Ok("ready")]);
        let err = await_completion_if(
            async {
                Err(Error::Api {
                    status: 401,
                    message: "unauthorized".to_string(),
                })
            },
            "cid",
            fetch,
            classify,
            policy(3),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), PollErrorKind::Transport);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_precondition_true_runs_loop() {
        let (calls, fetch) = scripted(vec![Ok("pending"), Ok("ready")]);
        let result =
            await_completion_if(async { Ok(true) }, "cid", fetch, classify, policy(3)).await;
        assert_eq!(result.unwrap(), "ready");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_polls_run_concurrently() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = |name: &'static str, ready_after: u32| {
            let log = Arc::clone(&log);
            let mut n = 0;
            move || {
                n += 1;
                log.lock().unwrap().push(name);
                let status = if n >= ready_after { "ready" } else { "pending" };
                std::future::ready(Ok::<_, Error>(status))
            }
        };

        let (a, b) = tokio::join!(
            await_completion("a", make("a", 2), classify, policy(5)),
            await_completion("b", make("b", 3), classify, policy(5)),
        );
        assert_eq!(a.unwrap(), "ready");
        assert_eq!(b.unwrap(), "ready");

        let log = log.lock().unwrap();
        assert_eq!(log.iter().filter(|n| **n == "a").count(), 2);
        assert_eq!(log.iter().filter(|n| **n == "b").count(), 3);
    }
}
