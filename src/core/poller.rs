//! Compile status polling with a fixed interval and an absolute deadline
//!
//! Server-side compilation of an uploaded package is asynchronous and only
//! observable by polling. The poller sleeps, queries, and repeats until the
//! package reports success or the deadline is reached. Query failures are
//! never retried.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::error::PublishError;
use crate::core::traits::{Clock, SystemClock};

/// Compilation state of a package as reported by the status endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileState {
    Pending,
    Succeeded,
}

impl CompileState {
    /// Interpret a `successStatus` value; only `0` means compiled
    pub fn from_success_status(status: i64) -> Self {
        if status == 0 {
            Self::Succeeded
        } else {
            Self::Pending
        }
    }
}

/// Options for compile polling
#[derive(Debug, Clone)]
pub struct CompilePollOptions {
    /// Pause before every status query
    pub interval: Duration,
    /// Total elapsed time after which polling gives up
    pub deadline: Duration,
}

impl Default for CompilePollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            deadline: Duration::from_secs(300),
        }
    }
}

/// Outcome of a successful poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOutcome {
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Polls compile status until success or timeout
///
/// # Examples
///
/// ```no_run
/// use closed_test_publisher::core::{CompilePoller, CompilePollOptions, CompileState};
///
/// # async fn run() -> Result<(), closed_test_publisher::core::PublishError> {
/// let poller = CompilePoller::new(CompilePollOptions::default());
/// let outcome = poller
///     .poll("P1", || async { Ok(CompileState::Succeeded) })
///     .await?;
/// assert_eq!(outcome.attempts, 1);
/// # Ok(())
/// # }
/// ```
pub struct CompilePoller {
    options: CompilePollOptions,
    clock: Arc<dyn Clock>,
}

impl CompilePoller {
    /// Create a poller backed by the system clock
    pub fn new(options: CompilePollOptions) -> Self {
        Self::with_clock(options, Arc::new(SystemClock))
    }

    pub fn with_clock(options: CompilePollOptions, clock: Arc<dyn Clock>) -> Self {
        Self { options, clock }
    }

    pub fn options(&self) -> &CompilePollOptions {
        &self.options
    }

    /// Poll until `query` reports [`CompileState::Succeeded`]
    ///
    /// Each attempt first waits `interval`, then queries. An error from
    /// `query` aborts immediately. Once the elapsed time reaches `deadline`
    /// after a pending answer, [`PublishError::CompileTimeout`] is returned.
    pub async fn poll<F, Fut>(
        &self,
        package_id: &str,
        mut query: F,
    ) -> Result<CompileOutcome, PublishError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<CompileState, PublishError>>,
    {
        let started = self.clock.now();
        let mut attempts: u32 = 0;

        loop {
            self.clock.sleep(self.options.interval).await;
            attempts += 1;

            let state = query().await?;
            let elapsed = self.clock.now().duration_since(started);

            if state == CompileState::Succeeded {
                info!(
                    package_id,
                    attempts,
                    elapsed_secs = elapsed.as_secs(),
                    "package compiled"
                );
                return Ok(CompileOutcome { attempts, elapsed });
            }

            debug!(
                package_id,
                attempts,
                elapsed_secs = elapsed.as_secs(),
                "package still compiling"
            );

            if elapsed >= self.options.deadline {
                return Err(PublishError::CompileTimeout {
                    package_id: package_id.to_string(),
                    attempts,
                    elapsed_secs: elapsed.as_secs(),
                });
            }
        }
    }
}

/// Simulated clock whose time only moves when something sleeps on it
///
/// Lets polling loops run through minutes of simulated time instantly.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Simulated time elapsed since the clock was created
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn advance(&self, duration: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *offset += duration;
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn poller_with(clock: &Arc<ManualClock>) -> CompilePoller {
        CompilePoller::with_clock(CompilePollOptions::default(), clock.clone())
    }

    #[test]
    fn test_compile_state_from_success_status() {
        assert_eq!(CompileState::from_success_status(0), CompileState::Succeeded);
        assert_eq!(CompileState::from_success_status(1), CompileState::Pending);
        assert_eq!(CompileState::from_success_status(-1), CompileState::Pending);
        assert_eq!(CompileState::from_success_status(2), CompileState::Pending);
    }

    #[test]
    fn test_poll_options_default() {
        let options = CompilePollOptions::default();
        assert_eq!(options.interval, Duration::from_secs(10));
        assert_eq!(options.deadline, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_poll_succeeds_once_status_turns_zero_at_thirty_seconds() {
        let clock = Arc::new(ManualClock::new());
        let poller = poller_with(&clock);
        let attempts = Arc::new(AtomicU32::new(0));

        let status_clock = clock.clone();
        let counter = attempts.clone();
        let outcome = poller
            .poll("P1", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                let elapsed = status_clock.elapsed();
                async move {
                    if elapsed < Duration::from_secs(30) {
                        Ok(CompileState::from_success_status(1))
                    } else {
                        Ok(CompileState::from_success_status(0))
                    }
                }
            })
            .await
            .expect("poll should succeed");

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.elapsed, Duration::from_secs(30));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_poll_times_out_when_never_compiled() {
        let clock = Arc::new(ManualClock::new());
        let poller = poller_with(&clock);
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = poller
            .poll("P1", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(CompileState::Pending) }
            })
            .await;

        match result {
            Err(PublishError::CompileTimeout {
                package_id,
                attempts: reported,
                elapsed_secs,
            }) => {
                assert_eq!(package_id, "P1");
                assert!(elapsed_secs >= 300);
                assert!(reported <= 31, "too many attempts: {}", reported);
                assert_eq!(reported, attempts.load(Ordering::SeqCst));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(clock.elapsed() >= Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_poll_query_error_is_fatal() {
        let clock = Arc::new(ManualClock::new());
        let poller = poller_with(&clock);
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = poller
            .poll("P1", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(PublishError::Network {
                        message: "connection reset".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(PublishError::Network { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_poll_success_on_first_attempt_waits_one_interval() {
        let clock = Arc::new(ManualClock::new());
        let poller = poller_with(&clock);

        let outcome = poller
            .poll("P1", || async { Ok(CompileState::Succeeded) })
            .await
            .expect("poll should succeed");

        assert_eq!(outcome.attempts, 1);
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_custom_deadline_is_respected() {
        let clock = Arc::new(ManualClock::new());
        let poller = CompilePoller::with_clock(
            CompilePollOptions {
                interval: Duration::from_secs(5),
                deadline: Duration::from_secs(12),
            },
            clock.clone(),
        );

        let result = poller
            .poll("P2", || async { Ok(CompileState::Pending) })
            .await;

        match result {
            Err(PublishError::CompileTimeout { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_manual_clock_advances_only_on_demand() {
        let clock = ManualClock::new();
        let start = clock.now();
        assert_eq!(clock.now(), start);
        clock.advance(Duration::from_secs(42));
        assert_eq!(clock.now().duration_since(start), Duration::from_secs(42));
    }
}
