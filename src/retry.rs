use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rusoto_core::RusotoError;
use tracing::warn;

use crate::sleep::Sleep;

const THROTTLING_CODES: [&str; 4] = [
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
];

const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Whether a failed call is worth repeating.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl<E> Transient for RusotoError<E> {
    fn is_transient(&self) -> bool {
        match self {
            RusotoError::HttpDispatch(_) => true,
            RusotoError::Unknown(response) => {
                let status = response.status.as_u16();
                status >= 500
                    || status == 429
                    || THROTTLING_CODES.iter().any(|code| {
                        response
                            .body_as_str()
                            .contains(&format!("<Code>{}</Code>", code))
                    })
            }
            _ => false,
        }
    }
}

/// Exponential backoff for downstream API calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    /// Saturates at `Duration::MAX`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        self.base_delay
            .checked_mul(2u32.pow(exponent))
            .unwrap_or(Duration::MAX)
    }

    /// Longest single delay this policy can produce, or `None` when it does
    /// not fit in a `Duration`.
    pub fn checked_longest_delay(&self) -> Option<Duration> {
        if self.max_attempts < 2 {
            return Some(Duration::ZERO);
        }
        let exponent = (self.max_attempts - 2).min(MAX_BACKOFF_EXPONENT);
        self.base_delay.checked_mul(2u32.pow(exponent))
    }

    pub async fn run<T, E, F, Fut>(
        &self,
        sleeper: &dyn Sleep,
        operation: &str,
        mut call: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + Display,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient failure, retrying"
                    );
                    sleeper.sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(3, Duration::from_millis(200))
    }
}

#[cfg(test)]
mod tests {
    use crate::retry::{RetryPolicy, Transient};
    use crate::sleep::tests::RecordingSleep;
    use rusoto_core::HttpDispatchError;
    use rusoto_core::RusotoError;
    use std::fmt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    enum FakeError {
        Flaky,
        Fatal,
    }

    impl fmt::Display for FakeError {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Transient for FakeError {
        fn is_transient(&self) -> bool {
            *self == FakeError::Flaky
        }
    }

    #[tokio::test]
    async fn test_delay_doubles() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100));
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_delay_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::new(20, Duration::from_millis(u64::MAX));
        assert_eq!(policy.delay_after(1), Duration::from_millis(u64::MAX));
        assert_eq!(policy.delay_after(20), Duration::MAX);
        assert_eq!(policy.checked_longest_delay(), None);
        assert_eq!(
            RetryPolicy::new(1, Duration::from_millis(u64::MAX)).checked_longest_delay(),
            Some(Duration::ZERO)
        );
        assert_eq!(
            RetryPolicy::default().checked_longest_delay(),
            Some(Duration::from_millis(400))
        );
    }

    #[tokio::test]
    async fn test_zero_attempts_is_one() {
        assert_eq!(RetryPolicy::new(0, Duration::from_millis(1)).max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let sleep = RecordingSleep::default();
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result = policy
            .run(&sleep, "test", move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FakeError::Flaky)
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            sleep.slept(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let sleep = RecordingSleep::default();
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<(), FakeError> = policy
            .run(&sleep, "test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(FakeError::Flaky)
            })
            .await;

        assert_eq!(result, Err(FakeError::Flaky));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleep.slept().len(), 2);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let policy = RetryPolicy::default();
        let sleep = RecordingSleep::default();
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<(), FakeError> = policy
            .run(&sleep, "test", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(FakeError::Fatal)
            })
            .await;

        assert_eq!(result, Err(FakeError::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleep.slept().is_empty());
    }

    #[tokio::test]
    async fn test_rusoto_classification() {
        let dispatch: RusotoError<()> =
            RusotoError::HttpDispatch(HttpDispatchError::new("connection reset".to_string()));
        assert!(dispatch.is_transient());

        let validation: RusotoError<()> = RusotoError::Validation("bad input".to_string());
        assert!(!validation.is_transient());
    }
}
