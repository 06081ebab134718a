// Retry logic for remote graph calls
use rand::Rng;
use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Attempt budget for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxAttempts {
    /// Give up after this many calls
    Bounded(NonZeroU32),
    /// Keep trying until success or process termination
    Unbounded,
}

impl MaxAttempts {
    /// Bounded budget; zero is clamped to a single attempt
    pub fn bounded(attempts: u32) -> Self {
        MaxAttempts::Bounded(NonZeroU32::new(attempts).unwrap_or(NonZeroU32::MIN))
    }

    /// Whether another call may follow `attempts_made` failed calls
    pub fn allows_another(self, attempts_made: u32) -> bool {
        match self {
            MaxAttempts::Bounded(max) => attempts_made < max.get(),
            MaxAttempts::Unbounded => true,
        }
    }
}

impl std::fmt::Display for MaxAttempts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaxAttempts::Bounded(max) => write!(f, "{}", max),
            MaxAttempts::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// Retry policy with exponential backoff
///
/// delay(n) = initial_delay * factor ^ (n - 1), capped at max_delay,
/// where n counts failed calls so far.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    pub max_attempts: MaxAttempts,
    /// Spread each delay by ±10%
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(20),
            factor: 1.5,
            max_delay: Duration::from_secs(70),
            max_attempts: MaxAttempts::Unbounded,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy without waits between attempts (tests, dry runs)
    pub fn immediate(max_attempts: MaxAttempts) -> Self {
        Self {
            initial_delay: Duration::ZERO,
            factor: 1.0,
            max_delay: Duration::ZERO,
            max_attempts,
            jitter: false,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: MaxAttempts) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Wait before the call that follows the `failures`-th failure
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let max_secs = self.max_delay.as_secs_f64();
        let mut secs = (self.initial_delay.as_secs_f64() * self.factor.powi(exponent)).min(max_secs);

        if self.jitter {
            // Keeps retries from a fleet of callers from landing together
            let jitter_factor: f64 = rand::thread_rng().gen_range(0.9..=1.1);
            secs = (secs * jitter_factor).min(max_secs);
        }

        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Classification of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    /// Surface immediately, whatever the budget
    Terminal,
}

/// Why a retried operation gave up
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// Bounded budget used up; carries the last failure
    Exhausted { attempts: u32, last: E },
    /// Classified terminal by the caller
    Terminal { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Terminal { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Terminal { error, .. } => error,
        }
    }
}

/// Runs remote operations under a [`RetryPolicy`]
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op`, treating every failure as retryable
    pub async fn execute<T, E, F, Fut>(&self, operation: &str, op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        self.execute_classified(operation, op, |_| RetryClass::Retryable)
            .await
    }

    /// Run `op`, letting `classify` opt specific failures out of retry
    ///
    /// # Returns
    /// - `Ok(value)` from the first successful call
    /// - `RetryError::Terminal` as soon as a failure is classified terminal
    /// - `RetryError::Exhausted` once a bounded budget is spent
    pub async fn execute_classified<T, E, F, Fut, C>(
        &self,
        operation: &str,
        mut op: F,
        classify: C,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        C: Fn(&E) -> RetryClass,
    {
        let mut attempts: u32 = 0;

        loop {
            attempts = attempts.saturating_add(1);

            let err = match op().await {
                Ok(value) => {
                    if attempts > 1 {
                        info!(operation, attempts, "Remote call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if classify(&err) == RetryClass::Terminal {
                warn!(operation, attempts, error = %err, "Remote call failed with terminal error");
                return Err(RetryError::Terminal { attempts, error: err });
            }

            if !self.policy.max_attempts.allows_another(attempts) {
                error!(
                    operation,
                    attempts,
                    max_attempts = %self.policy.max_attempts,
                    error = %err,
                    "Max retry attempts reached"
                );
                return Err(RetryError::Exhausted { attempts, last: err });
            }

            let delay = self.policy.delay_for(attempts);
            warn!(
                operation,
                attempt = attempts,
                max_attempts = %self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Remote call failed, scheduling retry"
            );
            sleep(delay).await;
        }
    }
}
