//! # Retry helper
//!
//! A generic bounded exponential-backoff wrapper. It is shared by every
//! call site that talks to an external collaborator; each call site
//! supplies its own retriability predicate rather than retrying blindly
//! on every error kind.

use std::future::Future;
use std::time::Duration;

/// Backoff parameters. `wait_time(attempt) = initial_delay * multiplier^attempt`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

/// Run `op` up to `policy.max_attempts + 1` times. Waits
/// `initial_delay * multiplier^attempt` between attempts when `is_retriable`
/// accepts the error; otherwise propagates immediately. The final failure
/// is always returned to the caller, retriable or not.
pub async fn retry<T, E, F, Fut, R>(
    mut op: F,
    policy: RetryPolicy,
    is_retriable: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let retriable = is_retriable(&err);
                if !retriable || attempt >= policy.max_attempts {
                    return Err(err);
                }
                let wait = policy
                    .initial_delay
                    .mul_f64(policy.multiplier.powi(attempt as i32));
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

/// Convenience predicate: retry on any error.
pub fn always_retriable<E>(_: &E) -> bool {
    true
}
