//! Capped linear backoff for external submissions.
//!
//! Returns a typed outcome carrying the attempts used instead of
//! burying the count in log output.

use std::fmt::Display;
use std::time::Duration;

use tokio::time::sleep;

/// Result of a retried operation plus how many attempts it took.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts_used: u32,
}

/// Run `op` up to `attempts` times (minimum 1), sleeping
/// `base_delay * attempt` between failures. Retries are synchronous
/// with respect to the caller: the batch does not advance until they
/// exhaust.
pub async fn retry_with_backoff<T, E, F>(
    attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> RetryOutcome<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op() {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts_used: attempt,
                }
            }
            Err(err) if attempt >= attempts => {
                log::warn!("attempt {attempt}/{attempts} failed: {err}; giving up");
                return RetryOutcome {
                    result: Err(err),
                    attempts_used: attempt,
                };
            }
            Err(err) => {
                let delay = base_delay.saturating_mul(attempt);
                log::warn!(
                    "attempt {attempt}/{attempts} failed: {err}; retrying in {delay:?}"
                );
                sleep(delay).await;
            }
        }
    }
}
