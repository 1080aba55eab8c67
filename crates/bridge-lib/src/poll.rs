//! Bounded fixed-interval polling with cancellation
//!
//! Used while waiting for the platform to materialize a workspace pod.
//! Each attempt sleeps for the interval first, then runs the probe. A probe
//! returning `Ok(None)` means "not yet"; an error aborts polling at once.

use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Polling bounds
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PollConfig {
    /// Delay before every attempt
    #[serde(
        rename = "interval_ms",
        with = "duration_millis",
        default = "default_interval"
    )]
    pub interval: Duration,
    /// Maximum number of attempts
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_max_attempts() -> u32 {
    120
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl PollConfig {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Upper bound on time spent sleeping
    pub fn ceiling(&self) -> Duration {
        slept(self.interval, self.max_attempts)
    }
}

/// Total sleep for `attempts` intervals, saturating at `Duration::MAX`
fn slept(interval: Duration, attempts: u32) -> Duration {
    interval.saturating_mul(attempts)
}

/// Why polling stopped without a value
#[derive(Debug, Error)]
pub enum PollError<E> {
    #[error("gave up after {attempts} attempts ({waited:?})")]
    Exhausted { attempts: u32, waited: Duration },

    #[error("polling cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },

    #[error("{0}")]
    Failed(E),
}

/// Outcome of a finished poll, with the attempt count for metrics
#[derive(Debug)]
pub struct Polled<T> {
    pub value: T,
    pub attempts: u32,
}

/// Run `probe` until it yields a value, the attempts run out, or `cancel`
/// fires.
pub async fn poll_until<F, Fut, T, E>(
    config: &PollConfig,
    operation_name: &str,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<Polled<T>, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;

    while attempt < config.max_attempts {
        tokio::select! {
            _ = cancel.cancelled() => {
                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    "Polling cancelled"
                );
                return Err(PollError::Cancelled { attempts: attempt });
            }
            _ = tokio::time::sleep(config.interval) => {}
        }

        attempt += 1;

        match probe().await {
            Ok(Some(value)) => {
                debug!(
                    operation = %operation_name,
                    attempt = attempt,
                    "Polling succeeded"
                );
                return Ok(Polled {
                    value,
                    attempts: attempt,
                });
            }
            Ok(None) => {
                debug!(
                    operation = %operation_name,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    "Not ready yet"
                );
            }
            Err(e) => {
                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    "Polling aborted by error"
                );
                return Err(PollError::Failed(e));
            }
        }
    }

    Err(PollError::Exhausted {
        attempts: attempt,
        waited: slept(config.interval, attempt),
    })
}

mod duration_millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
