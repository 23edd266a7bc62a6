//! Backoff for connection-level download failures
//!
//! A request that never reached the index (connection refused or reset,
//! connect timeout, DNS failure) is sent again after an exponentially growing
//! pause. Anything the server answered, and any transfer that stalled after
//! connecting, is final for this run: the file gets no `.fetched` marker and
//! is picked up again by the next run.

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tells [`fetch_with_retry`] whether repeating a request may succeed
pub trait IsRetryable {
    /// True when the same request could succeed on another attempt
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Connect covers refused, reset during handshake, DNS and connect timeouts
            Error::Network(e) => e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
            ),
            Error::HttpStatus { .. }
            | Error::InvalidUrl { .. }
            | Error::Extract(_)
            | Error::IntegrityMismatch { .. }
            | Error::InvalidPath { .. }
            | Error::Config { .. }
            | Error::Catalog(_)
            | Error::Serialization(_)
            | Error::Other(_) => false,
        }
    }
}

/// Run `request` until it succeeds, fails for good, or the retries run out
///
/// The first call is not a retry, so `request` runs at most
/// `config.max_attempts + 1` times.
pub async fn fetch_with_retry<F, Fut, T, E>(config: &RetryConfig, mut request: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut backoff = Backoff::new(config);
    let mut retries = 0;

    loop {
        let error = match request().await {
            Ok(value) => {
                if retries > 0 {
                    info!(retries, "request succeeded after reconnecting");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !error.is_retryable() {
            debug!(error = %error, "request failed, not retryable");
            return Err(error);
        }
        if retries >= config.max_attempts {
            warn!(error = %error, retries, "giving up on request");
            return Err(error);
        }

        retries += 1;
        let pause = backoff.next_pause();
        debug!(
            error = %error,
            retry = retries,
            max_retries = config.max_attempts,
            pause_ms = pause.as_millis() as u64,
            "connection failed, retrying"
        );
        tokio::time::sleep(pause).await;
    }
}

/// Exponential pause sequence capped at `max_delay`
struct Backoff<'a> {
    config: &'a RetryConfig,
    next: Duration,
}

impl<'a> Backoff<'a> {
    fn new(config: &'a RetryConfig) -> Self {
        Self {
            config,
            next: config.initial_delay,
        }
    }

    fn next_pause(&mut self) -> Duration {
        let base = self.next.min(self.config.max_delay);
        self.next = Duration::try_from_secs_f64(base.as_secs_f64() * self.config.backoff_multiplier)
            .map_or(self.config.max_delay, |grown| grown.min(self.config.max_delay));

        if self.config.jitter {
            spread(base)
        } else {
            base
        }
    }
}

/// Scale `pause` by a random factor in `[0.5, 1.5]` so projects do not reconnect in lockstep
fn spread(pause: Duration) -> Duration {
    pause.mul_f64(rand::thread_rng().gen_range(0.5..=1.5))
}
