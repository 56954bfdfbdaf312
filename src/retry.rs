// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounded retry with backoff.
//!
//! [`RetryPolicy`] is the single retry primitive of the crate. The controller
//! uses it for characteristic writes and, when configured, for transport
//! connects.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use pushbot_bridge::retry::RetryPolicy;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let policy = RetryPolicy::new()
//!     .with_max_attempts(3)
//!     .with_backoff(Duration::from_millis(1));
//!
//! let outcome = policy
//!     .run(|attempt| async move {
//!         if attempt < 3 { Err("busy") } else { Ok(attempt) }
//!     })
//!     .await;
//!
//! assert_eq!(outcome.attempts, 3);
//! assert_eq!(outcome.result, Ok(3));
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration_ms;

/// Attempt budget and delay schedule for a retried operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one. Zero is treated as
    /// one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    #[serde(rename = "backoff_ms", with = "duration_ms")]
    pub backoff: Duration,
    /// Growth factor applied to the delay after each further failure.
    pub backoff_multiplier: f32,
    /// Upper bound for the delay.
    #[serde(rename = "max_backoff_ms", with = "duration_ms")]
    pub max_backoff: Duration,
}

/// Result of [`RetryPolicy::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T, E> {
    /// The first success, or the error of the final attempt.
    pub result: Result<T, E>,
    /// Number of attempts made.
    pub attempts: u32,
}

impl<T, E> Attempted<T, E> {
    /// Returns true if one of the attempts succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

impl RetryPolicy {
    /// Creates a policy with default settings (3 attempts, 500 ms fixed
    /// backoff).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a policy that makes exactly one attempt.
    #[must_use]
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sets the total number of attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the delay after the first failure.
    #[must_use]
    pub fn with_backoff(mut self, delay: Duration) -> Self {
        self.backoff = delay;
        if self.max_backoff < delay {
            self.max_backoff = delay;
        }
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f32) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Sets the maximum delay between attempts.
    #[must_use]
    pub fn with_max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// Returns the effective attempt budget.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Calculates the delay that follows failed attempt number `failures`
    /// (1-based).
    #[must_use]
    pub fn delay_after(&self, failures: u32) -> Duration {
        if failures <= 1 {
            return self.backoff.min(self.max_backoff);
        }

        let multiplier = self
            .backoff_multiplier
            .powi(i32::try_from(failures - 1).unwrap_or(i32::MAX));

        // Delays are seconds at most; f32 precision is plenty
        #[allow(clippy::cast_precision_loss)]
        let delay_ms = self.backoff.as_millis() as f32 * multiplier;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = Duration::from_millis(delay_ms as u64);

        delay.min(self.max_backoff)
    }

    /// Runs `operation` until it succeeds or the attempt budget is spent.
    ///
    /// The closure receives the 1-based attempt number. The first success
    /// short-circuits the remaining attempts.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Attempted<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let budget = self.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation(attempt).await {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts: attempt,
                    };
                }
                Err(e) if attempt >= budget => {
                    tracing::debug!(attempt, error = %e, "Final attempt failed");
                    return Attempted {
                        result: Err(e),
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    tracing::debug!(attempt, budget, error = %e, ?delay, "Attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
            backoff_multiplier: 1.0,
            max_backoff: Duration::from_secs(30),
        }
    }
}
