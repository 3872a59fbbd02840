// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resilience utilities: the backoff schedule used when connecting at
//! startup, and the limiter that caps how many destination passes run at
//! once.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), doc_replicator::resilience::LimiterClosed> {
//! use doc_replicator::resilience::{DestinationLimiter, RetryConfig};
//!
//! // 5 attempts means 4 waits between them
//! let retry = RetryConfig::startup();
//! assert_eq!(retry.schedule().count(), 4);
//!
//! let limiter = DestinationLimiter::new(4);
//! let _slot = limiter.admit("sales@replica-a").await?;
//! // slot dropped = next destination may start
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::debug;

// =============================================================================
// Connect retry
// =============================================================================

/// How often, and how patiently, to try reaching a store.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: usize,

    /// Wait after the first failed attempt.
    pub initial_delay: Duration,

    /// Ceiling for any single wait.
    pub max_delay: Duration,

    /// Growth of the wait between consecutive attempts.
    pub backoff_factor: f64,

    /// Time allowed for one attempt (handshake + ping).
    pub attempt_timeout: Duration,
}

impl RetryConfig {
    /// Retry profile for process startup.
    ///
    /// A run is one pass, so an unreachable store should be reported within
    /// seconds rather than waited on.
    ///
    /// ```text
    /// After attempt  Wait      Cumulative
    /// -------------  ----      ----------
    /// 1              500ms     500ms
    /// 2              750ms     1.25s
    /// 3              1.12s     2.37s
    /// 4              1.69s     4.06s
    /// ```
    pub fn startup() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_factor: 1.5,
            attempt_timeout: Duration::from_secs(10),
        }
    }

    /// Fast-fail profile for tests.
    pub fn testing() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
            attempt_timeout: Duration::from_millis(500),
        }
    }

    /// Wait after failed attempt number `attempt` (1-indexed), capped at `max_delay`.
    pub fn delay_after(&self, attempt: usize) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as usize) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// Every wait between attempts, in order.
    ///
    /// Yields `max_attempts - 1` delays: running out means giving up.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..self.max_attempts).map(|attempt| self.delay_after(attempt))
    }
}

// =============================================================================
// Destination limiter
// =============================================================================

/// The limiter was closed before a destination got a slot.
#[derive(Debug, Clone, thiserror::Error)]
#[error("destination limiter closed (max {max_concurrent} concurrent passes)")]
pub struct LimiterClosed {
    pub max_concurrent: usize,
}

/// Caps how many destination passes hold source cursors at the same time.
///
/// Each worker is admitted before it touches either store and keeps its
/// slot until its pass ends. Once [`close`](Self::close)d, waiting and
/// future admissions fail with [`LimiterClosed`]; passes already holding a
/// slot are unaffected.
#[derive(Debug)]
pub struct DestinationLimiter {
    slots: Arc<Semaphore>,
    max_concurrent: usize,
}

impl DestinationLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Wait for a free slot for `destination`.
    ///
    /// The slot is released when the returned permit is dropped.
    pub async fn admit(&self, destination: &str) -> Result<OwnedSemaphorePermit, LimiterClosed> {
        match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(permit) => return Ok(permit),
            Err(TryAcquireError::Closed) => return Err(self.closed()),
            Err(TryAcquireError::NoPermits) => {}
        }

        debug!(
            destination = %destination,
            max_concurrent = self.max_concurrent,
            "Waiting for a destination slot"
        );
        Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| self.closed())
    }

    fn closed(&self) -> LimiterClosed {
        LimiterClosed {
            max_concurrent: self.max_concurrent,
        }
    }

    /// Refuse every pending and future admission.
    pub fn close(&self) {
        if !self.slots.is_closed() {
            debug!(in_flight = self.in_flight(), "Closing destination limiter");
            self.slots.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }

    /// Passes currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent
            .saturating_sub(self.slots.available_permits())
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}
