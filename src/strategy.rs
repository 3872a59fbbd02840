// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Processing strategy selection and the shared collection traversal.
//!
//! Both phases face the same memory/IO trade-off per collection:
//!
//! - **Materialize**: pull the whole result set into memory, then process it.
//!   Short-lived source cursor, fewer round trips, memory proportional to the
//!   collection.
//! - **Stream**: process each item as the cursor yields it. Bounded memory,
//!   longer-lived cursor.
//!
//! [`Strategy::select`] makes the decision from a document count, and
//! [`traverse`] is the one place that acts on it, so the upsert and
//! reconciliation phases cannot drift apart.

use crate::error::Result;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::num::NonZeroU64;

/// Default document count at or below which a collection is materialized.
pub const DEFAULT_MATERIALIZE_THRESHOLD: u64 = 200_000;

/// How a collection is traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Buffer the entire collection in memory before processing.
    Materialize,
    /// Process one item at a time as the cursor yields it.
    Stream,
}

impl Strategy {
    /// Choose a strategy from a document count.
    ///
    /// `Materialize` when `count <= threshold`, otherwise `Stream`.
    pub fn select(count: u64, threshold: NonZeroU64) -> Self {
        if count <= threshold.get() {
            Strategy::Materialize
        } else {
            Strategy::Stream
        }
    }

    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Materialize => "materialize",
            Strategy::Stream => "stream",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Threshold plus an optional operator override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyPolicy {
    threshold: NonZeroU64,
    forced: Option<Strategy>,
}

impl Default for StrategyPolicy {
    fn default() -> Self {
        Self {
            threshold: NonZeroU64::new(DEFAULT_MATERIALIZE_THRESHOLD)
                .unwrap_or(NonZeroU64::MIN),
            forced: None,
        }
    }
}

impl StrategyPolicy {
    /// Size-based selection with the given threshold.
    pub fn new(threshold: NonZeroU64) -> Self {
        Self {
            threshold,
            forced: None,
        }
    }

    /// Always use `strategy`, whatever the count.
    pub fn with_forced(mut self, strategy: Option<Strategy>) -> Self {
        self.forced = strategy;
        self
    }

    /// The configured threshold.
    pub fn threshold(&self) -> NonZeroU64 {
        self.threshold
    }

    /// The forced strategy, if any.
    pub fn forced(&self) -> Option<Strategy> {
        self.forced
    }

    /// Strategy for a collection holding `count` documents.
    pub fn choose(&self, count: u64) -> Strategy {
        self.forced
            .unwrap_or_else(|| Strategy::select(count, self.threshold))
    }
}

/// Fold over every item of a stream using the given strategy.
///
/// With [`Strategy::Materialize`] the stream is drained into memory before
/// `f` sees the first item, so a read error surfaces before any write
/// happens. With [`Strategy::Stream`] each item is handed to `f` as soon as
/// it arrives. Any error, from the stream or from `f`, stops the traversal.
pub async fn traverse<T, A, F, Fut>(
    strategy: Strategy,
    mut items: BoxStream<'_, Result<T>>,
    init: A,
    mut f: F,
) -> Result<A>
where
    F: FnMut(A, T) -> Fut,
    Fut: Future<Output = Result<A>>,
{
    let mut acc = init;
    match strategy {
        Strategy::Materialize => {
            let buffered: Vec<T> = items.try_collect().await?;
            for item in buffered {
                acc = f(acc, item).await?;
            }
        }
        Strategy::Stream => {
            while let Some(item) = items.try_next().await? {
                acc = f(acc, item).await?;
            }
        }
    }
    Ok(acc)
}
