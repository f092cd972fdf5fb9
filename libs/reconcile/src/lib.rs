//! Reconciliation loop primitives.
//!
//! Helpers for loops that turn an unbounded stream of desired-state changes
//! into bounded batches of work against an external system:
//!
//! - **Windowing**: [`next_window`] collects items from a channel until either
//!   the window's timeout elapses or it holds `max_size` items, whichever
//!   comes first.
//! - **Last-write-wins dedup**: [`distinct_keep_last`] collapses a window so
//!   that only the most recent change per key survives.
//!
//! # Invariants
//!
//! - A window never holds more than `max_size` items
//! - A window is never open for longer than `timeout`
//! - Dedup keeps exactly one item per key: the last one observed

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

/// Window configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("window max size must be at least 1")]
    ZeroMaxSize,

    #[error("window timeout must be greater than zero")]
    ZeroTimeout,
}

/// Bounds for a single batching window.
///
/// There is intentionally no `Default`: both bounds are deployment decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    timeout: Duration,
    max_size: usize,
}

impl WindowConfig {
    /// Create a window configuration.
    pub fn new(timeout: Duration, max_size: usize) -> Result<Self, WindowError> {
        if max_size == 0 {
            return Err(WindowError::ZeroMaxSize);
        }
        if timeout.is_zero() {
            return Err(WindowError::ZeroTimeout);
        }
        Ok(Self { timeout, max_size })
    }

    /// Maximum time a window stays open.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Maximum number of items in one window.
    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

/// Collect the next window of items from `rx`.
///
/// The window opens when this function is called. It closes when:
/// - `max_size` items have been received,
/// - the timeout elapses (possibly with zero items), or
/// - the channel is closed and drained.
///
/// Returns `None` only when the channel is closed and nothing was collected,
/// which means no further windows can be produced.
///
/// Cancel safe: dropping the future loses only the items collected so far in
/// this window, never an item still in the channel.
pub async fn next_window<T>(
    rx: &mut mpsc::UnboundedReceiver<T>,
    config: &WindowConfig,
) -> Option<Vec<T>> {
    let deadline = tokio::time::sleep(config.timeout);
    tokio::pin!(deadline);

    let mut items = Vec::new();

    loop {
        tokio::select! {
            _ = &mut deadline => return Some(items),
            item = rx.recv() => match item {
                Some(item) => {
                    items.push(item);
                    if items.len() >= config.max_size {
                        return Some(items);
                    }
                }
                None if items.is_empty() => return None,
                None => return Some(items),
            },
        }
    }
}

/// Remove duplicates by key, keeping the last occurrence of each key.
///
/// Survivors keep the relative order of their last occurrence, so the output
/// is a subsequence of the input.
pub fn distinct_keep_last<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut last_seen: HashMap<K, usize> = HashMap::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        last_seen.insert(key(item), idx);
    }

    if last_seen.len() == items.len() {
        return items;
    }

    items
        .into_iter()
        .enumerate()
        .filter(|(idx, item)| last_seen.get(&key(item)) == Some(idx))
        .map(|(_, item)| item)
        .collect()
}
