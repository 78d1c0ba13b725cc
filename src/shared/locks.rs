//! Per-Message Lock Table
//!
//! Fine-grained synchronization for read-modify-write sequences on a single
//! message (reaction replace). Operations on different messages never contend.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lock table keyed by message ID.
///
/// Lock entries are created lazily and kept for the lifetime of the process;
/// the per-entry cost is one `Arc<Mutex<()>>`.
#[derive(Default)]
pub struct MessageLocks {
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl MessageLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Acquire the lock for a message, waiting if another operation on the
    /// same message is in flight.
    pub async fn acquire(&self, message_id: i64) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(message_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}
