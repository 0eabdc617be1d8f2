//! # Transfer Tracker
//!
//! Ephemeral record of devices believed to be downloading freshly rendered
//! content. Lives only in memory and starts empty after a restart.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  device poll hands out bytes ──► mark_transferring(id)  [id → now]      │
//! │                                                                         │
//! │  is_transferring(id)                                                    │
//! │    ├── no entry                 → false                                 │
//! │    ├── age > timeout            → false, entry evicted                  │
//! │    └── otherwise                → true                                  │
//! │                                                                         │
//! │  clear_if_settled(id, dwell)     needsUpdate already false              │
//! │    └── age >= dwell             → entry removed                         │
//! │        (3s from device polls, 5s from listings)                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every operation takes the map lock for a single insert, lookup or remove.
//! Nothing is held across an await on another component.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Process-scoped map of `device_id -> transfer start`.
///
/// The lock guards one map operation at a time and is released before the
/// method returns. Renders and database calls never run while it is held, so
/// devices only contend for the few instructions of an insert or lookup.
#[derive(Debug)]
pub struct TransferTracker {
    started: RwLock<HashMap<String, Instant>>,
    timeout: Duration,
}

impl TransferTracker {
    pub fn new(timeout: Duration) -> Self {
        TransferTracker {
            started: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    /// Records that `device_id` started a download now. Overwrites any earlier start.
    pub async fn mark_transferring(&self, device_id: &str) {
        self.started
            .write()
            .await
            .insert(device_id.to_string(), Instant::now());
        debug!(device_id = %device_id, "Transfer started");
    }

    /// Returns true while a transfer is in flight. Stale entries are evicted.
    pub async fn is_transferring(&self, device_id: &str) -> bool {
        let started = match self.started.read().await.get(device_id) {
            Some(started) => *started,
            None => return false,
        };

        if started.elapsed() <= self.timeout {
            return true;
        }

        let mut map = self.started.write().await;
        // A poll may have re-marked the device between the two locks
        if map.get(device_id).is_some_and(|s| s.elapsed() > self.timeout) {
            map.remove(device_id);
            debug!(device_id = %device_id, "Transfer timed out");
        }
        false
    }

    /// Removes the entry once it is at least `dwell` old.
    ///
    /// Returns true if an entry was removed.
    pub async fn clear_if_settled(&self, device_id: &str, dwell: Duration) -> bool {
        let mut map = self.started.write().await;
        match map.get(device_id) {
            Some(started) if started.elapsed() >= dwell => {
                map.remove(device_id);
                debug!(device_id = %device_id, "Transfer settled");
                true
            }
            _ => false,
        }
    }

    /// Forgets the device unconditionally.
    pub async fn remove(&self, device_id: &str) {
        self.started.write().await.remove(device_id);
    }

    /// Number of tracked entries, stale ones included.
    pub async fn len(&self) -> usize {
        self.started.read().await.len()
    }
}

impl Default for TransferTracker {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_devices_are_tracked_independently() {
        let tracker = Arc::new(TransferTracker::default());

        let mut tasks = tokio::task::JoinSet::new();
        for n in 0..32 {
            let tracker = tracker.clone();
            tasks.spawn(async move {
                let device_id = format!("dev-{}", n);
                tracker.mark_transferring(&device_id).await;
                if n % 2 == 0 {
                    tracker.remove(&device_id).await;
                }
                tracker.is_transferring(&device_id).await
            });
        }

        let mut transferring = 0;
        while let Some(result) = tasks.join_next().await {
            if result.unwrap() {
                transferring += 1;
            }
        }
        assert_eq!(transferring, 16);
        assert_eq!(tracker.len().await, 16);
        assert!(tracker.is_transferring("dev-1").await);
        assert!(!tracker.is_transferring("dev-0").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transfer_times_out_and_is_evicted() {
        let tracker = TransferTracker::default();
        tracker.mark_transferring("dev-1").await;
        assert!(tracker.is_transferring("dev-1").await);

        tokio::time::advance(Duration::from_secs(300)).await;
        assert!(tracker.is_transferring("dev-1").await);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!tracker.is_transferring("dev-1").await);
        assert_eq!(tracker.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_respects_dwell() {
        let tracker = TransferTracker::default();
        tracker.mark_transferring("dev-1").await;

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!tracker.clear_if_settled("dev-1", Duration::from_secs(3)).await);
        assert!(tracker.is_transferring("dev-1").await);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(tracker.clear_if_settled("dev-1", Duration::from_secs(3)).await);
        assert!(!tracker.is_transferring("dev-1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remark_restarts_clock() {
        let tracker = TransferTracker::default();
        tracker.mark_transferring("dev-1").await;
        tokio::time::advance(Duration::from_secs(250)).await;
        tracker.mark_transferring("dev-1").await;
        tokio::time::advance(Duration::from_secs(100)).await;

        assert!(tracker.is_transferring("dev-1").await);
    }

    #[tokio::test]
    async fn test_devices_are_independent() {
        let tracker = TransferTracker::default();
        tracker.mark_transferring("dev-1").await;

        assert!(!tracker.is_transferring("dev-2").await);
        assert!(!tracker.clear_if_settled("dev-2", Duration::ZERO).await);

        tracker.remove("dev-1").await;
        assert!(!tracker.is_transferring("dev-1").await);
    }
}
