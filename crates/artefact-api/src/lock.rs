//! # Resolution Lock
//!
//! Serializes find-or-create of artefact identities so that no two
//! identities are ever created for the same `(domain, name)`.
//!
//! With [`LockGranularity::Global`] every resolution in the process takes
//! the same lock. [`LockGranularity::PerName`] keeps one lock per
//! `(domain, name)`, which preserves the no-duplicates property while letting
//! unrelated names resolve concurrently. A per-name entry is removed when the
//! last holder or waiter releases it.

use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// How finely resolutions are serialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockGranularity {
    /// One lock for every resolution.
    #[default]
    Global,
    /// One lock per `(domain, name)`.
    PerName,
}

impl FromStr for LockGranularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(Self::Global),
            "per-name" | "per_name" | "pername" => Ok(Self::PerName),
            other => Err(format!(
                "unknown resolution lock granularity {other:?} (expected \"global\" or \"per-name\")"
            )),
        }
    }
}

/// The lock taken around identity find-or-create.
#[derive(Debug)]
pub struct ResolutionLock {
    granularity: LockGranularity,
    global: Arc<Mutex<()>>,
    per_name: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl ResolutionLock {
    pub fn new(granularity: LockGranularity) -> Self {
        Self {
            granularity,
            global: Arc::new(Mutex::new(())),
            per_name: DashMap::new(),
        }
    }

    pub fn granularity(&self) -> LockGranularity {
        self.granularity
    }

    /// Wait for the lock covering `(domain, name)`. Released on drop.
    pub async fn acquire(&self, domain: &str, name: &str) -> ResolutionGuard<'_> {
        match self.granularity {
            LockGranularity::Global => ResolutionGuard {
                held: Some(Arc::clone(&self.global).lock_owned().await),
                prune: None,
            },
            LockGranularity::PerName => {
                let key = (domain.to_string(), name.to_string());
                let mutex = Arc::clone(&*self.per_name.entry(key.clone()).or_default());
                ResolutionGuard {
                    held: Some(mutex.lock_owned().await),
                    prune: Some((&self.per_name, key)),
                }
            }
        }
    }

    /// Number of `(domain, name)` pairs with a live per-name lock.
    pub fn tracked_names(&self) -> usize {
        self.per_name.len()
    }
}

/// Held resolution lock.
#[derive(Debug)]
pub struct ResolutionGuard<'a> {
    held: Option<OwnedMutexGuard<()>>,
    prune: Option<(&'a DashMap<(String, String), Arc<Mutex<()>>>, (String, String))>,
}

impl Drop for ResolutionGuard<'_> {
    fn drop(&mut self) {
        drop(self.held.take());
        if let Some((map, key)) = self.prune.take() {
            // Only the map's own reference left: nobody holds or awaits it.
            map.remove_if(&key, |_, mutex| Arc::strong_count(mutex) == 1);
        }
    }
}

impl Default for ResolutionLock {
    fn default() -> Self {
        Self::new(LockGranularity::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parses_granularity() {
        assert_eq!("global".parse::<LockGranularity>(), Ok(LockGranularity::Global));
        assert_eq!("Per-Name".parse::<LockGranularity>(), Ok(LockGranularity::PerName));
        assert!("coarse".parse::<LockGranularity>().is_err());
    }

    #[tokio::test]
    async fn global_lock_blocks_unrelated_names() {
        let lock = ResolutionLock::new(LockGranularity::Global);
        let _held = lock.acquire("example.com", "a").await;
        let other =
            tokio::time::timeout(Duration::from_millis(20), lock.acquire("example.com", "b")).await;
        assert!(other.is_err());
    }

    #[tokio::test]
    async fn per_name_lock_only_blocks_the_same_pair() {
        let lock = ResolutionLock::new(LockGranularity::PerName);
        let _held = lock.acquire("example.com", "a").await;
        let unrelated =
            tokio::time::timeout(Duration::from_millis(20), lock.acquire("example.com", "b")).await;
        assert!(unrelated.is_ok());
        let same =
            tokio::time::timeout(Duration::from_millis(20), lock.acquire("example.com", "a")).await;
        assert!(same.is_err());
    }

    #[tokio::test]
    async fn per_name_locks_are_pruned_once_released() {
        let lock = ResolutionLock::new(LockGranularity::PerName);
        let first = lock.acquire("example.com", "a").await;
        assert_eq!(lock.tracked_names(), 1);

        // A waiter keeps the entry alive after the holder lets go.
        let waiter = lock.acquire("example.com", "a");
        tokio::pin!(waiter);
        let pending = tokio::time::timeout(Duration::from_millis(20), waiter.as_mut()).await;
        assert!(pending.is_err());
        drop(first);
        assert_eq!(lock.tracked_names(), 1);

        let second = waiter.await;
        drop(second);
        assert_eq!(lock.tracked_names(), 0);

        for name in ["a", "b", "c"] {
            drop(lock.acquire("example.com", name).await);
        }
        assert_eq!(lock.tracked_names(), 0);
    }
}
