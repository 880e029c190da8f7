//! Keyed lock: serializes operations sharing a key (plugin id) while
//! letting different keys proceed in parallel.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

/// A map of per-key `tokio::sync::Mutex`es. Entries are created lazily
/// and never removed; the map stays small since it is bounded by the
/// number of distinct plugin ids ever seen.
pub struct KeyedLock {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLock {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    fn entry(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Runs `f` while holding the lock for `key`. Other callers with the
    /// same key block until `f` completes; callers with different keys
    /// run concurrently.
    pub async fn with_lock<F, Fut, T>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let lock = self.entry(key);
        let _guard = lock.lock().await;
        f().await
    }
}

impl Default for KeyedLock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_serializes() {
        let lock = Arc::new(KeyedLock::new());
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let lock = Arc::clone(&lock);
            let concurrent = Arc::clone(&concurrent);
            let max_concurrent = Arc::clone(&max_concurrent);
            handles.push(tokio::spawn(async move {
                lock.with_lock("plugin-a", || async {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    max_concurrent.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_run_concurrently() {
        let lock = Arc::new(KeyedLock::new());
        let start = tokio::time::Instant::now();

        let a = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                lock.with_lock("a", || async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                })
                .await;
            })
        };
        let b = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                lock.with_lock("b", || async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                })
                .await;
            })
        };
        a.await.unwrap();
        b.await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(95));
    }
}
