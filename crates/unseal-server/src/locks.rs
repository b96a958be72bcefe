use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-key async mutexes. Distinct keys never contend.
///
/// Entries are created on first lock and dropped once the last holder or
/// waiter goes away, including waiters cancelled before they acquire. The map
/// only holds keys currently in use.
#[derive(Default)]
pub struct KeyLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Held lock on one key. Released on drop.
pub struct KeyGuard<'a> {
    owner: &'a KeyLocks,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

type Acquire = Pin<Box<dyn Future<Output = OwnedMutexGuard<()>> + Send>>;

/// An in-flight acquisition. Dropping it early still prunes the entry.
struct Waiting<'a> {
    owner: &'a KeyLocks,
    key: &'a str,
    acquire: Option<Acquire>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> KeyGuard<'_> {
        let mutex = self
            .locks
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = Waiting {
            owner: self,
            key,
            acquire: Some(Box::pin(mutex.lock_owned())),
        }
        .await;
        KeyGuard {
            owner: self,
            key: key.to_owned(),
            guard: Some(guard),
        }
    }

    /// Number of keys with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Drop `key`'s entry if the map holds the only reference to it.
    fn prune(&self, key: &str) {
        self.locks
            .remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl Future for Waiting<'_> {
    type Output = OwnedMutexGuard<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.acquire.as_mut() {
            Some(acquire) => acquire.as_mut().poll(cx),
            None => Poll::Pending,
        }
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        // The pending acquire owns an Arc clone; release it before counting.
        self.acquire.take();
        self.owner.prune(self.key);
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        // Release first so our Arc no longer counts.
        self.guard.take();
        self.owner.prune(&self.key);
    }
}
