use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per task id.
///
/// Every read-modify-write of a task document holds its id's lock,
/// so concurrent executions of the same task append one after the
/// other instead of overwriting each other. Entries are dropped once
/// nobody holds or awaits them, including waiters that gave up.
#[derive(Default)]
pub struct TaskLocks {
    locks: Mutex<HashMap<String, Entry>>,
}

struct Entry {
    lock: Arc<AsyncMutex<()>>,
    /// Holder plus waiters; the entry goes when this reaches zero.
    users: usize,
}

/// Held for the duration of one task mutation.
///
/// Registered before waiting, so a waiter that is cancelled still
/// releases its share of the entry.
pub struct TaskGuard<'a> {
    owner: &'a TaskLocks,
    id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl TaskLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: &str) -> TaskGuard<'_> {
        let (lock, mut pending) = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            let entry = locks.entry(id.to_string()).or_insert_with(|| Entry {
                lock: Arc::new(AsyncMutex::new(())),
                users: 0,
            });
            entry.users += 1;
            let pending = TaskGuard {
                owner: self,
                id: id.to_string(),
                guard: None,
            };
            (entry.lock.clone(), pending)
        };
        pending.guard = Some(lock.lock_owned().await);
        pending
    }

    /// Number of ids with a live lock entry.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        let mut locks = self.owner.locks.lock().unwrap_or_else(|e| e.into_inner());
        self.guard.take();
        if let Some(entry) = locks.get_mut(&self.id) {
            entry.users -= 1;
            if entry.users == 0 {
                locks.remove(&self.id);
            }
        }
    }
}
