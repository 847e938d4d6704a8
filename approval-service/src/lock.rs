use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};

use crate::error::{Result, WorkflowError};

/// Per-entity guard for in-flight transitions within one client.
///
/// Not a distributed lock: two clients acting on the same entity are not
/// excluded from each other.
#[derive(Clone, Default)]
pub struct ActionLock {
    held: Arc<Mutex<LockTable>>,
}

#[derive(Default)]
struct LockTable {
    tokens: HashMap<String, u64>,
    next_token: u64,
}

impl ActionLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, LockTable> {
        // A poisoned table still holds valid ids
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Locks `entity_id` unless it is already locked.
    #[cfg(test)]
    pub fn try_acquire(&self, entity_id: &str) -> bool {
        self.acquire_token(entity_id).is_some()
    }

    fn acquire_token(&self, entity_id: &str) -> Option<u64> {
        let mut table = self.table();
        if table.tokens.contains_key(entity_id) {
            debug!("Action already in flight for {}", entity_id);
            return None;
        }
        table.next_token += 1;
        let token = table.next_token;
        table.tokens.insert(entity_id.to_string(), token);
        Some(token)
    }

    /// Scoped acquisition: the lock is released when the guard drops.
    pub fn guard(&self, entity_id: &str) -> Option<ActionGuard> {
        self.acquire_token(entity_id).map(|token| ActionGuard {
            lock: self.clone(),
            entity_id: entity_id.to_string(),
            token,
        })
    }

    /// Releases `entity_id` whoever holds it. Releasing a free id is a no-op.
    #[cfg(test)]
    pub fn release(&self, entity_id: &str) {
        self.table().tokens.remove(entity_id);
    }

    #[cfg(test)]
    pub fn is_held(&self, entity_id: &str) -> bool {
        self.table().tokens.contains_key(entity_id)
    }

    #[cfg(test)]
    pub fn held_count(&self) -> usize {
        self.table().tokens.len()
    }

    fn release_token(&self, entity_id: &str, token: u64) -> bool {
        let mut table = self.table();
        // Only if no release/re-acquire happened in between
        if table.tokens.get(entity_id) == Some(&token) {
            table.tokens.remove(entity_id);
            return true;
        }
        false
    }
}

pub struct ActionGuard {
    lock: ActionLock,
    entity_id: String,
    token: u64,
}

impl Drop for ActionGuard {
    fn drop(&mut self) {
        self.lock.release_token(&self.entity_id, self.token);
    }
}

/// The locks taken through one view.
///
/// Leaving the view releases these and nothing else, so other views sharing
/// the same client lock keep theirs.
pub struct LockScope {
    lock: ActionLock,
    taken: Arc<Mutex<HashMap<String, u64>>>,
}

impl LockScope {
    pub fn new(lock: ActionLock) -> Self {
        Self {
            lock,
            taken: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn guard(&self, entity_id: &str) -> Option<ScopedGuard> {
        let guard = self.lock.guard(entity_id)?;
        lock_taken(&self.taken).insert(entity_id.to_string(), guard.token);
        Some(ScopedGuard {
            guard,
            taken: self.taken.clone(),
        })
    }

    /// Runs `task` under the lock for `entity_id`. `None` means another
    /// action on the same entity is still in flight.
    ///
    /// The task is spawned so that dropping the returned future (the user
    /// navigating away) releases the lock while the remote call carries on.
    pub async fn run<F, T>(&self, entity_id: &str, task: F) -> Option<Result<T>>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let Some(_guard) = self.guard(entity_id) else {
            warn!("Skipping action on {}: another one is in flight", entity_id);
            return None;
        };

        let result = match tokio::spawn(task).await {
            Ok(result) => result,
            Err(err) => Err(WorkflowError::RemoteFailure(format!(
                "Action on {} did not finish: {}",
                entity_id, err
            ))),
        };
        Some(result)
    }

    /// Releases every lock this scope still holds.
    pub fn release_held(&self) {
        let taken: Vec<(String, u64)> = lock_taken(&self.taken).drain().collect();
        let released = taken
            .iter()
            .filter(|(entity_id, token)| self.lock.release_token(entity_id, *token))
            .count();
        if released > 0 {
            warn!("Released {} in-flight action lock(s) on leave", released);
        }
    }
}

fn lock_taken(taken: &Mutex<HashMap<String, u64>>) -> MutexGuard<'_, HashMap<String, u64>> {
    taken.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct ScopedGuard {
    guard: ActionGuard,
    taken: Arc<Mutex<HashMap<String, u64>>>,
}

impl Drop for ScopedGuard {
    fn drop(&mut self) {
        let mut taken = lock_taken(&self.taken);
        if taken.get(&self.guard.entity_id) == Some(&self.guard.token) {
            taken.remove(&self.guard.entity_id);
        }
    }
}
