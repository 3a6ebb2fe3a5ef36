use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

type Slot = Arc<AsyncMutex<()>>;

/// Per-user mutual exclusion for read-modify-write on a reward account.
/// Shared between the credit engine and the identity linker.
#[derive(Clone, Default)]
pub struct UserLocks {
    slots: Arc<Mutex<HashMap<Uuid, Slot>>>,
}

pub struct UserLockGuard {
    user_id: Uuid,
    slot: Slot,
    guard: Option<OwnedMutexGuard<()>>,
    slots: Arc<Mutex<HashMap<Uuid, Slot>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, user_id: Uuid) -> UserLockGuard {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(user_id).or_default().clone()
        };
        let guard = slot.clone().lock_owned().await;
        UserLockGuard {
            user_id,
            slot,
            guard: Some(guard),
            slots: self.slots.clone(),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for UserLockGuard {
    fn drop(&mut self) {
        // release before inspecting the map so a waiter never sees a removed slot while locked
        self.guard.take();
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = slots.get(&self.user_id) {
            // map entry + our clone
            if Arc::ptr_eq(current, &self.slot) && Arc::strong_count(&self.slot) == 2 {
                slots.remove(&self.user_id);
            }
        }
    }
}

/// Tracks users with an ad view in progress.
#[derive(Clone, Default)]
pub struct AdViewRegistry {
    active: Arc<Mutex<HashSet<Uuid>>>,
}

/// Held for the duration of one ad view; dropping it frees the slot,
/// including when the view is cancelled.
pub struct AdViewTicket {
    user_id: Uuid,
    active: Arc<Mutex<HashSet<Uuid>>>,
}

impl AdViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_begin(&self, user_id: Uuid) -> Option<AdViewTicket> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(user_id) {
            return None;
        }
        Some(AdViewTicket {
            user_id,
            active: self.active.clone(),
        })
    }

    #[cfg(test)]
    pub fn is_active(&self, user_id: Uuid) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&user_id)
    }
}

impl Drop for AdViewTicket {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.user_id);
    }
}
