//! Per-key single-flight.
//!
//! Concurrent misses on one cache key queue behind a shared async mutex; the first holder
//! fills the cache and the rest re-read it once they get the lock.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct SingleFlight {
    slots: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive ownership of `key`.
    pub async fn acquire(&self, key: &str) -> FlightGuard {
        let slot = self
            .slots
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = slot.clone().lock_owned().await;
        FlightGuard {
            key: key.to_string(),
            slot,
            slots: Arc::clone(&self.slots),
            guard: Some(guard),
        }
    }

    /// Keys with at least one holder or waiter.
    pub fn in_flight(&self) -> usize {
        self.slots.len()
    }
}

pub struct FlightGuard {
    key: String,
    slot: Arc<Mutex<()>>,
    slots: Arc<DashMap<String, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        // Release the lock before checking for waiters.
        self.guard.take();
        // Map entry + this guard's clone; anything above that is a waiter.
        self.slots.remove_if(&self.key, |_, slot| {
            Arc::ptr_eq(slot, &self.slot) && Arc::strong_count(slot) <= 2
        });
    }
}
