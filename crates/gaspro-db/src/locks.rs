//! # Ledger Locks
//!
//! Serialises writes per customer and lets whole-store passes run alone.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Lock Layout                                      │
//! │                                                                         │
//! │   gate: RwLock<()>                                                     │
//! │   ├── shared   ← every ledger / registry write                         │
//! │   └── exclusive← reconcile_all, import, factory reset                  │
//! │                                                                         │
//! │   customers: { customer_id → Mutex<()> }                               │
//! │   └── held across the whole database transaction of one write          │
//! │                                                                         │
//! │   Order: gate first, then the customer mutex. Never re-entered.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The SQLite transaction already takes the database write lock on its first
//! UPDATE; the async mutex keeps two writers for the same customer from
//! queueing on `busy_timeout` and gives a deterministic order.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Above this many idle entries the customer map is pruned.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Default)]
pub struct LedgerLocks {
    gate: RwLock<()>,
    customers: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Held for the duration of one customer-scoped write.
#[must_use]
pub struct CustomerGuard<'a> {
    _customer: OwnedMutexGuard<()>,
    _gate: RwLockReadGuard<'a, ()>,
}

impl LedgerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks one customer for a ledger write.
    pub async fn customer(&self, customer_id: &str) -> CustomerGuard<'_> {
        let gate = self.gate.read().await;
        let mutex = {
            let mut map = self.customers.lock().await;
            if map.len() > PRUNE_THRESHOLD {
                map.retain(|_, m| Arc::strong_count(m) > 1);
            }
            Arc::clone(map.entry(customer_id.to_string()).or_default())
        };
        CustomerGuard {
            _customer: mutex.lock_owned().await,
            _gate: gate,
        }
    }

    /// Shared access for writes that touch no balance (profiles, catalog).
    pub async fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().await
    }

    /// Exclusive access: waits for in-flight writes and blocks new ones.
    pub async fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().await
    }
}
