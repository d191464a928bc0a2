use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::Order;

// ============================================================================
// Order Cache - concurrent read accelerator
// ============================================================================
//
// In-process map of the most recently seen state of every order, keyed by
// order_uid. The store stays authoritative; this map only serves reads.
//
// Readers share the read lock, a writer holds the write lock for a single
// map operation. Entries are replaced whole: a `get` observes either the
// previous or the new Order, never a mix of the two.
// ============================================================================

#[derive(Default)]
pub struct OrderCache {
    inner: RwLock<HashMap<String, Order>>,
}

impl OrderCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or overwrite the entry for `order.order_uid`.
    pub fn set(&self, order: Order) {
        let mut map = self.inner.write().expect("order cache lock poisoned");
        map.insert(order.order_uid.clone(), order);
    }

    /// Clone out the cached order, or `None` when the id was never stored.
    pub fn get(&self, order_uid: &str) -> Option<Order> {
        let map = self.inner.read().expect("order cache lock poisoned");
        map.get(order_uid).cloned()
    }

    /// Number of distinct order ids currently held.
    pub fn len(&self) -> usize {
        self.inner.read().expect("order cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
