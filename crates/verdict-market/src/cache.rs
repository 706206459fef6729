//! Symbol validation cache — a bounded TTL map owned by the enricher.
//!
//! Each validated identifier costs one external quote call; trees mention
//! the same handful of symbols on every evaluation, so caching the verdict
//! bounds call volume. The cache is an explicit injected value, never a
//! process-global.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Slot {
    valid: bool,
    stored_at: Instant,
}

/// Bounded map of symbol → validation verdict with per-entry expiry.
pub struct ValidationCache {
    slots: Mutex<HashMap<String, Slot>>,
    ttl: Duration,
    capacity: usize,
}

impl ValidationCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Look up a cached verdict. Expired entries read as a miss.
    pub fn get(&self, symbol: &str) -> Option<bool> {
        let slots = match self.slots.lock() {
            Ok(s) => s,
            Err(_) => return None,
        };
        slots
            .get(symbol)
            .filter(|slot| slot.stored_at.elapsed() < self.ttl)
            .map(|slot| slot.valid)
    }

    /// Store a verdict, evicting expired entries first and the oldest
    /// entry if the cache is still at capacity.
    pub fn insert(&self, symbol: &str, valid: bool) {
        let mut slots = match self.slots.lock() {
            Ok(s) => s,
            Err(_) => return,
        };

        if slots.len() >= self.capacity && !slots.contains_key(symbol) {
            slots.retain(|_, slot| slot.stored_at.elapsed() < self.ttl);
            if slots.len() >= self.capacity {
                let oldest = slots
                    .iter()
                    .min_by_key(|(_, slot)| slot.stored_at)
                    .map(|(k, _)| k.clone());
                if let Some(key) = oldest {
                    slots.remove(&key);
                }
            }
        }

        slots.insert(
            symbol.to_string(),
            Slot {
                valid,
                stored_at: Instant::now(),
            },
        );
    }

    /// Number of live (possibly expired) entries.
    pub fn len(&self) -> usize {
        self.slots.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
