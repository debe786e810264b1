//! Per-photo single-flight registry
//!
//! At most one enrichment per `photo_id` runs inside this process. A second
//! message for a photo that is already being captioned is dropped instead of
//! racing the first one through the caption API, store and channel.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Registry of photo ids currently being enriched
#[derive(Clone, Default)]
pub struct InFlightRegistry {
    keys: Arc<DashMap<String, ()>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or `None` if another enrichment already holds it
    pub fn try_acquire(&self, key: &str) -> Option<InFlightGuard> {
        match self.keys.entry(key.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(InFlightGuard {
                    keys: Arc::clone(&self.keys),
                    key: key.to_string(),
                })
            }
        }
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Releases the claimed key on drop
pub struct InFlightGuard {
    keys: Arc<DashMap<String, ()>>,
    key: String,
}

impl InFlightGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.keys.remove(&self.key);
    }
}
