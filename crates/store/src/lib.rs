//! Helmdock store: per-tab keyed state with optional persistence.

#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use helmdock_core::TabId;
use helmdock_persist::Storage;
use metrics::counter;
use rustc_hash::FxHashMap;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

mod slot;
mod wait;

pub use slot::StateSlot;
pub use wait::{wait_until, wait_until_defined};

/// Map from tab id to a value of `T`, persisted under `storage_key`.
///
/// Values are held behind `Arc` and replaced whole, so readers never observe a
/// partially written entry. Writes reach storage while the entry lock is held,
/// so storage sees them in the same order as memory. Storage failures are
/// logged and the store keeps working from memory.
pub struct TabStore<T> {
    storage_key: String,
    entries: Mutex<FxHashMap<TabId, Arc<T>>>,
    storage: Option<Arc<dyn Storage>>,
}

impl<T> TabStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Memory-only store.
    pub fn new(storage_key: impl Into<String>) -> Self {
        Self { storage_key: storage_key.into(), entries: Mutex::new(FxHashMap::default()), storage: None }
    }

    /// Store whose writes go through to `storage`.
    pub fn with_storage(storage_key: impl Into<String>, storage: Arc<dyn Storage>) -> Self {
        Self { storage: Some(storage), ..Self::new(storage_key) }
    }

    pub fn storage_key(&self) -> &str { &self.storage_key }

    fn entries(&self) -> MutexGuard<'_, FxHashMap<TabId, Arc<T>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get_data(&self, tab_id: &TabId) -> Option<Arc<T>> {
        self.entries().get(tab_id).cloned()
    }

    pub fn has_data(&self, tab_id: &TabId) -> bool {
        self.entries().contains_key(tab_id)
    }

    /// Replace the entry for `tab_id`. Never merges.
    pub fn set_data(&self, tab_id: &TabId, value: T) -> Arc<T> {
        let value = Arc::new(value);
        let mut entries = self.entries();
        entries.insert(tab_id.clone(), Arc::clone(&value));
        self.persist(tab_id, &value);
        value
    }

    /// Replace the entry only if `cond` holds; `cond` runs under the entry lock,
    /// so a concurrent `clear_data` lands either before the check or after the write.
    pub fn set_data_if<C>(&self, tab_id: &TabId, value: T, cond: C) -> Option<Arc<T>>
    where
        C: FnOnce() -> bool,
    {
        let mut entries = self.entries();
        if !cond() {
            return None;
        }
        let value = Arc::new(value);
        entries.insert(tab_id.clone(), Arc::clone(&value));
        self.persist(tab_id, &value);
        Some(value)
    }

    /// Read-modify-replace under the entry lock. Returns `None` if the tab has no entry.
    pub fn update<F>(&self, tab_id: &TabId, f: F) -> Option<Arc<T>>
    where
        F: FnOnce(&T) -> T,
    {
        self.try_update(tab_id, |cur| Some(f(cur)))
    }

    /// Like `update`, but `f` may decline by returning `None`; the entry is then left as is.
    pub fn try_update<F>(&self, tab_id: &TabId, f: F) -> Option<Arc<T>>
    where
        F: FnOnce(&T) -> Option<T>,
    {
        let mut entries = self.entries();
        let next = Arc::new(f(entries.get(tab_id)?)?);
        entries.insert(tab_id.clone(), Arc::clone(&next));
        self.persist(tab_id, &next);
        Some(next)
    }

    pub fn clear_data(&self, tab_id: &TabId) {
        let mut entries = self.entries();
        let removed = entries.remove(tab_id).is_some();
        if let Some(storage) = &self.storage {
            if let Err(e) = storage.delete(&self.storage_key, tab_id.as_str()) {
                warn!(key = %self.storage_key, tab = %tab_id, error = %e, "store: delete failed; continuing in memory");
                counter!("store_persist_errors_total", 1u64);
            }
        }
        if removed {
            debug!(key = %self.storage_key, tab = %tab_id, "store: cleared");
        }
    }

    /// Tab ids currently held, sorted.
    pub fn tab_ids(&self) -> Vec<TabId> {
        let mut ids: Vec<TabId> = self.entries().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize { self.entries().len() }

    pub fn is_empty(&self) -> bool { self.entries().is_empty() }

    /// Load persisted entries into memory. Rows that fail to decode are skipped.
    /// Returns the number of entries restored.
    pub fn restore(&self) -> usize {
        let Some(storage) = &self.storage else { return 0 };
        let rows = match storage.load_all(&self.storage_key) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(key = %self.storage_key, error = %e, "store: restore failed; starting empty");
                counter!("store_persist_errors_total", 1u64);
                return 0;
            }
        };
        let mut restored = 0;
        let mut entries = self.entries();
        for (tab, raw) in rows {
            match serde_json::from_value::<T>(raw) {
                Ok(v) => {
                    entries.insert(TabId::from(tab), Arc::new(v));
                    restored += 1;
                }
                Err(e) => warn!(key = %self.storage_key, tab = %tab, error = %e, "store: skipping undecodable row"),
            }
        }
        debug!(key = %self.storage_key, restored, "store: restored");
        restored
    }

    fn persist(&self, tab_id: &TabId, value: &T) {
        let Some(storage) = &self.storage else { return };
        let res = serde_json::to_value(value)
            .map_err(anyhow::Error::from)
            .and_then(|v| storage.put(&self.storage_key, tab_id.as_str(), &v));
        if let Err(e) = res {
            warn!(key = %self.storage_key, tab = %tab_id, error = %e, "store: persist failed; continuing in memory");
            counter!("store_persist_errors_total", 1u64);
        }
    }
}
