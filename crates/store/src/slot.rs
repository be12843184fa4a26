//! Single-value protected slot owned by a controller (e.g. a dialog).

use std::sync::Arc;

use arc_swap::ArcSwapOption;

/// Holds at most one `T`; readers get a cheap `Arc` snapshot.
pub struct StateSlot<T> {
    inner: ArcSwapOption<T>,
}

impl<T> StateSlot<T> {
    pub fn new() -> Self { Self { inner: ArcSwapOption::empty() } }

    pub fn get(&self) -> Option<Arc<T>> { self.inner.load_full() }

    pub fn set(&self, value: T) { self.inner.store(Some(Arc::new(value))); }

    /// Empty the slot, returning what it held.
    pub fn take(&self) -> Option<Arc<T>> { self.inner.swap(None) }

    pub fn clear(&self) { self.inner.store(None); }

    pub fn is_set(&self) -> bool { self.inner.load().is_some() }
}

impl<T> Default for StateSlot<T> {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_clear() {
        let slot: StateSlot<String> = StateSlot::new();
        assert!(!slot.is_set());
        slot.set("release-a".into());
        assert_eq!(slot.get().as_deref().map(String::as_str), Some("release-a"));
        slot.set("release-b".into());
        assert_eq!(slot.take().as_deref().map(String::as_str), Some("release-b"));
        assert!(slot.get().is_none());
        slot.set("x".into());
        slot.clear();
        assert!(!slot.is_set());
    }
}
