#![forbid(unsafe_code)]

//! Observable insertion-ordered maps keyed by [`Value`].

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::dependency;
use crate::flags::LifecycleFlags;
use crate::observation::ObserverCache;
use crate::value::{Value, WeakValue};

use super::ordered::OrderedStore;
use super::{CollectionKind, CollectionObserver, IndexMap};

pub(crate) struct MapInner {
    store: RefCell<OrderedStore<Value>>,
    observers: ObserverCache,
    observer: OnceCell<Rc<CollectionObserver>>,
}

/// Shared handle to an observable map. Clones share identity.
#[derive(Clone)]
pub struct MapRef {
    inner: Rc<MapInner>,
}

/// Non-owning handle to a [`MapRef`].
#[derive(Clone)]
pub struct WeakMapRef {
    inner: Weak<MapInner>,
}

impl WeakMapRef {
    #[must_use]
    pub fn upgrade(&self) -> Option<MapRef> {
        self.inner.upgrade().map(|inner| MapRef { inner })
    }
}

impl Default for MapRef {
    fn default() -> Self {
        Self::new()
    }
}

impl MapRef {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(MapInner {
                store: RefCell::new(OrderedStore::default()),
                observers: ObserverCache::default(),
                observer: OnceCell::new(),
            }),
        }
    }

    #[must_use]
    pub fn identity(&self) -> *const () {
        Rc::as_ptr(&self.inner).cast()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakMapRef {
        WeakMapRef {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub(crate) fn observer_cache(&self) -> &ObserverCache {
        &self.inner.observers
    }

    pub(crate) fn collection_observer(&self) -> Rc<CollectionObserver> {
        Rc::clone(self.inner.observer.get_or_init(|| {
            CollectionObserver::new(
                CollectionKind::Map,
                WeakValue::Map(self.downgrade()),
                self.len_untracked(),
            )
        }))
    }

    fn track(&self) {
        if dependency::is_collecting() {
            dependency::record_collection(Value::Map(self.clone()));
        }
    }

    fn record(&self, edit: impl FnOnce(&mut IndexMap)) {
        if let Some(observer) = self.inner.observer.get().cloned() {
            observer.edit_index_map(edit);
            observer.notify(LifecycleFlags::empty());
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.track();
        self.len_untracked()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn len_untracked(&self) -> usize {
        self.inner.store.borrow().len()
    }

    #[must_use]
    pub fn get(&self, key: impl Into<Value>) -> Option<Value> {
        self.track();
        self.inner.store.borrow().get(&key.into()).cloned()
    }

    #[must_use]
    pub fn has(&self, key: impl Into<Value>) -> bool {
        self.track();
        self.inner.store.borrow().position(&key.into()).is_some()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<Value> {
        self.track();
        self.inner.store.borrow().keys().to_vec()
    }

    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.track();
        self.inner.store.borrow().values().to_vec()
    }

    /// Snapshot of `(key, value)` pairs in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.track();
        let store = self.inner.store.borrow();
        store
            .keys()
            .iter()
            .cloned()
            .zip(store.values().iter().cloned())
            .collect()
    }

    /// Insert or update. Writing the value already stored is a no-op.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) {
        let (key, value) = (key.into(), value.into());
        let replaced = {
            let mut store = self.inner.store.borrow_mut();
            match store.position(&key) {
                Some(position) => {
                    let slot = store.value_at_mut(position);
                    if *slot == value {
                        return;
                    }
                    *slot = value;
                    Some(position)
                }
                None => {
                    store.push(key.clone(), value);
                    None
                }
            }
        };
        self.record(|map| {
            match replaced {
                Some(position) => map.replace(position),
                None => map.push_inserted(1),
            }
            map.record_key(&key);
        });
    }

    /// Remove `key`. Returns whether it was present.
    pub fn delete(&self, key: impl Into<Value>) -> bool {
        let key = key.into();
        let removed = {
            let mut store = self.inner.store.borrow_mut();
            store.position(&key).map(|position| {
                store.remove(position);
                position
            })
        };
        match removed {
            Some(position) => {
                self.record(|map| {
                    map.splice(position, 1, 0);
                    map.record_key(&key);
                });
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let keys = self.inner.store.borrow_mut().clear();
        if keys.is_empty() {
            return;
        }
        self.record(|map| {
            map.splice(0, keys.len(), 0);
            for key in &keys {
                map.record_key(key);
            }
        });
    }
}

impl fmt::Debug for MapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.store.try_borrow() {
            Ok(store) => f
                .debug_map()
                .entries(store.keys().iter().zip(store.values()))
                .finish(),
            Err(_) => f.write_str("MapRef(<borrowed>)"),
        }
    }
}

impl<K: Into<Value>, V: Into<Value>> FromIterator<(K, V)> for MapRef {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = Self::new();
        for (key, value) in iter {
            map.set(key, value);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Slot;

    fn observed(map: &MapRef) -> (Rc<RefCell<Vec<IndexMap>>>, impl Drop) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let guard = map
            .collection_observer()
            .subscribe_fn(move |index_map, _| sink.borrow_mut().push(index_map.clone()));
        (seen, guard)
    }

    #[test]
    fn insertion_order_is_kept() {
        let map = MapRef::from_iter([("b", 1), ("a", 2)]);
        map.set("b", 3);
        assert_eq!(map.keys(), [Value::from("b"), Value::from("a")]);
        assert_eq!(map.get("b"), Some(Value::from(3)));
        assert_eq!(map.get("zzz"), None);
        assert!(map.has("a"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn set_records_keys_and_slots() {
        let map = MapRef::from_iter([("a", 1)]);
        let (seen, _guard) = observed(&map);

        map.set("a", 1);
        map.set("a", 2);
        map.set("b", 3);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2, "identical write is a no-op");
        assert_eq!(seen[0].slots(), [Slot::Inserted]);
        assert_eq!(seen[0].deleted(), [0]);
        assert_eq!(seen[0].keys(), [Value::from("a")]);
        assert_eq!(seen[1].slots(), [Slot::Existing(0), Slot::Inserted]);
        assert_eq!(seen[1].keys(), [Value::from("b")]);
    }

    #[test]
    fn delete_and_clear() {
        let map = MapRef::from_iter([("a", 1), ("b", 2), ("c", 3)]);
        let (seen, _guard) = observed(&map);

        assert!(map.delete("b"));
        assert!(!map.delete("b"));
        map.clear();
        map.clear();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].slots(), [Slot::Existing(0), Slot::Existing(2)]);
        assert_eq!(seen[0].deleted(), [1]);
        assert!(seen[1].is_empty());
        assert_eq!(seen[1].deleted(), [0, 1]);
        assert_eq!(seen[1].keys(), [Value::from("a"), Value::from("c")]);
    }

    #[test]
    fn object_keys_use_identity() {
        let key_a = crate::ObjectRef::new();
        let key_b = crate::ObjectRef::new();
        let map = MapRef::new();
        map.set(&key_a, 1);
        assert!(map.has(&key_a));
        assert!(!map.has(&key_b));
    }
}
