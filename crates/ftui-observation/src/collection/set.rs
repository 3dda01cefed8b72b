#![forbid(unsafe_code)]

//! Observable insertion-ordered sets of [`Value`].

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::dependency;
use crate::flags::LifecycleFlags;
use crate::observation::ObserverCache;
use crate::value::{Value, WeakValue};

use super::ordered::OrderedStore;
use super::{CollectionKind, CollectionObserver, IndexMap};

pub(crate) struct SetInner {
    store: RefCell<OrderedStore<()>>,
    observers: ObserverCache,
    observer: OnceCell<Rc<CollectionObserver>>,
}

/// Shared handle to an observable set. Clones share identity.
#[derive(Clone)]
pub struct SetRef {
    inner: Rc<SetInner>,
}

/// Non-owning handle to a [`SetRef`].
#[derive(Clone)]
pub struct WeakSetRef {
    inner: Weak<SetInner>,
}

impl WeakSetRef {
    #[must_use]
    pub fn upgrade(&self) -> Option<SetRef> {
        self.inner.upgrade().map(|inner| SetRef { inner })
    }
}

impl Default for SetRef {
    fn default() -> Self {
        Self::new()
    }
}

impl SetRef {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(SetInner {
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
    pub fn downgrade(&self) -> WeakSetRef {
        WeakSetRef {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub(crate) fn observer_cache(&self) -> &ObserverCache {
        &self.inner.observers
    }

    pub(crate) fn collection_observer(&self) -> Rc<CollectionObserver> {
        Rc::clone(self.inner.observer.get_or_init(|| {
            CollectionObserver::new(
                CollectionKind::Set,
                WeakValue::Set(self.downgrade()),
                self.len_untracked(),
            )
        }))
    }

    fn track(&self) {
        if dependency::is_collecting() {
            dependency::record_collection(Value::Set(self.clone()));
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
    pub fn has(&self, value: impl Into<Value>) -> bool {
        self.track();
        self.inner.store.borrow().position(&value.into()).is_some()
    }

    /// Members in insertion order.
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.track();
        self.inner.store.borrow().keys().to_vec()
    }

    /// Add `value`. Returns `false` if it was already a member.
    pub fn add(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        {
            let mut store = self.inner.store.borrow_mut();
            if store.position(&value).is_some() {
                return false;
            }
            store.push(value.clone(), ());
        }
        self.record(|map| {
            map.push_inserted(1);
            map.record_key(&value);
        });
        true
    }

    /// Remove `value`. Returns whether it was a member.
    pub fn delete(&self, value: impl Into<Value>) -> bool {
        let value = value.into();
        let removed = {
            let mut store = self.inner.store.borrow_mut();
            store.position(&value).map(|position| {
                store.remove(position);
                position
            })
        };
        match removed {
            Some(position) => {
                self.record(|map| {
                    map.splice(position, 1, 0);
                    map.record_key(&value);
                });
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let members = self.inner.store.borrow_mut().clear();
        if members.is_empty() {
            return;
        }
        self.record(|map| {
            map.splice(0, members.len(), 0);
            for member in &members {
                map.record_key(member);
            }
        });
    }
}

impl fmt::Debug for SetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.store.try_borrow() {
            Ok(store) => f.debug_set().entries(store.keys()).finish(),
            Err(_) => f.write_str("SetRef(<borrowed>)"),
        }
    }
}

impl<T: Into<Value>> FromIterator<T> for SetRef {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let set = Self::new();
        for value in iter {
            set.add(value);
        }
        set
    }
}
