#![forbid(unsafe_code)]

//! Shared observer attached to one array, map or set.
//!
//! Mutators on [`ArrayRef`](super::ArrayRef), [`MapRef`](super::MapRef) and
//! [`SetRef`](super::SetRef) edit the observer's pending [`IndexMap`] in
//! lockstep with the physical mutation, then ask it to notify. Outside a
//! [`BatchScope`](crate::BatchScope) delivery is immediate; inside one the
//! observer queues itself once and delivers a single merged map when the
//! outermost scope closes.
//!
//! # Invariants
//!
//! 1. At most one observer exists per collection instance.
//! 2. Subscribers see the collection already mutated.
//! 3. After delivery the pending map is reset to the identity of the current
//!    length.
//! 4. The length/size observer notifies after collection subscribers, and
//!    only when the count actually changed since its last notification.

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::batch;
use crate::error::ObservationError;
use crate::flags::LifecycleFlags;
use crate::observation::subscribers::SubscriberList;
use crate::observation::{
    Accessor, CollectionSubscriber, Observer, Subscriber, collection_subscriber,
};
use crate::value::{Value, WeakValue};

use super::IndexMap;

/// Built-in collection families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Array,
    Map,
    Set,
}

impl CollectionKind {
    /// Property exposing the element count.
    #[must_use]
    pub const fn length_property(self) -> &'static str {
        match self {
            Self::Array => "length",
            Self::Map | Self::Set => "size",
        }
    }
}

fn live_len(collection: &WeakValue) -> usize {
    match collection.upgrade() {
        Some(Value::Array(a)) => a.len_untracked(),
        Some(Value::Map(m)) => m.len_untracked(),
        Some(Value::Set(s)) => s.len_untracked(),
        _ => 0,
    }
}

/// Observer shared by every subscriber of one collection.
pub struct CollectionObserver {
    kind: CollectionKind,
    collection: WeakValue,
    index_map: RefCell<IndexMap>,
    subscribers: SubscriberList<dyn CollectionSubscriber>,
    length_observer: OnceCell<Rc<CollectionLengthObserver>>,
    queued: Cell<bool>,
    pending_flags: Cell<LifecycleFlags>,
    self_ref: Weak<CollectionObserver>,
}

impl CollectionObserver {
    pub(crate) fn new(kind: CollectionKind, collection: WeakValue, len: usize) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            kind,
            collection,
            index_map: RefCell::new(IndexMap::identity(len)),
            subscribers: SubscriberList::default(),
            length_observer: OnceCell::new(),
            queued: Cell::new(false),
            pending_flags: Cell::new(LifecycleFlags::empty()),
            self_ref: self_ref.clone(),
        })
    }

    #[must_use]
    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    /// The observed collection, if it is still alive.
    #[must_use]
    pub fn collection(&self) -> Option<Value> {
        self.collection.upgrade()
    }

    /// Changes recorded since the last delivery.
    #[must_use]
    pub fn pending_index_map(&self) -> IndexMap {
        self.index_map.borrow().clone()
    }

    pub fn subscribe(&self, subscriber: Rc<dyn CollectionSubscriber>) -> bool {
        self.subscribers.add(subscriber)
    }

    pub fn unsubscribe(&self, subscriber: &Rc<dyn CollectionSubscriber>) -> bool {
        self.subscribers.remove(subscriber)
    }

    /// Subscribe a closure; dropping the guard unsubscribes it.
    pub fn subscribe_fn(
        self: &Rc<Self>,
        callback: impl Fn(&IndexMap, LifecycleFlags) + 'static,
    ) -> CollectionSubscription {
        let subscriber = collection_subscriber(callback);
        self.subscribe(Rc::clone(&subscriber));
        CollectionSubscription {
            observer: Rc::clone(self),
            subscriber,
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// The `length` (arrays) or `size` (maps, sets) observer.
    #[must_use]
    pub fn length_observer(&self) -> Rc<CollectionLengthObserver> {
        Rc::clone(self.length_observer.get_or_init(|| {
            Rc::new(CollectionLengthObserver {
                kind: self.kind,
                collection: self.collection.clone(),
                current: Cell::new(live_len(&self.collection)),
                subscribers: SubscriberList::default(),
            })
        }))
    }

    pub(crate) fn edit_index_map(&self, edit: impl FnOnce(&mut IndexMap)) {
        edit(&mut self.index_map.borrow_mut());
    }

    /// Deliver now, or queue for the enclosing batch.
    pub(crate) fn notify(&self, flags: LifecycleFlags) {
        if batch::is_batching() {
            self.pending_flags.set(self.pending_flags.get() | flags);
            if !self.queued.replace(true) {
                if let Some(this) = self.self_ref.upgrade() {
                    batch::enqueue(this);
                }
            }
        } else {
            self.flush(flags);
        }
    }

    pub(crate) fn flush_queued(&self) {
        self.queued.set(false);
        let flags = self.pending_flags.replace(LifecycleFlags::empty());
        self.flush(flags | LifecycleFlags::FROM_FLUSH);
    }

    fn flush(&self, flags: LifecycleFlags) {
        let index_map = self.index_map.borrow_mut().take();
        self.subscribers
            .for_each(|subscriber| subscriber.handle_collection_change(&index_map, flags));
        if let Some(length_observer) = self.length_observer.get() {
            length_observer.refresh(flags);
        }
    }
}

impl fmt::Debug for CollectionObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionObserver")
            .field("kind", &self.kind)
            .field("subscribers", &self.subscribers.len())
            .field("queued", &self.queued.get())
            .finish()
    }
}

/// RAII guard returned by [`CollectionObserver::subscribe_fn`].
#[must_use = "dropping a CollectionSubscription unsubscribes immediately"]
pub struct CollectionSubscription {
    observer: Rc<CollectionObserver>,
    subscriber: Rc<dyn CollectionSubscriber>,
}

impl Drop for CollectionSubscription {
    fn drop(&mut self) {
        self.observer.unsubscribe(&self.subscriber);
    }
}

impl fmt::Debug for CollectionSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionSubscription")
            .field("kind", &self.observer.kind)
            .finish()
    }
}

/// Observer for `length` / `size`, layered on a [`CollectionObserver`].
pub struct CollectionLengthObserver {
    kind: CollectionKind,
    collection: WeakValue,
    current: Cell<usize>,
    subscribers: SubscriberList<dyn Subscriber>,
}

impl CollectionLengthObserver {
    #[must_use]
    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    fn refresh(&self, flags: LifecycleFlags) {
        let len = live_len(&self.collection);
        let old = self.current.replace(len);
        if old != len {
            let (new_value, old_value) = (Value::from(len), Value::from(old));
            self.subscribers
                .for_each(|subscriber| subscriber.handle_change(&new_value, &old_value, flags));
        }
    }
}

impl Accessor for CollectionLengthObserver {
    fn get_value(&self) -> Value {
        Value::from(live_len(&self.collection))
    }

    fn set_value(&self, value: Value, flags: LifecycleFlags) -> Result<(), ObservationError> {
        match self.collection.upgrade() {
            Some(collection) => {
                collection.set_property(self.kind.length_property(), value, flags)
            }
            None => Ok(()),
        }
    }
}

impl Observer for CollectionLengthObserver {
    fn subscribe(&self, subscriber: Rc<dyn Subscriber>) -> bool {
        if self.subscribers.is_empty() {
            self.current.set(live_len(&self.collection));
        }
        self.subscribers.add(subscriber)
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        self.subscribers.remove(subscriber)
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
