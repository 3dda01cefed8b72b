#![forbid(unsafe_code)]

//! Whole-object observation.
//!
//! Under [`LifecycleFlags::PROXY_STRATEGY`] every property of an object is
//! observed through one [`ProxyObserver`] stored in the object's hidden proxy
//! slot. Every successful write through [`ObjectRef::set`] reaches it, so no
//! per-property interception is installed. Whole-object subscribers receive
//! the key along with the values; per-property observers filter by key.
//!
//! # Invariants
//!
//! 1. At most one proxy observer exists per object.
//! 2. Per-property observers are notified before whole-object subscribers.
//! 3. Writes that leave the value unchanged (SameValueZero) notify nobody.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use tracing::trace;

use crate::error::ObservationError;
use crate::flags::LifecycleFlags;
use crate::object::{ObjectRef, WeakObjectRef};
use crate::value::Value;

use super::subscribers::SubscriberList;
use super::{Accessor, Observer, Subscriber};

/// Receives every property change of a proxied object.
pub trait ProxySubscriber {
    fn handle_proxy_change(
        &self,
        key: &str,
        new_value: &Value,
        old_value: &Value,
        flags: LifecycleFlags,
    );
}

impl<F> ProxySubscriber for F
where
    F: Fn(&str, &Value, &Value, LifecycleFlags),
{
    fn handle_proxy_change(
        &self,
        key: &str,
        new_value: &Value,
        old_value: &Value,
        flags: LifecycleFlags,
    ) {
        self(key, new_value, old_value, flags);
    }
}

/// Observer for an entire object.
pub struct ProxyObserver {
    target: WeakObjectRef,
    subscribers: SubscriberList<dyn ProxySubscriber>,
    properties: RefCell<AHashMap<Rc<str>, Rc<ProxyPropertyObserver>>>,
}

impl ProxyObserver {
    /// The proxy observer of `obj`, created on first request.
    pub fn get_or_create(obj: &ObjectRef) -> Rc<Self> {
        Rc::clone(obj.proxy_slot().get_or_init(|| {
            trace!(tag = obj.tag(), "creating proxy observer");
            Rc::new(Self {
                target: obj.downgrade(),
                subscribers: SubscriberList::default(),
                properties: RefCell::new(AHashMap::new()),
            })
        }))
    }

    #[must_use]
    pub fn target(&self) -> Option<ObjectRef> {
        self.target.upgrade()
    }

    pub fn subscribe(&self, subscriber: Rc<dyn ProxySubscriber>) -> bool {
        self.subscribers.add(subscriber)
    }

    pub fn unsubscribe(&self, subscriber: &Rc<dyn ProxySubscriber>) -> bool {
        self.subscribers.remove(subscriber)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Observer for a single key, shared by every caller asking for it.
    pub fn property(&self, key: &str) -> Rc<ProxyPropertyObserver> {
        Rc::clone(
            self.properties
                .borrow_mut()
                .entry(Rc::from(key))
                .or_insert_with(|| {
                    Rc::new(ProxyPropertyObserver {
                        target: self.target.clone(),
                        property: Rc::from(key),
                        subscribers: SubscriberList::default(),
                    })
                }),
        )
    }

    pub(crate) fn notify(
        &self,
        key: &str,
        new_value: &Value,
        old_value: &Value,
        flags: LifecycleFlags,
    ) {
        if new_value == old_value {
            return;
        }
        let property = self.properties.borrow().get(key).cloned();
        if let Some(property) = property {
            property.notify(new_value, old_value, flags);
        }
        self.subscribers.for_each(|subscriber| {
            subscriber.handle_proxy_change(key, new_value, old_value, flags);
        });
    }
}

impl fmt::Debug for ProxyObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyObserver")
            .field("subscribers", &self.subscribers.len())
            .field("properties", &self.properties.borrow().len())
            .finish()
    }
}

/// One key of a proxied object.
pub struct ProxyPropertyObserver {
    target: WeakObjectRef,
    property: Rc<str>,
    subscribers: SubscriberList<dyn Subscriber>,
}

impl ProxyPropertyObserver {
    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }

    fn notify(&self, new_value: &Value, old_value: &Value, flags: LifecycleFlags) {
        self.subscribers
            .for_each(|subscriber| subscriber.handle_change(new_value, old_value, flags));
    }
}

impl Accessor for ProxyPropertyObserver {
    fn get_value(&self) -> Value {
        self.target
            .upgrade()
            .map(|obj| obj.get_untracked(&self.property))
            .unwrap_or_default()
    }

    fn set_value(&self, value: Value, flags: LifecycleFlags) -> Result<(), ObservationError> {
        match self.target.upgrade() {
            Some(obj) => obj.set_with_flags(&self.property, value, flags),
            None => Ok(()),
        }
    }
}

impl Observer for ProxyPropertyObserver {
    fn subscribe(&self, subscriber: Rc<dyn Subscriber>) -> bool {
        self.subscribers.add(subscriber)
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        self.subscribers.remove(subscriber)
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl fmt::Debug for ProxyPropertyObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyPropertyObserver")
            .field("property", &self.property)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::subscriber;
    use std::cell::Cell;

    #[test]
    fn one_proxy_per_object() {
        let obj = ObjectRef::new();
        let a = ProxyObserver::get_or_create(&obj);
        let b = ProxyObserver::get_or_create(&obj);
        assert!(Rc::ptr_eq(&a, &b));
        assert!(Rc::ptr_eq(&a.property("x"), &b.property("x")));
        assert!(a.target().is_some_and(|t| t.ptr_eq(&obj)));
    }

    #[test]
    fn every_key_reaches_whole_object_subscribers() {
        let obj = ObjectRef::from_iter([("a", 1)]);
        let proxy = ProxyObserver::get_or_create(&obj);
        let keys = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&keys);
        let sub: Rc<dyn ProxySubscriber> =
            Rc::new(move |key: &str, _: &Value, _: &Value, _: LifecycleFlags| {
                sink.borrow_mut().push(key.to_owned());
            });
        proxy.subscribe(sub);

        obj.set("a", 2).unwrap();
        obj.set("b", 1).unwrap();
        obj.set("b", 1).unwrap();

        assert_eq!(*keys.borrow(), ["a", "b"]);
    }

    #[test]
    fn property_observers_filter_by_key() {
        let obj = ObjectRef::new();
        let property = ProxyObserver::get_or_create(&obj).property("x");
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        property.subscribe(subscriber(move |_, _, _| c.set(c.get() + 1)));

        obj.set("y", 1).unwrap();
        property
            .set_value(Value::from(5), LifecycleFlags::empty())
            .unwrap();

        assert_eq!(count.get(), 1);
        assert_eq!(property.get_value(), Value::from(5));
    }
}
