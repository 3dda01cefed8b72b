#![forbid(unsafe_code)]

//! Observer for plain data properties.
//!
//! Construction routes every later write of the property through the
//! observer (an interceptor in the object's hidden slot), so direct
//! `ObjectRef::set` calls notify exactly like writes made through
//! [`Accessor::set_value`].
//!
//! # Invariants
//!
//! 1. The cached value always equals the last value written through any path.
//! 2. Subscribers are notified once per write whose value differs from the
//!    cached one (SameValueZero).

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::ObservationError;
use crate::flags::LifecycleFlags;
use crate::object::{ObjectRef, WeakObjectRef, WriteInterceptor};
use crate::value::Value;

use super::subscribers::SubscriberList;
use super::{Accessor, Observer, Subscriber};

pub struct SetterObserver {
    obj: WeakObjectRef,
    property: Rc<str>,
    current: RefCell<Value>,
    subscribers: SubscriberList<dyn Subscriber>,
}

impl SetterObserver {
    /// # Errors
    ///
    /// [`ObservationError::NotConfigurable`] for locked properties,
    /// [`ObservationError::NotExtensible`] when the property is missing on a
    /// sealed object.
    pub fn new(obj: &ObjectRef, property: &str) -> Result<Rc<Self>, ObservationError> {
        let observer = Rc::new(Self {
            obj: obj.downgrade(),
            property: Rc::from(property),
            current: RefCell::new(obj.get_untracked(property)),
            subscribers: SubscriberList::default(),
        });
        let interceptor: Weak<dyn WriteInterceptor> = Rc::downgrade(&observer) as Weak<Self>;
        obj.install_interceptor(property, interceptor)?;
        Ok(observer)
    }

    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }
}

impl WriteInterceptor for SetterObserver {
    fn after_write(&self, new_value: &Value, _old_value: &Value, flags: LifecycleFlags) {
        let old = self.current.replace(new_value.clone());
        if old != *new_value {
            self.subscribers
                .for_each(|subscriber| subscriber.handle_change(new_value, &old, flags));
        }
    }
}

impl Accessor for SetterObserver {
    fn get_value(&self) -> Value {
        self.current.borrow().clone()
    }

    fn set_value(&self, value: Value, flags: LifecycleFlags) -> Result<(), ObservationError> {
        match self.obj.upgrade() {
            Some(obj) => obj.set_with_flags(&self.property, value, flags),
            None => {
                self.current.replace(value);
                Ok(())
            }
        }
    }
}

impl Observer for SetterObserver {
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

impl fmt::Debug for SetterObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetterObserver")
            .field("property", &self.property)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::subscriber;

    fn recorder() -> (Rc<RefCell<Vec<(Value, Value)>>>, Rc<dyn Subscriber>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&calls);
        let sub = subscriber(move |new, old, _| sink.borrow_mut().push((new.clone(), old.clone())));
        (calls, sub)
    }

    #[test]
    fn direct_writes_notify() {
        let obj = ObjectRef::from_iter([("a", 1)]);
        let observer = SetterObserver::new(&obj, "a").unwrap();
        let (calls, sub) = recorder();
        observer.subscribe(sub);

        obj.set("a", 2).unwrap();
        obj.set("a", 2).unwrap();
        observer
            .set_value(Value::from(3), LifecycleFlags::UPDATE_SOURCE)
            .unwrap();

        assert_eq!(
            *calls.borrow(),
            [
                (Value::from(2), Value::from(1)),
                (Value::from(3), Value::from(2)),
            ]
        );
        assert_eq!(observer.get_value(), Value::from(3));
    }

    #[test]
    fn nan_does_not_renotify() {
        let obj = ObjectRef::from_iter([("n", f64::NAN)]);
        let observer = SetterObserver::new(&obj, "n").unwrap();
        let (calls, sub) = recorder();
        observer.subscribe(sub);
        obj.set("n", f64::NAN).unwrap();
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn flags_reach_subscribers() {
        let obj = ObjectRef::new();
        let observer = SetterObserver::new(&obj, "a").unwrap();
        let seen = Rc::new(RefCell::new(LifecycleFlags::empty()));
        let sink = Rc::clone(&seen);
        observer.subscribe(subscriber(move |_, _, flags| *sink.borrow_mut() = flags));
        observer
            .set_value(Value::from(1), LifecycleFlags::FROM_BIND)
            .unwrap();
        assert_eq!(*seen.borrow(), LifecycleFlags::FROM_BIND);
    }

    #[test]
    fn locked_properties_cannot_be_intercepted() {
        let obj = ObjectRef::from_iter([("a", 1)]);
        obj.freeze();
        assert!(matches!(
            SetterObserver::new(&obj, "a").unwrap_err(),
            ObservationError::NotConfigurable { .. }
        ));
    }

    #[test]
    fn dropped_observer_releases_interception() {
        let obj = ObjectRef::from_iter([("a", 1)]);
        let observer = SetterObserver::new(&obj, "a").unwrap();
        assert!(obj.is_intercepted("a"));
        drop(observer);
        assert!(!obj.is_intercepted("a"));
        obj.set("a", 2).unwrap();
    }

    #[test]
    fn failed_write_notifies_nobody() {
        let obj = ObjectRef::from_iter([("a", 1)]);
        let observer = SetterObserver::new(&obj, "a").unwrap();
        let (calls, sub) = recorder();
        observer.subscribe(sub);
        obj.prevent_extensions();
        obj.set("a", 5).unwrap();
        assert_eq!(calls.borrow().len(), 1);
        assert!(obj.set("b", 1).is_err());
        assert_eq!(calls.borrow().len(), 1);
    }
}
