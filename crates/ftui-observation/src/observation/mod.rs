#![forbid(unsafe_code)]

//! Property observers and the locator that picks between them.
//!
//! Every lookup returns an [`AccessorOrObserver`]: one variant per
//! observation strategy, plus `External*` variants for observers supplied by
//! adapters, target locators or synthetic registries. Dispatch over the
//! variants is static; the strategy is chosen once per `(object, property)`
//! and cached on the object.
//!
//! | Variant | Chosen for | Notifies |
//! |---------|------------|----------|
//! | `Primitive` | primitive receivers | never |
//! | `Property` | write-only accessor requests | never |
//! | `Setter` | plain data properties | synchronously on change |
//! | `DirtyCheck` | properties that cannot be intercepted | on the next check pass |
//! | `Computed` | getter-based properties | when a dependency changes the result |
//! | `CustomSetter` | getter+setter pairs | when a write changes the getter result |
//! | `CollectionLength` | `length` / `size` | when the count changes |
//! | `Proxy` | anything under the proxy strategy | synchronously on change |

mod binding_context;
mod computed;
mod dirty_checker;
mod locator;
mod primitive;
mod property_accessor;
mod proxy;
mod setter;
pub(crate) mod subscribers;

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::collection::{CollectionLengthObserver, IndexMap};
use crate::error::ObservationError;
use crate::flags::LifecycleFlags;
use crate::value::Value;

pub use binding_context::{BindingContextObservers, ObserverRegistry};
pub use computed::{ComputedObserver, CustomSetterObserver};
pub use dirty_checker::{DirtyCheckProperty, DirtyChecker};
pub use locator::{
    NoTargetLocator, ObjectObservationAdapter, ObserverLocator, TargetAccessorLocator,
    TargetObserverLocator,
};
pub use primitive::PrimitiveObserver;
pub use property_accessor::PropertyAccessor;
pub use proxy::{ProxyObserver, ProxyPropertyObserver, ProxySubscriber};
pub use setter::SetterObserver;

/// Receives property change notifications.
pub trait Subscriber {
    fn handle_change(&self, new_value: &Value, old_value: &Value, flags: LifecycleFlags);
}

impl<F> Subscriber for F
where
    F: Fn(&Value, &Value, LifecycleFlags),
{
    fn handle_change(&self, new_value: &Value, old_value: &Value, flags: LifecycleFlags) {
        self(new_value, old_value, flags);
    }
}

/// Receives one [`IndexMap`] per delivered collection mutation batch.
pub trait CollectionSubscriber {
    fn handle_collection_change(&self, index_map: &IndexMap, flags: LifecycleFlags);
}

impl<F> CollectionSubscriber for F
where
    F: Fn(&IndexMap, LifecycleFlags),
{
    fn handle_collection_change(&self, index_map: &IndexMap, flags: LifecycleFlags) {
        self(index_map, flags);
    }
}

/// Wrap a closure as a shareable property subscriber.
pub fn subscriber(f: impl Fn(&Value, &Value, LifecycleFlags) + 'static) -> Rc<dyn Subscriber> {
    Rc::new(f)
}

/// Wrap a closure as a shareable collection subscriber.
pub fn collection_subscriber(
    f: impl Fn(&IndexMap, LifecycleFlags) + 'static,
) -> Rc<dyn CollectionSubscriber> {
    Rc::new(f)
}

/// Read/write access without change notification.
pub trait Accessor {
    fn get_value(&self) -> Value;

    /// # Errors
    ///
    /// Whatever the underlying property write rejects.
    fn set_value(&self, value: Value, flags: LifecycleFlags) -> Result<(), ObservationError>;
}

/// An [`Accessor`] that also notifies subscribers.
pub trait Observer: Accessor {
    /// Returns `false` if `subscriber` was already subscribed (or the
    /// observer never notifies).
    fn subscribe(&self, subscriber: Rc<dyn Subscriber>) -> bool;

    /// Returns `false` if `subscriber` was not subscribed.
    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool;

    fn subscriber_count(&self) -> usize;

    /// Observers whose identity is unstable opt out of the per-object cache.
    fn do_not_cache(&self) -> bool {
        false
    }
}

/// Strategy tag of an [`AccessorOrObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObserverKind {
    Primitive,
    PropertyAccessor,
    Setter,
    DirtyCheck,
    Computed,
    CustomSetter,
    CollectionLength,
    Proxy,
    External,
    ExternalAccessor,
}

/// Result of an observer or accessor lookup.
#[derive(Clone)]
pub enum AccessorOrObserver {
    Primitive(Rc<PrimitiveObserver>),
    Property(Rc<PropertyAccessor>),
    Setter(Rc<SetterObserver>),
    DirtyCheck(Rc<DirtyCheckProperty>),
    Computed(Rc<ComputedObserver>),
    CustomSetter(Rc<CustomSetterObserver>),
    CollectionLength(Rc<CollectionLengthObserver>),
    Proxy(Rc<ProxyPropertyObserver>),
    External(Rc<dyn Observer>),
    ExternalAccessor(Rc<dyn Accessor>),
}

impl AccessorOrObserver {
    #[must_use]
    pub fn kind(&self) -> ObserverKind {
        match self {
            Self::Primitive(_) => ObserverKind::Primitive,
            Self::Property(_) => ObserverKind::PropertyAccessor,
            Self::Setter(_) => ObserverKind::Setter,
            Self::DirtyCheck(_) => ObserverKind::DirtyCheck,
            Self::Computed(_) => ObserverKind::Computed,
            Self::CustomSetter(_) => ObserverKind::CustomSetter,
            Self::CollectionLength(_) => ObserverKind::CollectionLength,
            Self::Proxy(_) => ObserverKind::Proxy,
            Self::External(_) => ObserverKind::External,
            Self::ExternalAccessor(_) => ObserverKind::ExternalAccessor,
        }
    }

    fn accessor(&self) -> &dyn Accessor {
        match self {
            Self::Primitive(o) => o.as_ref(),
            Self::Property(o) => o.as_ref(),
            Self::Setter(o) => o.as_ref(),
            Self::DirtyCheck(o) => o.as_ref(),
            Self::Computed(o) => o.as_ref(),
            Self::CustomSetter(o) => o.as_ref(),
            Self::CollectionLength(o) => o.as_ref(),
            Self::Proxy(o) => o.as_ref(),
            Self::External(o) => o.as_ref(),
            Self::ExternalAccessor(o) => o.as_ref(),
        }
    }

    /// The observer behind this handle, if it supports subscriptions.
    #[must_use]
    pub fn as_observer(&self) -> Option<&dyn Observer> {
        match self {
            Self::Primitive(o) => Some(o.as_ref()),
            Self::Setter(o) => Some(o.as_ref()),
            Self::DirtyCheck(o) => Some(o.as_ref()),
            Self::Computed(o) => Some(o.as_ref()),
            Self::CustomSetter(o) => Some(o.as_ref()),
            Self::CollectionLength(o) => Some(o.as_ref()),
            Self::Proxy(o) => Some(o.as_ref()),
            Self::External(o) => Some(o.as_ref()),
            Self::Property(_) | Self::ExternalAccessor(_) => None,
        }
    }

    #[must_use]
    pub fn is_observer(&self) -> bool {
        self.as_observer().is_some()
    }

    #[must_use]
    pub fn get_value(&self) -> Value {
        self.accessor().get_value()
    }

    /// # Errors
    ///
    /// Whatever the underlying property write rejects.
    pub fn set_value(
        &self,
        value: impl Into<Value>,
        flags: LifecycleFlags,
    ) -> Result<(), ObservationError> {
        self.accessor().set_value(value.into(), flags)
    }

    /// # Errors
    ///
    /// [`ObservationError::NotObservable`] for write-only accessors.
    pub fn subscribe(&self, subscriber: Rc<dyn Subscriber>) -> Result<(), ObservationError> {
        match self.as_observer() {
            Some(observer) => {
                observer.subscribe(subscriber);
                Ok(())
            }
            None => Err(ObservationError::NotObservable {
                property: self.property_name(),
            }),
        }
    }

    pub fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        self.as_observer()
            .is_some_and(|observer| observer.unsubscribe(subscriber))
    }

    /// Subscribe a closure; dropping the returned guard unsubscribes it.
    ///
    /// # Errors
    ///
    /// [`ObservationError::NotObservable`] for write-only accessors.
    pub fn subscribe_fn(
        &self,
        callback: impl Fn(&Value, &Value, LifecycleFlags) + 'static,
    ) -> Result<Subscription, ObservationError> {
        let subscriber = subscriber(callback);
        self.subscribe(Rc::clone(&subscriber))?;
        Ok(Subscription {
            observer: self.clone(),
            subscriber,
        })
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.as_observer()
            .map_or(0, |observer| observer.subscriber_count())
    }

    #[must_use]
    pub fn do_not_cache(&self) -> bool {
        self.as_observer().is_some_and(|observer| observer.do_not_cache())
    }

    /// Whether both handles point at the same observer instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        fn addr<T: ?Sized>(rc: &Rc<T>) -> *const () {
            Rc::as_ptr(rc).cast()
        }
        let ptr = |value: &Self| match value {
            Self::Primitive(o) => addr(o),
            Self::Property(o) => addr(o),
            Self::Setter(o) => addr(o),
            Self::DirtyCheck(o) => addr(o),
            Self::Computed(o) => addr(o),
            Self::CustomSetter(o) => addr(o),
            Self::CollectionLength(o) => addr(o),
            Self::Proxy(o) => addr(o),
            Self::External(o) => addr(o),
            Self::ExternalAccessor(o) => addr(o),
        };
        self.kind() == other.kind() && ptr(self) == ptr(other)
    }

    fn property_name(&self) -> String {
        match self {
            Self::Property(p) => p.property().to_owned(),
            _ => "<accessor>".to_owned(),
        }
    }
}

impl fmt::Debug for AccessorOrObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessorOrObserver")
            .field("kind", &self.kind())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// RAII guard returned by [`AccessorOrObserver::subscribe_fn`].
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    observer: AccessorOrObserver,
    subscriber: Rc<dyn Subscriber>,
}

impl Subscription {
    /// Unsubscribe now. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.observer.unsubscribe(&self.subscriber);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("observer", &self.observer.kind())
            .finish()
    }
}

/// Hidden per-object cache of observers keyed by property name.
#[derive(Default)]
pub(crate) struct ObserverCache {
    slot: OnceCell<RefCell<AHashMap<Rc<str>, AccessorOrObserver>>>,
}

impl ObserverCache {
    pub(crate) fn get(&self, key: &str) -> Option<AccessorOrObserver> {
        self.slot.get()?.borrow().get(key).cloned()
    }

    pub(crate) fn is_created(&self) -> bool {
        self.slot.get().is_some()
    }

    pub(crate) fn insert(&self, key: &str, observer: AccessorOrObserver) {
        self.slot
            .get_or_init(|| RefCell::new(AHashMap::new()))
            .borrow_mut()
            .insert(Rc::from(key), observer);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slot.get().map_or(0, |slot| slot.borrow().len())
    }
}
