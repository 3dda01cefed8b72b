#![forbid(unsafe_code)]

//! Observers for getter-defined properties.
//!
//! A [`ComputedObserver`] evaluates its getter inside a dependency frame,
//! subscribes to the observer of every property and collection the getter
//! read, and re-evaluates when any of them changes. Dependencies are
//! re-collected on each evaluation, so a getter that branches only stays
//! subscribed to the branch it last took.
//!
//! A getter+setter pair that is not marked volatile gets a
//! [`CustomSetterObserver`] instead: writes through the setter are
//! intercepted and the getter is re-read afterwards.
//!
//! # Invariants
//!
//! 1. Dependencies are held only while the observer has subscribers.
//! 2. Subscribers are notified at most once per dependency change, and only
//!    when the getter result differs from the previous one (SameValueZero).
//! 3. A getter that reads nothing observable is polled by the dirty checker.
//! 4. Static getters are evaluated once and never subscribe to anything.
//!
//! # Failure Modes
//!
//! - Setter errors propagate to the caller of `set_value` unchanged.
//! - A dependency whose observer cannot be created (sealed object, dirty
//!   checking disallowed) is logged at `warn` and skipped.

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use crate::collection::{CollectionObserver, IndexMap};
use crate::config::ComputedOverrides;
use crate::dependency::{self, Collected};
use crate::error::ObservationError;
use crate::flags::LifecycleFlags;
use crate::object::{Getter, ObjectRef, PropertyDescriptor, WeakObjectRef, WriteInterceptor};
use crate::value::Value;

use super::subscribers::SubscriberList;
use super::{
    Accessor, AccessorOrObserver, CollectionSubscriber, DirtyCheckProperty, Observer,
    ObserverLocator, Subscriber,
};

/// Pick the observer for an accessor property.
pub(crate) fn create_computed_observer(
    locator: &ObserverLocator,
    obj: &ObjectRef,
    property: &str,
    descriptor: &PropertyDescriptor,
) -> Result<AccessorOrObserver, ObservationError> {
    let Some(getter) = descriptor.get() else {
        return Err(ObservationError::MissingGetter {
            property: property.to_owned(),
        });
    };
    if descriptor.set().is_some() && !getter.overrides().volatile {
        return CustomSetterObserver::new(obj, property).map(AccessorOrObserver::CustomSetter);
    }
    Ok(AccessorOrObserver::Computed(ComputedObserver::new(
        locator,
        obj,
        property,
        getter.clone(),
    )))
}

enum Dependency {
    Property(AccessorOrObserver),
    Collection(Rc<CollectionObserver>),
}

impl Dependency {
    fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Property(a), Self::Property(b)) => a.ptr_eq(b),
            (Self::Collection(a), Self::Collection(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Forwards dependency notifications to its owner without keeping it alive.
struct DependencyRelay {
    owner: Weak<ComputedObserver>,
}

impl Subscriber for DependencyRelay {
    fn handle_change(&self, _new_value: &Value, _old_value: &Value, flags: LifecycleFlags) {
        if let Some(owner) = self.owner.upgrade() {
            owner.handle_dependency_change(flags);
        }
    }
}

impl CollectionSubscriber for DependencyRelay {
    fn handle_collection_change(&self, _index_map: &IndexMap, flags: LifecycleFlags) {
        if let Some(owner) = self.owner.upgrade() {
            owner.handle_dependency_change(flags);
        }
    }
}

/// Clears the evaluation flag even if the getter unwinds.
struct Evaluating<'a>(&'a Cell<bool>);

impl<'a> Evaluating<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for Evaluating<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Observer for a getter whose value derives from other observed state.
pub struct ComputedObserver {
    obj: WeakObjectRef,
    property: Rc<str>,
    getter: Getter,
    locator: ObserverLocator,
    current: RefCell<Value>,
    evaluated: Cell<bool>,
    evaluating: Cell<bool>,
    subscribers: SubscriberList<dyn Subscriber>,
    dependencies: RefCell<Vec<Dependency>>,
    fallback: OnceCell<Option<Rc<DirtyCheckProperty>>>,
    relay: Rc<DependencyRelay>,
}

impl ComputedObserver {
    pub(crate) fn new(
        locator: &ObserverLocator,
        obj: &ObjectRef,
        property: &str,
        getter: Getter,
    ) -> Rc<Self> {
        Rc::new_cyclic(|owner| Self {
            obj: obj.downgrade(),
            property: Rc::from(property),
            getter,
            locator: locator.clone(),
            current: RefCell::new(Value::Undefined),
            evaluated: Cell::new(false),
            evaluating: Cell::new(false),
            subscribers: SubscriberList::default(),
            dependencies: RefCell::new(Vec::new()),
            fallback: OnceCell::new(),
            relay: Rc::new(DependencyRelay {
                owner: owner.clone(),
            }),
        })
    }

    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }

    #[must_use]
    pub fn overrides(&self) -> ComputedOverrides {
        self.getter.overrides()
    }

    /// Number of observers this property currently depends on.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.dependencies.borrow().len()
    }

    fn evaluate(&self, track: bool) -> Value {
        let Some(obj) = self.obj.upgrade() else {
            return Value::Undefined;
        };
        if !track || self.overrides().is_static {
            return dependency::untracked(|| self.getter.call(&obj));
        }
        let _evaluating = Evaluating::enter(&self.evaluating);
        let (value, collected) = dependency::collect(|| self.getter.call(&obj));
        trace!(
            property = %self.property,
            properties = collected.properties.len(),
            collections = collected.collections.len(),
            "evaluated computed property"
        );
        self.observe(&obj, collected);
        value
    }

    fn observe(&self, obj: &ObjectRef, collected: Collected) {
        let mut next = Vec::new();
        if collected.is_empty() {
            if let Some(fallback) = self.dirty_check_fallback(obj) {
                next.push(Dependency::Property(AccessorOrObserver::DirtyCheck(fallback)));
            }
        }
        for (target, key) in collected.properties {
            if target.ptr_eq(obj) && key == self.property {
                continue;
            }
            match self
                .locator
                .get_observer(LifecycleFlags::empty(), &Value::Object(target), &key)
            {
                Ok(observer) if observer.is_observer() => {
                    next.push(Dependency::Property(observer));
                }
                Ok(_) => {}
                Err(error) => {
                    warn!(
                        property = %self.property,
                        dependency = %key,
                        %error,
                        "skipping unobservable dependency"
                    );
                }
            }
        }
        for collection in &collected.collections {
            if let Some(observer) = self.locator.get_collection_observer(collection) {
                next.push(Dependency::Collection(observer));
            }
        }

        let relay: Rc<dyn Subscriber> = self.relay.clone();
        let collection_relay: Rc<dyn CollectionSubscriber> = self.relay.clone();
        for dependency in &next {
            match dependency {
                Dependency::Property(observer) => {
                    // Only observers reach `next`; the result cannot be an error.
                    let _ = observer.subscribe(Rc::clone(&relay));
                }
                Dependency::Collection(observer) => {
                    observer.subscribe(Rc::clone(&collection_relay));
                }
            }
        }
        let previous = self.dependencies.replace(next);
        let released: Vec<Dependency> = {
            let current = self.dependencies.borrow();
            previous
                .into_iter()
                .filter(|old| !current.iter().any(|dep| dep.same(old)))
                .collect()
        };
        Self::release(released, &relay, &collection_relay);
    }

    fn dirty_check_fallback(&self, obj: &ObjectRef) -> Option<Rc<DirtyCheckProperty>> {
        self.fallback
            .get_or_init(|| {
                match self
                    .locator
                    .dirty_checker()
                    .create_property(&Value::Object(obj.clone()), &self.property)
                {
                    Ok(property) => Some(property),
                    Err(error) => {
                        warn!(
                            property = %self.property,
                            %error,
                            "getter has no observable dependencies"
                        );
                        None
                    }
                }
            })
            .clone()
    }

    fn release(
        dependencies: Vec<Dependency>,
        relay: &Rc<dyn Subscriber>,
        collection_relay: &Rc<dyn CollectionSubscriber>,
    ) {
        for dependency in dependencies {
            match dependency {
                Dependency::Property(observer) => {
                    observer.unsubscribe(relay);
                }
                Dependency::Collection(observer) => {
                    observer.unsubscribe(collection_relay);
                }
            }
        }
    }

    fn handle_dependency_change(&self, flags: LifecycleFlags) {
        if self.evaluating.get() || self.subscribers.is_empty() {
            return;
        }
        let new_value = self.evaluate(true);
        let old_value = self.current.replace(new_value.clone());
        if old_value != new_value {
            self.subscribers
                .for_each(|subscriber| subscriber.handle_change(&new_value, &old_value, flags));
        }
    }
}

impl Accessor for ComputedObserver {
    /// Cached while subscribed (dependencies keep it fresh); evaluated on
    /// every call otherwise.
    fn get_value(&self) -> Value {
        if self.overrides().is_static {
            if !self.evaluated.replace(true) {
                self.current.replace(self.evaluate(false));
            }
            return self.current.borrow().clone();
        }
        if self.subscribers.is_empty() {
            return self.evaluate(false);
        }
        self.current.borrow().clone()
    }

    fn set_value(&self, value: Value, flags: LifecycleFlags) -> Result<(), ObservationError> {
        match self.obj.upgrade() {
            Some(obj) => obj.set_with_flags(&self.property, value, flags),
            None => Ok(()),
        }
    }
}

impl Observer for ComputedObserver {
    fn subscribe(&self, subscriber: Rc<dyn Subscriber>) -> bool {
        let first = self.subscribers.is_empty();
        let added = self.subscribers.add(subscriber);
        if added && first && !self.overrides().is_static {
            let value = self.evaluate(true);
            self.current.replace(value);
        }
        added
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        let removed = self.subscribers.remove(subscriber);
        if removed && self.subscribers.is_empty() {
            let relay: Rc<dyn Subscriber> = self.relay.clone();
            let collection_relay: Rc<dyn CollectionSubscriber> = self.relay.clone();
            let dependencies = self.dependencies.take();
            Self::release(dependencies, &relay, &collection_relay);
        }
        removed
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl fmt::Debug for ComputedObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedObserver")
            .field("property", &self.property)
            .field("overrides", &self.overrides())
            .field("dependencies", &self.dependencies.borrow().len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Observer for a getter+setter pair; notifies after writes through the
/// setter change the getter result.
pub struct CustomSetterObserver {
    obj: WeakObjectRef,
    property: Rc<str>,
    current: RefCell<Value>,
    subscribers: SubscriberList<dyn Subscriber>,
}

impl CustomSetterObserver {
    /// # Errors
    ///
    /// [`ObservationError::NotConfigurable`] when the accessor is locked.
    pub fn new(obj: &ObjectRef, property: &str) -> Result<Rc<Self>, ObservationError> {
        let observer = Rc::new(Self {
            obj: obj.downgrade(),
            property: Rc::from(property),
            current: RefCell::new(dependency::untracked(|| obj.get_untracked(property))),
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

impl WriteInterceptor for CustomSetterObserver {
    fn after_write(&self, new_value: &Value, _old_value: &Value, flags: LifecycleFlags) {
        let old = self.current.replace(new_value.clone());
        if old != *new_value {
            self.subscribers
                .for_each(|subscriber| subscriber.handle_change(new_value, &old, flags));
        }
    }
}

impl Accessor for CustomSetterObserver {
    fn get_value(&self) -> Value {
        match self.obj.upgrade() {
            Some(obj) => dependency::untracked(|| obj.get_untracked(&self.property)),
            None => self.current.borrow().clone(),
        }
    }

    fn set_value(&self, value: Value, flags: LifecycleFlags) -> Result<(), ObservationError> {
        match self.obj.upgrade() {
            Some(obj) => obj.set_with_flags(&self.property, value, flags),
            None => Ok(()),
        }
    }
}

impl Observer for CustomSetterObserver {
    fn subscribe(&self, subscriber: Rc<dyn Subscriber>) -> bool {
        if self.subscribers.is_empty() {
            self.current.replace(self.get_value());
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

impl fmt::Debug for CustomSetterObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomSetterObserver")
            .field("property", &self.property)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
