#![forbid(unsafe_code)]

//! Shared objects with property descriptors.
//!
//! An [`ObjectRef`] is the unit of observation: a reference-counted record of
//! own properties (data or accessor), an optional prototype, and the hidden
//! slots the observation layer attaches lazily (observer cache, write
//! interceptors, proxy observer). Hidden slots are never visible through
//! [`own_keys`](ObjectRef::own_keys) or descriptor lookups.
//!
//! # Invariants
//!
//! 1. Descriptor lookup walks the prototype chain and returns the first match.
//! 2. Writes honour descriptors: non-writable data rejects, accessors dispatch
//!    to their setter with the receiver as `this`, new keys require the object
//!    to be extensible.
//! 3. A successful write to an intercepted key notifies the interceptor and
//!    the proxy observer exactly once, after the write is complete and no
//!    internal borrow is held.
//! 4. A failed write notifies nobody.

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

use crate::config::ComputedOverrides;
use crate::dependency;
use crate::error::ObservationError;
use crate::flags::LifecycleFlags;
use crate::observation::{AccessorOrObserver, ObserverCache, ObserverRegistry, ProxyObserver};
use crate::value::Value;

type GetterFn = dyn Fn(&ObjectRef) -> Value;
type SetterFn = dyn Fn(&ObjectRef, Value) -> Result<(), ObservationError>;
type ObserverFactoryFn = dyn Fn(&ObjectRef) -> AccessorOrObserver;

/// Getter half of an accessor property.
#[derive(Clone)]
pub struct Getter {
    func: Rc<GetterFn>,
    overrides: ComputedOverrides,
    observer_factory: Option<Rc<ObserverFactoryFn>>,
}

impl Getter {
    /// Wrap a getter body. The receiver is passed as the first argument.
    pub fn new(func: impl Fn(&ObjectRef) -> Value + 'static) -> Self {
        Self {
            func: Rc::new(func),
            overrides: ComputedOverrides::default(),
            observer_factory: None,
        }
    }

    /// Attach computed-observation hints.
    #[must_use]
    pub fn with_overrides(mut self, overrides: ComputedOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Attach a precompiled observer factory. The locator uses it instead of
    /// building a computed observer.
    #[must_use]
    pub fn with_observer_factory(
        mut self,
        factory: impl Fn(&ObjectRef) -> AccessorOrObserver + 'static,
    ) -> Self {
        self.observer_factory = Some(Rc::new(factory));
        self
    }

    #[must_use]
    pub fn overrides(&self) -> ComputedOverrides {
        self.overrides
    }

    pub(crate) fn observer_factory(&self) -> Option<&Rc<ObserverFactoryFn>> {
        self.observer_factory.as_ref()
    }

    /// Evaluate against `receiver`.
    pub fn call(&self, receiver: &ObjectRef) -> Value {
        (self.func)(receiver)
    }
}

/// Setter half of an accessor property.
#[derive(Clone)]
pub struct Setter {
    func: Rc<SetterFn>,
}

impl Setter {
    pub fn new(func: impl Fn(&ObjectRef, Value) -> Result<(), ObservationError> + 'static) -> Self {
        Self {
            func: Rc::new(func),
        }
    }

    /// Invoke against `receiver`; errors come straight from the setter body.
    pub fn call(&self, receiver: &ObjectRef, value: Value) -> Result<(), ObservationError> {
        (self.func)(receiver, value)
    }
}

/// Property descriptor, as stored on an object.
#[derive(Clone)]
pub enum PropertyDescriptor {
    Data {
        value: Value,
        writable: bool,
        configurable: bool,
    },
    Accessor {
        get: Option<Getter>,
        set: Option<Setter>,
        configurable: bool,
    },
}

impl PropertyDescriptor {
    /// Writable, configurable data property.
    pub fn data(value: impl Into<Value>) -> Self {
        Self::Data {
            value: value.into(),
            writable: true,
            configurable: true,
        }
    }

    /// Configurable getter-only accessor.
    pub fn getter(get: Getter) -> Self {
        Self::Accessor {
            get: Some(get),
            set: None,
            configurable: true,
        }
    }

    /// Configurable getter/setter pair.
    pub fn accessor(get: Getter, set: Setter) -> Self {
        Self::Accessor {
            get: Some(get),
            set: Some(set),
            configurable: true,
        }
    }

    #[must_use]
    pub fn is_accessor(&self) -> bool {
        matches!(self, Self::Accessor { .. })
    }

    #[must_use]
    pub fn configurable(&self) -> bool {
        match self {
            Self::Data { configurable, .. } | Self::Accessor { configurable, .. } => *configurable,
        }
    }

    #[must_use]
    pub fn get(&self) -> Option<&Getter> {
        match self {
            Self::Accessor { get, .. } => get.as_ref(),
            Self::Data { .. } => None,
        }
    }

    #[must_use]
    pub fn set(&self) -> Option<&Setter> {
        match self {
            Self::Accessor { set, .. } => set.as_ref(),
            Self::Data { .. } => None,
        }
    }

    fn lock(&mut self) {
        match self {
            Self::Data {
                writable,
                configurable,
                ..
            } => {
                *writable = false;
                *configurable = false;
            }
            Self::Accessor { configurable, .. } => *configurable = false,
        }
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data {
                value,
                writable,
                configurable,
            } => f
                .debug_struct("Data")
                .field("value", value)
                .field("writable", writable)
                .field("configurable", configurable)
                .finish(),
            Self::Accessor {
                get,
                set,
                configurable,
            } => f
                .debug_struct("Accessor")
                .field("get", &get.is_some())
                .field("set", &set.is_some())
                .field("configurable", configurable)
                .finish(),
        }
    }
}

/// Hook run after a write to an intercepted key.
pub(crate) trait WriteInterceptor {
    fn after_write(&self, new_value: &Value, old_value: &Value, flags: LifecycleFlags);
}

pub(crate) struct ObjectInner {
    properties: RefCell<AHashMap<Rc<str>, PropertyDescriptor>>,
    prototype: Option<ObjectRef>,
    extensible: Cell<bool>,
    tag: Option<Rc<str>>,
    registry: Option<Rc<dyn ObserverRegistry>>,
    observers: ObserverCache,
    interceptors: RefCell<AHashMap<Rc<str>, Weak<dyn WriteInterceptor>>>,
    proxy: OnceCell<Rc<ProxyObserver>>,
}

/// Shared handle to an observable object. Clones share identity.
#[derive(Clone)]
pub struct ObjectRef {
    inner: Rc<ObjectInner>,
}

/// Non-owning handle to an [`ObjectRef`].
#[derive(Clone)]
pub struct WeakObjectRef {
    inner: Weak<ObjectInner>,
}

impl WeakObjectRef {
    #[must_use]
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.inner.upgrade().map(|inner| ObjectRef { inner })
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectRef {
    /// Empty, extensible object without prototype.
    #[must_use]
    pub fn new() -> Self {
        ObjectBuilder::default().build()
    }

    /// Empty object whose descriptor lookups fall back to `prototype`.
    #[must_use]
    pub fn with_prototype(prototype: &ObjectRef) -> Self {
        Self::builder().prototype(prototype).build()
    }

    /// Binding context that manages its own observers.
    #[must_use]
    pub fn binding_context() -> Self {
        Self::builder()
            .registry(Rc::new(crate::observation::BindingContextObservers::default()))
            .build()
    }

    #[must_use]
    pub fn builder() -> ObjectBuilder {
        ObjectBuilder::default()
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
    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Environment tag consulted by target locators.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.inner.tag.as_deref()
    }

    #[must_use]
    pub fn prototype(&self) -> Option<&ObjectRef> {
        self.inner.prototype.as_ref()
    }

    /// Whether the object manages its own observers.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.inner.registry.is_some()
    }

    pub(crate) fn registry(&self) -> Option<&Rc<dyn ObserverRegistry>> {
        self.inner.registry.as_ref()
    }

    pub(crate) fn observer_cache(&self) -> &ObserverCache {
        &self.inner.observers
    }

    pub(crate) fn proxy_slot(&self) -> &OnceCell<Rc<ProxyObserver>> {
        &self.inner.proxy
    }

    #[must_use]
    pub fn is_extensible(&self) -> bool {
        self.inner.extensible.get()
    }

    /// Forbid new properties (and new hidden slots).
    pub fn prevent_extensions(&self) {
        self.inner.extensible.set(false);
    }

    /// Lock every own property and forbid new ones.
    pub fn freeze(&self) {
        self.prevent_extensions();
        for descriptor in self.inner.properties.borrow_mut().values_mut() {
            descriptor.lock();
        }
    }

    #[must_use]
    pub fn has_own(&self, key: &str) -> bool {
        self.inner.properties.borrow().contains_key(key)
    }

    /// Own property names, sorted.
    #[must_use]
    pub fn own_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .inner
            .properties
            .borrow()
            .keys()
            .map(|k| k.to_string())
            .collect();
        keys.sort_unstable();
        keys
    }

    #[must_use]
    pub fn own_property_descriptor(&self, key: &str) -> Option<PropertyDescriptor> {
        self.inner.properties.borrow().get(key).cloned()
    }

    /// Descriptor for `key`, walking the prototype chain.
    #[must_use]
    pub fn property_descriptor(&self, key: &str) -> Option<PropertyDescriptor> {
        let mut current = Some(self);
        while let Some(obj) = current {
            if let Some(descriptor) = obj.own_property_descriptor(key) {
                return Some(descriptor);
            }
            current = obj.prototype();
        }
        None
    }

    /// Define or replace an own property.
    ///
    /// # Errors
    ///
    /// [`ObservationError::NotConfigurable`] when the existing property is
    /// locked, [`ObservationError::NotExtensible`] when `key` is new and the
    /// object is sealed.
    pub fn define_property(
        &self,
        key: &str,
        descriptor: PropertyDescriptor,
    ) -> Result<(), ObservationError> {
        let mut properties = self.inner.properties.borrow_mut();
        match properties.get(key) {
            Some(existing) if !existing.configurable() => {
                Err(ObservationError::NotConfigurable {
                    property: key.to_owned(),
                })
            }
            None if !self.is_extensible() => Err(ObservationError::NotExtensible {
                property: key.to_owned(),
            }),
            _ => {
                properties.insert(Rc::from(key), descriptor);
                Ok(())
            }
        }
    }

    /// Define a getter-only accessor.
    ///
    /// # Errors
    ///
    /// See [`define_property`](Self::define_property).
    pub fn define_getter(&self, key: &str, get: Getter) -> Result<(), ObservationError> {
        self.define_property(key, PropertyDescriptor::getter(get))
    }

    /// Define a getter/setter pair.
    ///
    /// # Errors
    ///
    /// See [`define_property`](Self::define_property).
    pub fn define_accessor(
        &self,
        key: &str,
        get: Getter,
        set: Setter,
    ) -> Result<(), ObservationError> {
        self.define_property(key, PropertyDescriptor::accessor(get, set))
    }

    /// Read `key`, recording the read for any computed property being
    /// evaluated.
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        dependency::record_property(self, key);
        self.get_untracked(key)
    }

    /// Read `key` without recording it. Getter bodies still record their own
    /// reads.
    #[must_use]
    pub fn get_untracked(&self, key: &str) -> Value {
        match self.property_descriptor(key) {
            Some(PropertyDescriptor::Data { value, .. }) => value,
            Some(PropertyDescriptor::Accessor { get: Some(get), .. }) => get.call(self),
            _ => Value::Undefined,
        }
    }

    /// Write `key` with empty flags.
    ///
    /// # Errors
    ///
    /// See [`set_with_flags`](Self::set_with_flags).
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), ObservationError> {
        self.set_with_flags(key, value.into(), LifecycleFlags::empty())
    }

    /// Write `key`, then notify any interceptor and proxy observer with
    /// `flags`.
    ///
    /// # Errors
    ///
    /// - [`ObservationError::ReadOnly`] for non-writable data properties.
    /// - [`ObservationError::NoSetter`] for accessors without a setter.
    /// - [`ObservationError::NotExtensible`] when adding to a sealed object.
    /// - Whatever the setter returns.
    pub fn set_with_flags(
        &self,
        key: &str,
        value: Value,
        flags: LifecycleFlags,
    ) -> Result<(), ObservationError> {
        let interceptor = self.interceptor(key);
        let proxy = self.inner.proxy.get().cloned();
        let observed = interceptor.is_some() || proxy.is_some();
        let old_value = if observed {
            dependency::untracked(|| self.get_untracked(key))
        } else {
            Value::Undefined
        };

        let via_accessor = self.write(key, value.clone())?;

        if observed {
            let new_value = if via_accessor {
                dependency::untracked(|| self.get_untracked(key))
            } else {
                value
            };
            if let Some(interceptor) = interceptor {
                interceptor.after_write(&new_value, &old_value, flags);
            }
            if let Some(proxy) = proxy {
                proxy.notify(key, &new_value, &old_value, flags);
            }
        }
        Ok(())
    }

    /// Perform the raw write. Returns whether a setter handled it.
    fn write(&self, key: &str, value: Value) -> Result<bool, ObservationError> {
        let own = self.own_property_descriptor(key);
        let resolved = match own {
            Some(descriptor) => Some((descriptor, true)),
            None => self
                .prototype()
                .and_then(|proto| proto.property_descriptor(key))
                .map(|descriptor| (descriptor, false)),
        };

        match resolved {
            Some((PropertyDescriptor::Accessor { set: Some(set), .. }, _)) => {
                set.call(self, value)?;
                Ok(true)
            }
            Some((PropertyDescriptor::Accessor { set: None, .. }, _)) => {
                Err(ObservationError::NoSetter {
                    property: key.to_owned(),
                })
            }
            Some((PropertyDescriptor::Data { writable: false, .. }, _)) => {
                Err(ObservationError::ReadOnly {
                    property: key.to_owned(),
                })
            }
            Some((PropertyDescriptor::Data { .. }, true)) => {
                let mut properties = self.inner.properties.borrow_mut();
                if let Some(PropertyDescriptor::Data { value: slot, .. }) =
                    properties.get_mut(key)
                {
                    *slot = value;
                }
                Ok(false)
            }
            Some((PropertyDescriptor::Data { .. }, false)) | None => {
                if !self.is_extensible() {
                    return Err(ObservationError::NotExtensible {
                        property: key.to_owned(),
                    });
                }
                self.inner
                    .properties
                    .borrow_mut()
                    .insert(Rc::from(key), PropertyDescriptor::data(value));
                Ok(false)
            }
        }
    }

    fn interceptor(&self, key: &str) -> Option<Rc<dyn WriteInterceptor>> {
        let mut interceptors = self.inner.interceptors.borrow_mut();
        let weak = interceptors.get(key)?;
        match weak.upgrade() {
            Some(live) => Some(live),
            None => {
                interceptors.remove(key);
                None
            }
        }
    }

    /// Route future writes of `key` through `interceptor`.
    pub(crate) fn install_interceptor(
        &self,
        key: &str,
        interceptor: Weak<dyn WriteInterceptor>,
    ) -> Result<(), ObservationError> {
        match self.own_property_descriptor(key) {
            Some(descriptor) if !descriptor.configurable() => {
                return Err(ObservationError::NotConfigurable {
                    property: key.to_owned(),
                });
            }
            None if !self.is_extensible() => {
                return Err(ObservationError::NotExtensible {
                    property: key.to_owned(),
                });
            }
            _ => {}
        }
        self.inner
            .interceptors
            .borrow_mut()
            .insert(Rc::from(key), interceptor);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn is_intercepted(&self, key: &str) -> bool {
        self.interceptor(key).is_some()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = match self.inner.properties.try_borrow() {
            Ok(properties) => properties.keys().map(|k| k.to_string()).collect(),
            Err(_) => Vec::new(),
        };
        keys.sort_unstable();
        f.debug_struct("ObjectRef")
            .field("tag", &self.tag())
            .field("keys", &keys)
            .finish()
    }
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for ObjectRef {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::builder(), |builder, (k, v)| builder.value(k.as_ref(), v))
            .build()
    }
}

/// Builder for objects that need a prototype, tag, registry or accessors at
/// construction.
#[derive(Default)]
#[must_use]
pub struct ObjectBuilder {
    prototype: Option<ObjectRef>,
    tag: Option<Rc<str>>,
    registry: Option<Rc<dyn ObserverRegistry>>,
    properties: AHashMap<Rc<str>, PropertyDescriptor>,
}

impl ObjectBuilder {
    pub fn prototype(mut self, prototype: &ObjectRef) -> Self {
        self.prototype = Some(prototype.clone());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tag = Some(Rc::from(tag));
        self
    }

    pub fn registry(mut self, registry: Rc<dyn ObserverRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn value(self, key: &str, value: impl Into<Value>) -> Self {
        self.descriptor(key, PropertyDescriptor::data(value))
    }

    pub fn getter(self, key: &str, get: Getter) -> Self {
        self.descriptor(key, PropertyDescriptor::getter(get))
    }

    pub fn accessor(self, key: &str, get: Getter, set: Setter) -> Self {
        self.descriptor(key, PropertyDescriptor::accessor(get, set))
    }

    pub fn descriptor(mut self, key: &str, descriptor: PropertyDescriptor) -> Self {
        self.properties.insert(Rc::from(key), descriptor);
        self
    }

    #[must_use]
    pub fn build(self) -> ObjectRef {
        ObjectRef {
            inner: Rc::new(ObjectInner {
                properties: RefCell::new(self.properties),
                prototype: self.prototype,
                extensible: Cell::new(true),
                tag: self.tag,
                registry: self.registry,
                observers: ObserverCache::default(),
                interceptors: RefCell::new(AHashMap::new()),
                proxy: OnceCell::new(),
            }),
        }
    }
}
