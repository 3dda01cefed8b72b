#![forbid(unsafe_code)]

//! Strategy selection for `(object, property)` observation.
//!
//! [`ObserverLocator::get_observer`] decides, in order:
//!
//! 1. Proxy strategy flag on an object: the object's [`ProxyObserver`].
//! 2. Synthetic objects: their own [`ObserverRegistry`].
//! 3. The per-object observer cache.
//! 4. A new observer: primitive wrapper, target locator, collection
//!    `length`/`size`, setter observer for data properties, observer factory,
//!    adapters, dirty checking, or a computed observer for accessors.
//! 5. The result is cached unless it opts out.
//!
//! # Invariants
//!
//! 1. A cached `(object, property)` pair always resolves to the same
//!    observer instance.
//! 2. Adapters are consulted in registration order; the first answer wins.
//!
//! # Failure Modes
//!
//! - [`ObservationError::NotExtensible`]: the observer cache would have to be
//!   created on a sealed object.
//! - [`ObservationError::MissingGetter`]: setter-only accessor.
//! - [`ObservationError::DirtyCheckDisallowed`]: the only strategy left is
//!   dirty checking and the settings forbid it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::collection::{ArrayRef, CollectionObserver, MapRef, SetRef};
use crate::config::ObservationConfig;
use crate::error::ObservationError;
use crate::flags::LifecycleFlags;
use crate::object::{ObjectRef, PropertyDescriptor};
use crate::value::Value;

use super::computed::create_computed_observer;
use super::{
    AccessorOrObserver, DirtyChecker, ObserverCache, PrimitiveObserver, PropertyAccessor,
    ProxyObserver, SetterObserver,
};

/// External strategy for accessor properties, consulted before dirty
/// checking and computed observation.
pub trait ObjectObservationAdapter {
    /// Return `None` to let the next adapter (or the built-in strategies)
    /// handle the property.
    fn get_observer(
        &self,
        flags: LifecycleFlags,
        obj: &ObjectRef,
        property: &str,
        descriptor: &PropertyDescriptor,
    ) -> Option<AccessorOrObserver>;
}

/// Environment-specific observers, e.g. for visual-tree nodes.
///
/// Consulted for every object and collection before the built-in
/// strategies, so a target locator may also claim arrays, maps and sets.
pub trait TargetObserverLocator {
    fn handles(&self, flags: LifecycleFlags, obj: &Value) -> bool;

    /// Whether [`ObserverLocator::get_accessor`] should hand out a full
    /// observer for this property instead of a write-only accessor.
    fn overrides_accessor(&self, flags: LifecycleFlags, obj: &Value, property: &str) -> bool;

    /// `None` marks the value as a target and falls through to the built-in
    /// strategies (with dirty checking instead of computed observation).
    fn get_observer(
        &self,
        flags: LifecycleFlags,
        locator: &ObserverLocator,
        obj: &Value,
        property: &str,
    ) -> Option<AccessorOrObserver>;
}

/// Environment-specific accessors.
pub trait TargetAccessorLocator {
    fn handles(&self, flags: LifecycleFlags, obj: &Value) -> bool;

    fn get_accessor(
        &self,
        flags: LifecycleFlags,
        locator: &ObserverLocator,
        obj: &Value,
        property: &str,
    ) -> AccessorOrObserver;
}

/// Target locator for environments without special targets.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTargetLocator;

impl TargetObserverLocator for NoTargetLocator {
    fn handles(&self, _flags: LifecycleFlags, _obj: &Value) -> bool {
        false
    }

    fn overrides_accessor(&self, _flags: LifecycleFlags, _obj: &Value, _property: &str) -> bool {
        false
    }

    fn get_observer(
        &self,
        _flags: LifecycleFlags,
        _locator: &ObserverLocator,
        _obj: &Value,
        _property: &str,
    ) -> Option<AccessorOrObserver> {
        None
    }
}

impl TargetAccessorLocator for NoTargetLocator {
    fn handles(&self, _flags: LifecycleFlags, _obj: &Value) -> bool {
        false
    }

    fn get_accessor(
        &self,
        _flags: LifecycleFlags,
        _locator: &ObserverLocator,
        obj: &Value,
        property: &str,
    ) -> AccessorOrObserver {
        AccessorOrObserver::Property(Rc::new(PropertyAccessor::new(obj.clone(), property)))
    }
}

struct LocatorInner {
    config: ObservationConfig,
    adapters: RefCell<Vec<Rc<dyn ObjectObservationAdapter>>>,
    dirty_checker: Rc<DirtyChecker>,
    target_observers: Rc<dyn TargetObserverLocator>,
    target_accessors: Rc<dyn TargetAccessorLocator>,
}

/// Entry point for observer and accessor lookups. Clones share state.
#[derive(Clone)]
pub struct ObserverLocator {
    inner: Rc<LocatorInner>,
}

impl Default for ObserverLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ObserverLocator {
    /// Locator with default settings and no target locators.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&ObservationConfig::default())
    }

    #[must_use]
    pub fn with_config(config: &ObservationConfig) -> Self {
        Self::with_targets(config, Rc::new(NoTargetLocator), Rc::new(NoTargetLocator))
    }

    #[must_use]
    pub fn with_targets(
        config: &ObservationConfig,
        target_observers: Rc<dyn TargetObserverLocator>,
        target_accessors: Rc<dyn TargetAccessorLocator>,
    ) -> Self {
        Self {
            inner: Rc::new(LocatorInner {
                config: *config,
                adapters: RefCell::new(Vec::new()),
                dirty_checker: DirtyChecker::new(config.dirty_check),
                target_observers,
                target_accessors,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ObservationConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn dirty_checker(&self) -> &Rc<DirtyChecker> {
        &self.inner.dirty_checker
    }

    /// Register an adapter after the ones already registered.
    pub fn add_adapter(&self, adapter: Rc<dyn ObjectObservationAdapter>) {
        self.inner.adapters.borrow_mut().push(adapter);
    }

    /// Observer (or accessor, for primitives) for `property` on `obj`.
    ///
    /// # Errors
    ///
    /// See the module-level failure modes.
    pub fn get_observer(
        &self,
        flags: LifecycleFlags,
        obj: &Value,
        property: &str,
    ) -> Result<AccessorOrObserver, ObservationError> {
        let flags = flags | self.inner.config.base_flags();

        if let Value::Object(target) = obj {
            if flags.uses_proxy_strategy() {
                trace!(property, "proxy strategy");
                return Ok(AccessorOrObserver::Proxy(
                    ProxyObserver::get_or_create(target).property(property),
                ));
            }
            if let Some(registry) = target.registry() {
                return registry.get_or_create(flags, target, property);
            }
        }

        let Some(cache) = observer_cache(obj) else {
            return self.create_property_observer(flags, obj, property);
        };
        if let Some(cached) = cache.get(property) {
            return Ok(cached);
        }
        if !cache.is_created() {
            if let Value::Object(target) = obj {
                if !target.is_extensible() {
                    return Err(ObservationError::NotExtensible {
                        property: property.to_owned(),
                    });
                }
            }
        }

        let observer = self.create_property_observer(flags, obj, property)?;
        if !observer.do_not_cache() {
            if !cache.is_created() {
                debug!(receiver = obj.type_name(), "creating observer cache");
            }
            cache.insert(property, observer.clone());
        }
        Ok(observer)
    }

    fn create_property_observer(
        &self,
        flags: LifecycleFlags,
        obj: &Value,
        property: &str,
    ) -> Result<AccessorOrObserver, ObservationError> {
        let mut is_target = false;
        if obj.is_object() {
            let targets = &self.inner.target_observers;
            if targets.handles(flags, obj) {
                if let Some(observer) = targets.get_observer(flags, self, obj, property) {
                    return Ok(observer);
                }
                is_target = true;
            }
        }

        let observer = match obj {
            Value::Array(array) if property == "length" => {
                AccessorOrObserver::CollectionLength(array.collection_observer().length_observer())
            }
            Value::Map(map) if property == "size" => {
                AccessorOrObserver::CollectionLength(map.collection_observer().length_observer())
            }
            Value::Set(set) if property == "size" => {
                AccessorOrObserver::CollectionLength(set.collection_observer().length_observer())
            }
            Value::Array(_) | Value::Map(_) | Value::Set(_) => self.dirty_check(obj, property)?,
            Value::Object(target) => {
                self.create_object_observer(flags, target, property, is_target)?
            }
            _ => AccessorOrObserver::Primitive(Rc::new(PrimitiveObserver::new(
                obj.clone(),
                property,
            ))),
        };
        trace!(
            property,
            receiver = obj.type_name(),
            kind = ?observer.kind(),
            "selected observation strategy"
        );
        Ok(observer)
    }

    fn create_object_observer(
        &self,
        flags: LifecycleFlags,
        obj: &ObjectRef,
        property: &str,
        is_target: bool,
    ) -> Result<AccessorOrObserver, ObservationError> {
        let descriptor = obj.property_descriptor(property);
        let Some(descriptor) = descriptor.filter(PropertyDescriptor::is_accessor) else {
            let configurable = obj
                .own_property_descriptor(property)
                .is_none_or(|own| own.configurable());
            if !configurable {
                return self.dirty_check(&Value::Object(obj.clone()), property);
            }
            return SetterObserver::new(obj, property).map(AccessorOrObserver::Setter);
        };

        if let Some(factory) = descriptor.get().and_then(|getter| getter.observer_factory()) {
            return Ok(factory(obj));
        }

        let adapters: Vec<Rc<dyn ObjectObservationAdapter>> =
            self.inner.adapters.borrow().clone();
        for adapter in adapters {
            if let Some(observer) = adapter.get_observer(flags, obj, property, &descriptor) {
                return Ok(observer);
            }
        }

        if is_target || !descriptor.configurable() {
            return self.dirty_check(&Value::Object(obj.clone()), property);
        }
        create_computed_observer(self, obj, property, &descriptor)
    }

    fn dirty_check(
        &self,
        obj: &Value,
        property: &str,
    ) -> Result<AccessorOrObserver, ObservationError> {
        self.inner
            .dirty_checker
            .create_property(obj, property)
            .map(AccessorOrObserver::DirtyCheck)
    }

    /// Write-side access for `property` on `obj`.
    ///
    /// # Errors
    ///
    /// Only when the target locator redirects to
    /// [`get_observer`](Self::get_observer) and that fails.
    pub fn get_accessor(
        &self,
        flags: LifecycleFlags,
        obj: &Value,
        property: &str,
    ) -> Result<AccessorOrObserver, ObservationError> {
        let flags = flags | self.inner.config.base_flags();
        if obj.is_object() && self.inner.target_accessors.handles(flags, obj) {
            if self
                .inner
                .target_observers
                .overrides_accessor(flags, obj, property)
            {
                return self.get_observer(flags, obj, property);
            }
            return Ok(self
                .inner
                .target_accessors
                .get_accessor(flags, self, obj, property));
        }
        if let Value::Object(target) = obj {
            if flags.uses_proxy_strategy() {
                return Ok(AccessorOrObserver::Proxy(
                    ProxyObserver::get_or_create(target).property(property),
                ));
            }
        }
        Ok(AccessorOrObserver::Property(Rc::new(PropertyAccessor::new(
            obj.clone(),
            property,
        ))))
    }

    pub fn get_array_observer(
        &self,
        _flags: LifecycleFlags,
        array: &ArrayRef,
    ) -> Rc<CollectionObserver> {
        array.collection_observer()
    }

    pub fn get_map_observer(&self, _flags: LifecycleFlags, map: &MapRef) -> Rc<CollectionObserver> {
        map.collection_observer()
    }

    pub fn get_set_observer(&self, _flags: LifecycleFlags, set: &SetRef) -> Rc<CollectionObserver> {
        set.collection_observer()
    }

    /// Collection observer for any collection value; `None` for everything
    /// else.
    #[must_use]
    pub fn get_collection_observer(&self, collection: &Value) -> Option<Rc<CollectionObserver>> {
        match collection {
            Value::Array(array) => Some(array.collection_observer()),
            Value::Map(map) => Some(map.collection_observer()),
            Value::Set(set) => Some(set.collection_observer()),
            _ => None,
        }
    }
}

fn observer_cache(obj: &Value) -> Option<&ObserverCache> {
    match obj {
        Value::Object(o) => Some(o.observer_cache()),
        Value::Array(a) => Some(a.observer_cache()),
        Value::Map(m) => Some(m.observer_cache()),
        Value::Set(s) => Some(s.observer_cache()),
        _ => None,
    }
}

impl fmt::Debug for ObserverLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverLocator")
            .field("config", &self.inner.config)
            .field("adapters", &self.inner.adapters.borrow().len())
            .field("dirty_checker", &self.inner.dirty_checker)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Getter;
    use crate::observation::ObserverKind;

    fn kind_of(locator: &ObserverLocator, obj: &Value, property: &str) -> ObserverKind {
        locator
            .get_observer(LifecycleFlags::empty(), obj, property)
            .unwrap()
            .kind()
    }

    #[test]
    fn strategy_per_shape() {
        let locator = ObserverLocator::new();
        let obj = ObjectRef::builder()
            .value("a", 1)
            .getter("g", Getter::new(|this| this.get("a")))
            .build();
        let arr = ArrayRef::from_iter([1]);
        let map = MapRef::new();

        assert_eq!(kind_of(&locator, &Value::from(&obj), "a"), ObserverKind::Setter);
        assert_eq!(kind_of(&locator, &Value::from(&obj), "new"), ObserverKind::Setter);
        assert_eq!(kind_of(&locator, &Value::from(&obj), "g"), ObserverKind::Computed);
        assert_eq!(
            kind_of(&locator, &Value::from(&arr), "length"),
            ObserverKind::CollectionLength
        );
        assert_eq!(kind_of(&locator, &Value::from(&arr), "0"), ObserverKind::DirtyCheck);
        assert_eq!(
            kind_of(&locator, &Value::from(&map), "size"),
            ObserverKind::CollectionLength
        );
        assert_eq!(kind_of(&locator, &Value::from("s"), "length"), ObserverKind::Primitive);
    }

    #[test]
    fn cached_per_object_and_property() {
        let locator = ObserverLocator::new();
        let obj = Value::from(ObjectRef::from_iter([("a", 1)]));
        let first = locator
            .get_observer(LifecycleFlags::empty(), &obj, "a")
            .unwrap();
        let second = locator
            .get_observer(LifecycleFlags::empty(), &obj, "a")
            .unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(obj.as_object().map(|o| o.observer_cache().len()), Some(1));

        let primitive = Value::from(1);
        let a = locator
            .get_observer(LifecycleFlags::empty(), &primitive, "x")
            .unwrap();
        let b = locator
            .get_observer(LifecycleFlags::empty(), &primitive, "x")
            .unwrap();
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn sealed_objects_cannot_host_a_cache() {
        let locator = ObserverLocator::new();
        let obj = ObjectRef::from_iter([("a", 1)]);
        obj.freeze();
        let err = locator
            .get_observer(LifecycleFlags::empty(), &Value::from(&obj), "a")
            .unwrap_err();
        assert!(matches!(err, ObservationError::NotExtensible { .. }));
    }

    #[test]
    fn non_configurable_properties_are_dirty_checked() {
        let locator = ObserverLocator::new();
        let obj = ObjectRef::builder()
            .descriptor(
                "locked",
                PropertyDescriptor::Data {
                    value: Value::from(1),
                    writable: true,
                    configurable: false,
                },
            )
            .descriptor(
                "fixed",
                PropertyDescriptor::Accessor {
                    get: Some(Getter::new(|_| Value::from(1))),
                    set: None,
                    configurable: false,
                },
            )
            .build();
        let value = Value::from(&obj);
        assert_eq!(kind_of(&locator, &value, "locked"), ObserverKind::DirtyCheck);
        assert_eq!(kind_of(&locator, &value, "fixed"), ObserverKind::DirtyCheck);
    }

    #[test]
    fn proxy_strategy_bypasses_the_cache() {
        let locator = ObserverLocator::new();
        let obj = ObjectRef::from_iter([("a", 1)]);
        let observer = locator
            .get_observer(LifecycleFlags::PROXY_STRATEGY, &Value::from(&obj), "a")
            .unwrap();
        assert_eq!(observer.kind(), ObserverKind::Proxy);
        assert!(!obj.observer_cache().is_created());

        let configured = ObserverLocator::with_config(&ObservationConfig {
            proxy_strategy: true,
            ..ObservationConfig::default()
        });
        assert_eq!(
            kind_of(&configured, &Value::from(&obj), "a"),
            ObserverKind::Proxy
        );
    }

    #[test]
    fn observer_factory_wins_over_computed() {
        let locator = ObserverLocator::new();
        let getter = Getter::new(|_| Value::from(1)).with_observer_factory(|obj| {
            AccessorOrObserver::Property(Rc::new(PropertyAccessor::new(Value::from(obj), "g")))
        });
        let obj = ObjectRef::builder().getter("g", getter).build();
        assert_eq!(
            kind_of(&locator, &Value::from(&obj), "g"),
            ObserverKind::PropertyAccessor
        );
    }

    struct ViewTargets;

    fn is_node(obj: &Value) -> bool {
        obj.as_object().and_then(ObjectRef::tag) == Some("node")
    }

    impl TargetObserverLocator for ViewTargets {
        fn handles(&self, _flags: LifecycleFlags, obj: &Value) -> bool {
            matches!(obj, Value::Array(_)) || is_node(obj)
        }

        fn overrides_accessor(&self, _flags: LifecycleFlags, _obj: &Value, property: &str) -> bool {
            property == "value"
        }

        fn get_observer(
            &self,
            _flags: LifecycleFlags,
            _locator: &ObserverLocator,
            obj: &Value,
            property: &str,
        ) -> Option<AccessorOrObserver> {
            match obj {
                Value::Array(_) => Some(AccessorOrObserver::Property(Rc::new(
                    PropertyAccessor::new(obj.clone(), property),
                ))),
                _ => None,
            }
        }
    }

    impl TargetAccessorLocator for ViewTargets {
        fn handles(&self, _flags: LifecycleFlags, obj: &Value) -> bool {
            is_node(obj)
        }

        fn get_accessor(
            &self,
            _flags: LifecycleFlags,
            _locator: &ObserverLocator,
            obj: &Value,
            property: &str,
        ) -> AccessorOrObserver {
            AccessorOrObserver::Primitive(Rc::new(PrimitiveObserver::new(obj.clone(), property)))
        }
    }

    #[test]
    fn target_locator_is_consulted_before_built_in_strategies() {
        let locator = ObserverLocator::with_targets(
            &ObservationConfig::default(),
            Rc::new(ViewTargets),
            Rc::new(ViewTargets),
        );
        let items = Value::from(ArrayRef::from_iter([1, 2]));
        assert_eq!(
            kind_of(&locator, &items, "length"),
            ObserverKind::PropertyAccessor
        );

        let node = Value::from(
            ObjectRef::builder()
                .tag("node")
                .value("value", 1)
                .getter("width", Getter::new(|this| this.get("value")))
                .build(),
        );
        assert_eq!(kind_of(&locator, &node, "width"), ObserverKind::DirtyCheck);
        assert_eq!(
            locator
                .get_accessor(LifecycleFlags::empty(), &node, "width")
                .unwrap()
                .kind(),
            ObserverKind::Primitive
        );
        assert_eq!(
            locator
                .get_accessor(LifecycleFlags::empty(), &node, "value")
                .unwrap()
                .kind(),
            ObserverKind::Setter
        );

        let plain = Value::from(MapRef::new());
        assert_eq!(
            kind_of(&locator, &plain, "size"),
            ObserverKind::CollectionLength
        );
    }

    #[test]
    fn accessor_defaults_to_property_accessor() {
        let locator = ObserverLocator::new();
        let obj = Value::from(ObjectRef::new());
        let accessor = locator
            .get_accessor(LifecycleFlags::empty(), &obj, "a")
            .unwrap();
        assert_eq!(accessor.kind(), ObserverKind::PropertyAccessor);
        let proxied = locator
            .get_accessor(LifecycleFlags::PROXY_STRATEGY, &obj, "a")
            .unwrap();
        assert_eq!(proxied.kind(), ObserverKind::Proxy);
    }
}
