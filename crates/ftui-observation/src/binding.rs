#![forbid(unsafe_code)]

//! Property bindings built on the [`ObserverLocator`].
//!
//! A [`PropertyBinding`] connects one property of a source value to one
//! property of a target value. The [`BindingMode`] decides which directions
//! are kept in sync once [`bind`](PropertyBinding::bind) has run.
//!
//! # Usage
//!
//! ```ignore
//! let locator = ObserverLocator::new();
//! let model = ObjectRef::from_iter([("name", "Ada")]);
//! let view = ObjectRef::new();
//!
//! let mut binding = PropertyBinding::new(
//!     &locator,
//!     BindingMode::TwoWay,
//!     Value::Object(model.clone()),
//!     "name",
//!     Value::Object(view.clone()),
//!     "text",
//! );
//! binding.bind(LifecycleFlags::empty())?;
//! assert_eq!(view.get("text"), Value::from("Ada"));
//!
//! view.set("text", "Grace")?;
//! assert_eq!(model.get("name"), Value::from("Grace"));
//! ```
//!
//! # Invariants
//!
//! 1. `OneTime`, `ToView` and `TwoWay` copy the source into the target during
//!    `bind`, with [`LifecycleFlags::UPDATE_TARGET`]. `FromView` copies
//!    nothing until the target changes.
//! 2. Writes toward the target carry `UPDATE_TARGET`; writes toward the source
//!    carry `UPDATE_SOURCE`.
//! 3. A two-way binding never re-enters itself: the write it performs in one
//!    direction is not echoed back.
//! 4. After `unbind` (or drop) no write is propagated by this binding.
//! 5. [`BindingScope`] unbinds in reverse registration order.
//!
//! # Failure Modes
//!
//! - Lookup or initial transfer fails: `bind` returns the error and the
//!   binding stays unbound.
//! - A propagated write is rejected: logged with `tracing::warn!`, the other
//!   side keeps its previous value and the binding stays active.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::{trace, warn};

use crate::error::ObservationError;
use crate::flags::LifecycleFlags;
use crate::observation::{AccessorOrObserver, ObserverLocator, Subscription};
use crate::value::Value;

/// Direction(s) in which a [`PropertyBinding`] propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BindingMode {
    /// Copy the source into the target once, at bind time.
    OneTime,
    /// Keep the target in sync with the source.
    #[default]
    ToView,
    /// Keep the source in sync with the target.
    FromView,
    /// Both directions.
    TwoWay,
}

impl BindingMode {
    #[must_use]
    pub const fn updates_target(self) -> bool {
        matches!(self, Self::OneTime | Self::ToView | Self::TwoWay)
    }

    #[must_use]
    pub const fn observes_source(self) -> bool {
        matches!(self, Self::ToView | Self::TwoWay)
    }

    #[must_use]
    pub const fn observes_target(self) -> bool {
        matches!(self, Self::FromView | Self::TwoWay)
    }
}

/// One side of a binding.
#[derive(Clone)]
struct Endpoint {
    value: Value,
    property: Rc<str>,
}

/// Connection between a source property and a target property.
pub struct PropertyBinding {
    locator: ObserverLocator,
    mode: BindingMode,
    source: Endpoint,
    target: Endpoint,
    subscriptions: Vec<Subscription>,
    bound: bool,
}

impl PropertyBinding {
    #[must_use]
    pub fn new(
        locator: &ObserverLocator,
        mode: BindingMode,
        source: Value,
        source_property: &str,
        target: Value,
        target_property: &str,
    ) -> Self {
        Self {
            locator: locator.clone(),
            mode,
            source: Endpoint {
                value: source,
                property: Rc::from(source_property),
            },
            target: Endpoint {
                value: target,
                property: Rc::from(target_property),
            },
            subscriptions: Vec::new(),
            bound: false,
        }
    }

    #[must_use]
    pub fn mode(&self) -> BindingMode {
        self.mode
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Perform the initial transfer and start observing.
    ///
    /// Binding an already bound binding does nothing.
    ///
    /// # Errors
    ///
    /// Any lookup error from the locator, [`ObservationError::NotObservable`]
    /// when an observed side only offers an accessor, or the error of the
    /// initial write.
    pub fn bind(&mut self, flags: LifecycleFlags) -> Result<(), ObservationError> {
        if self.bound {
            return Ok(());
        }
        let flags = flags | LifecycleFlags::FROM_BIND;
        let locator = &self.locator;
        let source = &self.source;
        let target = &self.target;

        let source_observer = locator.get_observer(flags, &source.value, &source.property)?;
        let target_accessor = locator.get_accessor(flags, &target.value, &target.property)?;

        if self.mode.updates_target() {
            target_accessor.set_value(
                source_observer.get_value(),
                flags | LifecycleFlags::UPDATE_TARGET,
            )?;
        }

        let syncing = Rc::new(Cell::new(false));
        let mut subscriptions = Vec::with_capacity(2);

        if self.mode.observes_source() {
            subscriptions.push(source_observer.subscribe_fn(propagate(
                Rc::clone(&syncing),
                target_accessor,
                Rc::clone(&target.property),
                LifecycleFlags::UPDATE_TARGET,
            ))?);
        }

        if self.mode.observes_target() {
            let target_observer = locator.get_observer(flags, &target.value, &target.property)?;
            let source_accessor = locator.get_accessor(flags, &source.value, &source.property)?;
            subscriptions.push(target_observer.subscribe_fn(propagate(
                syncing,
                source_accessor,
                Rc::clone(&source.property),
                LifecycleFlags::UPDATE_SOURCE,
            ))?);
        }

        trace!(
            source = &*source.property,
            target = &*target.property,
            mode = ?self.mode,
            "bound"
        );
        self.subscriptions = subscriptions;
        self.bound = true;
        Ok(())
    }

    /// Release every subscription held by this binding.
    pub fn unbind(&mut self) {
        if !self.bound {
            return;
        }
        self.subscriptions.clear();
        self.bound = false;
        trace!(
            source = &*self.source.property,
            target = &*self.target.property,
            "unbound"
        );
    }
}

/// Subscriber body that copies the new value through `accessor`, unless the
/// binding is already in the middle of a write.
fn propagate(
    syncing: Rc<Cell<bool>>,
    accessor: AccessorOrObserver,
    property: Rc<str>,
    direction: LifecycleFlags,
) -> impl Fn(&Value, &Value, LifecycleFlags) + 'static {
    move |new_value: &Value, _old_value: &Value, flags: LifecycleFlags| {
        let Some(_syncing) = Syncing::enter(&syncing) else {
            return;
        };
        if let Err(err) = accessor.set_value(new_value.clone(), flags | direction) {
            warn!(property = &*property, error = %err, "binding update rejected");
        }
    }
}

/// Marks a binding as mid-write; cleared on drop, including when a setter
/// unwinds.
struct Syncing<'a>(&'a Cell<bool>);

impl<'a> Syncing<'a> {
    fn enter(flag: &'a Cell<bool>) -> Option<Self> {
        if flag.replace(true) {
            return None;
        }
        Some(Self(flag))
    }
}

impl Drop for Syncing<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Drop for PropertyBinding {
    fn drop(&mut self) {
        self.unbind();
    }
}

impl fmt::Debug for PropertyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyBinding")
            .field("mode", &self.mode)
            .field("source", &self.source.property)
            .field("target", &self.target.property)
            .field("bound", &self.bound)
            .finish()
    }
}

/// Owns the bindings and subscriptions of a logical scope (a view, a
/// component instance).
///
/// # Invariants
///
/// 1. Bindings are unbound in reverse registration order on `clear()` and on
///    drop.
/// 2. `clear()` leaves the scope empty and reusable.
pub struct BindingScope {
    bindings: Vec<PropertyBinding>,
    subscriptions: Vec<Subscription>,
}

impl BindingScope {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
            subscriptions: Vec::new(),
        }
    }

    /// Bind `binding` and keep it until the scope is cleared.
    ///
    /// # Errors
    ///
    /// Whatever [`PropertyBinding::bind`] returns; the binding is dropped.
    pub fn bind(
        &mut self,
        mut binding: PropertyBinding,
        flags: LifecycleFlags,
    ) -> Result<&mut Self, ObservationError> {
        binding.bind(flags)?;
        self.bindings.push(binding);
        Ok(self)
    }

    /// Keep a raw subscription alive for the lifetime of the scope.
    pub fn hold(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.subscriptions.is_empty()
    }

    /// Unbind everything now.
    pub fn clear(&mut self) {
        while let Some(mut binding) = self.bindings.pop() {
            binding.unbind();
        }
        while let Some(subscription) = self.subscriptions.pop() {
            drop(subscription);
        }
    }
}

impl Default for BindingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BindingScope {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for BindingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingScope")
            .field("binding_count", &self.bindings.len())
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::ArrayRef;
    use crate::object::{Getter, ObjectRef, Setter};
    use std::cell::RefCell;

    fn pair(mode: BindingMode) -> (ObjectRef, ObjectRef, PropertyBinding) {
        let locator = ObserverLocator::new();
        let model = ObjectRef::from_iter([("name", "Ada")]);
        let view = ObjectRef::from_iter([("text", "")]);
        let binding = PropertyBinding::new(
            &locator,
            mode,
            Value::Object(model.clone()),
            "name",
            Value::Object(view.clone()),
            "text",
        );
        (model, view, binding)
    }

    #[test]
    fn to_view_copies_and_follows_source() {
        let (model, view, mut binding) = pair(BindingMode::ToView);
        binding.bind(LifecycleFlags::empty()).unwrap();
        assert_eq!(view.get("text"), Value::from("Ada"));

        model.set("name", "Grace").unwrap();
        assert_eq!(view.get("text"), Value::from("Grace"));

        view.set("text", "edited").unwrap();
        assert_eq!(model.get("name"), Value::from("Grace"));
    }

    #[test]
    fn one_time_copies_once() {
        let (model, view, mut binding) = pair(BindingMode::OneTime);
        binding.bind(LifecycleFlags::empty()).unwrap();
        assert_eq!(view.get("text"), Value::from("Ada"));

        model.set("name", "Grace").unwrap();
        assert_eq!(view.get("text"), Value::from("Ada"));
    }

    #[test]
    fn from_view_waits_for_target() {
        let (model, view, mut binding) = pair(BindingMode::FromView);
        binding.bind(LifecycleFlags::empty()).unwrap();
        assert_eq!(view.get("text"), Value::from(""));

        view.set("text", "typed").unwrap();
        assert_eq!(model.get("name"), Value::from("typed"));
    }

    #[test]
    fn two_way_without_echo() {
        let (model, view, mut binding) = pair(BindingMode::TwoWay);
        binding.bind(LifecycleFlags::empty()).unwrap();

        let writes = Rc::new(Cell::new(0));
        let w = Rc::clone(&writes);
        let locator = ObserverLocator::new();
        let model_observer = locator
            .get_observer(LifecycleFlags::empty(), &Value::Object(model.clone()), "name")
            .unwrap();
        let _guard = model_observer
            .subscribe_fn(move |_, _, _| w.set(w.get() + 1))
            .unwrap();

        view.set("text", "Grace").unwrap();
        assert_eq!(model.get("name"), Value::from("Grace"));
        assert_eq!(writes.get(), 1);

        model.set("name", "Linus").unwrap();
        assert_eq!(view.get("text"), Value::from("Linus"));
        assert_eq!(writes.get(), 2);
    }

    #[test]
    fn updates_carry_direction_flags() {
        let (model, view, mut binding) = pair(BindingMode::TwoWay);
        let locator = ObserverLocator::new();
        let observe = |obj: &ObjectRef, key: &str| {
            let seen = Rc::new(RefCell::new(Vec::new()));
            let sink = Rc::clone(&seen);
            let guard = locator
                .get_observer(LifecycleFlags::empty(), &Value::from(obj), key)
                .unwrap()
                .subscribe_fn(move |_, _, flags| sink.borrow_mut().push(flags))
                .unwrap();
            (seen, guard)
        };
        let (to_view, _view_guard) = observe(&view, "text");
        let (to_model, _model_guard) = observe(&model, "name");

        binding.bind(LifecycleFlags::empty()).unwrap();
        model.set("name", "Grace").unwrap();
        view.set("text", "Linus").unwrap();

        assert_eq!(
            *to_view.borrow(),
            [
                LifecycleFlags::FROM_BIND | LifecycleFlags::UPDATE_TARGET,
                LifecycleFlags::UPDATE_TARGET,
                LifecycleFlags::empty(),
            ]
        );
        assert_eq!(
            *to_model.borrow(),
            [LifecycleFlags::empty(), LifecycleFlags::UPDATE_SOURCE]
        );
    }

    #[test]
    fn unbind_stops_propagation() {
        let (model, view, mut binding) = pair(BindingMode::TwoWay);
        binding.bind(LifecycleFlags::empty()).unwrap();
        binding.unbind();
        assert!(!binding.is_bound());

        model.set("name", "Grace").unwrap();
        assert_eq!(view.get("text"), Value::from("Ada"));
    }

    #[test]
    fn panicking_setter_does_not_wedge_two_way_binding() {
        let locator = ObserverLocator::new();
        let model = ObjectRef::from_iter([("name", "Ada")]);
        let view = ObjectRef::builder()
            .value("_text", "")
            .accessor(
                "text",
                Getter::new(|this| this.get("_text")),
                Setter::new(|this, value| {
                    assert_ne!(value.to_string(), "boom", "setter refused value");
                    this.set("_text", value)
                }),
            )
            .build();
        let mut binding = PropertyBinding::new(
            &locator,
            BindingMode::TwoWay,
            Value::Object(model.clone()),
            "name",
            Value::Object(view.clone()),
            "text",
        );
        binding.bind(LifecycleFlags::empty()).unwrap();
        assert_eq!(view.get("text"), Value::from("Ada"));

        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            model.set("name", "boom").unwrap();
        }));
        assert!(unwound.is_err());

        model.set("name", "Grace").unwrap();
        assert_eq!(view.get("text"), Value::from("Grace"));
        view.set("text", "Ada").unwrap();
        assert_eq!(model.get("name"), Value::from("Ada"));
    }

    #[test]
    fn rejected_update_keeps_binding_alive() {
        let locator = ObserverLocator::new();
        let model = ObjectRef::from_iter([("name", "Ada")]);
        let view = ObjectRef::new();
        let accepted = Rc::new(RefCell::new(Value::Undefined));
        let store = Rc::clone(&accepted);
        let read = Rc::clone(&accepted);
        view.define_accessor(
            "text",
            Getter::new(move |_| read.borrow().clone()),
            Setter::new(move |_, value| {
                if value.as_str().is_some_and(str::is_empty) {
                    return Err(ObservationError::rejected("empty"));
                }
                *store.borrow_mut() = value;
                Ok(())
            }),
        )
        .unwrap();

        let mut binding = PropertyBinding::new(
            &locator,
            BindingMode::ToView,
            Value::Object(model.clone()),
            "name",
            Value::Object(view),
            "text",
        );
        binding.bind(LifecycleFlags::empty()).unwrap();
        assert_eq!(*accepted.borrow(), Value::from("Ada"));

        model.set("name", "").unwrap();
        assert_eq!(*accepted.borrow(), Value::from("Ada"));
        model.set("name", "Grace").unwrap();
        assert_eq!(*accepted.borrow(), Value::from("Grace"));
    }

    #[test]
    fn failed_initial_transfer_leaves_binding_unbound() {
        let locator = ObserverLocator::new();
        let view = ObjectRef::new();
        view.define_getter("text", Getter::new(|_| Value::Null))
            .unwrap();
        let mut binding = PropertyBinding::new(
            &locator,
            BindingMode::ToView,
            Value::Object(ObjectRef::from_iter([("name", "Ada")])),
            "name",
            Value::Object(view),
            "text",
        );
        let err = binding.bind(LifecycleFlags::empty()).unwrap_err();
        assert!(matches!(err, ObservationError::NoSetter { .. }));
        assert!(!binding.is_bound());
    }

    #[test]
    fn binds_collection_length() {
        let locator = ObserverLocator::new();
        let items = ArrayRef::from_iter([1, 2]);
        let view = ObjectRef::new();
        let mut binding = PropertyBinding::new(
            &locator,
            BindingMode::ToView,
            Value::Array(items.clone()),
            "length",
            Value::Object(view.clone()),
            "count",
        );
        binding.bind(LifecycleFlags::empty()).unwrap();
        assert_eq!(view.get("count"), Value::from(2));

        items.push(3);
        assert_eq!(view.get("count"), Value::from(3));
    }

    #[test]
    fn scope_unbinds_in_reverse_order() {
        let locator = ObserverLocator::new();
        let model = ObjectRef::from_iter([("a", 1), ("b", 2)]);
        let view = ObjectRef::new();
        let mut scope = BindingScope::new();
        for key in ["a", "b"] {
            let binding = PropertyBinding::new(
                &locator,
                BindingMode::ToView,
                Value::Object(model.clone()),
                key,
                Value::Object(view.clone()),
                key,
            );
            scope.bind(binding, LifecycleFlags::empty()).unwrap();
        }
        assert_eq!(scope.binding_count(), 2);

        let source = locator
            .get_observer(LifecycleFlags::empty(), &Value::Object(model.clone()), "a")
            .unwrap();
        assert_eq!(source.subscriber_count(), 1);

        scope.clear();
        assert!(scope.is_empty());
        assert_eq!(source.subscriber_count(), 0);

        model.set("a", 10).unwrap();
        assert_eq!(view.get("a"), Value::from(1));
    }

    #[test]
    fn scope_drop_releases_held_subscriptions() {
        let locator = ObserverLocator::new();
        let model = ObjectRef::from_iter([("a", 1)]);
        let observer = locator
            .get_observer(LifecycleFlags::empty(), &Value::Object(model.clone()), "a")
            .unwrap();
        let count = Rc::new(Cell::new(0));
        {
            let mut scope = BindingScope::new();
            let c = Rc::clone(&count);
            scope.hold(observer.subscribe_fn(move |_, _, _| c.set(c.get() + 1)).unwrap());
            model.set("a", 2).unwrap();
        }
        model.set("a", 3).unwrap();
        assert_eq!(count.get(), 1);
        assert_eq!(observer.subscriber_count(), 0);
    }

    #[test]
    fn scope_debug_format() {
        let scope = BindingScope::new();
        assert!(format!("{scope:?}").contains("binding_count: 0"));
        assert_eq!(BindingMode::default(), BindingMode::ToView);
    }

    #[test]
    #[tracing_test::traced_test]
    fn rejected_update_is_logged() {
        let locator = ObserverLocator::new();
        let model = ObjectRef::from_iter([("name", "Ada")]);
        let view = ObjectRef::new();
        view.define_accessor(
            "text",
            Getter::new(|_| Value::Undefined),
            Setter::new(|_, value| {
                if value == Value::from("Ada") {
                    Ok(())
                } else {
                    Err(ObservationError::rejected("read-only view"))
                }
            }),
        )
        .unwrap();
        let mut binding = PropertyBinding::new(
            &locator,
            BindingMode::ToView,
            Value::from(&model),
            "name",
            Value::from(&view),
            "text",
        );
        binding.bind(LifecycleFlags::empty()).unwrap();

        model.set("name", "Grace").unwrap();
        assert!(logs_contain("binding update rejected"));
        assert!(logs_contain("read-only view"));
    }
}

