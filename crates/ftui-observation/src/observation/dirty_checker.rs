#![forbid(unsafe_code)]

//! Polling fallback for properties that cannot be intercepted.
//!
//! A [`DirtyCheckProperty`] joins its checker's tracked list when it gains
//! its first subscriber and leaves when it loses the last one. Each pass
//! re-reads every tracked property and notifies the ones whose value moved
//! since the previous pass.
//!
//! # Invariants
//!
//! 1. Changes are never delivered synchronously with the mutation; they wait
//!    for the next pass, driven by [`DirtyChecker::tick`] or
//!    [`DirtyChecker::check`].
//! 2. A property is tracked iff it has at least one subscriber.
//!
//! # Failure Modes
//!
//! - With `throw` set, [`DirtyChecker::create_property`] refuses with
//!   [`ObservationError::DirtyCheckDisallowed`].
//! - With `disabled` set, `tick` does nothing and tracked properties go
//!   quiet until [`DirtyChecker::check`] is called explicitly.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use crate::config::DirtyCheckSettings;
use crate::dependency;
use crate::error::ObservationError;
use crate::flags::LifecycleFlags;
use crate::value::{Value, WeakValue};

use super::subscribers::SubscriberList;
use super::{Accessor, Observer, Subscriber};

/// Registry of polled properties.
pub struct DirtyChecker {
    settings: Cell<DirtyCheckSettings>,
    tracked: RefCell<Vec<Weak<DirtyCheckProperty>>>,
    elapsed: Cell<u32>,
    self_ref: Weak<DirtyChecker>,
}

impl DirtyChecker {
    #[must_use]
    pub fn new(settings: DirtyCheckSettings) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            settings: Cell::new(settings),
            tracked: RefCell::new(Vec::new()),
            elapsed: Cell::new(0),
            self_ref: self_ref.clone(),
        })
    }

    #[must_use]
    pub fn settings(&self) -> DirtyCheckSettings {
        self.settings.get()
    }

    /// Replace the settings. Already-created properties keep polling.
    pub fn set_settings(&self, settings: DirtyCheckSettings) {
        self.settings.set(settings);
    }

    /// Create a polled observer for `property` on `obj`.
    ///
    /// # Errors
    ///
    /// [`ObservationError::DirtyCheckDisallowed`] when the settings forbid
    /// dirty checking, [`ObservationError::NotAnObject`] for primitive
    /// receivers.
    pub fn create_property(
        &self,
        obj: &Value,
        property: &str,
    ) -> Result<Rc<DirtyCheckProperty>, ObservationError> {
        let settings = self.settings.get();
        if settings.throw {
            return Err(ObservationError::DirtyCheckDisallowed {
                property: property.to_owned(),
            });
        }
        let Some(target) = obj.downgrade() else {
            return Err(ObservationError::NotAnObject {
                property: property.to_owned(),
                type_name: obj.type_name(),
            });
        };
        if settings.warn {
            warn!(
                property,
                receiver = obj.type_name(),
                "property cannot be observed without dirty checking"
            );
        }
        Ok(Rc::new_cyclic(|self_ref| DirtyCheckProperty {
            checker: self.self_ref.clone(),
            obj: target,
            property: Rc::from(property),
            old_value: RefCell::new(Value::Undefined),
            subscribers: SubscriberList::default(),
            self_ref: self_ref.clone(),
        }))
    }

    /// Advance one external tick; runs a pass every `ticks_per_check` ticks.
    pub fn tick(&self) {
        let settings = self.settings.get();
        if settings.disabled {
            return;
        }
        let elapsed = self.elapsed.get() + 1;
        if elapsed >= settings.effective_ticks() {
            self.elapsed.set(0);
            self.check();
        } else {
            self.elapsed.set(elapsed);
        }
    }

    /// Run a pass now, regardless of ticks and the `disabled` setting.
    pub fn check(&self) {
        let live: Vec<Rc<DirtyCheckProperty>> = {
            let mut tracked = self.tracked.borrow_mut();
            tracked.retain(|property| property.strong_count() > 0);
            tracked.iter().filter_map(Weak::upgrade).collect()
        };
        if !live.is_empty() {
            debug!(tracked = live.len(), "dirty-check pass");
        }
        for property in live {
            if property.is_dirty() {
                property.flush(LifecycleFlags::FROM_DIRTY_CHECK);
            }
        }
    }

    /// Number of properties currently polled.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.tracked
            .borrow()
            .iter()
            .filter(|property| property.strong_count() > 0)
            .count()
    }

    fn add_property(&self, property: Weak<DirtyCheckProperty>) {
        self.tracked.borrow_mut().push(property);
    }

    fn remove_property(&self, property: &Weak<DirtyCheckProperty>) {
        self.tracked
            .borrow_mut()
            .retain(|tracked| !tracked.ptr_eq(property));
    }
}

impl fmt::Debug for DirtyChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirtyChecker")
            .field("settings", &self.settings.get())
            .field("tracked", &self.tracked_count())
            .finish()
    }
}

/// A property observed by polling.
pub struct DirtyCheckProperty {
    checker: Weak<DirtyChecker>,
    obj: WeakValue,
    property: Rc<str>,
    old_value: RefCell<Value>,
    subscribers: SubscriberList<dyn Subscriber>,
    self_ref: Weak<DirtyCheckProperty>,
}

impl DirtyCheckProperty {
    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Whether the live value differs from the last delivered one.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        *self.old_value.borrow() != self.get_value()
    }

    fn flush(&self, flags: LifecycleFlags) {
        let new_value = self.get_value();
        let old_value = self.old_value.replace(new_value.clone());
        if old_value != new_value {
            self.subscribers
                .for_each(|subscriber| subscriber.handle_change(&new_value, &old_value, flags));
        }
    }
}

impl Accessor for DirtyCheckProperty {
    fn get_value(&self) -> Value {
        match self.obj.upgrade() {
            Some(obj) => dependency::untracked(|| obj.get_property(&self.property)),
            None => Value::Undefined,
        }
    }

    fn set_value(&self, value: Value, flags: LifecycleFlags) -> Result<(), ObservationError> {
        match self.obj.upgrade() {
            Some(obj) => obj.set_property(&self.property, value, flags),
            None => Ok(()),
        }
    }
}

impl Observer for DirtyCheckProperty {
    fn subscribe(&self, subscriber: Rc<dyn Subscriber>) -> bool {
        let first = self.subscribers.is_empty();
        let added = self.subscribers.add(subscriber);
        if added && first {
            self.old_value.replace(self.get_value());
            if let Some(checker) = self.checker.upgrade() {
                checker.add_property(self.self_ref.clone());
            }
        }
        added
    }

    fn unsubscribe(&self, subscriber: &Rc<dyn Subscriber>) -> bool {
        let removed = self.subscribers.remove(subscriber);
        if removed && self.subscribers.is_empty() {
            if let Some(checker) = self.checker.upgrade() {
                checker.remove_property(&self.self_ref);
            }
        }
        removed
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl fmt::Debug for DirtyCheckProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirtyCheckProperty")
            .field("property", &self.property)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
