#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;

use crate::error::ObservationError;
use crate::flags::LifecycleFlags;
use crate::object::ObjectRef;

use super::{AccessorOrObserver, SetterObserver};

/// Observer store owned by a synthetic object.
///
/// Objects built with a registry bypass the locator's strategy selection
/// entirely: every lookup on them is answered by the registry.
pub trait ObserverRegistry {
    /// # Errors
    ///
    /// Whatever creating the observer fails with.
    fn get_or_create(
        &self,
        flags: LifecycleFlags,
        obj: &ObjectRef,
        property: &str,
    ) -> Result<AccessorOrObserver, ObservationError>;
}

/// Registry used by binding contexts: one [`SetterObserver`] per key.
#[derive(Default)]
pub struct BindingContextObservers {
    observers: RefCell<AHashMap<Rc<str>, Rc<SetterObserver>>>,
}

impl BindingContextObservers {
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.borrow().is_empty()
    }
}

impl ObserverRegistry for BindingContextObservers {
    fn get_or_create(
        &self,
        _flags: LifecycleFlags,
        obj: &ObjectRef,
        property: &str,
    ) -> Result<AccessorOrObserver, ObservationError> {
        if let Some(existing) = self.observers.borrow().get(property) {
            return Ok(AccessorOrObserver::Setter(Rc::clone(existing)));
        }
        let observer = SetterObserver::new(obj, property)?;
        self.observers
            .borrow_mut()
            .insert(Rc::from(property), Rc::clone(&observer));
        Ok(AccessorOrObserver::Setter(observer))
    }
}

impl fmt::Debug for BindingContextObservers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self
            .observers
            .borrow()
            .keys()
            .map(|key| key.to_string())
            .collect();
        keys.sort_unstable();
        f.debug_struct("BindingContextObservers")
            .field("keys", &keys)
            .finish()
    }
}
