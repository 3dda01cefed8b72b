#![forbid(unsafe_code)]

use std::rc::Rc;

use crate::error::ObservationError;
use crate::flags::LifecycleFlags;
use crate::value::Value;

use super::{Accessor, Observer, Subscriber};

/// Read-only view of a property on a primitive. Never notifies and is never
/// cached.
#[derive(Debug)]
pub struct PrimitiveObserver {
    obj: Value,
    property: Rc<str>,
}

impl PrimitiveObserver {
    #[must_use]
    pub fn new(obj: Value, property: &str) -> Self {
        Self {
            obj,
            property: Rc::from(property),
        }
    }

    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }
}

impl Accessor for PrimitiveObserver {
    fn get_value(&self) -> Value {
        self.obj.get_property(&self.property)
    }

    /// Writes to primitives are dropped.
    fn set_value(&self, _value: Value, _flags: LifecycleFlags) -> Result<(), ObservationError> {
        Ok(())
    }
}

impl Observer for PrimitiveObserver {
    fn subscribe(&self, _subscriber: Rc<dyn Subscriber>) -> bool {
        false
    }

    fn unsubscribe(&self, _subscriber: &Rc<dyn Subscriber>) -> bool {
        false
    }

    fn subscriber_count(&self) -> usize {
        0
    }

    fn do_not_cache(&self) -> bool {
        true
    }
}
