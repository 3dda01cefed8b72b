#![forbid(unsafe_code)]

use std::rc::Rc;

use crate::error::ObservationError;
use crate::flags::LifecycleFlags;
use crate::value::Value;

use super::Accessor;

/// Direct get/set with no change notification.
///
/// Handed out for one-way-to-view targets where nothing needs to observe the
/// property.
#[derive(Debug)]
pub struct PropertyAccessor {
    obj: Value,
    property: Rc<str>,
}

impl PropertyAccessor {
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

    #[must_use]
    pub fn object(&self) -> &Value {
        &self.obj
    }
}

impl Accessor for PropertyAccessor {
    fn get_value(&self) -> Value {
        self.obj.get_property(&self.property)
    }

    fn set_value(&self, value: Value, flags: LifecycleFlags) -> Result<(), ObservationError> {
        self.obj.set_property(&self.property, value, flags)
    }
}
