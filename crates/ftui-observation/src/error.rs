#![forbid(unsafe_code)]

//! Error type for observation and property access.
//!
//! # Failure Modes
//!
//! | Failure | Raised by | Meaning |
//! |---------|-----------|---------|
//! | `NotExtensible` | cache slot / new property | object was sealed with `prevent_extensions` or `freeze` |
//! | `NotConfigurable` | interception, `define_property` | descriptor is locked |
//! | `ReadOnly` | `set` | non-writable data property or `size` |
//! | `NoSetter` | `set`, computed `set_value` | accessor without setter |
//! | `MissingGetter` | locator | accessor defines only a setter |
//! | `DirtyCheckDisallowed` | locator | dirty checking configured to throw |
//! | `Rejected` | user setters | the setter refused the value |
//!
//! None of these are retried; they surface to the immediate caller.

/// Errors produced while locating observers or reading/writing properties.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObservationError {
    /// A hidden slot or new property could not be added to a sealed object.
    #[error("cannot add '{property}' to a non-extensible object")]
    NotExtensible { property: String },
    /// The property descriptor may not be redefined or intercepted.
    #[error("property '{property}' is not configurable")]
    NotConfigurable { property: String },
    /// The property is not writable.
    #[error("property '{property}' is read-only")]
    ReadOnly { property: String },
    /// An accessor property has no setter.
    #[error("property '{property}' has a getter but no setter")]
    NoSetter { property: String },
    /// An accessor property has a setter but nothing to read it with.
    #[error("computed property '{property}' has a setter but no getter")]
    MissingGetter { property: String },
    /// Dirty checking was the only remaining strategy and it is forbidden.
    #[error("dirty checking '{property}' is disallowed by the current settings")]
    DirtyCheckDisallowed { property: String },
    /// Subscription was requested from a write-only accessor.
    #[error("'{property}' is served by an accessor and cannot be observed")]
    NotObservable { property: String },
    /// A write targeted a primitive value.
    #[error("cannot set '{property}' on a {type_name} value")]
    NotAnObject {
        property: String,
        type_name: &'static str,
    },
    /// The built-in collection has no such writable property.
    #[error("{type_name} values do not support property '{property}'")]
    UnsupportedProperty {
        property: String,
        type_name: &'static str,
    },
    /// An array length assignment was not a valid length.
    #[error("invalid array length: {value}")]
    InvalidLength { value: String },
    /// A user-defined setter rejected the value.
    #[error("{reason}")]
    Rejected { reason: String },
}

impl ObservationError {
    /// Convenience constructor for setter implementations.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_property() {
        let err = ObservationError::ReadOnly {
            property: "size".into(),
        };
        assert_eq!(err.to_string(), "property 'size' is read-only");

        let err = ObservationError::NotAnObject {
            property: "x".into(),
            type_name: "number",
        };
        assert_eq!(err.to_string(), "cannot set 'x' on a number value");
    }

    #[test]
    fn rejected_is_transparent() {
        let err = ObservationError::rejected("name must contain a space");
        assert_eq!(err.to_string(), "name must contain a space");
    }
}
