#![forbid(unsafe_code)]

//! Dynamic values flowing through observers and bindings.
//!
//! # Invariants
//!
//! 1. Reference variants (`Object`, `Array`, `Map`, `Set`) compare and hash by
//!    identity, never by content.
//! 2. Numbers compare by SameValueZero: `NaN == NaN` and `0.0 == -0.0`. A
//!    property holding `NaN` therefore does not notify when `NaN` is written
//!    again.
//! 3. `Eq` and `Hash` agree, so `Value` can key maps and sets.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::collection::{ArrayRef, MapRef, SetRef, WeakArrayRef, WeakMapRef, WeakSetRef};
use crate::error::ObservationError;
use crate::flags::LifecycleFlags;
use crate::object::{ObjectRef, WeakObjectRef};

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectRef),
    Array(ArrayRef),
    Map(MapRef),
    Set(SetRef),
}

impl Value {
    /// Type name used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
            Self::Set(_) => "set",
        }
    }

    /// Whether the value is a reference type that can carry observers.
    #[must_use]
    pub fn is_object(&self) -> bool {
        matches!(
            self,
            Self::Object(_) | Self::Array(_) | Self::Map(_) | Self::Set(_)
        )
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&MapRef> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_set(&self) -> Option<&SetRef> {
        match self {
            Self::Set(s) => Some(s),
            _ => None,
        }
    }

    /// Identity address of a reference value.
    #[must_use]
    pub fn identity(&self) -> Option<*const ()> {
        match self {
            Self::Object(o) => Some(o.identity()),
            Self::Array(a) => Some(a.identity()),
            Self::Map(m) => Some(m.identity()),
            Self::Set(s) => Some(s.identity()),
            _ => None,
        }
    }

    /// Non-owning handle to a reference value.
    #[must_use]
    pub fn downgrade(&self) -> Option<WeakValue> {
        match self {
            Self::Object(o) => Some(WeakValue::Object(o.downgrade())),
            Self::Array(a) => Some(WeakValue::Array(a.downgrade())),
            Self::Map(m) => Some(WeakValue::Map(m.downgrade())),
            Self::Set(s) => Some(WeakValue::Set(s.downgrade())),
            _ => None,
        }
    }

    /// Read `key` from any value.
    ///
    /// Objects resolve through their descriptors, arrays expose `length` and
    /// canonical indices, maps and sets expose `size`, strings expose
    /// `length`. Everything else reads as `undefined`.
    #[must_use]
    pub fn get_property(&self, key: &str) -> Value {
        match self {
            Self::Object(o) => o.get(key),
            Self::Array(a) => {
                if key == "length" {
                    Value::from(a.len())
                } else if let Some(index) = array_index(key) {
                    a.get(index)
                } else {
                    Value::Undefined
                }
            }
            Self::Map(m) if key == "size" => Value::from(m.len()),
            Self::Set(s) if key == "size" => Value::from(s.len()),
            Self::String(s) if key == "length" => Value::from(s.encode_utf16().count()),
            _ => Value::Undefined,
        }
    }

    /// Write `key` on any value.
    ///
    /// # Errors
    ///
    /// Primitives reject every write with [`ObservationError::NotAnObject`].
    /// Arrays accept `length` and indices only; maps and sets accept nothing.
    /// Object writes follow [`ObjectRef::set_with_flags`].
    pub fn set_property(
        &self,
        key: &str,
        value: Value,
        flags: LifecycleFlags,
    ) -> Result<(), ObservationError> {
        match self {
            Self::Object(o) => o.set_with_flags(key, value, flags),
            Self::Array(a) => {
                if key == "length" {
                    let len = array_length(&value)?;
                    a.set_length_with_flags(len, flags)
                } else if let Some(index) = array_index(key) {
                    a.set_with_flags(index, value, flags)
                } else {
                    Err(ObservationError::UnsupportedProperty {
                        property: key.to_owned(),
                        type_name: self.type_name(),
                    })
                }
            }
            Self::Map(_) | Self::Set(_) if key == "size" => Err(ObservationError::ReadOnly {
                property: key.to_owned(),
            }),
            Self::Map(_) | Self::Set(_) => Err(ObservationError::UnsupportedProperty {
                property: key.to_owned(),
                type_name: self.type_name(),
            }),
            _ => Err(ObservationError::NotAnObject {
                property: key.to_owned(),
                type_name: self.type_name(),
            }),
        }
    }
}

/// Canonical array index: decimal digits without leading zeros, below
/// `u32::MAX`. Larger digit strings are ordinary property names.
pub(crate) fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    if !key.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index: u32 = key.parse().ok()?;
    if index == u32::MAX {
        return None;
    }
    usize::try_from(index).ok()
}

fn array_length(value: &Value) -> Result<usize, ObservationError> {
    match value {
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= f64::from(u32::MAX) => {
            Ok(*n as usize)
        }
        other => Err(ObservationError::InvalidLength {
            value: other.to_string(),
        }),
    }
}

/// Ordering used by [`ArrayRef::sort`]: `undefined` last, everything else by
/// string form.
pub(crate) fn default_compare(a: &Value, b: &Value) -> Ordering {
    match (a.is_undefined(), b.is_undefined()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.to_string().cmp(&b.to_string()),
    }
}

fn format_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_nan() {
        f.write_str("NaN")
    } else if n.is_infinite() {
        f.write_str(if n > 0.0 { "Infinity" } else { "-Infinity" })
    } else if n == 0.0 {
        f.write_str("0")
    } else {
        write!(f, "{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => format_number(*n, f),
            Self::String(s) => f.write_str(s),
            Self::Object(_) => f.write_str("[object Object]"),
            Self::Array(a) => {
                for (i, item) in a.to_vec_untracked().iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    if !matches!(item, Value::Undefined | Value::Null) {
                        write!(f, "{item}")?;
                    }
                }
                Ok(())
            }
            Self::Map(_) => f.write_str("[object Map]"),
            Self::Set(_) => f.write_str("[object Set]"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Number(n) => write!(f, "Number({n})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Object(o) => fmt::Debug::fmt(o, f),
            Self::Array(a) => fmt::Debug::fmt(a, f),
            Self::Map(m) => fmt::Debug::fmt(m, f),
            Self::Set(s) => fmt::Debug::fmt(s, f),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Array(a), Self::Array(b)) => a.ptr_eq(b),
            (Self::Map(a), Self::Map(b)) => a.ptr_eq(b),
            (Self::Set(a), Self::Set(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Undefined | Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Number(n) => {
                let canonical = if n.is_nan() {
                    f64::NAN
                } else if *n == 0.0 {
                    0.0
                } else {
                    *n
                };
                canonical.to_bits().hash(state);
            }
            Self::String(s) => s.hash(state),
            other => other.identity().hash(state),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Self::Number(v as f64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(Rc::from(v))
    }
}

impl From<&Value> for Value {
    fn from(v: &Value) -> Self {
        v.clone()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

macro_rules! impl_reference_from {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Self::$variant(v)
            }
        }

        impl From<&$ty> for Value {
            fn from(v: &$ty) -> Self {
                Self::$variant(v.clone())
            }
        }
    };
}

impl_reference_from!(ObjectRef, Object);
impl_reference_from!(ArrayRef, Array);
impl_reference_from!(MapRef, Map);
impl_reference_from!(SetRef, Set);

/// Non-owning counterpart of a reference [`Value`].
///
/// Observers keep one of these so that observing an object never extends its
/// lifetime.
#[derive(Clone)]
pub enum WeakValue {
    Object(WeakObjectRef),
    Array(WeakArrayRef),
    Map(WeakMapRef),
    Set(WeakSetRef),
}

impl WeakValue {
    /// Recover the value if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Value> {
        match self {
            Self::Object(o) => o.upgrade().map(Value::Object),
            Self::Array(a) => a.upgrade().map(Value::Array),
            Self::Map(m) => m.upgrade().map(Value::Map),
            Self::Set(s) => s.upgrade().map(Value::Set),
        }
    }
}

impl fmt::Debug for WeakValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Object(_) => "Object",
            Self::Array(_) => "Array",
            Self::Map(_) => "Map",
            Self::Set(_) => "Set",
        };
        f.debug_tuple("WeakValue").field(&kind).finish()
    }
}
