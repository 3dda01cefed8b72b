#![forbid(unsafe_code)]

//! Observable arrays, maps and sets.
//!
//! Collections are observed as a whole: one [`CollectionObserver`] per
//! instance receives every mutation as an [`IndexMap`] describing where each
//! element came from. `length` / `size` are observed through a
//! [`CollectionLengthObserver`] layered on top.

mod array;
mod index_map;
mod map;
mod observer;
mod ordered;
mod set;

pub use array::{ArrayRef, MAX_ARRAY_LENGTH, WeakArrayRef};
pub use index_map::{IndexMap, Slot};
pub use map::{MapRef, WeakMapRef};
pub use observer::{
    CollectionKind, CollectionLengthObserver, CollectionObserver, CollectionSubscription,
};
pub use set::{SetRef, WeakSetRef};
