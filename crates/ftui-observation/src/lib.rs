#![forbid(unsafe_code)]

//! Property and collection observation for FrankenTUI bindings.
//!
//! This crate provides:
//! - [`ObserverLocator`] to pick, create and cache the right observer for any
//!   `(value, property)` pair
//! - Property observers: [`SetterObserver`], [`ComputedObserver`],
//!   [`CustomSetterObserver`], [`DirtyCheckProperty`], [`ProxyObserver`],
//!   [`PrimitiveObserver`] and the write-only [`PropertyAccessor`]
//! - [`ArrayRef`], [`MapRef`] and [`SetRef`] whose mutations are reported to a
//!   [`CollectionObserver`] as an [`IndexMap`]
//! - [`BatchScope`] to merge collection notifications
//! - [`PropertyBinding`] and [`BindingScope`] as the consumer of all of the
//!   above
//!
//! # Architecture
//!
//! Observation works on an explicit dynamic object model ([`Value`],
//! [`ObjectRef`]). Hidden per-object state (observer cache, write
//! interceptors, proxy and collection observers) lives on the shared inner
//! record of each object and is created lazily. Everything is single-threaded
//! and built on `Rc`; observers hold their subjects weakly.

pub mod batch;
pub mod binding;
pub mod collection;
pub mod config;
pub mod dependency;
pub mod error;
pub mod flags;
pub mod object;
pub mod observation;
pub mod value;

pub use batch::{BatchScope, batch};
pub use binding::{BindingMode, BindingScope, PropertyBinding};
pub use collection::{
    ArrayRef, CollectionKind, CollectionLengthObserver, CollectionObserver, CollectionSubscription,
    IndexMap, MAX_ARRAY_LENGTH, MapRef, SetRef, Slot, WeakArrayRef, WeakMapRef, WeakSetRef,
};
pub use config::{ComputedOverrides, DEFAULT_TICKS_PER_CHECK, DirtyCheckSettings, ObservationConfig};
pub use dependency::{is_collecting, untracked};
pub use error::ObservationError;
pub use flags::LifecycleFlags;
pub use object::{Getter, ObjectBuilder, ObjectRef, PropertyDescriptor, Setter, WeakObjectRef};
pub use observation::{
    Accessor, AccessorOrObserver, BindingContextObservers, CollectionSubscriber,
    ComputedObserver, CustomSetterObserver, DirtyCheckProperty, DirtyChecker, NoTargetLocator,
    ObjectObservationAdapter, Observer, ObserverKind, ObserverLocator, ObserverRegistry,
    PrimitiveObserver, PropertyAccessor, ProxyObserver, ProxyPropertyObserver, ProxySubscriber,
    SetterObserver, Subscriber, Subscription, TargetAccessorLocator, TargetObserverLocator,
    collection_subscriber, subscriber,
};
pub use value::{Value, WeakValue};
