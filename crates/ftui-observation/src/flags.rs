#![forbid(unsafe_code)]

//! Lifecycle flags threaded through observer lookups and notifications.

use bitflags::bitflags;

bitflags! {
    /// Bitmask supplied by the lifecycle layer.
    ///
    /// Only [`PROXY_STRATEGY`](Self::PROXY_STRATEGY) changes how the
    /// [`ObserverLocator`](crate::ObserverLocator) picks a strategy; the
    /// remaining bits describe where an update came from and are forwarded
    /// untouched to subscribers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LifecycleFlags: u32 {
        /// Observe whole objects through a [`ProxyObserver`](crate::ProxyObserver).
        const PROXY_STRATEGY   = 1 << 0;
        /// The request originates from a bind pass.
        const FROM_BIND        = 1 << 1;
        /// The request originates from an unbind pass.
        const FROM_UNBIND      = 1 << 2;
        /// A binding is writing model state into the view.
        const UPDATE_TARGET    = 1 << 3;
        /// A binding is writing view state back into the model.
        const UPDATE_SOURCE    = 1 << 4;
        /// Delivered while flushing a [`BatchScope`](crate::BatchScope).
        const FROM_FLUSH       = 1 << 5;
        /// Delivered by a [`DirtyChecker`](crate::DirtyChecker) pass.
        const FROM_DIRTY_CHECK = 1 << 6;
    }
}

impl LifecycleFlags {
    /// Whether whole-object proxy observation was requested.
    #[inline]
    #[must_use]
    pub const fn uses_proxy_strategy(self) -> bool {
        self.contains(Self::PROXY_STRATEGY)
    }
}
