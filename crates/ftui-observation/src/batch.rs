#![forbid(unsafe_code)]

//! Deferred collection notifications.
//!
//! While a [`BatchScope`] is alive, collection mutations keep editing their
//! observer's index map but do not deliver it. Each observer is queued once;
//! when the outermost scope drops, every queued observer delivers one merged
//! map (with [`LifecycleFlags::FROM_FLUSH`](crate::LifecycleFlags::FROM_FLUSH))
//! in the order it was first mutated.
//!
//! Property observers are not deferred.
//!
//! # Invariants
//!
//! 1. Nested scopes are supported; only the outermost one flushes.
//! 2. Mutations made by subscribers during the flush are delivered
//!    immediately, since no scope is active any more.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use tracing::debug;

use crate::collection::CollectionObserver;

#[derive(Default)]
struct BatchState {
    depth: usize,
    queue: Vec<Rc<CollectionObserver>>,
}

thread_local! {
    static BATCH: RefCell<BatchState> = RefCell::new(BatchState::default());
}

/// RAII guard that defers collection notifications until dropped.
#[must_use = "the batch flushes as soon as the scope is dropped"]
pub struct BatchScope {
    _not_send: PhantomData<Rc<()>>,
}

impl BatchScope {
    pub fn new() -> Self {
        BATCH.with(|state| state.borrow_mut().depth += 1);
        Self {
            _not_send: PhantomData,
        }
    }

    /// Number of scopes currently open on this thread.
    #[must_use]
    pub fn depth() -> usize {
        BATCH.with(|state| state.borrow().depth)
    }
}

impl Default for BatchScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        let queued = BATCH.with(|state| {
            let mut state = state.borrow_mut();
            state.depth = state.depth.saturating_sub(1);
            if state.depth == 0 {
                std::mem::take(&mut state.queue)
            } else {
                Vec::new()
            }
        });
        if queued.is_empty() {
            return;
        }
        debug!(observers = queued.len(), "flushing batched collection changes");
        for observer in queued {
            observer.flush_queued();
        }
    }
}

/// Run `f` inside a [`BatchScope`].
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _scope = BatchScope::new();
    f()
}

pub(crate) fn is_batching() -> bool {
    BATCH.with(|state| state.borrow().depth > 0)
}

pub(crate) fn enqueue(observer: Rc<CollectionObserver>) {
    BATCH.with(|state| state.borrow_mut().queue.push(observer));
}
