#![forbid(unsafe_code)]

//! Dependency collection for computed getters.
//!
//! While a getter runs inside [`collect`], every tracked read
//! ([`ObjectRef::get`](crate::ObjectRef::get), collection length and element
//! reads) is recorded once in the innermost frame. Frames nest, so a computed
//! property evaluated while another one is collecting records into its own
//! frame only.

use std::cell::RefCell;
use std::rc::Rc;

use crate::object::ObjectRef;
use crate::value::Value;

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Reads recorded during one evaluation, in first-read order.
#[derive(Debug, Default)]
pub(crate) struct Collected {
    pub(crate) properties: Vec<(ObjectRef, Rc<str>)>,
    pub(crate) collections: Vec<Value>,
}

impl Collected {
    pub(crate) fn is_empty(&self) -> bool {
        self.properties.is_empty() && self.collections.is_empty()
    }
}

struct Frame {
    tracking: bool,
    collected: Collected,
}

/// Pops its frame even if the evaluation unwinds.
struct FrameGuard {
    popped: bool,
}

impl FrameGuard {
    fn push(tracking: bool) -> Self {
        FRAMES.with(|frames| {
            frames.borrow_mut().push(Frame {
                tracking,
                collected: Collected::default(),
            });
        });
        Self { popped: false }
    }

    fn finish(mut self) -> Collected {
        self.popped = true;
        FRAMES
            .with(|frames| frames.borrow_mut().pop())
            .map(|frame| frame.collected)
            .unwrap_or_default()
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if !self.popped {
            FRAMES.with(|frames| {
                frames.borrow_mut().pop();
            });
        }
    }
}

fn with_active_frame(f: impl FnOnce(&mut Collected)) {
    FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        if let Some(frame) = frames.last_mut() {
            if frame.tracking {
                f(&mut frame.collected);
            }
        }
    });
}

pub(crate) fn record_property(target: &ObjectRef, key: &str) {
    with_active_frame(|collected| {
        let seen = collected
            .properties
            .iter()
            .any(|(obj, k)| obj.ptr_eq(target) && &**k == key);
        if !seen {
            collected.properties.push((target.clone(), Rc::from(key)));
        }
    });
}

pub(crate) fn record_collection(collection: Value) {
    with_active_frame(|collected| {
        let id = collection.identity();
        if !collected.collections.iter().any(|c| c.identity() == id) {
            collected.collections.push(collection);
        }
    });
}

/// Whether a tracking frame is currently open.
#[must_use]
pub fn is_collecting() -> bool {
    FRAMES.with(|frames| frames.borrow().last().is_some_and(|frame| frame.tracking))
}

/// Run `f`, returning its result and every tracked read it made.
pub(crate) fn collect<R>(f: impl FnOnce() -> R) -> (R, Collected) {
    let guard = FrameGuard::push(true);
    let result = f();
    (result, guard.finish())
}

/// Run `f` without recording any of its reads into an enclosing collection.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let guard = FrameGuard::push(false);
    let result = f();
    drop(guard.finish());
    result
}
