#![forbid(unsafe_code)]

//! Observable arrays.
//!
//! Every mutator edits the elements and, when an observer is attached, the
//! observer's pending [`IndexMap`](super::IndexMap) in the same call. No-op
//! mutations (an empty splice, `pop` on an empty array, sorting fewer than
//! two elements, writing an identical value) leave both untouched and notify
//! nobody.

use std::cell::{OnceCell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::dependency;
use crate::error::ObservationError;
use crate::flags::LifecycleFlags;
use crate::observation::ObserverCache;
use crate::value::{Value, WeakValue, default_compare};

use super::{CollectionKind, CollectionObserver, IndexMap};

pub(crate) struct ArrayInner {
    items: RefCell<Vec<Value>>,
    observers: ObserverCache,
    observer: OnceCell<Rc<CollectionObserver>>,
}

/// Shared handle to an observable array. Clones share identity.
#[derive(Clone)]
pub struct ArrayRef {
    inner: Rc<ArrayInner>,
}

/// Non-owning handle to an [`ArrayRef`].
#[derive(Clone)]
pub struct WeakArrayRef {
    inner: Weak<ArrayInner>,
}

impl WeakArrayRef {
    #[must_use]
    pub fn upgrade(&self) -> Option<ArrayRef> {
        self.inner.upgrade().map(|inner| ArrayRef { inner })
    }
}

impl Default for ArrayRef {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a possibly negative splice start against `len`.
fn resolve_start(start: isize, len: usize) -> usize {
    if start < 0 {
        len.saturating_sub(start.unsigned_abs())
    } else {
        start.unsigned_abs().min(len)
    }
}

impl ArrayRef {
    #[must_use]
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    #[must_use]
    pub fn from_vec(items: Vec<Value>) -> Self {
        Self {
            inner: Rc::new(ArrayInner {
                items: RefCell::new(items),
                observers: ObserverCache::default(),
                observer: OnceCell::new(),
            }),
        }
    }

    #[must_use]
    pub fn identity(&self) -> *const () {
        Rc::as_ptr(&self.inner).cast()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakArrayRef {
        WeakArrayRef {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub(crate) fn observer_cache(&self) -> &ObserverCache {
        &self.inner.observers
    }

    /// The array's collection observer, created on first request.
    pub(crate) fn collection_observer(&self) -> Rc<CollectionObserver> {
        Rc::clone(self.inner.observer.get_or_init(|| {
            CollectionObserver::new(
                CollectionKind::Array,
                WeakValue::Array(self.downgrade()),
                self.len_untracked(),
            )
        }))
    }

    fn track(&self) {
        if dependency::is_collecting() {
            dependency::record_collection(Value::Array(self.clone()));
        }
    }

    fn record(&self, flags: LifecycleFlags, edit: impl FnOnce(&mut IndexMap)) {
        if let Some(observer) = self.inner.observer.get().cloned() {
            observer.edit_index_map(edit);
            observer.notify(flags);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.track();
        self.len_untracked()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn len_untracked(&self) -> usize {
        self.inner.items.borrow().len()
    }

    /// Element at `index`, or `undefined` past the end.
    #[must_use]
    pub fn get(&self, index: usize) -> Value {
        self.track();
        self.inner
            .items
            .borrow()
            .get(index)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot of the elements.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.track();
        self.to_vec_untracked()
    }

    pub(crate) fn to_vec_untracked(&self) -> Vec<Value> {
        self.inner.items.borrow().clone()
    }

    /// Append one element. Returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        self.push_all([value])
    }

    /// Append several elements as one mutation. Returns the new length.
    pub fn push_all<I, T>(&self, values: I) -> usize
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        let len = self.len_untracked();
        self.splice(len as isize, Some(0), values);
        self.len_untracked()
    }

    pub fn pop(&self) -> Option<Value> {
        let len = self.len_untracked();
        if len == 0 {
            return None;
        }
        self.splice(len as isize - 1, Some(1), std::iter::empty::<Value>())
            .pop()
    }

    pub fn shift(&self) -> Option<Value> {
        if self.len_untracked() == 0 {
            return None;
        }
        self.splice(0, Some(1), std::iter::empty::<Value>()).pop()
    }

    /// Prepend elements, keeping their order. Returns the new length.
    pub fn unshift<I, T>(&self, values: I) -> usize
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        self.splice(0, Some(0), values);
        self.len_untracked()
    }

    /// Remove `delete_count` elements from `start` (all remaining when
    /// `None`) and insert `items` in their place. A negative `start` counts
    /// from the end. Returns the removed elements.
    pub fn splice<I, T>(&self, start: isize, delete_count: Option<usize>, items: I) -> Vec<Value>
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        let inserted: Vec<Value> = items.into_iter().map(Into::into).collect();
        let insert_count = inserted.len();
        let (start, removed) = {
            let mut vec = self.inner.items.borrow_mut();
            let len = vec.len();
            let start = resolve_start(start, len);
            let delete_count = delete_count.map_or(len - start, |count| count.min(len - start));
            let removed: Vec<Value> = vec.splice(start..start + delete_count, inserted).collect();
            (start, removed)
        };
        if !removed.is_empty() || insert_count > 0 {
            let delete_count = removed.len();
            self.record(LifecycleFlags::empty(), |map| {
                map.splice(start, delete_count, insert_count);
            });
        }
        removed
    }

    pub fn reverse(&self) {
        let len = {
            let mut items = self.inner.items.borrow_mut();
            items.reverse();
            items.len()
        };
        if len > 1 {
            let order: Vec<usize> = (0..len).rev().collect();
            self.record(LifecycleFlags::empty(), |map| map.permute(&order));
        }
    }

    /// Stable sort by string form with `undefined` last.
    pub fn sort(&self) {
        self.sort_by(default_compare);
    }

    /// Stable sort with a caller comparator. The comparator may read the
    /// array; it sees the pre-sort order.
    pub fn sort_by(&self, mut compare: impl FnMut(&Value, &Value) -> Ordering) {
        let snapshot = self.to_vec_untracked();
        if snapshot.len() < 2 {
            return;
        }
        let mut order: Vec<usize> = (0..snapshot.len()).collect();
        order.sort_by(|&a, &b| compare(&snapshot[a], &snapshot[b]));
        if order.iter().enumerate().all(|(position, &from)| position == from) {
            return;
        }
        let sorted: Vec<Value> = order.iter().map(|&from| snapshot[from].clone()).collect();
        *self.inner.items.borrow_mut() = sorted;
        self.record(LifecycleFlags::empty(), |map| map.permute(&order));
    }

    /// Assign `array[index] = value`, growing with `undefined` when past the
    /// end.
    ///
    /// # Errors
    ///
    /// [`ObservationError::InvalidLength`] when the write would grow the
    /// array past [`MAX_ARRAY_LENGTH`].
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<(), ObservationError> {
        self.set_with_flags(index, value.into(), LifecycleFlags::empty())
    }

    /// # Errors
    ///
    /// See [`set`](Self::set).
    pub fn set_with_flags(
        &self,
        index: usize,
        value: Value,
        flags: LifecycleFlags,
    ) -> Result<(), ObservationError> {
        let grown = {
            let mut items = self.inner.items.borrow_mut();
            let len = items.len();
            if index < len {
                if items[index] == value {
                    return Ok(());
                }
                items[index] = value;
                None
            } else {
                check_growth(index.saturating_add(1))?;
                items.resize(index, Value::Undefined);
                items.push(value);
                Some(index + 1 - len)
            }
        };
        self.record(flags, |map| match grown {
            Some(count) => map.push_inserted(count),
            None => map.replace(index),
        });
        Ok(())
    }

    /// Truncate, or grow with `undefined`.
    ///
    /// # Errors
    ///
    /// [`ObservationError::InvalidLength`] when `len` exceeds
    /// [`MAX_ARRAY_LENGTH`].
    pub fn set_length(&self, len: usize) -> Result<(), ObservationError> {
        self.set_length_with_flags(len, LifecycleFlags::empty())
    }

    /// # Errors
    ///
    /// See [`set_length`](Self::set_length).
    pub fn set_length_with_flags(
        &self,
        len: usize,
        flags: LifecycleFlags,
    ) -> Result<(), ObservationError> {
        let old = self.len_untracked();
        if len == old {
            return Ok(());
        }
        check_growth(len)?;
        self.inner
            .items
            .borrow_mut()
            .resize(len, Value::Undefined);
        self.record(flags, |map| {
            if len < old {
                map.splice(len, old - len, 0);
            } else {
                map.push_inserted(len - old);
            }
        });
        Ok(())
    }
}

/// Largest length an array may reach through index or `length` assignment.
/// Writes past it are rejected instead of allocating the gap.
pub const MAX_ARRAY_LENGTH: usize = 1 << 24;

fn check_growth(len: usize) -> Result<(), ObservationError> {
    if len > MAX_ARRAY_LENGTH {
        return Err(ObservationError::InvalidLength {
            value: len.to_string(),
        });
    }
    Ok(())
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.items.try_borrow() {
            Ok(items) => f.debug_tuple("ArrayRef").field(&*items).finish(),
            Err(_) => f.write_str("ArrayRef(<borrowed>)"),
        }
    }
}

impl<T: Into<Value>> FromIterator<T> for ArrayRef {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Slot;
    use std::cell::Cell;

    fn observed(values: &[i32]) -> (ArrayRef, Rc<RefCell<Vec<IndexMap>>>, impl Drop) {
        let arr: ArrayRef = values.iter().copied().collect();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let guard = arr
            .collection_observer()
            .subscribe_fn(move |map, _| sink.borrow_mut().push(map.clone()));
        (arr, seen, guard)
    }

    fn numbers(arr: &ArrayRef) -> Vec<f64> {
        arr.to_vec()
            .iter()
            .map(|v| v.as_number().unwrap_or(f64::NAN))
            .collect()
    }

    #[test]
    fn push_pop_shift_unshift() {
        let arr = ArrayRef::from_iter([2]);
        assert_eq!(arr.push(3), 2);
        assert_eq!(arr.unshift([0, 1]), 4);
        assert_eq!(numbers(&arr), [0.0, 1.0, 2.0, 3.0]);
        assert_eq!(arr.pop(), Some(Value::from(3)));
        assert_eq!(arr.shift(), Some(Value::from(0)));
        assert_eq!(numbers(&arr), [1.0, 2.0]);
        assert_eq!(ArrayRef::new().pop(), None);
    }

    #[test]
    fn splice_negative_start_and_open_count() {
        let arr = ArrayRef::from_iter([1, 2, 3, 4]);
        let removed = arr.splice(-2, None, std::iter::empty::<Value>());
        assert_eq!(removed, [Value::from(3), Value::from(4)]);
        assert_eq!(numbers(&arr), [1.0, 2.0]);

        let removed = arr.splice(10, Some(3), [9]);
        assert!(removed.is_empty());
        assert_eq!(numbers(&arr), [1.0, 2.0, 9.0]);
    }

    #[test]
    fn splice_records_deleted_and_inserted() {
        let (arr, seen, _guard) = observed(&[1, 2, 3, 4, 5]);
        arr.splice(1, Some(2), ["a", "b"]);
        let seen = seen.borrow();
        assert_eq!(
            seen[0].slots(),
            [
                Slot::Existing(0),
                Slot::Inserted,
                Slot::Inserted,
                Slot::Existing(3),
                Slot::Existing(4),
            ]
        );
        assert_eq!(seen[0].deleted(), [1, 2]);
    }

    #[test]
    fn noop_mutations_do_not_notify() {
        let (arr, seen, _guard) = observed(&[1]);
        arr.splice(0, Some(0), std::iter::empty::<Value>());
        arr.sort();
        arr.reverse();
        arr.set(0, 1).unwrap();
        arr.set_length(1).unwrap();
        assert!(seen.borrow().is_empty());
        assert_eq!(ArrayRef::new().shift(), None);
    }

    #[test]
    fn reverse_and_sort_permute() {
        let (arr, seen, _guard) = observed(&[10, 9, 1]);
        arr.sort();
        assert_eq!(numbers(&arr), [1.0, 10.0, 9.0]);
        arr.sort_by(|a, b| {
            a.as_number()
                .unwrap_or_default()
                .total_cmp(&b.as_number().unwrap_or_default())
        });
        assert_eq!(numbers(&arr), [1.0, 9.0, 10.0]);
        arr.reverse();
        assert_eq!(numbers(&arr), [10.0, 9.0, 1.0]);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        assert_eq!(
            seen[0].slots(),
            [Slot::Existing(2), Slot::Existing(0), Slot::Existing(1)]
        );
        assert!(seen.iter().all(|map| map.deleted().is_empty()));
    }

    #[test]
    fn sort_comparator_may_read_the_array() {
        let arr = ArrayRef::from_iter([3, 1, 2]);
        let reader = arr.clone();
        let reads = Cell::new(0);
        arr.sort_by(|a, b| {
            reads.set(reads.get() + reader.len());
            a.as_number()
                .unwrap_or_default()
                .total_cmp(&b.as_number().unwrap_or_default())
        });
        assert!(reads.get() > 0);
        assert_eq!(numbers(&arr), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn index_assignment_replaces_or_grows() {
        let (arr, seen, _guard) = observed(&[1, 2]);
        arr.set(1, 5).unwrap();
        arr.set(3, 7).unwrap();
        assert_eq!(
            arr.to_vec(),
            [Value::from(1), Value::from(5), Value::Undefined, Value::from(7)]
        );
        let seen = seen.borrow();
        assert_eq!(seen[0].slots(), [Slot::Existing(0), Slot::Inserted]);
        assert_eq!(seen[0].deleted(), [1]);
        assert_eq!(seen[1].inserted().collect::<Vec<_>>(), [2, 3]);
    }

    #[test]
    fn sorting_a_sorted_array_is_silent() {
        let (arr, seen, _guard) = observed(&[1, 2, 3]);
        arr.sort();
        arr.sort_by(|a, b| {
            a.as_number()
                .unwrap_or_default()
                .total_cmp(&b.as_number().unwrap_or_default())
        });
        assert!(seen.borrow().is_empty());
        assert_eq!(numbers(&arr), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn growth_past_the_limit_is_rejected() {
        let (arr, seen, _guard) = observed(&[1]);
        let err = arr.set(MAX_ARRAY_LENGTH, 2).unwrap_err();
        assert!(matches!(err, ObservationError::InvalidLength { .. }));
        let err = arr.set(usize::MAX, 2).unwrap_err();
        assert!(matches!(err, ObservationError::InvalidLength { .. }));
        let err = arr.set_length(MAX_ARRAY_LENGTH + 1).unwrap_err();
        assert!(matches!(err, ObservationError::InvalidLength { .. }));
        assert_eq!(numbers(&arr), [1.0]);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn set_length_truncates_and_grows() {
        let (arr, seen, _guard) = observed(&[1, 2, 3]);
        arr.set_length(1).unwrap();
        arr.set_length(2).unwrap();
        assert_eq!(arr.to_vec(), [Value::from(1), Value::Undefined]);
        let seen = seen.borrow();
        assert_eq!(seen[0].deleted(), [1, 2]);
        assert_eq!(seen[1].slots(), [Slot::Existing(0), Slot::Inserted]);
    }

    #[test]
    fn reads_are_tracked() {
        let arr = ArrayRef::from_iter([1]);
        let (_, collected) = dependency::collect(|| arr.len());
        assert_eq!(collected.collections.len(), 1);
        let (_, collected) = dependency::collect(|| arr.to_vec_untracked());
        assert!(collected.is_empty());
    }
}
