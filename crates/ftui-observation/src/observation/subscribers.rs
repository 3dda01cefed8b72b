#![forbid(unsafe_code)]

//! Ordered subscriber lists shared by every observer.
//!
//! # Invariants
//!
//! 1. Subscribers are delivered in subscription order.
//! 2. A subscriber appears at most once (identity comparison).
//! 3. Delivery iterates a snapshot, so a subscriber added mid-round waits for
//!    the next round, and a subscriber removed mid-round is skipped if it has
//!    not been reached yet.
//! 4. No internal borrow is held while a subscriber runs; subscribers may
//!    subscribe, unsubscribe or mutate observed state re-entrantly.

use std::cell::RefCell;
use std::rc::Rc;

pub(crate) struct SubscriberList<S: ?Sized> {
    entries: RefCell<Vec<Rc<S>>>,
}

impl<S: ?Sized> Default for SubscriberList<S> {
    fn default() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }
}

fn same<S: ?Sized>(a: &Rc<S>, b: &Rc<S>) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}

impl<S: ?Sized> SubscriberList<S> {
    /// Append `subscriber`. Returns `false` if it was already present.
    pub(crate) fn add(&self, subscriber: Rc<S>) -> bool {
        let mut entries = self.entries.borrow_mut();
        if entries.iter().any(|existing| same(existing, &subscriber)) {
            return false;
        }
        entries.push(subscriber);
        true
    }

    /// Remove `subscriber`. Returns `false` if it was not present.
    pub(crate) fn remove(&self, subscriber: &Rc<S>) -> bool {
        let mut entries = self.entries.borrow_mut();
        match entries.iter().position(|existing| same(existing, subscriber)) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn contains(&self, subscriber: &Rc<S>) -> bool {
        self.entries
            .borrow()
            .iter()
            .any(|existing| same(existing, subscriber))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Call `deliver` for every subscriber still present when reached.
    pub(crate) fn for_each(&self, mut deliver: impl FnMut(&S)) {
        let snapshot: Vec<Rc<S>> = self.entries.borrow().clone();
        for subscriber in &snapshot {
            if self.contains(subscriber) {
                deliver(subscriber);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    trait Probe {
        fn hit(&self);
    }

    struct Counter(Cell<u32>);

    impl Probe for Counter {
        fn hit(&self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn add_is_idempotent_by_identity() {
        let list: SubscriberList<dyn Probe> = SubscriberList::default();
        let a: Rc<dyn Probe> = Rc::new(Counter(Cell::new(0)));
        let b: Rc<dyn Probe> = Rc::new(Counter(Cell::new(0)));
        assert!(list.add(Rc::clone(&a)));
        assert!(!list.add(Rc::clone(&a)));
        assert!(list.add(Rc::clone(&b)));
        assert_eq!(list.len(), 2);
        assert!(list.remove(&a));
        assert!(!list.remove(&a));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn delivery_in_subscription_order() {
        let list: SubscriberList<dyn Fn() -> u32> = SubscriberList::default();
        list.add(Rc::new(|| 1));
        list.add(Rc::new(|| 2));
        list.add(Rc::new(|| 3));
        let mut seen = Vec::new();
        list.for_each(|s| seen.push(s()));
        assert_eq!(seen, [1, 2, 3]);
    }

    #[test]
    fn removed_mid_round_is_skipped() {
        let list: Rc<SubscriberList<dyn Probe>> = Rc::new(SubscriberList::default());
        let late = Rc::new(Counter(Cell::new(0)));
        let late_dyn: Rc<dyn Probe> = late.clone();

        struct Remover {
            list: Rc<SubscriberList<dyn Probe>>,
            target: Rc<dyn Probe>,
        }
        impl Probe for Remover {
            fn hit(&self) {
                self.list.remove(&self.target);
            }
        }

        list.add(Rc::new(Remover {
            list: Rc::clone(&list),
            target: Rc::clone(&late_dyn),
        }));
        list.add(late_dyn);
        list.for_each(|s| s.hit());
        assert_eq!(late.0.get(), 0);
        assert_eq!(list.len(), 1);
    }
}
