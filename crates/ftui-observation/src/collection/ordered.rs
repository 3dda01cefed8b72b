#![forbid(unsafe_code)]

//! Insertion-ordered keyed storage shared by maps and sets.

use ahash::AHashMap;

use crate::value::Value;

/// Keys in insertion order, a parallel value column, and a position index.
pub(crate) struct OrderedStore<V> {
    keys: Vec<Value>,
    values: Vec<V>,
    positions: AHashMap<Value, usize>,
}

impl<V> Default for OrderedStore<V> {
    fn default() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            positions: AHashMap::new(),
        }
    }
}

impl<V> OrderedStore<V> {
    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn position(&self, key: &Value) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub(crate) fn get(&self, key: &Value) -> Option<&V> {
        self.position(key).map(|position| &self.values[position])
    }

    pub(crate) fn value_at_mut(&mut self, position: usize) -> &mut V {
        &mut self.values[position]
    }

    pub(crate) fn keys(&self) -> &[Value] {
        &self.keys
    }

    pub(crate) fn values(&self) -> &[V] {
        &self.values
    }

    /// Append a key known to be absent. Returns its position.
    pub(crate) fn push(&mut self, key: Value, value: V) -> usize {
        let position = self.keys.len();
        self.positions.insert(key.clone(), position);
        self.keys.push(key);
        self.values.push(value);
        position
    }

    pub(crate) fn remove(&mut self, position: usize) -> (Value, V) {
        let key = self.keys.remove(position);
        let value = self.values.remove(position);
        self.positions.remove(&key);
        for slot in self.positions.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        (key, value)
    }

    /// Empty the store, returning the keys it held.
    pub(crate) fn clear(&mut self) -> Vec<Value> {
        self.positions.clear();
        self.values.clear();
        std::mem::take(&mut self.keys)
    }
}
