//! `PrimaryMap` and `SecondaryMap`: the two dense-index map flavors.
//!
//! Grounded on the teacher's `cranelift-entity` map: a `PrimaryMap` owns the
//! sequence and is the only way to mint a fresh key; a `SecondaryMap` attaches
//! auxiliary per-key data (liveness flags, schedule indices, vreg bindings) to
//! keys minted elsewhere and answers with a default value for keys it has never
//! seen written.

use crate::EntityRef;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};
use std::slice;

/// A mapping `K -> V` that also owns the dense index space: `push` is the only
/// way to create a new `K`.
#[derive(Debug, Clone)]
pub struct PrimaryMap<K: EntityRef, V> {
    elems: Vec<V>,
    unused: PhantomData<K>,
}

impl<K: EntityRef, V> PrimaryMap<K, V> {
    /// Create a new empty map.
    pub fn new() -> Self {
        Self { elems: Vec::new(), unused: PhantomData }
    }

    /// Create a new empty map with the given capacity pre-reserved.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { elems: Vec::with_capacity(capacity), unused: PhantomData }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    /// Is this map empty?
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Get the element at `k`, if any.
    pub fn get(&self, k: K) -> Option<&V> {
        self.elems.get(k.index())
    }

    /// Get a mutable reference to the element at `k`, if any.
    pub fn get_mut(&mut self, k: K) -> Option<&mut V> {
        self.elems.get_mut(k.index())
    }

    /// Append `v` to the map, returning the key that was minted for it.
    pub fn push(&mut self, v: V) -> K {
        let k = K::new(self.elems.len());
        self.elems.push(v);
        k
    }

    /// The key that `push` would mint next, without actually pushing anything.
    pub fn next_key(&self) -> K {
        K::new(self.elems.len())
    }

    /// Iterate over keys and values in insertion order.
    pub fn iter(&self) -> Iter<K, V> {
        Iter { iter: self.elems.iter().enumerate(), unused: PhantomData }
    }

    /// Iterate over keys and mutable values in insertion order.
    pub fn iter_mut(&mut self) -> IterMut<K, V> {
        IterMut { iter: self.elems.iter_mut().enumerate(), unused: PhantomData }
    }

    /// Iterate over the keys only.
    pub fn keys(&self) -> crate::keys::Keys<K> {
        crate::keys::Keys::new(self.elems.len())
    }

    /// Iterate over the values only.
    pub fn values(&self) -> slice::Iter<'_, V> {
        self.elems.iter()
    }
}

impl<K: EntityRef, V> Default for PrimaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityRef, V> Index<K> for PrimaryMap<K, V> {
    type Output = V;
    fn index(&self, k: K) -> &V {
        &self.elems[k.index()]
    }
}

impl<K: EntityRef, V> IndexMut<K> for PrimaryMap<K, V> {
    fn index_mut(&mut self, k: K) -> &mut V {
        &mut self.elems[k.index()]
    }
}

/// A mapping `K -> V` over the dense index space minted by some `PrimaryMap`.
///
/// Unlike `PrimaryMap`, a `SecondaryMap` cannot mint new keys; it behaves as if
/// every key has the default value from the start, growing its backing vector
/// lazily on first write past the end.
#[derive(Debug, Clone)]
pub struct SecondaryMap<K: EntityRef, V: Clone> {
    elems: Vec<V>,
    default: V,
    unused: PhantomData<K>,
}

impl<K: EntityRef, V: Clone> SecondaryMap<K, V> {
    /// Create a new empty map using `V::default()` as the implicit value.
    pub fn new() -> Self
    where
        V: Default,
    {
        Self { elems: Vec::new(), default: V::default(), unused: PhantomData }
    }

    /// Create a new empty map with an explicit default, for `V` without `Default`.
    pub fn with_default(default: V) -> Self {
        Self { elems: Vec::new(), default, unused: PhantomData }
    }

    /// Number of elements actually materialized (not necessarily the number of
    /// live keys in the corresponding `PrimaryMap`).
    pub fn len(&self) -> usize {
        self.elems.len()
    }

    /// Is this map empty?
    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Get the element at `k`, materializing the default if needed.
    pub fn get(&self, k: K) -> &V {
        self.elems.get(k.index()).unwrap_or(&self.default)
    }

    /// Get a mutable reference at `k`, growing the backing vector with clones of
    /// the default as necessary.
    pub fn get_mut(&mut self, k: K) -> &mut V {
        let i = k.index();
        if i >= self.elems.len() {
            self.elems.resize(i + 1, self.default.clone());
        }
        &mut self.elems[i]
    }

    /// Remove all entries, reverting every key to the default.
    pub fn clear(&mut self) {
        self.elems.clear();
    }

    /// Iterate over keys and values that have been materialized.
    pub fn iter(&self) -> Iter<K, V> {
        Iter { iter: self.elems.iter().enumerate(), unused: PhantomData }
    }
}

impl<K: EntityRef, V: Clone + Default> Default for SecondaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityRef, V: Clone> Index<K> for SecondaryMap<K, V> {
    type Output = V;
    fn index(&self, k: K) -> &V {
        self.get(k)
    }
}

impl<K: EntityRef, V: Clone> IndexMut<K> for SecondaryMap<K, V> {
    fn index_mut(&mut self, k: K) -> &mut V {
        self.get_mut(k)
    }
}

/// Iterator over `(K, &V)` pairs, yielded in key order.
pub struct Iter<'a, K: EntityRef, V> {
    iter: std::iter::Enumerate<slice::Iter<'a, V>>,
    unused: PhantomData<K>,
}

impl<'a, K: EntityRef, V> Iterator for Iter<'a, K, V> {
    type Item = (K, &'a V);
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|(i, v)| (K::new(i), v))
    }
}

/// Iterator over `(K, &mut V)` pairs, yielded in key order.
pub struct IterMut<'a, K: EntityRef, V> {
    iter: std::iter::Enumerate<slice::IterMut<'a, V>>,
    unused: PhantomData<K>,
}

impl<'a, K: EntityRef, V> Iterator for IterMut<'a, K, V> {
    type Item = (K, &'a mut V);
    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|(i, v)| (K::new(i), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity_impl;

    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct Id(u32);
    entity_impl!(Id, "id");

    #[test]
    fn primary_map_mints_sequential_keys() {
        let mut m: PrimaryMap<Id, &str> = PrimaryMap::new();
        let a = m.push("a");
        let b = m.push("b");
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(m[a], "a");
        assert_eq!(m[b], "b");
    }

    #[test]
    fn secondary_map_defaults_unwritten_keys() {
        let mut primary: PrimaryMap<Id, ()> = PrimaryMap::new();
        let k0 = primary.push(());
        let k5 = Id::new(5);
        let mut sec: SecondaryMap<Id, i32> = SecondaryMap::new();
        assert_eq!(*sec.get(k0), 0);
        *sec.get_mut(k5) = 42;
        assert_eq!(*sec.get(k5), 42);
        assert_eq!(*sec.get(Id::new(2)), 0);
    }
}
