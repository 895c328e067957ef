use super::index_trait::IndexRef;
use std::{marker::PhantomData, ops};

/// A vector-backed arena addressed by a typed index `K`.
///
/// Entries are never removed, so an index handed out by [`IndexedMap::push`]
/// stays valid for the lifetime of the map.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct IndexedMap<K: IndexRef, D> {
    data: Vec<D>,
    #[cfg_attr(feature = "serialize", serde(skip))]
    key: PhantomData<K>,
}

impl<K: IndexRef, D> ops::Index<K> for IndexedMap<K, D> {
    type Output = D;

    fn index(&self, index: K) -> &D {
        &self.data[index.index()]
    }
}

impl<K: IndexRef, D> ops::IndexMut<K> for IndexedMap<K, D> {
    fn index_mut(&mut self, index: K) -> &mut D {
        &mut self.data[index.index()]
    }
}

impl<K: IndexRef, D> IndexedMap<K, D> {
    pub fn new() -> Self {
        Self {
            data: vec![],
            key: PhantomData,
        }
    }

    /// Store `item` and return its index.
    pub fn push(&mut self, item: D) -> K {
        let key = K::new(self.data.len());
        self.data.push(item);
        key
    }

    pub fn get(&self, index: K) -> Option<&D> {
        self.data.get(index.index())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Entries with their indices, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &D)> {
        self.data.iter().enumerate().map(|(i, d)| (K::new(i), d))
    }
}

impl<K: IndexRef, D> Default for IndexedMap<K, D> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::{IndexRef, IndexedMap, impl_index};
    use proptest::prelude::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct NodeIdx(u32);
    impl_index!(NodeIdx);

    #[test]
    fn push_returns_stable_keys() {
        let mut map = IndexedMap::<NodeIdx, &str>::new();
        let first = map.push("a");
        let second = map.push("b");
        map[first] = "c";
        assert_eq!(map[first], "c");
        assert_eq!(map[second], "b");
        assert!(map.get(NodeIdx(2)).is_none());
        assert_eq!(map.iter().map(|(k, _)| k).collect::<Vec<_>>(), vec![first, second]);
        assert_eq!(second.to_string(), "1");
    }

    proptest! {
        #[test]
        fn keys_index_their_values(count in 0usize..512) {
            let mut map = IndexedMap::<NodeIdx, usize>::new();
            for i in 0..count {
                map.push(i);
            }
            prop_assert_eq!(map.len(), count);
            for (k, v) in map.iter() {
                prop_assert_eq!(k.index(), *v);
            }
        }
    }
}
