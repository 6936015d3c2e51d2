//! Key-only [`ChainedMap`].

use std::fmt;

use super::{ChainedMap, Iter as MapIter};
use crate::config::ChainConfig;
use crate::error::Result;
use crate::kernel::ChainKey;
use crate::pool::{Heap, MemoryPool};

/// Set over a numeric key domain larger than one [`TinySet`](crate::TinySet)
/// can address.
pub struct ChainedSet<K, P: MemoryPool = Heap> {
    map: ChainedMap<K, (), P>,
}

impl<K> ChainedSet<K, Heap> {
    pub fn new() -> Self {
        Self {
            map: ChainedMap::new(),
        }
    }

    pub fn with_config(config: ChainConfig) -> Self {
        Self {
            map: ChainedMap::with_config(config),
        }
    }

    pub fn with_capacity(elements: u16) -> Self {
        Self {
            map: ChainedMap::with_capacity(elements),
        }
    }
}

impl<K> Default for ChainedSet<K, Heap> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P: MemoryPool> ChainedSet<K, P> {
    pub fn with_config_in(config: ChainConfig, pool: P) -> Self {
        Self {
            map: ChainedMap::with_config_in(config, pool),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.map.capacity()
    }

    pub fn map_ability(&self) -> usize {
        self.map.map_ability()
    }

    pub fn chain_capacity(&self) -> usize {
        self.map.chain_capacity()
    }

    pub fn chain_size(&self) -> usize {
        self.map.chain_size()
    }

    pub fn range_width(&self) -> u8 {
        self.map.range_width()
    }

    pub fn fullness(&self) -> u8 {
        self.map.fullness()
    }

    pub fn is_full(&self) -> bool {
        self.map.is_full()
    }

    pub fn memory_usage(&self) -> usize {
        self.map.memory_usage()
    }

    pub fn pool(&self) -> &P {
        self.map.pool()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn swap(&mut self, other: &mut Self) {
        self.map.swap(&mut other.map);
    }

    pub fn iter(&self) -> Iter<'_, K> {
        Iter {
            inner: self.map.iter(),
        }
    }
}

impl<K: ChainKey, P: MemoryPool> ChainedSet<K, P> {
    /// Add `key`. Returns `false` if it was already present.
    pub fn insert(&mut self, key: K) -> Result<bool> {
        Ok(self.map.insert(key, ())?.is_none())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    pub fn erase(&mut self, key: &K) -> bool {
        self.map.erase(key)
    }

    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&K) -> bool,
    {
        self.map.retain(|k, _| keep(k));
    }

    pub fn fit(&mut self) -> usize {
        self.map.fit()
    }

    pub fn reserve(&mut self, elements: u16) -> Result<()> {
        self.map.reserve(elements)
    }

    /// See [`ChainedMap::set_fullness`].
    pub fn set_fullness(&mut self, percent: u8) -> Result<Option<K>> {
        self.map.set_fullness(percent)
    }

    pub fn try_extend<I>(&mut self, iter: I) -> Result<usize>
    where
        I: IntoIterator<Item = K>,
    {
        self.map.try_extend(iter.into_iter().map(|k| (k, ())))
    }
}

impl<K: Clone, P: MemoryPool + Clone> Clone for ChainedSet<K, P> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
        }
    }
}

impl<K: ChainKey, P: MemoryPool> PartialEq for ChainedSet<K, P> {
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map
    }
}

impl<K: fmt::Debug, P: MemoryPool> fmt::Debug for ChainedSet<K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

pub struct Iter<'a, K> {
    inner: MapIter<'a, K, ()>,
}

impl<'a, K> Iterator for Iter<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }
}

impl<K> DoubleEndedIterator for Iter<'_, K> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(k, _)| k)
    }
}

impl<'a, K, P: MemoryPool> IntoIterator for &'a ChainedSet<K, P> {
    type Item = &'a K;
    type IntoIter = Iter<'a, K>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
