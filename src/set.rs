//! Key-only [`TinyMap`].

use std::fmt;

use crate::error::Result;
use crate::kernel::HashKey;
use crate::map::{self, TinyMap};

/// Open-addressing hash set holding at most `255 * fullness / 100` keys.
#[derive(Clone)]
pub struct TinySet<K> {
    map: TinyMap<K, ()>,
}

impl<K> Default for TinySet<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> TinySet<K> {
    pub fn new() -> Self {
        Self {
            map: TinyMap::new(),
        }
    }

    pub fn with_fullness(percent: u8) -> Self {
        Self {
            map: TinyMap::with_fullness(percent),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Keys the set accepts before it grows.
    pub fn capacity(&self) -> usize {
        self.map.capacity()
    }

    pub fn map_ability(&self) -> usize {
        self.map.map_ability()
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

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn iter(&self) -> Iter<'_, K> {
        Iter {
            inner: self.map.iter(),
        }
    }
}

impl<K: HashKey> TinySet<K> {
    /// Add `key`. Returns `false` if it was already present.
    pub fn insert(&mut self, key: K) -> Result<bool> {
        Ok(self.map.insert(key, ())?.is_none())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Slot index holding `key`, if present.
    pub fn find(&self, key: &K) -> Option<usize> {
        self.map.find(key)
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

    pub fn reserve(&mut self, keys: u8) -> Result<()> {
        self.map.reserve(keys)
    }

    pub fn fit(&mut self) -> usize {
        self.map.fit()
    }

    pub fn set_fullness(&mut self, percent: u8) -> Result<()> {
        self.map.set_fullness(percent)
    }

    pub fn try_extend<I>(&mut self, iter: I) -> Result<()>
    where
        I: IntoIterator<Item = K>,
    {
        self.map.try_extend(iter.into_iter().map(|k| (k, ())))
    }
}

impl<K: HashKey> PartialEq for TinySet<K> {
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map
    }
}

impl<K: fmt::Debug> fmt::Debug for TinySet<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[derive(Clone)]
pub struct Iter<'a, K> {
    inner: map::Iter<'a, K, ()>,
}

impl<'a, K> Iterator for Iter<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K> DoubleEndedIterator for Iter<'_, K> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(k, _)| k)
    }
}

impl<K> ExactSizeIterator for Iter<'_, K> {}

impl<'a, K> IntoIterator for &'a TinySet<K> {
    type Item = &'a K;
    type IntoIter = Iter<'a, K>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn insert_reports_novelty() {
        let mut set = TinySet::new();
        assert_eq!(set.insert(7u8), Ok(true));
        assert_eq!(set.insert(7u8), Ok(false));
        assert!(set.contains(&7));
        assert_eq!(set.len(), 1);
        assert!(set.erase(&7));
        assert!(!set.erase(&7));
        assert!(set.is_empty());
    }

    #[test]
    fn fills_to_ability() {
        let mut set = TinySet::new();
        set.try_extend(0..234u16).unwrap();
        assert_eq!(set.len(), set.map_ability());
        assert!(set.is_full());
        assert_eq!(set.insert(1000), Err(Error::TableFull));
        assert_eq!(set.insert(5), Ok(false));
    }

    #[test]
    fn equality_and_iteration() {
        let mut a = TinySet::new();
        let mut b = TinySet::with_fullness(50);
        a.try_extend(["x", "y", "z"]).unwrap();
        b.try_extend(["z", "y", "x"]).unwrap();
        assert_eq!(a, b);

        let mut keys: Vec<&str> = a.iter().copied().collect();
        keys.sort();
        assert_eq!(keys, ["x", "y", "z"]);
        assert_eq!(a.iter().rev().count(), 3);
        assert_eq!(format!("{:?}", TinySet::<u8>::new()), "{}");
    }

    #[test]
    fn fit_after_erase() {
        let mut set = TinySet::new();
        set.try_extend(0..100u8).unwrap();
        for k in 10..100u8 {
            set.erase(&k);
        }
        assert!(set.fit() > 0);
        assert!((0..10u8).all(|k| set.contains(&k)));
        set.set_fullness(100).unwrap();
        assert_eq!(set.fullness(), 100);
    }

    #[test]
    fn retain_keeps_matching_keys() {
        let mut set = TinySet::new();
        set.try_extend(0..50u8).unwrap();
        set.retain(|k| k % 5 == 0);
        assert_eq!(set.len(), 10);
        assert!((0..50u8).all(|k| set.contains(&k) == (k % 5 == 0)));
    }
}
