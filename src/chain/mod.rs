//! Range-sharded chain of [`TinyMap`]s.
//!
//! The key domain is cut into ranges `width` keys wide. Each range that holds
//! at least one key is owned by one sub-table of the chain, and a small range
//! directory (itself a [`TinyMap<u8, u8>`]) records which one.
//!
//! Every chain entry is in one of three states, kept in a [`SlotTags`]
//! directory:
//!
//! - `Used`: allocated and owns a range.
//! - `Deleted` (warm reserve): allocated but emptied. Keeps its allocation and
//!   is handed the next unowned range.
//! - `Empty`: either allocated but never assigned, or not allocated at all
//!   (cold reserve).
//!
//! ```text
//! cold --first key--> Used --emptied--> warm --new range--> Used
//!                                        |
//!                                        +--fit()--> cold
//! ```
//!
//! The chain and the range directory both top out at 255 entries, so the
//! addressable key space is `width * 255` integral keys.

pub mod set;

pub use set::ChainedSet;

use std::fmt;
use std::iter::Enumerate;
use std::mem;

use crate::config::{self, ChainConfig, DEFAULT_CHAIN_CAPACITY};
use crate::error::{Error, Result};
use crate::kernel::{self, ChainKey, MAX_CAP, MAX_FULLNESS};
use crate::map::{self, TinyMap};
use crate::pool::{Heap, MemoryPool};
use crate::slots::{SlotTag, SlotTags};

type Chain<K, V> = Box<[Option<Box<TinyMap<K, V>>>]>;

fn alloc_chain<K, V>(len: usize) -> Result<Vec<Option<Box<TinyMap<K, V>>>>> {
    let mut chain = Vec::new();
    chain
        .try_reserve_exact(len)
        .map_err(|_| Error::AllocationFailure)?;
    Ok(chain)
}

/// Map over a numeric key domain larger than one [`TinyMap`] can address.
pub struct ChainedMap<K, V, P: MemoryPool = Heap> {
    chain: Chain<K, V>,
    lifecycle: SlotTags,
    /// range id -> chain index, for `Used` entries only.
    ranges: TinyMap<u8, u8>,
    fullness: u8,
    width: u8,
    width_override: Option<u8>,
    /// Number of `Used` sub-tables.
    active: u8,
    pool: P,
}

impl<K, V> ChainedMap<K, V, Heap> {
    pub fn new() -> Self {
        Self::with_config(ChainConfig::default())
    }

    pub fn with_config(config: ChainConfig) -> Self {
        Self::with_config_in(config, Heap)
    }

    /// Chain sized for about `elements` keys.
    pub fn with_capacity(elements: u16) -> Self {
        Self::with_config(ChainConfig::for_elements(elements))
    }
}

impl<K, V> Default for ChainedMap<K, V, Heap> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, P: MemoryPool> ChainedMap<K, V, P> {
    /// Build a chain whose sub-tables are drawn from `pool`.
    ///
    /// Preactivation is best effort: a sub-table the pool refuses stays a cold
    /// reserve.
    pub fn with_config_in(config: ChainConfig, pool: P) -> Self {
        let fullness = kernel::clamp_fullness(config.fullness);
        let len = usize::from(config.chain_capacity);
        let mut map = Self {
            chain: (0..len).map(|_| None).collect(),
            lifecycle: SlotTags::with_len(len),
            ranges: TinyMap::with_fullness(MAX_FULLNESS),
            fullness,
            width: config::resolve_width(fullness, config.range_width),
            width_override: config.range_width,
            active: 0,
            pool,
        };
        for i in 0..usize::from(config.preactivated).min(len) {
            if let Err(err) = map.activate(i) {
                tracing::debug!(index = i, %err, "preactivation skipped");
                break;
            }
        }
        map
    }

    #[inline]
    fn sub_table_bytes() -> usize {
        mem::size_of::<TinyMap<K, V>>()
    }

    fn activate(&mut self, index: usize) -> Result<()> {
        if self.chain[index].is_some() {
            return Ok(());
        }
        self.pool.try_acquire(Self::sub_table_bytes())?;
        self.chain[index] = Some(Box::new(TinyMap::with_fullness(self.fullness)));
        tracing::debug!(index, "sub-table activated");
        Ok(())
    }

    // Back to cold reserve.
    fn free(&mut self, index: usize) {
        if self.chain[index].take().is_some() {
            self.pool.release(Self::sub_table_bytes());
        }
        self.lifecycle.set(index, SlotTag::Empty);
    }

    /// Number of elements across every sub-table.
    pub fn len(&self) -> usize {
        self.chain.iter().flatten().map(|t| t.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    /// Number of chain entries (allocated or not).
    pub fn chain_capacity(&self) -> usize {
        self.chain.len()
    }

    /// Number of sub-tables currently holding elements.
    pub fn chain_size(&self) -> usize {
        usize::from(self.active)
    }

    /// Keys per range.
    pub fn range_width(&self) -> u8 {
        self.width
    }

    /// Load factor of every sub-table, in percent.
    pub fn fullness(&self) -> u8 {
        self.fullness
    }

    /// Elements the current chain entries could hold.
    pub fn capacity(&self) -> usize {
        self.chain.len() * usize::from(self.width)
    }

    /// Elements a full-length chain could hold.
    pub fn map_ability(&self) -> usize {
        usize::from(self.width) * usize::from(MAX_CAP)
    }

    /// Whether every allocated sub-table is logically full.
    pub fn is_full(&self) -> bool {
        self.chain.iter().flatten().all(|t| t.is_full())
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Bytes owned by the chain, its sub-tables, and its directories.
    pub fn memory_usage(&self) -> usize {
        let entry = mem::size_of::<Option<Box<TinyMap<K, V>>>>();
        let tables: usize = self
            .chain
            .iter()
            .map(|slot| entry + slot.as_ref().map_or(0, |t| t.memory_usage()))
            .sum();
        mem::size_of::<Self>()
            + tables
            + self.lifecycle.byte_size()
            + self
                .ranges
                .memory_usage()
                .saturating_sub(mem::size_of::<TinyMap<u8, u8>>())
    }

    /// Resize the chain array, keeping every sub-table at its index.
    ///
    /// The new length never drops below the active sub-table count or cuts off
    /// an allocated sub-table.
    pub fn remap(&mut self, new_capacity: u8) -> Result<()> {
        let highest = (0..self.chain.len())
            .rev()
            .find(|&i| self.chain[i].is_some() || self.lifecycle.get(i) != SlotTag::Empty)
            .map_or(0, |i| i + 1);
        let new_len = usize::from(new_capacity)
            .max(usize::from(self.active))
            .max(highest);
        if new_len == self.chain.len() {
            return Ok(());
        }

        let mut chain = alloc_chain(new_len)?;
        let mut lifecycle = SlotTags::try_with_len(new_len)?;
        for i in 0..self.chain.len().min(new_len) {
            lifecycle.set(i, self.lifecycle.get(i));
        }
        tracing::debug!(from = self.chain.len(), to = new_len, "chain remap");

        let old = mem::take(&mut self.chain);
        chain.extend(old.into_vec().into_iter().take(new_len));
        chain.resize_with(new_len, || None);
        self.chain = chain.into_boxed_slice();
        self.lifecycle = lifecycle;
        Ok(())
    }

    /// Free every sub-table and forget every range. Chain length is kept.
    pub fn clear(&mut self) {
        for i in 0..self.chain.len() {
            self.free(i);
        }
        self.ranges.clear();
        self.ranges.fit();
        self.active = 0;
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            tables: self.chain.iter().enumerate(),
            lifecycle: &self.lifecycle,
            front: None,
            back: None,
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            tables: self.chain.iter_mut().enumerate(),
            lifecycle: &self.lifecycle,
            current: None,
        }
    }

    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    fn range_owned_by(&self, index: u8) -> Option<u8> {
        self.ranges
            .iter()
            .find(|&(_, &owner)| owner == index)
            .map(|(&range, _)| range)
    }

    // Re-point the range owned by chain index `from` at `to`.
    fn retarget(&mut self, from: u8, to: u8) {
        let range = self.range_owned_by(from);
        if let Some(owner) = range.and_then(|r| self.ranges.get_mut(&r)) {
            *owner = to;
        }
    }

    // Used -> warm reserve, once the sub-table has been emptied.
    fn demote(&mut self, index: usize, range: u8) {
        self.ranges.erase(&range);
        self.lifecycle.set(index, SlotTag::Deleted);
        self.active -= 1;
        tracing::debug!(range, index, "sub-table demoted to warm reserve");
    }
}

impl<K: ChainKey, V, P: MemoryPool> ChainedMap<K, V, P> {
    fn range_of(&self, key: &K) -> Result<u8> {
        let range = key.range_id(self.width);
        u8::try_from(range).map_err(|_| Error::KeyOutOfRange { range })
    }

    fn owner(&self, range: u8) -> Option<usize> {
        let index = usize::from(*self.ranges.get(&range)?);
        debug_assert_eq!(self.lifecycle.get(index), SlotTag::Used);
        Some(index)
    }

    fn table_for(&self, key: &K) -> Option<&TinyMap<K, V>> {
        let index = self.owner(self.range_of(key).ok()?)?;
        if self.lifecycle.get(index) != SlotTag::Used {
            return None;
        }
        self.chain[index].as_deref()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.table_for(key)?.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let index = self.owner(self.range_of(key).ok()?)?;
        self.chain[index].as_deref_mut()?.get_mut(key)
    }

    /// Position of `key` as `(sub-table index, slot index)`.
    pub fn find(&self, key: &K) -> Option<(usize, usize)> {
        let index = self.owner(self.range_of(key).ok()?)?;
        let slot = self.chain[index].as_deref()?.find(key)?;
        Some((index, slot))
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Like [`get`](Self::get), reporting a miss as [`Error::KeyNotFound`].
    pub fn at(&self, key: &K) -> Result<&V> {
        self.get(key).ok_or(Error::KeyNotFound)
    }

    /// Value for `key`, inserting `V::default()` on a miss.
    pub fn get_or_default(&mut self, key: K) -> Result<&mut V>
    where
        V: Default,
    {
        if !self.contains_key(&key) {
            self.insert(key, V::default())?;
        }
        self.get_mut(&key).ok_or(Error::KeyNotFound)
    }

    /// Insert or replace. Returns the previous value of `key`.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>> {
        self.insert_entry(key, value).map_err(|(err, _)| err)
    }

    /// Insert every pair from `iter`, stopping at the first failure.
    ///
    /// Returns the number of pairs consumed.
    pub fn try_extend<I>(&mut self, iter: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut consumed = 0;
        for (key, value) in iter {
            self.insert(key, value)?;
            consumed += 1;
        }
        Ok(consumed)
    }

    fn insert_entry(&mut self, key: K, value: V) -> std::result::Result<Option<V>, (Error, V)> {
        let range = match self.range_of(&key) {
            Ok(range) => range,
            Err(err) => return Err((err, value)),
        };

        if let Some(index) = self.owner(range) {
            if let Some(table) = self.chain[index].as_deref_mut() {
                return table
                    .insert_entry(key, value)
                    .map(|(_, old)| old)
                    .map_err(|(err, _, value)| (err, value));
            }
        }

        let index = match self.vacant_table() {
            Ok(index) => index,
            Err(err) => return Err((err, value)),
        };
        if let Err(err) = self.ranges.insert(range, index as u8) {
            return Err((err, value));
        }
        let Some(table) = self.chain[index].as_deref_mut() else {
            self.ranges.erase(&range);
            return Err((Error::AllocationFailure, value));
        };
        match table.insert_entry(key, value) {
            Ok((_, old)) => {
                self.lifecycle.set(index, SlotTag::Used);
                self.active += 1;
                tracing::debug!(range, index, "range assigned");
                Ok(old)
            }
            Err((err, _, value)) => {
                self.ranges.erase(&range);
                Err((err, value))
            }
        }
    }

    // Allocated sub-table ready for a new range, growing the chain if needed.
    fn vacant_table(&mut self) -> Result<usize> {
        loop {
            let len = self.chain.len();

            let fresh = (0..len).find(|&i| {
                self.lifecycle.get(i) == SlotTag::Empty
                    && self.chain[i].as_ref().is_some_and(|t| t.is_empty())
            });
            if let Some(i) = fresh {
                return Ok(i);
            }

            let warm = (0..len)
                .find(|&i| self.lifecycle.get(i) == SlotTag::Deleted && self.chain[i].is_some());
            if let Some(i) = warm {
                return Ok(i);
            }

            if let Some(i) = (0..len).find(|&i| self.chain[i].is_none()) {
                self.activate(i)?;
                return Ok(i);
            }

            if len >= usize::from(MAX_CAP) {
                return Err(Error::ChainExhausted);
            }
            self.remap((len + 4).min(usize::from(MAX_CAP)) as u8)?;
        }
    }

    /// Remove `key`. Returns `false` if it was not present.
    ///
    /// A sub-table left empty is shrunk and kept as a warm reserve.
    pub fn erase(&mut self, key: &K) -> bool {
        let Ok(range) = self.range_of(key) else {
            return false;
        };
        let Some(index) = self.owner(range) else {
            return false;
        };
        let Some(table) = self.chain[index].as_deref_mut() else {
            return false;
        };
        if !table.erase(key) {
            return false;
        }
        if table.is_empty() {
            table.fit();
            self.demote(index, range);
        }
        true
    }

    /// Keep only the entries for which `keep` returns `true`.
    ///
    /// Sub-tables left empty become warm reserves, as with
    /// [`erase`](Self::erase).
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        for index in 0..self.chain.len() {
            if self.lifecycle.get(index) != SlotTag::Used {
                continue;
            }
            let Some(table) = self.chain[index].as_deref_mut() else {
                continue;
            };
            table.retain(&mut keep);
            if !table.is_empty() {
                continue;
            }
            table.fit();
            if let Some(range) = self.range_owned_by(index as u8) {
                self.demote(index, range);
            }
        }
    }

    /// Prepare sub-tables for about `elements` keys.
    ///
    /// Allocates `ceil(elements / width)` sub-tables plus 3 (or 6) reserve
    /// entries. How keys spread over ranges is unknown, so this is a hint.
    pub fn reserve(&mut self, elements: u16) -> Result<()> {
        let elements = usize::from(elements);
        if elements > self.map_ability() {
            return Err(Error::CapacityOverflow { requested: elements });
        }
        if elements < self.len() {
            return Ok(());
        }
        let required = elements.div_ceil(usize::from(self.width));
        let spare = if required < 3 { 3 } else { 6 };
        let total = (required + spare).min(usize::from(MAX_CAP));
        if total > self.chain.len() {
            self.remap(total as u8)?;
        }
        for i in 0..required {
            self.activate(i)?;
        }
        Ok(())
    }

    /// Change the load factor of every sub-table (clamped to `10..=100`).
    ///
    /// This also changes the range width, so every element is redistributed.
    /// Either every element ends up under the new configuration, or the chain
    /// is rebuilt under the old one and the error is returned. On success the
    /// largest addressable key is returned (`None` for floating keys).
    pub fn set_fullness(&mut self, percent: u8) -> Result<Option<K>> {
        let fullness = kernel::clamp_fullness(percent);
        if fullness == self.fullness {
            return Ok(K::max_key(self.width));
        }
        let width = config::resolve_width(fullness, self.width_override);
        let total = self.len();
        let ability = usize::from(width) * usize::from(MAX_CAP);
        if ability < total {
            return Err(Error::WouldOverflow {
                size: total,
                ability,
            });
        }

        let required = total.div_ceil(usize::from(width));
        let new_len = self.chain.len().max(required);
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(total)
            .map_err(|_| Error::AllocationFailure)?;
        let mut fresh = alloc_chain(new_len)?;
        fresh.resize_with(new_len, || None);
        let fresh_lifecycle = SlotTags::try_with_len(new_len)?;

        for table in self.chain.iter_mut().flatten() {
            table.drain_into(&mut buffer);
        }
        let parked = mem::replace(&mut self.chain, fresh.into_boxed_slice());
        let parked_lifecycle = mem::replace(&mut self.lifecycle, fresh_lifecycle);
        let (old_fullness, old_width) = (self.fullness, self.width);
        self.ranges.clear();
        self.fullness = fullness;
        self.width = width;
        self.active = 0;

        match self.rebuild(required, &mut buffer) {
            Ok(()) => {
                let released = parked.iter().flatten().count();
                for _ in 0..released {
                    self.pool.release(Self::sub_table_bytes());
                }
                tracing::debug!(fullness, width, elements = total, "fullness migrated");
                Ok(K::max_key(width))
            }
            Err(err) => {
                tracing::warn!(fullness, %err, "fullness migration failed, rolling back");
                for i in 0..self.chain.len() {
                    if let Some(table) = self.chain[i].as_deref_mut() {
                        table.drain_into(&mut buffer);
                    }
                    self.free(i);
                }
                self.chain = parked;
                self.lifecycle = parked_lifecycle;
                self.lifecycle.clear();
                self.ranges.clear();
                self.fullness = old_fullness;
                self.width = old_width;
                self.active = 0;

                for (key, value) in buffer {
                    if let Err((restore_err, _)) = self.insert_entry(key, value) {
                        tracing::error!(%restore_err, "element lost while restoring chain");
                    }
                }
                Err(err)
            }
        }
    }

    /// Compact the chain. Returns the number of bytes released.
    ///
    /// Warm reserves are freed, active sub-tables are shrunk and slid to the
    /// front, and a chain less than a third used is reallocated smaller (never
    /// below the default length).
    pub fn fit(&mut self) -> usize {
        let before = self.memory_usage();

        let mut used = 0usize;
        for i in 0..self.chain.len() {
            match self.lifecycle.get(i) {
                SlotTag::Used => {
                    if let Some(table) = self.chain[i].as_deref_mut() {
                        table.fit();
                    }
                    used += 1;
                }
                SlotTag::Deleted => self.free(i),
                SlotTag::Empty => {}
            }
        }

        if used > 1 {
            let mut dest = 0usize;
            for src in 0..self.chain.len() {
                if self.lifecycle.get(src) != SlotTag::Used {
                    continue;
                }
                if dest != src {
                    self.chain.swap(dest, src);
                    let displaced = self.lifecycle.get(dest);
                    self.lifecycle.set(dest, SlotTag::Used);
                    self.lifecycle.set(src, displaced);
                    self.retarget(src as u8, dest as u8);
                }
                dest += 1;
            }

            let len = self.chain.len();
            if used < len / 3 && len > usize::from(DEFAULT_CHAIN_CAPACITY) {
                let new_len = usize::from(DEFAULT_CHAIN_CAPACITY).max(used * 2);
                for i in new_len..len {
                    self.free(i);
                }
                if let Err(err) = self.remap(new_len as u8) {
                    tracing::debug!(%err, "chain kept at full length");
                }
            }
        }

        let freed = before.saturating_sub(self.memory_usage());
        tracing::debug!(active = used, freed, "chain fit");
        freed
    }

    fn rebuild(&mut self, required: usize, buffer: &mut Vec<(K, V)>) -> Result<()> {
        for i in 0..required {
            self.activate(i)?;
        }
        while let Some((key, value)) = buffer.pop() {
            if let Err((err, value)) = self.insert_entry(key, value) {
                buffer.push((key, value));
                return Err(err);
            }
        }
        Ok(())
    }
}

impl<K, V, P: MemoryPool> Drop for ChainedMap<K, V, P> {
    fn drop(&mut self) {
        let bytes = Self::sub_table_bytes();
        for slot in self.chain.iter_mut() {
            if slot.take().is_some() {
                self.pool.release(bytes);
            }
        }
    }
}

impl<K: Clone, V: Clone, P: MemoryPool + Clone> Clone for ChainedMap<K, V, P> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            lifecycle: self.lifecycle.clone(),
            ranges: self.ranges.clone(),
            fullness: self.fullness,
            width: self.width,
            width_override: self.width_override,
            active: self.active,
            pool: self.pool.clone(),
        }
    }
}

impl<K: ChainKey, V: PartialEq, P: MemoryPool> PartialEq for ChainedMap<K, V, P> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K: fmt::Debug, V: fmt::Debug, P: MemoryPool> fmt::Debug for ChainedMap<K, V, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

// =============================================================================
// Iterators
// =============================================================================

/// Entries of every active sub-table, in chain order.
pub struct Iter<'a, K, V> {
    tables: Enumerate<std::slice::Iter<'a, Option<Box<TinyMap<K, V>>>>>,
    lifecycle: &'a SlotTags,
    front: Option<map::Iter<'a, K, V>>,
    back: Option<map::Iter<'a, K, V>>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(inner) = self.front.as_mut() {
                if let Some(entry) = inner.next() {
                    return Some(entry);
                }
                self.front = None;
            }
            match self.tables.next() {
                Some((i, Some(table))) if self.lifecycle.get(i) == SlotTag::Used => {
                    self.front = Some(table.iter());
                }
                Some(_) => {}
                None => return self.back.as_mut()?.next(),
            }
        }
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(inner) = self.back.as_mut() {
                if let Some(entry) = inner.next_back() {
                    return Some(entry);
                }
                self.back = None;
            }
            match self.tables.next_back() {
                Some((i, Some(table))) if self.lifecycle.get(i) == SlotTag::Used => {
                    self.back = Some(table.iter());
                }
                Some(_) => {}
                None => return self.front.as_mut()?.next_back(),
            }
        }
    }
}

/// Entries of every active sub-table, values mutable.
pub struct IterMut<'a, K, V> {
    tables: Enumerate<std::slice::IterMut<'a, Option<Box<TinyMap<K, V>>>>>,
    lifecycle: &'a SlotTags,
    current: Option<map::IterMut<'a, K, V>>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(inner) = self.current.as_mut() {
                if let Some(entry) = inner.next() {
                    return Some(entry);
                }
                self.current = None;
            }
            match self.tables.next()? {
                (i, Some(table)) if self.lifecycle.get(i) == SlotTag::Used => {
                    self.current = Some(table.iter_mut());
                }
                _ => {}
            }
        }
    }
}

impl<'a, K, V, P: MemoryPool> IntoIterator for &'a ChainedMap<K, V, P> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, P: MemoryPool> IntoIterator for &'a mut ChainedMap<K, V, P> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
