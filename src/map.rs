//! Bounded open-addressing map of at most 255 slots.
//!
//! ```text
//! |------------------|-----------------|--------|
//! 0                 len          virtual_cap    cap
//! ```
//!
//! `cap` is the physical slot count, `virtual_cap = cap * fullness / 100` is
//! the element count that triggers growth. Growth doubles `cap` up to 255.
//! Erased slots become tombstones that keep their key (so an erased key is
//! recognised without walking further) until they are reused, cleared, or
//! purged by a rehash. The value is dropped on erase.

use std::fmt;
use std::iter::Enumerate;
use std::mem;

use crate::error::{Error, Result};
use crate::kernel::{self, HashKey, DEFAULT_FULLNESS, MAX_CAP, MIN_CAP};
use crate::slots::{SlotTag, SlotTags};

// `(key, None)` is a tombstone.
type Slot<K, V> = Option<(K, Option<V>)>;

enum Probe {
    /// A `Used` slot holding the key.
    Found(u8),
    /// Where the key would go: the first `Empty` slot, or a tombstone of the
    /// same key.
    Vacant(u8),
    /// Every slot was visited without reaching either.
    Exhausted { saw_deleted: bool },
}

fn alloc_slots<K, V>(cap: u8) -> Result<Box<[Slot<K, V>]>> {
    let mut slots = Vec::new();
    slots
        .try_reserve_exact(usize::from(cap))
        .map_err(|_| Error::AllocationFailure)?;
    slots.resize_with(usize::from(cap), || None);
    Ok(slots.into_boxed_slice())
}

/// Open-addressing hash map holding at most `255 * fullness / 100` entries.
#[derive(Clone)]
pub struct TinyMap<K, V> {
    slots: Box<[Slot<K, V>]>,
    tags: SlotTags,
    cap: u8,
    len: u8,
    /// Load factor in percent.
    fullness: u8,
    virtual_cap: u8,
    step: u8,
}

impl<K, V> TinyMap<K, V> {
    /// Empty map with 4 slots and the default fullness (92%).
    pub fn new() -> Self {
        Self::with_layout(MIN_CAP, DEFAULT_FULLNESS)
    }

    /// Empty map with `cap` physical slots, clamped to `4..=255`.
    pub fn with_capacity(cap: u8) -> Self {
        Self::with_layout(cap.max(MIN_CAP), DEFAULT_FULLNESS)
    }

    /// Empty map with 4 slots and the given fullness (clamped to `10..=100`).
    pub fn with_fullness(percent: u8) -> Self {
        Self::with_layout(MIN_CAP, kernel::clamp_fullness(percent))
    }

    fn with_layout(cap: u8, fullness: u8) -> Self {
        Self {
            slots: (0..cap).map(|_| None).collect(),
            tags: SlotTags::with_len(usize::from(cap)),
            cap,
            len: 0,
            fullness,
            virtual_cap: kernel::cap_to_virtual(cap, fullness),
            step: kernel::probe_step(cap),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Elements the map accepts before it grows.
    #[inline]
    pub fn capacity(&self) -> usize {
        usize::from(self.virtual_cap)
    }

    /// Physical slot count.
    #[inline]
    pub fn slot_capacity(&self) -> usize {
        usize::from(self.cap)
    }

    /// Most elements the map can ever hold at its current fullness.
    #[inline]
    pub fn map_ability(&self) -> usize {
        usize::from(kernel::map_ability(self.fullness))
    }

    /// Load factor in percent.
    #[inline]
    pub fn fullness(&self) -> u8 {
        self.fullness
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len >= self.virtual_cap
    }

    /// Bytes owned by the map, including the map header.
    pub fn memory_usage(&self) -> usize {
        mem::size_of::<Self>()
            + usize::from(self.cap) * mem::size_of::<Slot<K, V>>()
            + self.tags.byte_size()
    }

    /// Remove every entry. Slot storage is kept.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.tags.clear();
        self.len = 0;
    }

    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    /// Entry stored at `index`, if that slot is live.
    pub fn get_index(&self, index: usize) -> Option<(&K, &V)> {
        if self.tags.get(index) != SlotTag::Used {
            return None;
        }
        match &self.slots[index] {
            Some((k, Some(v))) => Some((k, v)),
            _ => None,
        }
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            slots: self.slots.iter().enumerate(),
            tags: &self.tags,
            remaining: self.len(),
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            remaining: usize::from(self.len),
            slots: self.slots.iter_mut().enumerate(),
            tags: &self.tags,
        }
    }

    pub fn keys(&self) -> impl DoubleEndedIterator<Item = &K> + '_ {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl DoubleEndedIterator<Item = &V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    /// Move every live entry into `out` and leave the map empty.
    pub(crate) fn drain_into(&mut self, out: &mut Vec<(K, V)>) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if let (SlotTag::Used, Some((k, Some(v)))) = (self.tags.get(i), slot.take()) {
                out.push((k, v));
            }
        }
        self.tags.clear();
        self.len = 0;
    }
}

impl<K: HashKey, V> TinyMap<K, V> {
    fn probe(&self, key: &K) -> Probe {
        let mut index = kernel::hash(self.cap, key);
        let mut attempts = 0u8;
        let mut saw_deleted = false;

        loop {
            let tag = self.tags.get(usize::from(index));
            if tag == SlotTag::Empty {
                return Probe::Vacant(index);
            }
            if attempts == self.cap {
                return Probe::Exhausted { saw_deleted };
            }
            attempts += 1;

            if let Some((k, _)) = &self.slots[usize::from(index)] {
                if k == key {
                    return match tag {
                        SlotTag::Used => Probe::Found(index),
                        _ => Probe::Vacant(index),
                    };
                }
            }
            if tag == SlotTag::Deleted {
                saw_deleted = true;
            }
            index = kernel::next_probe(self.cap, index, self.step);
        }
    }

    /// Slot index holding `key`, if present.
    pub fn find(&self, key: &K) -> Option<usize> {
        match self.probe(key) {
            Probe::Found(i) => Some(usize::from(i)),
            _ => None,
        }
    }

    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.find(key).is_some()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let i = self.find(key)?;
        self.slots[i].as_ref().and_then(|(_, v)| v.as_ref())
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let i = self.find(key)?;
        self.slots[i].as_mut().and_then(|(_, v)| v.as_mut())
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
        let index = match self.find(&key) {
            Some(i) => i,
            None => self.insert_full(key, V::default())?.0,
        };
        self.slots[index]
            .as_mut()
            .and_then(|(_, v)| v.as_mut())
            .ok_or(Error::KeyNotFound)
    }

    /// Insert or replace. Returns the previous value of `key`.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>> {
        self.insert_entry(key, value)
            .map(|(_, old)| old)
            .map_err(|(err, _, _)| err)
    }

    /// Insert or replace. Returns the slot index and whether `key` is new.
    pub fn insert_full(&mut self, key: K, value: V) -> Result<(usize, bool)> {
        self.insert_entry(key, value)
            .map(|(i, old)| (usize::from(i), old.is_none()))
            .map_err(|(err, _, _)| err)
    }

    /// Insert every pair from `iter`, stopping at the first failure.
    pub fn try_extend<I>(&mut self, iter: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in iter {
            self.insert(key, value)?;
        }
        Ok(())
    }

    /// Insert that hands the entry back when it cannot be stored.
    pub(crate) fn insert_entry(
        &mut self,
        key: K,
        value: V,
    ) -> std::result::Result<(u8, Option<V>), (Error, K, V)> {
        if let Probe::Found(i) = self.probe(&key) {
            return Ok(self.occupy(i, key, value));
        }

        while self.len >= self.virtual_cap {
            if self.cap == MAX_CAP {
                return Err((Error::TableFull, key, value));
            }
            let doubled = (u16::from(self.cap) * 2).min(u16::from(MAX_CAP)) as u8;
            if let Err(err) = self.rehash(doubled) {
                return Err((err, key, value));
            }
        }

        let mut compacted = false;
        loop {
            match self.probe(&key) {
                Probe::Found(i) | Probe::Vacant(i) => return Ok(self.occupy(i, key, value)),
                Probe::Exhausted { saw_deleted: true } if !compacted => {
                    tracing::trace!(cap = self.cap, len = self.len, "purging tombstones");
                    compacted = true;
                    if let Err(err) = self.rehash(self.cap) {
                        return Err((err, key, value));
                    }
                }
                Probe::Exhausted { .. } => return Err((Error::TableFull, key, value)),
            }
        }
    }

    fn occupy(&mut self, index: u8, key: K, value: V) -> (u8, Option<V>) {
        let i = usize::from(index);
        if self.tags.get(i) == SlotTag::Used {
            if let Some((_, Some(v))) = self.slots[i].as_mut() {
                return (index, Some(mem::replace(v, value)));
            }
            debug_assert!(false, "used slot {i} has no entry");
            self.len = self.len.saturating_sub(1);
        }
        self.slots[i] = Some((key, Some(value)));
        self.tags.set(i, SlotTag::Used);
        self.len += 1;
        (index, None)
    }

    /// Remove `key`. Returns `false` if it was not present.
    pub fn erase(&mut self, key: &K) -> bool {
        self.remove(key).is_some()
    }

    /// Remove `key` and return its value. The key stays behind as a tombstone.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let Probe::Found(i) = self.probe(key) else {
            return None;
        };
        let i = usize::from(i);
        self.tags.set(i, SlotTag::Deleted);
        self.len -= 1;
        self.slots[i].as_mut().and_then(|(_, v)| v.take())
    }

    /// Keep only the entries for which `keep` returns `true`.
    ///
    /// Rejected entries become tombstones, exactly as if erased.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if self.tags.get(i) != SlotTag::Used {
                continue;
            }
            if let Some((k, value)) = slot {
                if value.as_mut().is_some_and(|v| !keep(k, v)) {
                    *value = None;
                    self.tags.set(i, SlotTag::Deleted);
                    self.len -= 1;
                }
            }
        }
    }

    /// Rebuild into `new_cap` slots, dropping tombstones.
    ///
    /// `new_cap` is raised to the smallest capacity that still holds every
    /// element (and at least 4).
    pub fn rehash(&mut self, new_cap: u8) -> Result<()> {
        let floor = kernel::min_cap_for(self.len, self.fullness)
            .clamp(u16::from(MIN_CAP), u16::from(MAX_CAP)) as u8;
        let new_cap = new_cap.max(floor);

        let slots = alloc_slots(new_cap)?;
        let tags = SlotTags::try_with_len(usize::from(new_cap))?;
        tracing::trace!(from = self.cap, to = new_cap, len = self.len, "rehash");

        let old_slots = mem::replace(&mut self.slots, slots);
        let old_tags = mem::replace(&mut self.tags, tags);
        self.cap = new_cap;
        self.step = kernel::probe_step(new_cap);
        self.virtual_cap = kernel::cap_to_virtual(new_cap, self.fullness);
        self.len = 0;

        for (i, slot) in old_slots.into_vec().into_iter().enumerate() {
            if old_tags.get(i) != SlotTag::Used {
                continue;
            }
            if let Some((key, Some(value))) = slot {
                self.place(key, value);
            }
        }
        Ok(())
    }

    // Reinsert into a table with no tombstones and a free slot.
    fn place(&mut self, key: K, value: V) {
        match self.probe(&key) {
            Probe::Found(i) | Probe::Vacant(i) => {
                self.occupy(i, key, value);
            }
            Probe::Exhausted { .. } => {
                debug_assert!(false, "rehash target has no free slot");
                tracing::error!(cap = self.cap, len = self.len, "entry lost during rehash");
            }
        }
    }

    /// Shrink to the smallest capacity that holds every element.
    ///
    /// Returns the number of bytes released.
    pub fn fit(&mut self) -> usize {
        let target = kernel::min_cap_for(self.len, self.fullness)
            .clamp(u16::from(MIN_CAP), u16::from(MAX_CAP)) as u8;
        if target >= self.cap {
            return 0;
        }
        let before = self.memory_usage();
        match self.rehash(target) {
            Ok(()) => before.saturating_sub(self.memory_usage()),
            Err(_) => 0,
        }
    }

    /// Prepare room for `virtual_cap` elements.
    ///
    /// The physical size is `virtual_cap * 100 / fullness`, truncated, so the
    /// resulting [`capacity`](Self::capacity) can land one below the request.
    pub fn reserve(&mut self, virtual_cap: u8) -> Result<()> {
        let requested = kernel::virtual_to_cap(virtual_cap, self.fullness);
        if requested > u16::from(MAX_CAP) {
            return Err(Error::CapacityOverflow {
                requested: usize::from(requested),
            });
        }
        let new_cap = (requested as u8).max(self.len);
        if new_cap == self.cap {
            return Ok(());
        }
        self.rehash(new_cap)
    }

    /// Change the load factor (clamped to `10..=100`).
    ///
    /// Fails without changes if the map could never hold its current elements
    /// at the new fullness. Data only moves when the current slots no longer
    /// cover the element count.
    pub fn set_fullness(&mut self, percent: u8) -> Result<()> {
        let fullness = kernel::clamp_fullness(percent);
        let ability = kernel::map_ability(fullness);
        if ability < self.len {
            return Err(Error::WouldOverflow {
                size: self.len(),
                ability: usize::from(ability),
            });
        }

        let (old_fullness, old_virtual) = (self.fullness, self.virtual_cap);
        self.fullness = fullness;
        self.virtual_cap = kernel::cap_to_virtual(self.cap, fullness);
        if self.len > self.virtual_cap {
            if let Err(err) = self.rehash(self.cap) {
                self.fullness = old_fullness;
                self.virtual_cap = old_virtual;
                return Err(err);
            }
        }
        Ok(())
    }
}

impl<K, V> Default for TinyMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: HashKey, V: PartialEq> PartialEq for TinyMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for TinyMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

// =============================================================================
// Iterators
// =============================================================================

/// Live entries in slot order.
pub struct Iter<'a, K, V> {
    slots: Enumerate<std::slice::Iter<'a, Slot<K, V>>>,
    tags: &'a SlotTags,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        for (i, slot) in self.slots.by_ref() {
            if self.tags.get(i) != SlotTag::Used {
                continue;
            }
            if let Some((k, Some(v))) = slot {
                self.remaining -= 1;
                return Some((k, v));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        while let Some((i, slot)) = self.slots.next_back() {
            if self.tags.get(i) != SlotTag::Used {
                continue;
            }
            if let Some((k, Some(v))) = slot {
                self.remaining -= 1;
                return Some((k, v));
            }
        }
        None
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
            tags: self.tags,
            remaining: self.remaining,
        }
    }
}

/// Live entries in slot order, values mutable.
pub struct IterMut<'a, K, V> {
    slots: Enumerate<std::slice::IterMut<'a, Slot<K, V>>>,
    tags: &'a SlotTags,
    remaining: usize,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        for (i, slot) in self.slots.by_ref() {
            if self.tags.get(i) != SlotTag::Used {
                continue;
            }
            if let Some((k, Some(v))) = slot {
                self.remaining -= 1;
                return Some((&*k, v));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for IterMut<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        while let Some((i, slot)) = self.slots.next_back() {
            if self.tags.get(i) != SlotTag::Used {
                continue;
            }
            if let Some((k, Some(v))) = slot {
                self.remaining -= 1;
                return Some((&*k, v));
            }
        }
        None
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

/// Owning iterator over live entries.
pub struct IntoIter<K, V> {
    slots: Enumerate<std::vec::IntoIter<Slot<K, V>>>,
    tags: SlotTags,
    remaining: usize,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        for (i, slot) in self.slots.by_ref() {
            if self.tags.get(i) != SlotTag::Used {
                continue;
            }
            if let Some((k, Some(v))) = slot {
                self.remaining -= 1;
                return Some((k, v));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for IntoIter<K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        while let Some((i, slot)) = self.slots.next_back() {
            if self.tags.get(i) != SlotTag::Used {
                continue;
            }
            if let Some((k, Some(v))) = slot {
                self.remaining -= 1;
                return Some((k, v));
            }
        }
        None
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}

impl<K, V> IntoIterator for TinyMap<K, V> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            remaining: self.len(),
            slots: self.slots.into_vec().into_iter().enumerate(),
            tags: self.tags,
        }
    }
}

impl<'a, K, V> IntoIterator for &'a TinyMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V> IntoIterator for &'a mut TinyMap<K, V> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
