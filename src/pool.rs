//! Memory pools that back chain sub-table allocation.
//!
//! A [`ChainedMap`](crate::ChainedMap) asks its pool before it allocates a
//! sub-table and hands the bytes back when the sub-table is freed. A pool that
//! refuses makes the requesting operation fail with
//! [`Error::AllocationFailure`] instead of aborting.
//!
//! # Example
//!
//! ```rust
//! use chainmap::{Budget, ChainConfig, ChainedMap};
//!
//! let pool = Budget::new(4096);
//! let mut map: ChainedMap<u16, u32, Budget> =
//!     ChainedMap::with_config_in(ChainConfig::default(), pool);
//! map.insert(10, 1).unwrap();
//! assert!(map.pool().used() > 0);
//! ```

use crate::error::{Error, Result};

/// Source of sub-table memory.
pub trait MemoryPool {
    /// Claim `bytes`. Must leave the pool unchanged when it fails.
    fn try_acquire(&mut self, bytes: usize) -> Result<()>;

    /// Return `bytes` previously claimed.
    fn release(&mut self, bytes: usize);
}

/// The global heap. Never refuses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Heap;

impl MemoryPool for Heap {
    #[inline]
    fn try_acquire(&mut self, _bytes: usize) -> Result<()> {
        Ok(())
    }

    #[inline]
    fn release(&mut self, _bytes: usize) {}
}

/// A byte budget with a hard limit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Budget {
    limit: usize,
    used: usize,
}

impl Budget {
    /// Budget of `limit` bytes (`0` = unlimited).
    pub fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn used(&self) -> usize {
        self.used
    }

    /// Bytes still available, `usize::MAX` when unlimited.
    pub fn available(&self) -> usize {
        if self.limit == 0 {
            usize::MAX
        } else {
            self.limit.saturating_sub(self.used)
        }
    }
}

impl MemoryPool for Budget {
    fn try_acquire(&mut self, bytes: usize) -> Result<()> {
        if bytes > self.available() {
            tracing::debug!(
                requested = bytes,
                used = self.used,
                limit = self.limit,
                "memory budget exhausted"
            );
            return Err(Error::AllocationFailure);
        }
        self.used += bytes;
        Ok(())
    }

    fn release(&mut self, bytes: usize) {
        debug_assert!(bytes <= self.used, "released more than acquired");
        self.used = self.used.saturating_sub(bytes);
    }
}

impl<P: MemoryPool + ?Sized> MemoryPool for &mut P {
    fn try_acquire(&mut self, bytes: usize) -> Result<()> {
        (**self).try_acquire(bytes)
    }

    fn release(&mut self, bytes: usize) {
        (**self).release(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_never_refuses() {
        let mut heap = Heap;
        assert!(heap.try_acquire(usize::MAX).is_ok());
        heap.release(usize::MAX);
    }

    #[test]
    fn budget_enforces_limit() {
        let mut budget = Budget::new(100);
        budget.try_acquire(60).unwrap();
        assert_eq!(budget.available(), 40);
        assert_eq!(budget.try_acquire(41), Err(Error::AllocationFailure));
        assert_eq!(budget.used(), 60);
        budget.try_acquire(40).unwrap();
        assert_eq!(budget.available(), 0);
        budget.release(100);
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn unlimited_budget() {
        let mut budget = Budget::new(0);
        budget.try_acquire(1 << 20).unwrap();
        assert_eq!(budget.available(), usize::MAX);
        assert_eq!(budget.limit(), 0);
    }

    #[test]
    fn borrowed_pool_forwards() {
        fn charge<P: MemoryPool>(mut pool: P, bytes: usize) -> Result<()> {
            pool.try_acquire(bytes)
        }

        let mut budget = Budget::new(10);
        let borrowed = &mut budget;
        charge(borrowed, 7).unwrap();
        assert_eq!(budget.used(), 7);
        assert_eq!(charge(&mut budget, 4), Err(Error::AllocationFailure));
        assert_eq!(budget.used(), 7);
    }
}
