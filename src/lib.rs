//! # chainmap
//!
//! Memory-budgeted associative arrays for small targets.
//!
//! [`TinyMap`] is an open-addressing hash table of at most 255 slots with a
//! two-bit state per slot and a configurable load factor ("fullness").
//! [`ChainedMap`] shards a larger numeric key domain into fixed-width ranges,
//! each owned by one `TinyMap`, and draws its sub-tables from a
//! [`MemoryPool`] so allocation failure is an error instead of an abort.
//!
//! ## Example
//!
//! ```rust
//! use chainmap::{ChainConfig, ChainedMap, TinyMap};
//!
//! let mut small: TinyMap<u8, &str> = TinyMap::new();
//! small.insert(1, "one").unwrap();
//! small.insert(5, "five").unwrap();
//! assert_eq!(small.get(&5), Some(&"five"));
//!
//! let mut wide: ChainedMap<u16, u32> = ChainedMap::with_config(ChainConfig {
//!     range_width: Some(10),
//!     ..ChainConfig::default()
//! });
//! wide.insert(3, 30).unwrap();
//! wide.insert(13, 130).unwrap();
//! assert_eq!(wide.len(), 2);
//! assert_eq!(wide.chain_size(), 2);
//!
//! // Every element is redistributed; on failure nothing is lost.
//! let boundary = wide.set_fullness(50).unwrap();
//! assert_eq!(boundary, Some(10 * 255 - 1));
//! assert_eq!(wide.get(&13), Some(&130));
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

pub mod chain;
pub mod config;
pub mod error;
pub mod kernel;
pub mod map;
pub mod pool;
pub mod set;
pub mod slots;

pub use chain::{ChainedMap, ChainedSet};
pub use config::ChainConfig;
pub use error::{Error, Result};
pub use kernel::{ChainKey, HashKey};
pub use map::TinyMap;
pub use pool::{Budget, Heap, MemoryPool};
pub use set::TinySet;
pub use slots::{SlotTag, SlotTags};

#[cfg(test)]
mod proptests;
