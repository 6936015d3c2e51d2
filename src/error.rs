//! Error type shared by every table in the crate.

/// Failures reported by map, set, and chain operations.
///
/// Tables never panic on these conditions. A failed mutation leaves every
/// stored element in place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The key is not stored in the table.
    #[error("key not found")]
    KeyNotFound,

    /// A base table is at 255 slots and logically full.
    #[error("table is full at the maximum of 255 slots")]
    TableFull,

    /// No sub-table could be allocated or recycled and the chain already
    /// holds 255 entries.
    #[error("chain cannot activate another sub-table")]
    ChainExhausted,

    /// The allocator or memory pool refused a request.
    #[error("allocation failed")]
    AllocationFailure,

    /// The key maps to a range id that does not fit the 8-bit range space.
    #[error("key maps to range {range}, beyond the addressable 0..=255")]
    KeyOutOfRange { range: usize },

    /// A reservation asks for more than the table can ever hold.
    #[error("requested capacity {requested} exceeds the table maximum")]
    CapacityOverflow { requested: usize },

    /// A new fullness cannot hold the elements already stored.
    #[error("fullness change would hold at most {ability} elements but {size} are stored")]
    WouldOverflow { size: usize, ability: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
