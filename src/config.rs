//! Chain construction parameters.

use crate::kernel::{self, DEFAULT_FULLNESS, MAX_CAP};

/// Initial chain length.
pub const DEFAULT_CHAIN_CAPACITY: u8 = 10;

/// Sub-tables allocated up front by a default chain.
pub const DEFAULT_PREACTIVATED: u8 = 3;

/// Configuration for a [`ChainedMap`](crate::ChainedMap).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    /// Load factor of every sub-table, in percent (clamped to `10..=100`).
    pub fullness: u8,
    /// Initial number of chain entries.
    pub chain_capacity: u8,
    /// Sub-tables allocated at construction, ready for their first range.
    pub preactivated: u8,
    /// Keys per range. Defaults to `255 * fullness / 100` and is capped there,
    /// so a range never holds more keys than its sub-table can.
    pub range_width: Option<u8>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            fullness: DEFAULT_FULLNESS,
            chain_capacity: DEFAULT_CHAIN_CAPACITY,
            preactivated: DEFAULT_PREACTIVATED,
            range_width: None,
        }
    }
}

impl ChainConfig {
    /// Configuration sized for about `elements` integral keys.
    pub fn for_elements(elements: u16) -> Self {
        let base = Self::default();
        let width = base.range_width();
        let required = (elements / u16::from(width) + 1).min(u16::from(MAX_CAP)) as u8;
        let reserve = if (3..MAX_CAP - 6).contains(&required) { 6 } else { 3 };
        Self {
            chain_capacity: required.saturating_add(reserve),
            preactivated: required,
            ..base
        }
    }

    /// Effective keys per range for this configuration.
    pub fn range_width(&self) -> u8 {
        resolve_width(kernel::clamp_fullness(self.fullness), self.range_width)
    }
}

pub(crate) fn resolve_width(fullness: u8, requested: Option<u8>) -> u8 {
    let ability = kernel::map_ability(fullness);
    requested.unwrap_or(ability).clamp(1, ability)
}
