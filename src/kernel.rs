//! Hash kernel: start index, probe step, and key preprocessing.
//!
//! Every table in the crate addresses at most 255 slots. The start index of a
//! key uses a per-capacity additive offset chosen to spread small integer keys
//! for that exact modulus, and the probe step is chosen coprime to the
//! capacity so a probe sequence visits every slot once before repeating.

// =============================================================================
// Limits
// =============================================================================

/// Largest physical slot count of a single table (and largest chain length).
pub const MAX_CAP: u8 = 255;

/// Smallest physical slot count of a single table.
pub const MIN_CAP: u8 = 4;

/// Default load factor, in percent.
pub const DEFAULT_FULLNESS: u8 = 92;

/// Smallest accepted load factor, in percent.
pub const MIN_FULLNESS: u8 = 10;

/// Largest accepted load factor, in percent.
pub const MAX_FULLNESS: u8 = 100;

/// Clamp a requested load factor into `MIN_FULLNESS..=MAX_FULLNESS`.
#[inline]
pub fn clamp_fullness(percent: u8) -> u8 {
    percent.clamp(MIN_FULLNESS, MAX_FULLNESS)
}

/// Elements a table of `cap` slots accepts before it has to grow.
///
/// Truncating. `virtual_to_cap(cap_to_virtual(c, f), f)` is not always `c`.
#[inline]
pub fn cap_to_virtual(cap: u8, fullness: u8) -> u8 {
    ((u16::from(cap) * u16::from(fullness)) / 100) as u8
}

/// Physical slots needed to expose `virtual_cap` elements (truncating).
#[inline]
pub fn virtual_to_cap(virtual_cap: u8, fullness: u8) -> u16 {
    (u16::from(virtual_cap) * 100) / u16::from(fullness)
}

/// Smallest slot count whose virtual capacity holds `size` elements.
#[inline]
pub fn min_cap_for(size: u8, fullness: u8) -> u16 {
    let f = u16::from(fullness);
    (u16::from(size) * 100).div_ceil(f)
}

/// Most elements a single table can ever hold at `fullness`.
#[inline]
pub fn map_ability(fullness: u8) -> u8 {
    cap_to_virtual(MAX_CAP, fullness)
}

// =============================================================================
// Start index and probe step
// =============================================================================

// Additive offsets, indexed by `cap - 1`.
const OFFSETS: [u16; MAX_CAP as usize] = [
    1, 3, 1, 2, 12, 34, 49, 127, 981, 594, 2052, 1044,
    49375, 53321, 10649, 380, 17924, 4814, 21417, 27973, 2711, 25859, 19375, 30550,
    46560, 27453, 40930, 18546, 22584, 6562, 23268, 53300, 5169, 40037, 41846, 33642,
    27539, 20618, 64175, 59684, 19330, 42712, 1875, 43525, 64229, 36685, 20704, 31013,
    9442, 25741, 38699, 30829, 1037, 43586, 12733, 27755, 61573, 48797, 42204, 31935,
    63893, 11520, 24363, 22963, 48454, 27302, 4153, 51261, 31542, 19673, 20041, 41237,
    5395, 45652, 65105, 42390, 32730, 58752, 23485, 22238, 45897, 30628, 18218, 56135,
    64169, 23873, 33359, 41164, 30553, 2477, 26146, 25258, 38555, 36956, 55323, 36955,
    28145, 34934, 24128, 44346, 57422, 17639, 10847, 14692, 58631, 62805, 44332, 23472,
    30505, 42232, 45541, 28020, 27608, 47457, 7888, 22815, 33549, 56415, 36346, 1458,
    24626, 39447, 35548, 23130, 30783, 58784, 9345, 3842, 59278, 15268, 9092, 37766,
    62289, 49252, 39060, 6744, 6888, 35294, 61301, 8810, 35659, 54890, 27484, 15082,
    41652, 55021, 24111, 2335, 8341, 24842, 22493, 7374, 8563, 24125, 14717, 49767,
    39395, 44696, 18306, 6331, 60974, 28892, 34381, 22501, 47759, 10173, 19659, 58273,
    56330, 31516, 39378, 4702, 55814, 58567, 26173, 4818, 19669, 63836, 59751, 30066,
    1339, 38164, 11732, 7403, 39225, 5556, 44476, 33594, 2491, 63186, 58885, 50149,
    51242, 19350, 18232, 10553, 65382, 61292, 25227, 14925, 29984, 55349, 36245, 10413,
    37264, 43980, 6598, 38559, 21451, 18880, 54303, 48748, 48658, 34723, 36902, 39886,
    52936, 28903, 13346, 6541, 14553, 59345, 4998, 45510, 62008, 16457, 47400, 9316,
    21719, 13975, 36364, 17815, 4488, 40578, 7847, 14591, 1443, 35610, 8353, 23187,
    41174, 31424, 24346, 35663, 45976, 26208, 20988, 39438, 52284, 7982, 58000, 5705,
    16935, 5340, 7,
];

#[inline]
fn offset(cap: u8) -> usize {
    debug_assert!(cap > 0);
    usize::from(OFFSETS[usize::from(cap) - 1])
}

#[inline]
fn gcd(mut a: u16, mut b: u16) -> u16 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// Start slot of `key` in a table of `cap` slots.
#[inline]
pub fn hash<K: HashKey + ?Sized>(cap: u8, key: &K) -> u8 {
    debug_assert!(cap > 0);
    (offset(cap).wrapping_add(key.preprocess()) % usize::from(cap)) as u8
}

/// Probe step for a table of `cap` slots. Always coprime with `cap`.
pub fn probe_step(cap: u8) -> u8 {
    match cap {
        0..=10 => 1,
        14 | 18 => 5,
        11..=20 => cap / 2 + cap % 2 - 1,
        _ => {
            let mut b = cap / 10 - 1;
            while b % 10 == 0 || gcd(u16::from(cap), u16::from(b)) > 1 {
                b -= 1;
            }
            b
        }
    }
}

/// Slot after `index` in the probe sequence.
#[inline]
pub fn next_probe(cap: u8, index: u8, step: u8) -> u8 {
    let sum = u16::from(index) + u16::from(step);
    let cap = u16::from(cap);
    if cap.is_power_of_two() {
        (sum & (cap - 1)) as u8
    } else {
        (sum % cap) as u8
    }
}

// =============================================================================
// Key capability
// =============================================================================

/// A key the kernel can turn into an integer before hashing.
///
/// Integers hash as their own value. Floats fold their little-endian bytes,
/// strings use a DJB2 variant.
pub trait HashKey: PartialEq {
    fn preprocess(&self) -> usize;
}

macro_rules! impl_integral_key {
    ($($t:ty),*) => {
        $(
            impl HashKey for $t {
                #[inline]
                fn preprocess(&self) -> usize {
                    *self as usize
                }
            }
        )*
    };
}

impl_integral_key!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

impl HashKey for bool {
    #[inline]
    fn preprocess(&self) -> usize {
        usize::from(*self)
    }
}

impl HashKey for char {
    #[inline]
    fn preprocess(&self) -> usize {
        *self as usize
    }
}

#[inline]
fn fold_bytes(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .fold(0usize, |acc, &b| acc.wrapping_mul(31).wrapping_add(usize::from(b)))
}

#[inline]
fn djb2(bytes: &[u8]) -> usize {
    bytes
        .iter()
        .fold(5381usize, |acc, &b| acc.wrapping_mul(33) ^ usize::from(b))
}

impl HashKey for f32 {
    #[inline]
    fn preprocess(&self) -> usize {
        fold_bytes(&self.to_le_bytes())
    }
}

impl HashKey for f64 {
    #[inline]
    fn preprocess(&self) -> usize {
        fold_bytes(&self.to_le_bytes())
    }
}

impl HashKey for str {
    #[inline]
    fn preprocess(&self) -> usize {
        djb2(self.as_bytes())
    }
}

impl HashKey for String {
    #[inline]
    fn preprocess(&self) -> usize {
        djb2(self.as_bytes())
    }
}

impl HashKey for &str {
    #[inline]
    fn preprocess(&self) -> usize {
        djb2(self.as_bytes())
    }
}

/// A key a [`ChainedMap`](crate::ChainedMap) can shard by range.
///
/// Integral keys map to contiguous ranges (`key / width`). Floating keys map by
/// remainder (`preprocess(key) % width`), so a float range is a residue class,
/// not an interval.
pub trait ChainKey: HashKey + Copy {
    /// Range id of this key for ranges `width` keys wide.
    fn range_id(&self, width: u8) -> usize;

    /// Largest key a full 255-entry chain of `width`-wide ranges can hold, if
    /// the key type has one.
    fn max_key(width: u8) -> Option<Self>;
}

macro_rules! impl_integral_chain_key {
    ($($t:ty),*) => {
        $(
            impl ChainKey for $t {
                #[inline]
                fn range_id(&self, width: u8) -> usize {
                    self.preprocess() / usize::from(width.max(1))
                }

                fn max_key(width: u8) -> Option<Self> {
                    let last = u64::from(width.max(1)) * u64::from(MAX_CAP) - 1;
                    Some(<$t>::try_from(last).unwrap_or(<$t>::MAX))
                }
            }
        )*
    };
}

impl_integral_chain_key!(u8, u16);

macro_rules! impl_floating_chain_key {
    ($($t:ty),*) => {
        $(
            impl ChainKey for $t {
                #[inline]
                fn range_id(&self, width: u8) -> usize {
                    self.preprocess() % usize::from(width.max(1))
                }

                fn max_key(_width: u8) -> Option<Self> {
                    None
                }
            }
        )*
    };
}

impl_floating_chain_key!(f32, f64);
