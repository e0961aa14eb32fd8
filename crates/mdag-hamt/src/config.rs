use serde::{Deserialize, Serialize};

use crate::error::{HamtError, HamtResult};

/// Largest supported bit width: a level's occupancy bitmap is a `u32`.
pub const MAX_BIT_WIDTH: u8 = 5;

/// Shape parameters of a HAMT.
///
/// Changing either value changes every root CID, so an index must always be
/// reopened with the configuration it was written with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HamtConfig {
    /// Hash bits consumed per level; a level has `2^bit_width` slots.
    pub bit_width: u8,
    /// Entries a bucket holds before it is split into a deeper level.
    pub bucket_size: usize,
}

impl Default for HamtConfig {
    fn default() -> Self {
        Self {
            bit_width: MAX_BIT_WIDTH,
            bucket_size: 3,
        }
    }
}

impl HamtConfig {
    pub fn validate(&self) -> HamtResult<()> {
        if self.bit_width == 0 || self.bit_width > MAX_BIT_WIDTH {
            return Err(HamtError::InvalidConfig(format!(
                "bit_width must be in 1..={MAX_BIT_WIDTH}, got {}",
                self.bit_width
            )));
        }
        if self.bucket_size == 0 {
            return Err(HamtError::InvalidConfig(
                "bucket_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of levels whose bit group fits in a 256-bit hash.
    pub fn max_depth(&self) -> usize {
        256 / self.bit_width as usize
    }
}
