//! Configuration for zonal index files.

use crate::error::{Result, ZonalError};
use serde::{Deserialize, Serialize};

/// Allocation granularity for block sizes (4 KB OS page).
pub const PAGE_UNIT: u64 = 4096;

/// Geometry and layout parameters of one index file.
///
/// The key size is derived: every key is a minimum bounding rectangle of
/// `dimensions` lo/hi coordinate pairs stored as little-endian f64, so
/// `key_size = dimensions * 2 * 8`. These parameters are written into the
/// index header at creation and verified on every open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Number of spatial dimensions (d >= 1).
    pub dimensions: u64,
    /// Size of one leaf payload in bytes.
    pub value_size: u64,
    /// Block size in bytes (positive multiple of PAGE_UNIT).
    pub block_size: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimensions: 2,
            value_size: 8,
            block_size: PAGE_UNIT,
        }
    }
}

impl IndexConfig {
    /// Size of one serialized key (MBR) in bytes.
    pub fn key_size(&self) -> u64 {
        self.dimensions * 2 * std::mem::size_of::<f64>() as u64
    }

    /// Checks that the parameters describe a usable index layout.
    pub fn validate(&self) -> Result<()> {
        if self.dimensions == 0 {
            return Err(ZonalError::Config("dimensions must be at least 1".into()));
        }
        if self.value_size == 0 {
            return Err(ZonalError::Config("value_size must be at least 1".into()));
        }
        if self.block_size == 0 || self.block_size % PAGE_UNIT != 0 {
            return Err(ZonalError::Config(format!(
                "block_size must be a positive multiple of {}, got {}",
                PAGE_UNIT, self.block_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = IndexConfig::default();
        assert_eq!(config.dimensions, 2);
        assert_eq!(config.value_size, 8);
        assert_eq!(config.block_size, 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_key_size_derivation() {
        let config = IndexConfig::default();
        // 2 dimensions -> 4 coordinates -> 32 bytes
        assert_eq!(config.key_size(), 32);

        let config = IndexConfig {
            dimensions: 3,
            ..Default::default()
        };
        assert_eq!(config.key_size(), 48);
    }

    #[test]
    fn test_validate_rejects_zero_dimensions() {
        let config = IndexConfig {
            dimensions: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_value_size() {
        let config = IndexConfig {
            value_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_block_size() {
        for block_size in [0, 100, 4095, 4097, 6000] {
            let config = IndexConfig {
                block_size,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "block_size {}", block_size);
        }
    }

    #[test]
    fn test_validate_accepts_page_unit_multiples() {
        for block_size in [4096, 8192, 16384, 65536] {
            let config = IndexConfig {
                block_size,
                ..Default::default()
            };
            assert!(config.validate().is_ok(), "block_size {}", block_size);
        }
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let original = IndexConfig {
            dimensions: 3,
            value_size: 16,
            block_size: 8192,
        };
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: IndexConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_config_clone_copy() {
        let c1 = IndexConfig::default();
        let c2 = c1; // Copy
        assert_eq!(c1, c2);
    }
}
