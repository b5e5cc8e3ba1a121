use super::replacement;
use crate::addrdec;

use serde::{Deserialize, Serialize};

/// Cache array organization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Organization {
    DirectMapped,
    SetAssociative,
    FullyAssociative,
}

/// Cross-level inclusion policy.
///
/// Meaningful from level 2 onward; level 1 is inclusive of nothing.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InclusionPolicy {
    #[default]
    Inclusive,
    Exclusive,
    NINE,
}

impl std::fmt::Display for InclusionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Inclusive => write!(f, "Inclusive"),
            Self::Exclusive => write!(f, "Exclusive"),
            Self::NINE => write!(f, "NINE"),
        }
    }
}

/// Invalid cache geometry, rejected at construction.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cache size {0} is not a positive power of two")]
    BadSize(u64),
    #[error("block size {0} is not a positive power of two")]
    BadBlockSize(u64),
    #[error("block size {block_size} does not divide cache size {size}")]
    BlockSizeDoesNotDivide { size: u64, block_size: u64 },
    #[error("associativity {0} is not a positive power of two")]
    BadAssociativity(u64),
    #[error("associativity {associativity} exceeds the {num_blocks} blocks in the cache")]
    TooManyWays { associativity: u64, num_blocks: u64 },
    #[error("set size {set_bytes} (block size x associativity) does not divide cache size {size}")]
    SetSizeDoesNotDivide { size: u64, set_bytes: u64 },
    #[error("hierarchy must contain at least one cache level")]
    EmptyHierarchy,
}

/// Geometry and behavior of one cache level.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub organization: Organization,
    /// Total size in bytes.
    pub size: u64,
    /// Block size in bytes.
    pub block_size: u64,
    /// Number of ways (meaningful for set-associative caches).
    pub associativity: u64,
    /// Replacement policy.
    pub policy: replacement::Kind,
    /// Cycles to access this level.
    pub access_latency: u64,
    /// Write-back when true, write-through otherwise.
    pub write_back: bool,
    /// Allocate a block on write misses.
    pub write_allocate: bool,
    /// Relation to the level above; ignored on level 1.
    pub inclusion_policy: InclusionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            organization: Organization::SetAssociative,
            size: 64 * 1024,
            block_size: 64,
            associativity: 8,
            policy: replacement::Kind::LRU,
            access_latency: 1,
            write_back: true,
            write_allocate: true,
            inclusion_policy: InclusionPolicy::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.size.is_power_of_two() {
            return Err(ConfigError::BadSize(self.size));
        }
        if !self.block_size.is_power_of_two() {
            return Err(ConfigError::BadBlockSize(self.block_size));
        }
        if self.size % self.block_size != 0 {
            return Err(ConfigError::BlockSizeDoesNotDivide {
                size: self.size,
                block_size: self.block_size,
            });
        }
        if self.organization == Organization::SetAssociative {
            if !self.associativity.is_power_of_two() {
                return Err(ConfigError::BadAssociativity(self.associativity));
            }
            if self.associativity > self.size / self.block_size {
                return Err(ConfigError::TooManyWays {
                    associativity: self.associativity,
                    num_blocks: self.size / self.block_size,
                });
            }
            let set_bytes = self.block_size * self.associativity;
            if self.size % set_bytes != 0 {
                return Err(ConfigError::SetSizeDoesNotDivide {
                    size: self.size,
                    set_bytes,
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn num_sets(&self) -> u64 {
        match self.organization {
            Organization::DirectMapped => self.size / self.block_size,
            Organization::SetAssociative => self.size / (self.block_size * self.associativity),
            Organization::FullyAssociative => 1,
        }
    }

    #[must_use]
    pub fn num_ways(&self) -> u64 {
        match self.organization {
            Organization::DirectMapped => 1,
            Organization::SetAssociative => self.associativity,
            Organization::FullyAssociative => self.size / self.block_size,
        }
    }

    #[must_use]
    pub fn offset_bits(&self) -> u32 {
        addrdec::logb2(self.block_size)
    }

    #[must_use]
    pub fn index_bits(&self) -> u32 {
        match self.organization {
            Organization::FullyAssociative => 0,
            _ => addrdec::logb2(self.num_sets()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, ConfigError, Organization};
    use crate::cache::replacement;

    fn direct_mapped(size: u64, block_size: u64) -> Config {
        Config {
            organization: Organization::DirectMapped,
            size,
            block_size,
            associativity: 1,
            ..Config::default()
        }
    }

    #[test]
    fn derived_geometry() {
        let dm = direct_mapped(32 * 1024, 64);
        assert_eq!(dm.num_sets(), 512);
        assert_eq!(dm.num_ways(), 1);
        assert_eq!(dm.offset_bits(), 6);
        assert_eq!(dm.index_bits(), 9);

        let sa = Config {
            organization: Organization::SetAssociative,
            size: 32 * 1024,
            block_size: 64,
            associativity: 4,
            ..Config::default()
        };
        assert_eq!(sa.num_sets(), 128);
        assert_eq!(sa.num_ways(), 4);
        assert_eq!(sa.index_bits(), 7);

        let fa = Config {
            organization: Organization::FullyAssociative,
            size: 1024,
            block_size: 64,
            ..Config::default()
        };
        assert_eq!(fa.num_sets(), 1);
        assert_eq!(fa.num_ways(), 16);
        assert_eq!(fa.index_bits(), 0);
    }

    #[test]
    fn one_entry_cache() {
        // block size == size: a single set with a single way
        let config = direct_mapped(64, 64);
        assert!(config.validate().is_ok());
        assert_eq!(config.num_sets(), 1);
        assert_eq!(config.num_ways(), 1);
        assert_eq!(config.index_bits(), 0);
    }

    #[test]
    fn rejects_non_power_of_two_size() {
        let config = direct_mapped(3000, 64);
        assert_eq!(config.validate(), Err(ConfigError::BadSize(3000)));
    }

    #[test]
    fn rejects_non_power_of_two_block() {
        let config = direct_mapped(4096, 48);
        assert_eq!(config.validate(), Err(ConfigError::BadBlockSize(48)));
    }

    #[test]
    fn rejects_oversized_associativity() {
        let config = Config {
            organization: Organization::SetAssociative,
            size: 256,
            block_size: 64,
            associativity: 8,
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::TooManyWays {
                associativity: 8,
                num_blocks: 4,
            })
        );
    }

    #[test]
    fn associativity_equal_to_num_blocks_is_fully_associative() {
        let config = Config {
            organization: Organization::SetAssociative,
            size: 256,
            block_size: 64,
            associativity: 4,
            policy: replacement::Kind::FIFO,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.num_sets(), 1);
        assert_eq!(config.num_ways(), 4);
    }
}
