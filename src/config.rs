//! Test configuration loading.
//!
//! A configuration file is a JSON document naming one test: the cache
//! hierarchy (closest-to-CPU first), the main-memory latency, and the
//! trace driving it.

use crate::cache::{self, Cache, InclusionPolicy, Organization};
use crate::dram::MainMemory;
use crate::hierarchy::Hierarchy;
use crate::trace::{FileSource, Pattern, SyntheticSource, TraceSource};

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not open config file {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("config file {path:?}: cache_hierarchy must not be empty")]
    EmptyHierarchy { path: PathBuf },
    #[error("config file {path:?}, level {level}: {source}")]
    Cache {
        path: PathBuf,
        level: u64,
        #[source]
        source: cache::ConfigError,
    },
    #[error("config file {path:?}: read_ratio {value} outside [0, 1]")]
    ReadRatio { path: PathBuf, value: f64 },
    #[error("config file {path:?}: start_address must be below end_address")]
    AddressRange { path: PathBuf },
    #[error(transparent)]
    Trace(#[from] crate::trace::TraceError),
}

/// One test: a named hierarchy, memory, and trace.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestConfig {
    pub test_name: String,
    pub cache_hierarchy: Vec<CacheSpec>,
    pub memory: MemorySpec,
    pub trace: TraceSpec,
    #[serde(skip)]
    path: PathBuf,
}

/// One cache level as configured on disk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheSpec {
    pub level: u64,
    pub organization: Organization,
    pub size: u64,
    pub block_size: u64,
    pub associativity: u64,
    /// Replacement policy name; unknown names fall back to LRU.
    pub policy: String,
    pub access_latency: u64,
    pub write_back: bool,
    pub write_allocate: bool,
    #[serde(default)]
    pub inclusion_policy: Option<InclusionPolicy>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MemorySpec {
    pub access_latency: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TraceSpec {
    File {
        filename: PathBuf,
    },
    Synthetic {
        pattern: Pattern,
        start_address: u64,
        end_address: u64,
        num_accesses: u64,
        read_ratio: f64,
    },
}

impl TestConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| Error::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.path = path.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.cache_hierarchy.is_empty() {
            return Err(Error::EmptyHierarchy {
                path: self.path.clone(),
            });
        }
        if let TraceSpec::Synthetic {
            read_ratio,
            start_address,
            end_address,
            ..
        } = self.trace
        {
            if !(0.0..=1.0).contains(&read_ratio) {
                return Err(Error::ReadRatio {
                    path: self.path.clone(),
                    value: read_ratio,
                });
            }
            if start_address >= end_address {
                return Err(Error::AddressRange {
                    path: self.path.clone(),
                });
            }
        }
        Ok(())
    }

    /// Instantiate the configured hierarchy.
    pub fn build_hierarchy(&self) -> Result<Hierarchy, Error> {
        let mut levels = Vec::with_capacity(self.cache_hierarchy.len());
        for spec in &self.cache_hierarchy {
            levels.push(spec.build(&self.path)?);
        }
        Hierarchy::new(levels).map_err(|source| Error::Cache {
            path: self.path.clone(),
            level: 0,
            source,
        })
    }

    #[must_use]
    pub fn build_memory(&self) -> MainMemory {
        MainMemory::new(self.memory.access_latency)
    }

    /// Instantiate the configured trace source.
    pub fn build_trace(&self) -> Result<Box<dyn TraceSource>, Error> {
        match &self.trace {
            TraceSpec::File { filename } => Ok(Box::new(FileSource::open(filename)?)),
            TraceSpec::Synthetic {
                pattern,
                start_address,
                end_address,
                num_accesses,
                read_ratio,
            } => Ok(Box::new(SyntheticSource::new(
                *pattern,
                *start_address,
                *end_address,
                *num_accesses,
                *read_ratio,
            ))),
        }
    }
}

impl CacheSpec {
    fn build(&self, path: &Path) -> Result<Cache, Error> {
        if self.level <= 1 && self.inclusion_policy.is_some() {
            log::warn!(
                "{}: inclusion_policy on L{} is ignored; level 1 is inclusive of nothing",
                path.display(),
                self.level,
            );
        }
        let inclusion_policy = if self.level <= 1 {
            InclusionPolicy::Inclusive
        } else {
            self.inclusion_policy.unwrap_or_default()
        };
        let config = cache::Config {
            organization: self.organization,
            size: self.size,
            block_size: self.block_size,
            associativity: self.associativity,
            policy: cache::ReplacementKind::from_name(&self.policy),
            access_latency: self.access_latency,
            write_back: self.write_back,
            write_allocate: self.write_allocate,
            inclusion_policy,
        };
        Cache::new(config).map_err(|source| Error::Cache {
            path: path.to_path_buf(),
            level: self.level,
            source,
        })
    }
}
