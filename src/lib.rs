pub mod addrdec;
pub mod cache;
pub mod config;
pub mod dram;
pub mod hierarchy;
pub mod metrics;
pub mod trace;

pub use cache::{AccessOutcome, Cache, Config as CacheConfig};
pub use dram::MainMemory;
pub use hierarchy::Hierarchy;
pub use trace::{AccessKind, MemoryAccess};

/// A 64-bit memory address.
#[allow(non_camel_case_types)]
pub type address = u64;
