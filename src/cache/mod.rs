pub mod block;
pub mod config;
pub mod replacement;

pub use block::Entry;
pub use config::{Config, ConfigError, InclusionPolicy, Organization};
pub use replacement::Kind as ReplacementKind;

use crate::trace::AccessKind;
use crate::{addrdec, address};
use replacement::Policy;

/// Outcome of one cache-level operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessOutcome {
    pub hit: bool,
    /// This level's access latency, charged on hits and misses alike.
    pub latency: u64,
    /// A dirty victim was displaced and must be written back.
    pub writeback: bool,
    /// Block address of a displaced valid entry.
    pub evicted_address: Option<address>,
    /// Copy of the displaced entry, for victim caching.
    pub evicted_entry: Option<Entry>,
}

/// One set-associative cache level.
///
/// Way `w` of set `s` lives at `lines[s * num_ways + w]`.
#[derive(Debug, Clone)]
pub struct Cache {
    config: Config,
    policy: Policy,
    lines: Vec<Entry>,
    stats: stats::Cache,
    num_ways: u64,
    offset_bits: u32,
    index_bits: u32,
}

impl Cache {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let num_sets = config.num_sets();
        let num_ways = config.num_ways();
        let policy = Policy::new(config.policy, num_sets as usize, num_ways as usize);
        Ok(Self {
            offset_bits: config.offset_bits(),
            index_bits: config.index_bits(),
            lines: vec![Entry::default(); (num_sets * num_ways) as usize],
            stats: stats::Cache::default(),
            num_ways,
            policy,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn stats(&self) -> &stats::Cache {
        &self.stats
    }

    /// The block address containing `addr`.
    #[must_use]
    pub fn block_addr(&self, addr: address) -> address {
        addr & !(self.config.block_size - 1)
    }

    fn decode(&self, addr: address) -> (u64, u64) {
        (
            addrdec::set_index(addr, self.offset_bits, self.index_bits),
            addrdec::tag(addr, self.offset_bits, self.index_bits),
        )
    }

    fn line_index(&self, set: u64, way: u64) -> usize {
        (set * self.num_ways + way) as usize
    }

    fn find(&self, set: u64, tag: u64) -> Option<u64> {
        (0..self.num_ways).find(|&way| {
            let line = &self.lines[self.line_index(set, way)];
            line.valid && line.tag == tag
        })
    }

    /// Pure lookup. Does not touch statistics or replacement state.
    #[must_use]
    pub fn probe(&self, addr: address) -> Option<(u64, u64)> {
        let (set, tag) = self.decode(addr);
        self.find(set, tag).map(|way| (set, way))
    }

    #[must_use]
    pub fn contains(&self, addr: address) -> bool {
        self.probe(addr).is_some()
    }

    /// A copy of the entry holding `addr`, if resident.
    #[must_use]
    pub fn get_entry(&self, addr: address) -> Option<Entry> {
        self.probe(addr)
            .map(|(set, way)| self.lines[self.line_index(set, way)])
    }

    /// Service one user reference.
    pub fn access(&mut self, addr: address, kind: AccessKind) -> AccessOutcome {
        let (set, tag) = self.decode(addr);
        let mut outcome = AccessOutcome {
            latency: self.config.access_latency,
            ..AccessOutcome::default()
        };

        if let Some(way) = self.find(set, tag) {
            log::trace!("cache::access({addr:#x}, {kind:?}) => HIT set={set} way={way}");
            self.stats.hits += 1;
            self.policy.on_access(set as usize, way as usize);
            if kind.is_write() && self.config.write_back {
                let idx = self.line_index(set, way);
                self.lines[idx].dirty = true;
            }
            outcome.hit = true;
            return outcome;
        }

        log::trace!("cache::access({addr:#x}, {kind:?}) => MISS set={set} tag={tag:#x}");
        self.stats.misses += 1;
        if kind.is_read() || self.config.write_allocate {
            self.allocate(set, tag, kind, &mut outcome);
        }
        outcome
    }

    fn allocate(&mut self, set: u64, tag: u64, kind: AccessKind, outcome: &mut AccessOutcome) {
        let way = self.policy.victim(set as usize, self.num_ways as usize) as u64;
        let index = self.line_index(set, way);
        let victim = self.lines[index];
        if victim.valid {
            self.record_eviction(set, victim, outcome);
        }
        self.lines[index] = Entry {
            valid: true,
            dirty: kind.is_write() && self.config.write_back,
            tag,
        };
        self.policy.on_access(set as usize, way as usize);
    }

    fn record_eviction(&self, set: u64, victim: Entry, outcome: &mut AccessOutcome) {
        let evicted = addrdec::reconstruct(victim.tag, set, self.offset_bits, self.index_bits);
        log::trace!(
            "cache::evict({evicted:#x}) set={set} dirty={} writeback={}",
            victim.dirty,
            self.config.write_back && victim.dirty,
        );
        outcome.evicted_address = Some(evicted);
        outcome.evicted_entry = Some(victim);
        if self.config.write_back && victim.dirty {
            outcome.writeback = true;
        }
    }

    /// Install a caller-provided entry, bypassing hit/miss accounting.
    ///
    /// Used by the hierarchy for victim caching and exclusive promotion.
    /// The installed entry keeps its dirty flag; a write install into a
    /// write-back cache forces it on.
    pub fn force_install(&mut self, addr: address, entry: Entry, kind: AccessKind) -> AccessOutcome {
        let (set, tag) = self.decode(addr);
        let mut outcome = AccessOutcome {
            latency: self.config.access_latency,
            ..AccessOutcome::default()
        };

        let way = match self.find(set, tag) {
            Some(way) => way,
            None => {
                let way = self.policy.victim(set as usize, self.num_ways as usize) as u64;
                let victim = self.lines[self.line_index(set, way)];
                if victim.valid {
                    self.record_eviction(set, victim, &mut outcome);
                }
                way
            }
        };

        let index = self.line_index(set, way);
        self.lines[index] = Entry {
            valid: true,
            dirty: entry.dirty || (kind.is_write() && self.config.write_back),
            tag,
        };
        self.policy.on_access(set as usize, way as usize);
        outcome
    }

    /// Drop the block holding `addr`, if resident.
    pub fn invalidate(&mut self, addr: address) {
        let (set, tag) = self.decode(addr);
        if let Some(way) = self.find(set, tag) {
            let idx = self.line_index(set, way);
            self.lines[idx].reset();
            self.policy.on_invalidate(set as usize, way as usize);
        }
    }

    /// All entries invalid, statistics zeroed, policy state forgotten.
    pub fn reset(&mut self) {
        for line in &mut self.lines {
            line.reset();
        }
        self.policy.reset();
        self.stats.reset();
    }
}
