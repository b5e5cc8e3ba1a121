//! Multi-level cache hierarchy.
//!
//! Levels are ordered closest-to-CPU first; main memory sits below the
//! last level and is accessed by the caller when [`Hierarchy::access`]
//! reports a miss in every level. The hierarchy drives all cross-level
//! movement itself: exclusive promotion and victim caching, inclusive
//! back-invalidation, and write-through forwarding. Blocks move between
//! levels as value copies, never as shared references.

use crate::cache::{Cache, ConfigError, Entry, InclusionPolicy};
use crate::trace::AccessKind;
use crate::address;

/// Block displaced from L1 during the current access.
///
/// Lives for exactly one [`Hierarchy::access`] call; an exclusive L2
/// consumes it as a victim-cache install.
#[derive(Debug, Clone, Copy)]
struct Eviction {
    addr: address,
    entry: Entry,
}

/// An ordered tower of cache levels.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    levels: Vec<Cache>,
}

impl Hierarchy {
    pub fn new(levels: Vec<Cache>) -> Result<Self, ConfigError> {
        if levels.is_empty() {
            return Err(ConfigError::EmptyHierarchy);
        }
        Ok(Self { levels })
    }

    #[must_use]
    pub fn levels(&self) -> &[Cache] {
        &self.levels
    }

    #[must_use]
    pub fn level(&self, index: usize) -> &Cache {
        &self.levels[index]
    }

    /// Propagate one memory reference through the hierarchy.
    ///
    /// Returns the accumulated cache latency and whether any level hit.
    /// On a full miss the caller is responsible for the main-memory
    /// access and its latency.
    pub fn access(&mut self, addr: address, kind: AccessKind) -> (u64, bool) {
        let num_levels = self.levels.len();
        let exclusive_l2 = num_levels > 1
            && self.levels[1].config().inclusion_policy == InclusionPolicy::Exclusive;
        // L1 residency before the access; the exclusive single-copy
        // invariant is checked against it below.
        let was_in_l1 = exclusive_l2 && self.levels[0].contains(addr);

        let mut tracker: Option<Eviction> = None;
        let mut total_latency = 0;
        let mut hit_level: Option<usize> = None;

        let outcome = self.levels[0].access(addr, kind);
        total_latency += outcome.latency;
        if exclusive_l2 {
            if let (Some(evicted), Some(entry)) = (outcome.evicted_address, outcome.evicted_entry) {
                tracker = Some(Eviction {
                    addr: evicted,
                    entry,
                });
            }
        }

        if outcome.hit {
            hit_level = Some(0);
        } else {
            for level in 1..num_levels {
                let outcome = self.levels[level].access(addr, kind);
                total_latency += outcome.latency;
                if outcome.hit {
                    if self.levels[level].config().inclusion_policy == InclusionPolicy::Exclusive {
                        self.promote(addr, level, kind, &mut tracker);
                    }
                    hit_level = Some(level);
                    break;
                }
                // the missing level allocated; an inclusive level that
                // displaced a victim must push it out of the upper levels
                if self.levels[level].config().inclusion_policy == InclusionPolicy::Inclusive {
                    if let Some(evicted) = outcome.evicted_address {
                        self.back_invalidate(evicted, level);
                    }
                }
            }
        }

        // Full miss: the per-level accesses above also allocated into
        // exclusive levels; drop those copies so the block lives in L1 only.
        if hit_level.is_none() && (kind.is_read() || self.levels[0].config().write_allocate) {
            for level in 1..num_levels {
                if self.levels[level].config().inclusion_policy == InclusionPolicy::Exclusive {
                    self.levels[level].invalidate(addr);
                }
            }
        }

        // write-through levels forward write hits one level down
        if let Some(level) = hit_level {
            if kind.is_write() && !self.levels[level].config().write_back {
                total_latency += self.propagate_write_through(addr, level);
            }
        }

        // victim caching: the block displaced from L1 moves into exclusive
        // L2 unless it is the very block this access fetched
        if exclusive_l2 {
            if let Some(eviction) = tracker.take() {
                let fetched = self.levels[0].block_addr(addr);
                if self.levels[0].block_addr(eviction.addr) != fetched {
                    log::trace!("hierarchy::victim_cache({:#x})", eviction.addr);
                    self.levels[1].force_install(eviction.addr, eviction.entry, AccessKind::Write);
                }
            }
        }

        if exclusive_l2 {
            debug_assert!(
                !(self.levels[0].contains(addr) && self.levels[1].contains(addr)),
                "block {addr:#x} resident in both L1 and exclusive L2 (in L1 before access: {was_in_l1})",
            );
        }

        (total_latency, hit_level.is_some())
    }

    /// Move the block that hit in exclusive `level` up into L1.
    fn promote(
        &mut self,
        addr: address,
        level: usize,
        kind: AccessKind,
        tracker: &mut Option<Eviction>,
    ) {
        let entry = match self.levels[level].get_entry(addr) {
            Some(entry) => entry,
            None => return,
        };
        log::trace!("hierarchy::promote({addr:#x}) from L{}", level + 1);
        self.levels[level].invalidate(addr);
        let outcome = self.levels[0].force_install(addr, entry, kind);
        if let (Some(evicted), Some(entry)) = (outcome.evicted_address, outcome.evicted_entry) {
            *tracker = Some(Eviction {
                addr: evicted,
                entry,
            });
        }
    }

    /// Forward a write hit at write-through `level` to the level below.
    ///
    /// Exclusive lower levels are skipped: they must not re-acquire a
    /// block the upper level holds. Propagation ends at the last cache
    /// level; main-memory traffic stays miss-driven.
    fn propagate_write_through(&mut self, addr: address, level: usize) -> u64 {
        let next = level + 1;
        if next >= self.levels.len() {
            return 0;
        }
        if self.levels[next].config().inclusion_policy == InclusionPolicy::Exclusive {
            return 0;
        }
        let outcome = self.levels[next].access(addr, AccessKind::Write);
        if self.levels[next].config().inclusion_policy == InclusionPolicy::Inclusive {
            if let Some(evicted) = outcome.evicted_address {
                self.back_invalidate(evicted, next);
            }
        }
        outcome.latency
    }

    /// Remove `addr` from every level above `from_level`.
    fn back_invalidate(&mut self, addr: address, from_level: usize) {
        log::trace!("hierarchy::back_invalidate({addr:#x}) below L{}", from_level + 1);
        for level in &mut self.levels[..from_level] {
            level.invalidate(addr);
        }
    }

    /// Reset every level: entries, statistics, and replacement state.
    pub fn reset(&mut self) {
        for level in &mut self.levels {
            level.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Hierarchy;
    use crate::cache::{Cache, Config, InclusionPolicy, Organization};
    use crate::trace::AccessKind::{Read, Write};

    fn level(size: u64, associativity: u64, latency: u64, inclusion: InclusionPolicy) -> Cache {
        Cache::new(Config {
            organization: Organization::SetAssociative,
            size,
            block_size: 64,
            associativity,
            access_latency: latency,
            inclusion_policy: inclusion,
            ..Config::default()
        })
        .unwrap()
    }

    /// L1 4KB 4-way, L2 8KB 8-way, 64B blocks.
    fn two_level(inclusion: InclusionPolicy) -> Hierarchy {
        Hierarchy::new(vec![
            level(4096, 4, 1, InclusionPolicy::Inclusive),
            level(8192, 8, 10, inclusion),
        ])
        .unwrap()
    }

    // L1 has 16 sets, L2 has 16 sets; stepping by 16 * 64 bytes keeps
    // every address in set 0 of both levels.
    const SET_STRIDE: u64 = 16 * 64;

    #[test]
    fn empty_hierarchy_is_rejected() {
        assert!(Hierarchy::new(vec![]).is_err());
    }

    #[test]
    fn l1_hit_stops_the_search() {
        let mut hierarchy = two_level(InclusionPolicy::Inclusive);
        let (latency, hit) = hierarchy.access(0x1000, Read);
        assert!(!hit);
        assert_eq!(latency, 1 + 10);

        let (latency, hit) = hierarchy.access(0x1000, Read);
        assert!(hit);
        assert_eq!(latency, 1);
        assert_eq!(hierarchy.level(1).stats().accesses(), 1);
    }

    #[test]
    fn l2_hit_after_l1_eviction() {
        let mut hierarchy = two_level(InclusionPolicy::Inclusive);
        hierarchy.access(0x1000, Read);
        // evict 0x1000 from L1 (4 ways, 5 conflicting blocks)
        for i in 1..=4 {
            hierarchy.access(0x1000 + i * SET_STRIDE, Read);
        }
        assert!(!hierarchy.level(0).contains(0x1000));
        assert!(hierarchy.level(1).contains(0x1000));

        let (latency, hit) = hierarchy.access(0x1000, Read);
        assert!(hit);
        assert_eq!(latency, 1 + 10);
        // inclusive: the block stays in L2
        assert!(hierarchy.level(1).contains(0x1000));
    }

    #[test]
    fn inclusive_fill_populates_both_levels() {
        let mut hierarchy = two_level(InclusionPolicy::Inclusive);
        hierarchy.access(0x1000, Read);
        assert!(hierarchy.level(0).contains(0x1000));
        assert!(hierarchy.level(1).contains(0x1000));
    }

    #[test]
    fn inclusive_back_invalidation() {
        let mut hierarchy = two_level(InclusionPolicy::Inclusive);
        let base = 0x1000u64;
        hierarchy.access(base, Read);

        // 8 more conflicting blocks overflow the 8-way L2 set and evict
        // the oldest block
        for i in 1..=8 {
            hierarchy.access(base + i * SET_STRIDE, Read);
        }
        assert!(!hierarchy.level(1).contains(base));
        // inclusion restored: the block also left L1
        assert!(!hierarchy.level(0).contains(base));

        // every L1-resident block is still L2 resident
        for i in 0..=8 {
            let addr = base + i * SET_STRIDE;
            if hierarchy.level(0).contains(addr) {
                assert!(hierarchy.level(1).contains(addr), "addr {addr:#x}");
            }
        }
    }

    #[test]
    fn exclusive_fill_lands_in_l1_only() {
        let mut hierarchy = two_level(InclusionPolicy::Exclusive);
        let (_, hit) = hierarchy.access(0x1000, Read);
        assert!(!hit);
        assert!(hierarchy.level(0).contains(0x1000));
        assert!(!hierarchy.level(1).contains(0x1000));
    }

    #[test]
    fn exclusive_victim_caching() {
        let mut hierarchy = two_level(InclusionPolicy::Exclusive);
        let x = 0x1000u64;
        hierarchy.access(x, Read);

        // overflow the 4-way L1 set: x is evicted and victim-cached in L2
        for i in 1..=4 {
            hierarchy.access(x + i * SET_STRIDE, Read);
        }
        assert!(!hierarchy.level(0).contains(x));
        assert!(hierarchy.level(1).contains(x));

        // L2 hit moves x back to L1 and removes it from L2
        let (_, hit) = hierarchy.access(x, Read);
        assert!(hit);
        assert!(hierarchy.level(0).contains(x));
        assert!(!hierarchy.level(1).contains(x));
    }

    #[test]
    fn exclusive_no_block_in_both_levels_ever() {
        let mut hierarchy = two_level(InclusionPolicy::Exclusive);
        let base = 0x1000u64;
        let addrs: Vec<u64> = (0..12).map(|i| base + i * SET_STRIDE).collect();
        // mixed read/write workload with plenty of L1 overflow
        for round in 0..4 {
            for (i, &addr) in addrs.iter().enumerate() {
                let kind = if (i + round) % 3 == 0 { Write } else { Read };
                hierarchy.access(addr, kind);
                for &check in &addrs {
                    assert!(
                        !(hierarchy.level(0).contains(check)
                            && hierarchy.level(1).contains(check)),
                        "block {check:#x} in both levels",
                    );
                }
            }
        }
    }

    #[test]
    fn exclusive_promotion_keeps_dirty_data() {
        let mut hierarchy = two_level(InclusionPolicy::Exclusive);
        let x = 0x1000u64;
        hierarchy.access(x, Write);
        // push the dirty block down into L2
        for i in 1..=4 {
            hierarchy.access(x + i * SET_STRIDE, Read);
        }
        assert!(hierarchy.level(1).get_entry(x).unwrap().dirty);

        // promotion carries the dirty flag back up
        hierarchy.access(x, Read);
        assert!(hierarchy.level(0).get_entry(x).unwrap().dirty);
        assert!(!hierarchy.level(1).contains(x));
    }

    #[test]
    fn nine_levels_fill_independently() {
        // L1 larger than L2: both 16 sets, L1 8-way, L2 4-way
        let mut hierarchy = Hierarchy::new(vec![
            level(8192, 8, 1, InclusionPolicy::Inclusive),
            level(4096, 4, 10, InclusionPolicy::NINE),
        ])
        .unwrap();

        let base = 0x1000u64;
        hierarchy.access(base, Read);
        // NINE allocates on its own miss
        assert!(hierarchy.level(0).contains(base));
        assert!(hierarchy.level(1).contains(base));

        // overflow the 4-way L2 set while the 8-way L1 set still fits
        for i in 1..=4 {
            hierarchy.access(base + i * SET_STRIDE, Read);
        }
        assert!(!hierarchy.level(1).contains(base));
        // no back-invalidation: L1 keeps the block L2 dropped
        assert!(hierarchy.level(0).contains(base));
    }

    #[test]
    fn miss_counts_are_per_user_access() {
        let mut hierarchy = two_level(InclusionPolicy::Inclusive);
        for i in 0..10 {
            hierarchy.access(0x1000 + i * SET_STRIDE, Read);
        }
        assert_eq!(hierarchy.level(0).stats().accesses(), 10);
        assert_eq!(hierarchy.level(1).stats().accesses(), 10);
    }

    #[test]
    fn write_through_l1_forwards_write_hits() {
        let l1 = Cache::new(Config {
            organization: Organization::SetAssociative,
            size: 4096,
            block_size: 64,
            associativity: 4,
            access_latency: 1,
            write_back: false,
            ..Config::default()
        })
        .unwrap();
        let l2 = level(8192, 8, 10, InclusionPolicy::Inclusive);
        let mut hierarchy = Hierarchy::new(vec![l1, l2]).unwrap();

        hierarchy.access(0x1000, Read);
        let l2_accesses = hierarchy.level(1).stats().accesses();

        // write hit in write-through L1 reaches L2 as a synthetic write
        let (latency, hit) = hierarchy.access(0x1000, Write);
        assert!(hit);
        assert_eq!(latency, 1 + 10);
        assert_eq!(hierarchy.level(1).stats().accesses(), l2_accesses + 1);
        // write-through never dirties L1
        assert!(!hierarchy.level(0).get_entry(0x1000).unwrap().dirty);
    }

    #[test]
    fn three_level_inclusive_smoke() {
        let mut hierarchy = Hierarchy::new(vec![
            level(4096, 4, 1, InclusionPolicy::Inclusive),
            level(8192, 8, 10, InclusionPolicy::Inclusive),
            level(16384, 8, 30, InclusionPolicy::Inclusive),
        ])
        .unwrap();

        let (latency, hit) = hierarchy.access(0x1000, Read);
        assert!(!hit);
        assert_eq!(latency, 1 + 10 + 30);
        for i in 0..3 {
            assert!(hierarchy.level(i).contains(0x1000));
        }

        let (latency, hit) = hierarchy.access(0x1000, Read);
        assert!(hit);
        assert_eq!(latency, 1);
    }

    #[test]
    fn reset_clears_every_level() {
        let mut hierarchy = two_level(InclusionPolicy::Inclusive);
        hierarchy.access(0x1000, Write);
        hierarchy.reset();
        assert!(!hierarchy.level(0).contains(0x1000));
        assert!(!hierarchy.level(1).contains(0x1000));
        assert_eq!(hierarchy.level(0).stats().accesses(), 0);
        assert_eq!(hierarchy.level(1).stats().accesses(), 0);
    }
}
