use serde::{Deserialize, Serialize};

/// Per-cache access statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cache {
    pub hits: u64,
    pub misses: u64,
}

impl Cache {
    /// Total number of accesses serviced.
    #[must_use]
    pub fn accesses(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of accesses that hit.
    ///
    /// A cache that saw no accesses reports a hit rate of zero.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        if self.accesses() == 0 {
            0.0
        } else {
            self.hits as f64 / self.accesses() as f64
        }
    }

    /// Fraction of accesses that missed, `1 - hit_rate()`.
    ///
    /// An idle level misses with probability one: its full latency weight
    /// propagates down the AMAT miss path.
    #[must_use]
    pub fn miss_rate(&self) -> f64 {
        1.0 - self.hit_rate()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl std::ops::AddAssign for Cache {
    fn add_assign(&mut self, other: Self) {
        self.hits += other.hits;
        self.misses += other.misses;
    }
}
