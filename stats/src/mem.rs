use serde::{Deserialize, Serialize};

/// Main memory traffic counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mem {
    pub reads: u64,
    pub writes: u64,
}

impl Mem {
    #[must_use]
    pub fn accesses(&self) -> u64 {
        self.reads + self.writes
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl std::ops::AddAssign for Mem {
    fn add_assign(&mut self, other: Self) {
        self.reads += other.reads;
        self.writes += other.writes;
    }
}
