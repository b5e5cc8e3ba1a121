use crate::address;
use crate::trace::AccessKind;

/// Main memory behind the last cache level.
///
/// Contents are not modeled; the memory is a fixed access latency plus
/// read/write traffic counters.
#[derive(Debug, Clone)]
pub struct MainMemory {
    access_latency: u64,
    stats: stats::Mem,
}

impl MainMemory {
    #[must_use]
    pub fn new(access_latency: u64) -> Self {
        Self {
            access_latency,
            stats: stats::Mem::default(),
        }
    }

    /// Service one access, returning the fixed latency.
    pub fn access(&mut self, _addr: address, kind: AccessKind) -> u64 {
        if kind.is_write() {
            self.stats.writes += 1;
        } else {
            self.stats.reads += 1;
        }
        self.access_latency
    }

    #[must_use]
    pub fn access_latency(&self) -> u64 {
        self.access_latency
    }

    #[must_use]
    pub fn stats(&self) -> &stats::Mem {
        &self.stats
    }

    pub fn reset(&mut self) {
        self.stats.reset();
    }
}
