//! Replacement policies.
//!
//! Each variant keeps its own per-set bookkeeping. All variants prefer an
//! unoccupied way over evicting a live one, lowest-numbered first.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Replacement policy selector.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    #[default]
    LRU,
    FIFO,
    Random,
}

impl Kind {
    /// Look up a policy by its configuration name.
    ///
    /// Unknown names fall back to LRU.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "LRU" => Self::LRU,
            "FIFO" => Self::FIFO,
            "RANDOM" => Self::Random,
            other => {
                log::warn!("unknown replacement policy {other:?}, defaulting to LRU");
                Self::LRU
            }
        }
    }
}

/// Per-set victim selection state for one cache level.
#[derive(Clone, Debug)]
pub enum Policy {
    /// Recency order per set, most recently used at the back.
    LRU { stacks: Vec<Vec<usize>> },
    /// Insertion order per set, oldest installed at the front.
    /// Repeated accesses do not reorder the queue.
    FIFO { queues: Vec<VecDeque<usize>> },
    /// Occupancy bookkeeping only; full sets evict a uniformly random way.
    /// The seed is kept so `reset` restores the exact victim sequence.
    Random {
        occupied: Vec<Vec<bool>>,
        seed: u64,
        rng: StdRng,
    },
}

/// Lowest-numbered way not yet occupied, if any.
fn lowest_free(num_ways: usize, occupied: impl Fn(usize) -> bool) -> Option<usize> {
    (0..num_ways).find(|&way| !occupied(way))
}

impl Policy {
    #[must_use]
    pub fn new(kind: Kind, num_sets: usize, num_ways: usize) -> Self {
        Self::with_seed(kind, num_sets, num_ways, rand::random())
    }

    /// Build a policy with a deterministic random number generator.
    #[must_use]
    pub fn with_seed(kind: Kind, num_sets: usize, num_ways: usize, seed: u64) -> Self {
        match kind {
            Kind::LRU => Self::LRU {
                stacks: vec![Vec::new(); num_sets],
            },
            Kind::FIFO => Self::FIFO {
                queues: vec![VecDeque::new(); num_sets],
            },
            Kind::Random => Self::Random {
                occupied: vec![vec![false; num_ways]; num_sets],
                seed,
                rng: StdRng::seed_from_u64(seed),
            },
        }
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Self::LRU { .. } => Kind::LRU,
            Self::FIFO { .. } => Kind::FIFO,
            Self::Random { .. } => Kind::Random,
        }
    }

    /// Record that `way` of `set` was touched or installed.
    pub fn on_access(&mut self, set: usize, way: usize) {
        match self {
            Self::LRU { stacks } => {
                let stack = &mut stacks[set];
                stack.retain(|&w| w != way);
                stack.push(way);
            }
            Self::FIFO { queues } => {
                let queue = &mut queues[set];
                if !queue.contains(&way) {
                    queue.push_back(way);
                }
            }
            Self::Random { occupied, .. } => {
                occupied[set][way] = true;
            }
        }
    }

    /// Forget a way that was invalidated so it re-enters the empty-way
    /// preference.
    pub fn on_invalidate(&mut self, set: usize, way: usize) {
        match self {
            Self::LRU { stacks } => stacks[set].retain(|&w| w != way),
            Self::FIFO { queues } => queues[set].retain(|&w| w != way),
            Self::Random { occupied, .. } => occupied[set][way] = false,
        }
    }

    /// Select the way of `set` to replace next.
    pub fn victim(&mut self, set: usize, num_ways: usize) -> usize {
        match self {
            Self::LRU { stacks } => {
                let stack = &stacks[set];
                if let Some(way) = lowest_free(num_ways, |w| stack.contains(&w)) {
                    return way;
                }
                // least recently used sits at the front; the install that
                // follows moves it to the back via on_access
                stack[0]
            }
            Self::FIFO { queues } => {
                let queue = &mut queues[set];
                if let Some(way) = lowest_free(num_ways, |w| queue.contains(&w)) {
                    return way;
                }
                queue.pop_front().expect("full set has a queued way")
            }
            Self::Random { occupied, rng, .. } => {
                let occupied = &occupied[set];
                if let Some(way) = lowest_free(num_ways, |w| occupied[w]) {
                    return way;
                }
                rng.gen_range(0..num_ways)
            }
        }
    }

    pub fn reset(&mut self) {
        match self {
            Self::LRU { stacks } => {
                for stack in stacks {
                    stack.clear();
                }
            }
            Self::FIFO { queues } => {
                for queue in queues {
                    queue.clear();
                }
            }
            Self::Random {
                occupied,
                seed,
                rng,
            } => {
                for set in occupied {
                    set.fill(false);
                }
                // back to the seeded start: the victim sequence replays
                *rng = StdRng::seed_from_u64(*seed);
            }
        }
    }
}
