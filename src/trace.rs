//! Memory reference streams.
//!
//! A trace is a lazy, finite sequence of [`MemoryAccess`] values. File
//! traces parse `<hexaddr> <R|W>` lines; synthetic traces generate
//! addresses algorithmically; callback traces wrap arbitrary closures.

use crate::address;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek};
use std::path::{Path, PathBuf};

/// Read or write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessKind {
    Read,
    Write,
}

impl AccessKind {
    #[must_use]
    pub fn is_read(self) -> bool {
        matches!(self, Self::Read)
    }

    #[must_use]
    pub fn is_write(self) -> bool {
        matches!(self, Self::Write)
    }
}

/// One reference in a trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryAccess {
    pub addr: address,
    pub kind: AccessKind,
}

#[derive(thiserror::Error, Debug)]
pub enum TraceError {
    #[error("could not open trace file {path:?}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("i/o error reading trace")]
    Io(#[from] std::io::Error),
    #[error("invalid address {value:?} on line {line}")]
    BadAddress { line: u64, value: String },
    #[error("invalid access kind {value:?} on line {line}")]
    BadKind { line: u64, value: String },
    #[error("missing access kind on line {line}")]
    MissingKind { line: u64 },
    #[error("trace source cannot be cloned")]
    NotClonable,
}

/// A lazy, finite stream of memory references.
pub trait TraceSource {
    /// The next reference, or `None` at end of trace.
    fn next_access(&mut self) -> Result<Option<MemoryAccess>, TraceError>;

    /// Rewind to the first reference.
    fn reset(&mut self) -> Result<(), TraceError>;

    /// An independent, rewound copy. Some sources refuse.
    fn try_clone(&self) -> Result<Box<dyn TraceSource>, TraceError>;
}

/// Trace file reader.
///
/// One access per line: a hexadecimal address (optional `0x` prefix) and
/// an `R` or `W` marker, case-insensitive. Blank lines are skipped.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    reader: BufReader<File>,
    line: u64,
}

impl FileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| TraceError::Open {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            reader: BufReader::new(file),
            line: 0,
        })
    }
}

impl TraceSource for FileSource {
    fn next_access(&mut self) -> Result<Option<MemoryAccess>, TraceError> {
        let mut buf = String::new();
        loop {
            buf.clear();
            if self.reader.read_line(&mut buf)? == 0 {
                return Ok(None);
            }
            self.line += 1;

            let mut fields = buf.split_whitespace();
            let addr_field = match fields.next() {
                Some(field) => field,
                None => continue,
            };
            let digits = addr_field
                .strip_prefix("0x")
                .or_else(|| addr_field.strip_prefix("0X"))
                .unwrap_or(addr_field);
            let addr = u64::from_str_radix(digits, 16).map_err(|_| TraceError::BadAddress {
                line: self.line,
                value: addr_field.to_string(),
            })?;

            let kind = match fields.next() {
                Some(field) if field.eq_ignore_ascii_case("r") => AccessKind::Read,
                Some(field) if field.eq_ignore_ascii_case("w") => AccessKind::Write,
                Some(field) => {
                    return Err(TraceError::BadKind {
                        line: self.line,
                        value: field.to_string(),
                    })
                }
                None => return Err(TraceError::MissingKind { line: self.line }),
            };
            return Ok(Some(MemoryAccess { addr, kind }));
        }
    }

    fn reset(&mut self) -> Result<(), TraceError> {
        self.reader.rewind()?;
        self.line = 0;
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn TraceSource>, TraceError> {
        Ok(Box::new(Self::open(&self.path)?))
    }
}

/// Access pattern of a generated trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pattern {
    /// Walk `[start, end)` cyclically, one byte at a time.
    Sequential,
    /// Uniform draws from `[start, end)`.
    Random,
    /// Walk `[start, end)` cyclically in [`STRIDE`] byte steps.
    Strided,
    /// Cycle through a small pool of random addresses.
    Looping,
}

/// Stride of [`Pattern::Strided`], in bytes.
pub const STRIDE: u64 = 64;

/// Upper bound on the [`Pattern::Looping`] address pool.
const LOOP_POOL: u64 = 100;

/// Algorithmically generated reference stream.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    pattern: Pattern,
    start_address: u64,
    end_address: u64,
    num_accesses: u64,
    read_ratio: f64,
    position: u64,
    rng: StdRng,
    loop_pool: Vec<u64>,
}

impl SyntheticSource {
    /// Build a generator seeded from the system entropy pool.
    ///
    /// `start_address` must lie below `end_address`; the configuration
    /// loader rejects anything else.
    #[must_use]
    pub fn new(
        pattern: Pattern,
        start_address: u64,
        end_address: u64,
        num_accesses: u64,
        read_ratio: f64,
    ) -> Self {
        Self::with_rng(
            pattern,
            start_address,
            end_address,
            num_accesses,
            read_ratio,
            StdRng::from_entropy(),
        )
    }

    /// Build a deterministic generator for reproducible runs.
    #[must_use]
    pub fn with_seed(
        pattern: Pattern,
        start_address: u64,
        end_address: u64,
        num_accesses: u64,
        read_ratio: f64,
        seed: u64,
    ) -> Self {
        Self::with_rng(
            pattern,
            start_address,
            end_address,
            num_accesses,
            read_ratio,
            StdRng::seed_from_u64(seed),
        )
    }

    fn with_rng(
        pattern: Pattern,
        start_address: u64,
        end_address: u64,
        num_accesses: u64,
        read_ratio: f64,
        mut rng: StdRng,
    ) -> Self {
        debug_assert!(start_address < end_address);
        let mut loop_pool = Vec::new();
        if pattern == Pattern::Looping {
            let pool_size = LOOP_POOL.min(end_address - start_address);
            loop_pool = (0..pool_size)
                .map(|_| rng.gen_range(start_address..end_address))
                .collect();
        }
        Self {
            pattern,
            start_address,
            end_address,
            num_accesses,
            read_ratio,
            position: 0,
            rng,
            loop_pool,
        }
    }

    fn generate_address(&mut self) -> u64 {
        let span = self.end_address - self.start_address;
        match self.pattern {
            Pattern::Sequential => self.start_address + self.position % span,
            Pattern::Random => self.rng.gen_range(self.start_address..self.end_address),
            Pattern::Strided => self.start_address + (self.position * STRIDE) % span,
            Pattern::Looping => self.loop_pool[(self.position % self.loop_pool.len() as u64) as usize],
        }
    }

    fn generate_kind(&mut self) -> AccessKind {
        if self.rng.gen::<f64>() < self.read_ratio {
            AccessKind::Read
        } else {
            AccessKind::Write
        }
    }
}

impl TraceSource for SyntheticSource {
    fn next_access(&mut self) -> Result<Option<MemoryAccess>, TraceError> {
        if self.position >= self.num_accesses {
            return Ok(None);
        }
        let addr = self.generate_address();
        let kind = self.generate_kind();
        self.position += 1;
        Ok(Some(MemoryAccess { addr, kind }))
    }

    fn reset(&mut self) -> Result<(), TraceError> {
        // the loop pool is kept, so Looping repeats the same addresses
        self.position = 0;
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn TraceSource>, TraceError> {
        let mut copy = self.clone();
        copy.position = 0;
        Ok(Box::new(copy))
    }
}

/// Caller-supplied generator. Refuses to clone.
pub struct CallbackSource {
    generator: Box<dyn FnMut() -> Option<MemoryAccess>>,
    rewind: Box<dyn FnMut()>,
}

impl CallbackSource {
    pub fn new(
        generator: impl FnMut() -> Option<MemoryAccess> + 'static,
        rewind: impl FnMut() + 'static,
    ) -> Self {
        Self {
            generator: Box::new(generator),
            rewind: Box::new(rewind),
        }
    }
}

impl std::fmt::Debug for CallbackSource {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("CallbackSource").finish_non_exhaustive()
    }
}

impl TraceSource for CallbackSource {
    fn next_access(&mut self) -> Result<Option<MemoryAccess>, TraceError> {
        Ok((self.generator)())
    }

    fn reset(&mut self) -> Result<(), TraceError> {
        (self.rewind)();
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn TraceSource>, TraceError> {
        Err(TraceError::NotClonable)
    }
}
