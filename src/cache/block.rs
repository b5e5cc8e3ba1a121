use crate::address;

/// One block slot in a cache set.
///
/// The simulator is statistical: blocks carry residency state but no
/// payload. Invariant: `dirty` implies `valid`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Entry {
    pub valid: bool,
    pub dirty: bool,
    pub tag: address,
}

impl Entry {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::Entry;

    #[test]
    fn fresh_entry_is_invalid() {
        let entry = Entry::default();
        assert!(!entry.valid);
        assert!(!entry.dirty);
        assert_eq!(entry.tag, 0);
    }

    #[test]
    fn reset_clears_all_state() {
        let mut entry = Entry {
            valid: true,
            dirty: true,
            tag: 0xbeef,
        };
        entry.reset();
        assert_eq!(entry, Entry::default());
    }
}
