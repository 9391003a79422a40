/// `Hunk` is one run of differing bytes. Either side may be shorter than
/// the other where the inputs have different lengths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    /// Offset of the first differing byte.
    pub offset: usize,
    /// Bytes in the old payload over the run (clipped to its length).
    pub old: Vec<u8>,
    /// Bytes in the new payload over the run (clipped to its length).
    pub new: Vec<u8>,
}

impl Hunk {
    fn new(old: &[u8], new: &[u8], start: usize, end: usize) -> Self {
        let clip = |b: &[u8]| b[start.min(b.len())..end.min(b.len())].to_vec();
        Self {
            offset: start,
            old: clip(old),
            new: clip(new),
        }
    }

    /// One past the last offset covered.
    #[must_use]
    pub fn end(&self) -> usize {
        self.offset + self.old.len().max(self.new.len())
    }
}

/// Every maximal run where `old` and `new` differ, in ascending order.
/// A position only one side has counts as different.
#[must_use]
pub fn diff(old: &[u8], new: &[u8]) -> Vec<Hunk> {
    diff_coalesced(old, new, 0)
}

/// Like `diff` but runs separated by fewer than `gap` equal bytes are
/// merged, the equal bytes included.
#[must_use]
pub fn diff_coalesced(old: &[u8], new: &[u8], gap: usize) -> Vec<Hunk> {
    let len = old.len().max(new.len());
    let differs = |i: usize| old.get(i) != new.get(i);

    let mut runs: Vec<(usize, usize)> = Vec::new();
    let mut i = 0;
    while i < len {
        if !differs(i) {
            i += 1;
            continue;
        }
        let start = i;
        while i < len && differs(i) {
            i += 1;
        }
        match runs.last_mut() {
            Some(last) if start - last.1 < gap => last.1 = i,
            _ => runs.push((start, i)),
        }
    }
    runs.into_iter()
        .map(|(start, end)| Hunk::new(old, new, start, end))
        .collect()
}
