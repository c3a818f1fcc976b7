//! PositionBatch: per-line byte/character metadata for up to B consecutive lines.
//!
//! Checkpoints of all lines are stored in one flat vector; `checkpoint_ends[i]` is the
//! exclusive end of line `i`'s slice. Entry `j` of a line's slice is the byte offset of the
//! line's character `j * K`, so entry 0 is where the line starts.

/// Immutable once handed to the index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionBatch {
    checkpoints: Vec<u64>,
    checkpoint_ends: Vec<usize>,
    byte_lengths: Vec<u64>,
    char_lengths: Vec<u64>,
}

impl PositionBatch {
    fn with_capacity(lines: usize) -> Self {
        Self {
            checkpoints: Vec::with_capacity(lines),
            checkpoint_ends: Vec::with_capacity(lines),
            byte_lengths: Vec::with_capacity(lines),
            char_lengths: Vec::with_capacity(lines),
        }
    }

    /// Number of populated lines.
    pub fn count(&self) -> usize {
        self.byte_lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.byte_lengths.is_empty()
    }

    /// Byte offsets of every K-th character of the line. Never empty.
    pub fn checkpoints(&self, line: usize) -> &[u64] {
        let start = if line == 0 { 0 } else { self.checkpoint_ends[line - 1] };
        &self.checkpoints[start..self.checkpoint_ends[line]]
    }

    /// Bytes in the line, without its terminator.
    pub fn byte_length(&self, line: usize) -> u64 {
        self.byte_lengths[line]
    }

    /// Characters in the line, without its terminator.
    pub fn char_length(&self, line: usize) -> u64 {
        self.char_lengths[line]
    }

    /// Byte offset just past the last character of the last line (0 when empty).
    pub fn end_offset(&self) -> u64 {
        match self.count() {
            0 => 0,
            n => self.checkpoints(n - 1)[0] + self.byte_lengths[n - 1],
        }
    }

    pub(super) fn push(&mut self, checkpoints: &[u64], byte_length: u64, char_length: u64) {
        debug_assert!(!checkpoints.is_empty(), "a line always has its start offset");
        debug_assert!(checkpoints.windows(2).all(|w| w[0] < w[1]), "checkpoints must increase");
        self.checkpoints.extend_from_slice(checkpoints);
        self.checkpoint_ends.push(self.checkpoints.len());
        self.byte_lengths.push(byte_length);
        self.char_lengths.push(char_length);
    }

    pub(super) fn pop(&mut self) {
        if self.checkpoint_ends.pop().is_some() {
            let end = self.checkpoint_ends.last().copied().unwrap_or(0);
            self.checkpoints.truncate(end);
            self.byte_lengths.pop();
            self.char_lengths.pop();
        }
    }

    /// Appends lines `range` of `other`.
    pub(super) fn extend_from(&mut self, other: &PositionBatch, range: std::ops::Range<usize>) {
        for line in range {
            self.push(other.checkpoints(line), other.byte_length(line), other.char_length(line));
        }
    }
}

/// The batch the scanner is filling. Pre-allocated to capacity B.
///
/// The last record may be provisional: the partial metadata of a line whose terminator has
/// not been seen yet. The next `push_line` replaces it, and freezing drops it.
#[derive(Debug, Clone)]
pub struct MutableBatch {
    batch: PositionBatch,
    capacity: usize,
    provisional: bool,
}

impl MutableBatch {
    pub fn new(capacity: usize) -> Self {
        Self {
            batch: PositionBatch::with_capacity(capacity),
            capacity,
            provisional: false,
        }
    }

    /// Records, including a provisional last one.
    pub fn count(&self) -> usize {
        self.batch.count()
    }

    /// Lines whose terminator (or end of file) has been seen.
    pub fn complete_count(&self) -> usize {
        self.batch.count() - usize::from(self.provisional)
    }

    pub fn has_provisional(&self) -> bool {
        self.provisional
    }

    pub fn is_full(&self) -> bool {
        self.complete_count() >= self.capacity
    }

    pub fn as_batch(&self) -> &PositionBatch {
        &self.batch
    }

    /// Records a finished line, replacing the provisional record if there is one.
    pub fn push_line(&mut self, checkpoints: &[u64], byte_length: u64, char_length: u64) {
        debug_assert!(!self.is_full(), "batch is already full");
        if self.provisional {
            self.batch.pop();
            self.provisional = false;
        }
        self.batch.push(checkpoints, byte_length, char_length);
    }

    /// Records (or refreshes) the partial metadata of the line being scanned.
    pub fn set_provisional(&mut self, checkpoints: &[u64], byte_length: u64, char_length: u64) {
        if self.provisional {
            self.batch.pop();
        }
        self.batch.push(checkpoints, byte_length, char_length);
        self.provisional = true;
    }

    /// Copy-freeze: returns the complete lines and leaves an empty batch behind.
    pub fn freeze(&mut self) -> PositionBatch {
        if self.provisional {
            self.batch.pop();
            self.provisional = false;
        }
        std::mem::replace(&mut self.batch, PositionBatch::with_capacity(self.capacity))
    }
}
