//! LineIndex: append-only map from absolute line number to position metadata.
//!
//! Frozen batches are shared as `Arc<PositionBatch>` and never mutated after they are
//! appended, so a lookup only holds the lock long enough to clone one `Arc`. The filling tail
//! (`current`) is also an `Arc`: the scanner extends it copy-on-write through
//! `Arc::make_mut`, which copies only when a reader still holds the previous snapshot.
//! A reader therefore never observes a half-written record.

use std::ops::Range;
use std::sync::{Arc, RwLock};

use super::position_batch::{MutableBatch, PositionBatch};
use super::{CHARS_PER_CHECKPOINT, LINES_PER_BATCH, ViewerError};
use crate::ignore_poison::IgnoreRwPoison;

#[derive(Debug, Default)]
struct IndexState {
    frozen: Vec<Arc<PositionBatch>>,
    current: Option<Arc<PositionBatch>>,
    current_has_provisional: bool,
    line_count: usize,
    bytes_scanned: u64,
}

impl IndexState {
    fn refresh_totals(&mut self, lines_per_batch: usize) {
        let (lines, end) = match (&self.current, self.frozen.last()) {
            (Some(current), _) => (self.frozen.len() * lines_per_batch + current.count(), current.end_offset()),
            (None, Some(last)) => ((self.frozen.len() - 1) * lines_per_batch + last.count(), last.end_offset()),
            (None, None) => (0, 0),
        };
        self.line_count = lines;
        // An empty tail right after a freeze must not move the scanned-bytes mark backwards.
        self.bytes_scanned = self.bytes_scanned.max(end);
    }
}

pub struct LineIndex {
    lines_per_batch: usize,
    chars_per_checkpoint: u64,
    state: RwLock<IndexState>,
}

impl Default for LineIndex {
    fn default() -> Self {
        Self::new(LINES_PER_BATCH, CHARS_PER_CHECKPOINT)
    }
}

impl LineIndex {
    pub fn new(lines_per_batch: usize, chars_per_checkpoint: u64) -> Self {
        assert!(lines_per_batch > 0 && chars_per_checkpoint > 0, "index layout must be non-zero");
        Self {
            lines_per_batch,
            chars_per_checkpoint,
            state: RwLock::new(IndexState::default()),
        }
    }

    /// Checkpoint granularity K the scanner used.
    pub fn chars_per_checkpoint(&self) -> u64 {
        self.chars_per_checkpoint
    }

    /// Appends a finished batch and drops the superseded `current` tail.
    /// Returns the absolute line range the batch covers.
    pub fn append_finished_batch(&self, batch: PositionBatch) -> Range<usize> {
        let mut state = self.state.write_ignore_poison();
        let first = state.frozen.len() * self.lines_per_batch;
        let count = batch.count();
        state.frozen.push(Arc::new(batch));
        state.current = None;
        state.current_has_provisional = false;
        state.refresh_totals(self.lines_per_batch);
        first..first + count
    }

    /// Brings the observable tail up to date with the scanner's batch.
    ///
    /// Only the records added since the last call are copied. A provisional last record is
    /// replaced by whatever the scanner now has at that position. Returns the absolute line
    /// range that changed.
    pub fn update_current_preview(&self, partial: &MutableBatch) -> Range<usize> {
        let mut state = self.state.write_ignore_poison();
        let base = state.frozen.len() * self.lines_per_batch;
        let had_provisional = state.current_has_provisional;
        let tail = Arc::make_mut(state.current.get_or_insert_with(Default::default));

        let keep = tail.count() - usize::from(had_provisional);
        debug_assert!(partial.count() >= keep, "the filling batch never shrinks");
        let keep = keep.min(partial.count());
        while tail.count() > keep {
            tail.pop();
        }
        tail.extend_from(partial.as_batch(), keep..partial.count());

        state.current_has_provisional = partial.has_provisional();
        state.refresh_totals(self.lines_per_batch);
        base + keep..base + partial.count()
    }

    /// Lines resolvable right now. Grows monotonically while scanning.
    pub fn line_count(&self) -> usize {
        self.state.read_ignore_poison().line_count
    }

    pub fn is_empty(&self) -> bool {
        self.line_count() == 0
    }

    /// Byte offset just past the last (possibly provisional) line seen so far.
    pub fn bytes_scanned_so_far(&self) -> u64 {
        self.state.read_ignore_poison().bytes_scanned
    }

    /// Position metadata of one line.
    pub fn line(&self, line: usize) -> Result<LineRef, ViewerError> {
        let state = self.state.read_ignore_poison();
        let out_of_bounds = || ViewerError::OutOfBounds {
            line,
            from: 0,
            to: state.line_count,
        };
        let batch_number = line / self.lines_per_batch;
        let offset = line % self.lines_per_batch;
        let batch = match state.frozen.get(batch_number) {
            Some(batch) => batch,
            None if batch_number == state.frozen.len() => state.current.as_ref().ok_or_else(out_of_bounds)?,
            None => return Err(out_of_bounds()),
        };
        if offset >= batch.count() {
            return Err(out_of_bounds());
        }
        Ok(LineRef {
            batch: Arc::clone(batch),
            offset,
        })
    }

    pub fn checkpoints_of(&self, line: usize) -> Result<Vec<u64>, ViewerError> {
        Ok(self.line(line)?.checkpoints().to_vec())
    }

    pub fn byte_length_of(&self, line: usize) -> Result<u64, ViewerError> {
        Ok(self.line(line)?.byte_length())
    }

    pub fn char_length_of(&self, line: usize) -> Result<u64, ViewerError> {
        Ok(self.line(line)?.char_length())
    }

    /// A bounds-checked handle over `[from, to)`. O(1), nothing is copied.
    pub fn view(self: &Arc<Self>, from: usize, to: usize) -> IndexView {
        IndexView {
            index: Arc::clone(self),
            from,
            to,
        }
    }

    /// A view over every line scanned so far.
    pub fn full_view(self: &Arc<Self>) -> IndexView {
        let to = self.line_count();
        self.view(0, to)
    }
}

/// One line's record, kept alive by a reference to the batch that owns it.
#[derive(Debug, Clone)]
pub struct LineRef {
    batch: Arc<PositionBatch>,
    offset: usize,
}

impl LineRef {
    pub fn checkpoints(&self) -> &[u64] {
        self.batch.checkpoints(self.offset)
    }

    pub fn byte_length(&self) -> u64 {
        self.batch.byte_length(self.offset)
    }

    pub fn char_length(&self) -> u64 {
        self.batch.char_length(self.offset)
    }

    /// Byte offset of the line's first character.
    pub fn start_offset(&self) -> u64 {
        self.checkpoints()[0]
    }
}

/// Read-only window over `[from, to)` of a [`LineIndex`]. Safe to hold while scanning continues.
#[derive(Clone)]
pub struct IndexView {
    index: Arc<LineIndex>,
    from: usize,
    to: usize,
}

impl IndexView {
    pub fn from(&self) -> usize {
        self.from
    }

    pub fn to(&self) -> usize {
        self.to
    }

    pub fn len(&self) -> usize {
        self.to.saturating_sub(self.from)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, line: usize) -> bool {
        (self.from..self.to).contains(&line)
    }

    pub fn chars_per_checkpoint(&self) -> u64 {
        self.index.chars_per_checkpoint()
    }

    pub fn line(&self, line: usize) -> Result<LineRef, ViewerError> {
        if !self.contains(line) {
            return Err(ViewerError::OutOfBounds {
                line,
                from: self.from,
                to: self.to,
            });
        }
        self.index.line(line)
    }

    pub fn checkpoints_of(&self, line: usize) -> Result<Vec<u64>, ViewerError> {
        Ok(self.line(line)?.checkpoints().to_vec())
    }

    pub fn byte_length_of(&self, line: usize) -> Result<u64, ViewerError> {
        Ok(self.line(line)?.byte_length())
    }

    pub fn char_length_of(&self, line: usize) -> Result<u64, ViewerError> {
        Ok(self.line(line)?.char_length())
    }
}

impl std::fmt::Debug for IndexView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexView").field("from", &self.from).field("to", &self.to).finish()
    }
}
