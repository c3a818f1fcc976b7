//! Scanner: one decoding pass over the file that builds the line position index.
//!
//! Bytes are read in large chunks and decoded in small windows. A window is only committed
//! when it contains no line terminator, crosses no checkpoint boundary, and decodes without
//! an ambiguous tail; otherwise the scanner rolls back to the window start and decodes one
//! character at a time until it is past the risky spot. Both paths produce the same
//! checkpoints and lengths, the windowed one is just faster.
//!
//! For ASCII-compatible charsets the window is cut in front of the first `\r`/`\n` byte
//! (found with memchr), so short lines rarely leave the fast path.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use encoding_rs::Encoding;
use log::{debug, info, warn};
use memchr::memchr2;
use serde::{Deserialize, Serialize};

use super::charset::{decode_one, decode_window};
use super::memory::{MemoryBudget, MemoryGuard};
use super::position_batch::{MutableBatch, PositionBatch};
use super::{
    CHARS_PER_CHECKPOINT, DECODE_WINDOW_BYTES, LINES_PER_BATCH, MAX_BYTES_PER_CHAR, PREVIEW_LINE_LIMIT,
    SCAN_CHUNK_BYTES, ViewerError,
};

/// Fixed per-line cost in the index: byte length, char length, checkpoint slice end.
const INDEX_BYTES_PER_LINE: u64 = 24;

/// Configuration for a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScanConfig {
    /// Bytes read from the file per refill.
    pub chunk_bytes: usize,
    /// Bytes decoded opportunistically in one go.
    pub window_bytes: usize,
    /// Lines per position batch (B).
    pub lines_per_batch: usize,
    /// Characters between two checkpoints (K).
    pub chars_per_checkpoint: u64,
    /// Every finished line is previewed until this many lines are scanned.
    pub preview_line_limit: usize,
    /// Characters per line handed to `ScanSink::line_preview`. 0 disables line previews.
    pub preview_columns: usize,
    pub memory: MemoryBudget,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: SCAN_CHUNK_BYTES,
            window_bytes: DECODE_WINDOW_BYTES,
            lines_per_batch: LINES_PER_BATCH,
            chars_per_checkpoint: CHARS_PER_CHECKPOINT,
            preview_line_limit: PREVIEW_LINE_LIMIT,
            preview_columns: 0,
            memory: MemoryBudget::default(),
        }
    }
}

/// How a scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    /// The whole file was scanned.
    pub finished: bool,
    /// Scanning stopped early because memory pressure stayed critical.
    pub stopped_on_low_memory: bool,
    pub lines_scanned: usize,
    pub bytes_scanned: u64,
}

/// Receives what the scanner produces. Called on the scanning thread.
pub trait ScanSink {
    /// The first `preview_columns` characters of a finished line.
    fn line_preview(&mut self, _line: usize, _text: &str) {}

    /// A full batch (or the last, partial one) that will never change again.
    fn finished_batch(&mut self, batch: PositionBatch);

    /// The batch still being filled, possibly ending in a provisional record.
    fn preview_batch(&mut self, batch: &MutableBatch);
}

pub struct Scanner<'a> {
    encoding: &'static Encoding,
    config: &'a ScanConfig,
    cancel: &'a AtomicBool,
}

impl<'a> Scanner<'a> {
    pub fn new(encoding: &'static Encoding, config: &'a ScanConfig, cancel: &'a AtomicBool) -> Self {
        Self {
            encoding,
            config,
            cancel,
        }
    }

    /// Scans the file at `path`. Blocking, run it on a background thread.
    pub fn scan(&self, path: &Path, sink: &mut dyn ScanSink) -> Result<ScanOutcome, ViewerError> {
        let file = File::open(path)?;
        let started = Instant::now();
        let outcome = self.scan_reader(file, sink)?;
        info!(
            "Scanned {} lines ({} bytes) of {} in {} ms (finished: {}, low memory: {})",
            outcome.lines_scanned,
            outcome.bytes_scanned,
            path.display(),
            started.elapsed().as_millis(),
            outcome.finished,
            outcome.stopped_on_low_memory
        );
        Ok(outcome)
    }

    /// Scans any byte source. Cancellation ends the scan with `finished == false`.
    pub fn scan_reader<R: Read>(&self, mut source: R, sink: &mut dyn ScanSink) -> Result<ScanOutcome, ViewerError> {
        let refill_threshold = self.config.window_bytes.max(MAX_BYTES_PER_CHAR);
        let mut buf = vec![0u8; self.config.chunk_bytes.max(refill_threshold * 4)];
        let mut start = 0;
        let mut end = 0;
        let mut eof = false;
        let mut state = ScanState::new(self.encoding, self.config);

        loop {
            if self.cancel.load(Ordering::Relaxed) {
                debug!("Scan cancelled after {} lines", state.lines_scanned);
                return Ok(state.outcome(false, false));
            }

            if !eof && end - start < refill_threshold {
                buf.copy_within(start..end, 0);
                end -= start;
                start = 0;
                while !eof && end < buf.len() {
                    match source.read(&mut buf[end..]) {
                        Ok(0) => eof = true,
                        Ok(n) => end += n,
                        Err(e) if e.kind() == ErrorKind::Interrupted => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                continue;
            }

            if start == end {
                break;
            }

            match state.step(&buf[start..end], eof, sink) {
                Step::Consumed(n) => start += n,
                Step::LowMemory => {
                    state.flush(sink);
                    return Ok(state.outcome(false, true));
                }
            }
        }

        if state.finish_at_eof(sink) == Flow::LowMemory {
            state.flush(sink);
            return Ok(state.outcome(false, true));
        }
        state.flush(sink);
        Ok(state.outcome(true, false))
    }
}

enum Step {
    Consumed(usize),
    LowMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    LowMemory,
}

/// The line currently being scanned.
#[derive(Default)]
struct LineBuilder {
    checkpoints: Vec<u64>,
    chars: u64,
    preview: String,
    preview_chars: usize,
}

impl LineBuilder {
    fn reset(&mut self) {
        self.checkpoints.clear();
        self.chars = 0;
        self.preview.clear();
        self.preview_chars = 0;
    }

    fn has_started(&self) -> bool {
        !self.checkpoints.is_empty()
    }
}

struct ScanState<'c> {
    encoding: &'static Encoding,
    ascii_compatible: bool,
    config: &'c ScanConfig,
    chars_per_checkpoint: u64,
    /// Absolute offset of the next undecoded byte. Always a character boundary.
    offset: u64,
    line: LineBuilder,
    /// The previous character was `\r`, so a following `\n` belongs to the same terminator.
    after_cr: bool,
    lines_scanned: usize,
    batch: MutableBatch,
    decoded: String,
    unit: String,
    index_bytes: u64,
    memory: MemoryGuard,
}

impl<'c> ScanState<'c> {
    fn new(encoding: &'static Encoding, config: &'c ScanConfig) -> Self {
        Self {
            encoding,
            ascii_compatible: encoding.is_ascii_compatible(),
            config,
            chars_per_checkpoint: config.chars_per_checkpoint.max(1),
            offset: 0,
            line: LineBuilder::default(),
            after_cr: false,
            lines_scanned: 0,
            batch: MutableBatch::new(config.lines_per_batch.max(1)),
            decoded: String::with_capacity(config.window_bytes * 4),
            unit: String::with_capacity(MAX_BYTES_PER_CHAR * 4),
            index_bytes: 0,
            memory: MemoryGuard::new(config.memory.clone()),
        }
    }

    fn outcome(&self, finished: bool, stopped_on_low_memory: bool) -> ScanOutcome {
        ScanOutcome {
            finished,
            stopped_on_low_memory,
            lines_scanned: self.lines_scanned,
            bytes_scanned: self.offset,
        }
    }

    /// Consumes at least one character from `bytes`.
    fn step(&mut self, bytes: &[u8], eof: bool, sink: &mut dyn ScanSink) -> Step {
        let mut window = &bytes[..bytes.len().min(self.config.window_bytes)];
        if self.ascii_compatible {
            if let Some(terminator) = memchr2(b'\n', b'\r', window) {
                window = &window[..terminator];
            }
        }
        if window.is_empty() {
            return self.strict(bytes, eof, 1, sink);
        }

        let decoded = decode_window(self.encoding, window, &mut self.decoded);
        match self.first_risky_char() {
            None => {
                let committed = self.commit_window(decoded.clean_bytes, sink);
                if committed == 0 {
                    // Nothing decoded cleanly: the window starts with the ambiguous sequence.
                    return self.strict(bytes, eof, 1, sink);
                }
                if !decoded.ambiguous {
                    return Step::Consumed(committed);
                }
                match self.strict(&bytes[committed..], eof, 1, sink) {
                    Step::Consumed(n) => Step::Consumed(committed + n),
                    Step::LowMemory => Step::LowMemory,
                }
            }
            // Roll back to the window start and go one character at a time past the risky one.
            Some(risky) => self.strict(bytes, eof, risky + 1, sink),
        }
    }

    /// Index of the first decoded character that needs an exact byte offset.
    fn first_risky_char(&self) -> Option<usize> {
        let k = self.chars_per_checkpoint;
        let into_stride = self.line.chars % k;
        let next_boundary = if into_stride == 0 { k } else { k - into_stride };
        self.decoded
            .chars()
            .enumerate()
            .find(|&(i, c)| c == '\n' || c == '\r' || i as u64 == next_boundary)
            .map(|(i, _)| i)
    }

    /// Commits all characters in `self.decoded`, which occupy `clean_bytes` bytes.
    fn commit_window(&mut self, clean_bytes: usize, sink: &mut dyn ScanSink) -> usize {
        if self.decoded.is_empty() {
            return 0;
        }
        self.after_cr = false;
        if self.line.chars % self.chars_per_checkpoint == 0 {
            self.push_checkpoint(self.offset, sink);
        }
        let decoded = std::mem::take(&mut self.decoded);
        let mut count = 0u64;
        for c in decoded.chars() {
            if self.line.preview_chars < self.config.preview_columns {
                self.line.preview.push(c);
                self.line.preview_chars += 1;
            }
            count += 1;
        }
        self.decoded = decoded;
        self.line.chars += count;
        self.offset += clean_bytes as u64;
        clean_bytes
    }

    /// Decodes `chars` characters one by one.
    fn strict(&mut self, bytes: &[u8], eof: bool, chars: usize, sink: &mut dyn ScanSink) -> Step {
        let mut consumed = 0;
        let mut decoded_chars = 0;
        let mut unit = std::mem::take(&mut self.unit);
        while decoded_chars < chars && consumed < bytes.len() {
            let rest = &bytes[consumed..];
            if !eof && rest.len() < MAX_BYTES_PER_CHAR {
                // Not enough lookahead for a strict decode, let the caller refill first.
                break;
            }
            let len = decode_one(self.encoding, rest, eof, &mut unit);
            let start = self.offset;
            self.offset += len as u64;
            consumed += len;
            for c in unit.chars() {
                decoded_chars += 1;
                if self.process_char(c, start, sink) == Flow::LowMemory {
                    self.unit = unit;
                    return Step::LowMemory;
                }
            }
        }
        self.unit = unit;
        Step::Consumed(consumed)
    }

    /// Handles one strictly decoded character that starts at byte offset `start`.
    fn process_char(&mut self, c: char, start: u64, sink: &mut dyn ScanSink) -> Flow {
        if std::mem::take(&mut self.after_cr) && c == '\n' {
            return Flow::Continue;
        }
        match c {
            '\n' | '\r' => {
                if !self.line.has_started() {
                    self.line.checkpoints.push(start);
                }
                self.after_cr = c == '\r';
                self.finish_line(start, sink)
            }
            _ => {
                if self.line.chars % self.chars_per_checkpoint == 0 {
                    self.push_checkpoint(start, sink);
                }
                self.line.chars += 1;
                if self.line.preview_chars < self.config.preview_columns {
                    self.line.preview.push(c);
                    self.line.preview_chars += 1;
                }
                Flow::Continue
            }
        }
    }

    fn push_checkpoint(&mut self, offset: u64, sink: &mut dyn ScanSink) {
        self.line.checkpoints.push(offset);
        let ordinal = self.line.checkpoints.len() - 1;
        // Publish the start of a very long line before its end is known, at doubling distances.
        if ordinal > 0 && ordinal.is_power_of_two() && self.lines_scanned < self.config.preview_line_limit {
            let checkpoints = &self.line.checkpoints;
            self.batch.set_provisional(
                &checkpoints[..ordinal],
                offset - checkpoints[0],
                ordinal as u64 * self.chars_per_checkpoint,
            );
            sink.preview_batch(&self.batch);
        }
    }

    /// Finalizes the current line, which ends right before byte offset `end`.
    fn finish_line(&mut self, end: u64, sink: &mut dyn ScanSink) -> Flow {
        let checkpoints = &self.line.checkpoints;
        self.batch.push_line(checkpoints, end - checkpoints[0], self.line.chars);
        self.index_bytes += checkpoints.len() as u64 * 8 + INDEX_BYTES_PER_LINE;
        if self.config.preview_columns > 0 {
            sink.line_preview(self.lines_scanned, &self.line.preview);
        }
        self.lines_scanned += 1;
        self.line.reset();

        if self.batch.is_full() {
            sink.finished_batch(self.batch.freeze());
        } else if self.lines_scanned <= self.config.preview_line_limit {
            sink.preview_batch(&self.batch);
        }

        self.check_memory()
    }

    fn check_memory(&mut self) -> Flow {
        if !self.memory.is_critical(self.index_bytes) {
            return Flow::Continue;
        }
        for attempt in 1..=self.memory.reclaim_attempts() {
            self.reclaim();
            std::thread::sleep(self.memory.reclaim_pause());
            if !self.memory.recheck(self.index_bytes) {
                debug!("Memory pressure relieved after {} reclaim attempt(s)", attempt);
                return Flow::Continue;
            }
        }
        warn!(
            "Stopping scan at {} lines ({} bytes): memory pressure stayed critical (index holds {} bytes)",
            self.lines_scanned, self.offset, self.index_bytes
        );
        Flow::LowMemory
    }

    /// Gives back scratch memory the scan can live without.
    fn reclaim(&mut self) {
        self.decoded = String::new();
        self.line.preview.shrink_to_fit();
        self.line.checkpoints.shrink_to_fit();
    }

    /// Finalizes a last line that has no terminator.
    fn finish_at_eof(&mut self, sink: &mut dyn ScanSink) -> Flow {
        if self.line.has_started() {
            let end = self.offset;
            return self.finish_line(end, sink);
        }
        Flow::Continue
    }

    /// Hands over the remaining complete lines. A line still in progress is dropped.
    fn flush(&mut self, sink: &mut dyn ScanSink) {
        if self.batch.complete_count() > 0 {
            sink.finished_batch(self.batch.freeze());
        }
    }
}
