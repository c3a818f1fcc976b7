//! Searcher: forward literal search from a position, streaming the file through one decoder.
//!
//! Line terminators are ordinary characters for matching (a term can span lines) and only
//! drive the line/column bookkeeping. A mismatch restarts the term from its first character
//! without re-testing the mismatching character.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use encoding_rs::{CoderResult, Encoding};
use log::debug;

use super::ViewerError;
use super::line_index::IndexView;

/// Bytes read per step while streaming.
const SEARCH_CHUNK_BYTES: usize = 64 * 1024;

pub struct Searcher {
    path: PathBuf,
    encoding: &'static Encoding,
}

/// Line/column of the next character in the stream.
struct Cursor {
    line: usize,
    column: u64,
    after_cr: bool,
}

impl Cursor {
    /// Returns the position of `c`, then moves past it.
    fn advance(&mut self, c: char) -> (usize, u64) {
        let at = (self.line, self.column);
        match c {
            '\n' if self.after_cr => self.after_cr = false,
            '\n' | '\r' => {
                self.line += 1;
                self.column = 0;
                self.after_cr = c == '\r';
            }
            _ => {
                self.column += 1;
                self.after_cr = false;
            }
        }
        at
    }
}

impl Searcher {
    pub fn new(path: &Path, encoding: &'static Encoding) -> Self {
        Self {
            path: path.to_path_buf(),
            encoding,
        }
    }

    /// Searches `term` starting strictly after `(from_line, from_column)` up to the end of `view`.
    ///
    /// `on_match` receives the line and column of each match's first character. Returns
    /// whether anything was found. Setting `cancel` stops the search early; that is not an error.
    #[allow(clippy::too_many_arguments)]
    pub fn search(
        &self,
        view: &IndexView,
        from_line: usize,
        from_column: u64,
        term: &str,
        mut on_match: impl FnMut(usize, u64),
        stop_on_first: bool,
        cancel: &AtomicBool,
    ) -> Result<bool, ViewerError> {
        let term: Vec<char> = term.chars().collect();
        if term.is_empty() {
            return Ok(false);
        }
        let Some((line, column)) = self.start_position(view, from_line, from_column)? else {
            return Ok(false);
        };

        let started = Instant::now();
        let k = view.chars_per_checkpoint();
        let record = view.line(line)?;
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(record.checkpoints()[(column / k) as usize]))?;

        let mut skip = column % k;
        let mut cursor = Cursor {
            line,
            column: column - skip,
            after_cr: false,
        };
        let mut decoder = self.encoding.new_decoder_without_bom_handling();
        let mut buf = vec![0u8; SEARCH_CHUNK_BYTES];
        let mut text = String::new();
        let mut matched = 0;
        let mut match_start = (0, 0);
        let mut found = false;
        let mut eof = false;

        while !eof && cursor.line < view.to() {
            if cancel.load(Ordering::Relaxed) {
                debug!("Search cancelled at line {}", cursor.line);
                return Ok(found);
            }
            let read = match file.read(&mut buf) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            eof = read == 0;
            text.clear();
            let mut input = &buf[..read];
            loop {
                text.reserve(decoder.max_utf8_buffer_length(input.len()).unwrap_or(input.len() * 3 + 16));
                let (result, consumed, _) = decoder.decode_to_string(input, &mut text, eof);
                input = &input[consumed..];
                match result {
                    CoderResult::InputEmpty => break,
                    CoderResult::OutputFull => {}
                }
            }

            for c in text.chars() {
                if skip > 0 {
                    skip -= 1;
                    cursor.advance(c);
                    continue;
                }
                if cursor.line >= view.to() {
                    break;
                }
                let at = cursor.advance(c);
                if c != term[matched] {
                    matched = 0;
                    continue;
                }
                if matched == 0 {
                    match_start = at;
                }
                matched += 1;
                if matched == term.len() {
                    found = true;
                    matched = 0;
                    on_match(match_start.0, match_start.1);
                    if stop_on_first {
                        debug!("Search hit after {} ms", started.elapsed().as_millis());
                        return Ok(true);
                    }
                }
            }
        }
        debug!("Search pass finished in {} ms (found: {})", started.elapsed().as_millis(), found);
        Ok(found)
    }

    /// First position after `(line, column)`, or `None` when that is past the view.
    fn start_position(
        &self,
        view: &IndexView,
        line: usize,
        column: u64,
    ) -> Result<Option<(usize, u64)>, ViewerError> {
        if !view.contains(line) {
            return Ok(None);
        }
        let column = column + 1;
        if column < view.char_length_of(line)? {
            return Ok(Some((line, column)));
        }
        Ok(view.contains(line + 1).then_some((line + 1, 0)))
    }
}
