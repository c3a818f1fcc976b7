//! Reader: fetches a rectangle of text (lines × columns) using the index's checkpoints.
//!
//! A line's text is never decoded from its start unless the window starts there: the read
//! begins at the checkpoint at or before the first column, so the cost of one line is bounded
//! by K characters plus the window width, however long the line is.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Instant;

use encoding_rs::Encoding;
use log::debug;

use super::ViewerError;
use super::charset::decode_lossy;
use super::line_index::{IndexView, LineRef};

pub struct Reader {
    path: PathBuf,
    encoding: &'static Encoding,
    /// Opened on first use, kept for the reader's lifetime.
    file: Option<File>,
    buf: Vec<u8>,
}

impl Reader {
    pub fn new(path: &Path, encoding: &'static Encoding) -> Self {
        Self {
            path: path.to_path_buf(),
            encoding,
            file: None,
            buf: Vec::new(),
        }
    }

    /// Reads columns `[first_column, first_column + column_count)` of lines
    /// `[first_line, one_after_last)`. Lines shorter than `first_column` come back empty.
    pub fn read_window(
        &mut self,
        view: &IndexView,
        first_line: usize,
        one_after_last: usize,
        first_column: u64,
        column_count: usize,
    ) -> Result<Vec<String>, ViewerError> {
        let started = Instant::now();
        let mut lines = Vec::with_capacity(one_after_last.saturating_sub(first_line));
        for line in first_line..one_after_last {
            let record = view.line(line)?;
            let text = self.read_line(&record, view.chars_per_checkpoint(), first_column, column_count)?;
            lines.push(text);
        }
        debug!(
            "Read lines {}..{} from column {} in {} ms",
            first_line,
            one_after_last,
            first_column,
            started.elapsed().as_millis()
        );
        Ok(lines)
    }

    fn read_line(
        &mut self,
        record: &LineRef,
        chars_per_checkpoint: u64,
        first_column: u64,
        column_count: usize,
    ) -> Result<String, ViewerError> {
        let char_length = record.char_length();
        if first_column >= char_length || column_count == 0 {
            return Ok(String::new());
        }
        let chars_to_read = (column_count as u64).min(char_length - first_column);
        let checkpoints = record.checkpoints();
        let start_checkpoint = (first_column / chars_per_checkpoint) as usize;
        let stop_checkpoint = 1 + ((first_column + chars_to_read) / chars_per_checkpoint) as usize;

        let start = checkpoints[start_checkpoint];
        let end = checkpoints
            .get(stop_checkpoint)
            .copied()
            .unwrap_or(checkpoints[0] + record.byte_length());

        self.read_span(start, end)?;
        let decoded = decode_lossy(self.encoding, &self.buf);
        let skip = (first_column % chars_per_checkpoint) as usize;
        Ok(decoded.chars().skip(skip).take(chars_to_read as usize).collect())
    }

    /// Fills `self.buf` with bytes `[start, end)` of the file.
    fn read_span(&mut self, start: u64, end: u64) -> Result<(), ViewerError> {
        let file = match self.file.take() {
            Some(file) => file,
            None => File::open(&self.path)?,
        };
        let file = self.file.insert(file);
        self.buf.resize((end - start) as usize, 0);
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(&mut self.buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => ViewerError::Io("File content changed unexpectedly".to_string()),
            _ => ViewerError::from(e),
        })
    }
}
