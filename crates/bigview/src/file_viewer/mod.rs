//! File viewer module: background scanning, windowed reads and literal search over one file.
//!
//! Components, leaves first:
//! - `PositionBatch` / `MutableBatch`: per-line byte/character metadata for up to B lines
//! - `LineIndex` / `IndexView`: append-only sequence of frozen batches plus the filling tail
//! - `Scanner`: single decoding pass over the file that feeds the index
//! - `Reader`: fetches a line/column window using the index's checkpoints
//! - `Searcher`: streams a literal-term match forward from a position
//! - `ViewerController`: owns the index and viewport, runs the scan/read/search workers

mod charset;
mod controller;
mod line_index;
mod memory;
mod position_batch;
mod reader;
mod scanner;
mod searcher;
mod signal;
mod viewport;

#[cfg(test)]
mod searcher_test;
#[cfg(test)]
mod signal_test;
#[cfg(test)]
mod test_support;

pub use charset::resolve_charset;
pub use controller::ViewerController;
pub use line_index::{IndexView, LineIndex, LineRef};
pub use memory::{MemoryBudget, MemoryTelemetry};
pub use position_batch::{MutableBatch, PositionBatch};
pub use reader::Reader;
pub use scanner::{ScanConfig, ScanOutcome, ScanSink, Scanner};
pub use searcher::Searcher;
pub use viewport::ViewportState;

use serde::Serialize;

/// Characters between two recorded byte offsets within a line (K).
pub const CHARS_PER_CHECKPOINT: u64 = 32 * 1024;

/// Lines per position batch (B), the unit of freezing in the index.
pub const LINES_PER_BATCH: usize = 10_240;

/// Until this many lines are scanned, every finished line is published as a preview.
/// After that only completed batches are.
pub const PREVIEW_LINE_LIMIT: usize = LINES_PER_BATCH * 4;

/// Bytes read from the file per scanner refill.
pub const SCAN_CHUNK_BYTES: usize = 1024 * 1024;

/// Bytes decoded opportunistically in one go. Three times this must stay far below the chunk size.
pub const DECODE_WINDOW_BYTES: usize = 64;

/// Upper bound on the bytes of a single encoded character, for any supported charset.
pub const MAX_BYTES_PER_CHAR: usize = 8;

/// Stride of the "large jump" navigation calls, in lines or columns.
pub const LARGE_JUMP: u64 = 500;

/// Minimum time between two progress events while a scan is running (500 ms).
pub const PROGRESS_INTERVAL_MS: u64 = 500;

/// What the presentation layer renders: the visible slice of the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerContent {
    pub lines: Vec<String>,
    /// 1-based.
    pub first_displayed_line: usize,
    /// 1-based.
    pub first_displayed_column: u64,
}

/// Scanner progress, purely informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    pub lines_scanned: usize,
    pub bytes_scanned: u64,
    pub finished: bool,
    pub stopped_on_low_memory: bool,
    pub memory: Option<MemoryTelemetry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A user-facing advisory. Formatting and dialogs are up to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInfo {
    pub title: String,
    pub text: String,
    pub severity: Severity,
}

impl MessageInfo {
    pub fn new(title: impl Into<String>, text: impl Into<String>, severity: Severity) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            severity,
        }
    }
}

/// Errors from the viewer components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerError {
    Io(String),
    NotFound(String),
    IsDirectory,
    UnsupportedCharset(String),
    /// A line outside what the index (or the view) covers was requested.
    OutOfBounds {
        line: usize,
        from: usize,
        to: usize,
    },
    /// The owning worker was asked to stop. Never surfaced to the user.
    Cancelled,
}

impl std::fmt::Display for ViewerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "{}", msg),
            Self::NotFound(path) => write!(f, "File not found: {}", path),
            Self::IsDirectory => write!(f, "Cannot view a directory"),
            Self::UnsupportedCharset(label) => write!(f, "Unsupported charset: {}", label),
            Self::OutOfBounds { line, from, to } => {
                write!(f, "Line index {} is not between {} and {}", line, from, to)
            }
            Self::Cancelled => write!(f, "Operation cancelled"),
        }
    }
}

impl std::error::Error for ViewerError {}

impl From<std::io::Error> for ViewerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// The presentation layer's side of the controller. Callbacks arrive on worker threads.
pub trait ViewerListener: Send + Sync {
    fn on_content(&self, content: ViewerContent);

    fn on_progress(&self, progress: ScanProgress);

    fn on_message(&self, message: MessageInfo);
}
