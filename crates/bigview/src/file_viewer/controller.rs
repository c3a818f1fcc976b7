//! ViewerController: one open file, its line index, its viewport, and three workers.
//!
//! - scan: one pass over the file, feeding the index and waking the read worker when a
//!   published range is visible
//! - read: long-lived, recomputes the visible content whenever the update signal is raised
//! - search: short-lived, at most one alive; a new search cancels the previous one
//!
//! Navigation calls only change the viewport and raise the signal, so they never block on I/O.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use encoding_rs::Encoding;
use log::{debug, error, info};

use super::charset::resolve_charset;
use super::line_index::{IndexView, LineIndex};
use super::memory::MemoryTelemetry;
use super::position_batch::{MutableBatch, PositionBatch};
use super::reader::Reader;
use super::scanner::{ScanSink, Scanner};
use super::searcher::Searcher;
use super::signal::UpdateSignal;
use super::viewport::ViewportState;
use super::{MessageInfo, ScanProgress, Severity, ViewerContent, ViewerError, ViewerListener};
use crate::config::ViewerConfig;
use crate::ignore_poison::IgnorePoison;

struct SearchHandle {
    cancel: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// State shared by the controller and its workers.
struct Shared {
    path: PathBuf,
    encoding: &'static Encoding,
    config: ViewerConfig,
    index: Arc<LineIndex>,
    viewport: Mutex<ViewportState>,
    signal: UpdateSignal,
    cancelled: AtomicBool,
    search: Mutex<Option<SearchHandle>>,
    listener: Arc<dyn ViewerListener>,
    recomputations: AtomicUsize,
}

pub struct ViewerController {
    shared: Arc<Shared>,
    scan_thread: Mutex<Option<JoinHandle<()>>>,
    read_thread: Mutex<Option<JoinHandle<()>>>,
}

impl ViewerController {
    /// Opens `path` with the default configuration and starts scanning it.
    pub fn open(
        path: impl AsRef<Path>,
        charset: &str,
        displayed_lines: usize,
        displayed_columns: usize,
        listener: Arc<dyn ViewerListener>,
    ) -> Result<Self, ViewerError> {
        let config = ViewerConfig {
            charset: charset.to_string(),
            ..ViewerConfig::default()
        };
        Self::open_with_config(path, config, displayed_lines, displayed_columns, listener)
    }

    /// Opens `path` and starts the scan and read workers. Fails synchronously only when the
    /// file can't be viewed at all (missing, a directory, unknown charset).
    pub fn open_with_config(
        path: impl AsRef<Path>,
        config: ViewerConfig,
        displayed_lines: usize,
        displayed_columns: usize,
        listener: Arc<dyn ViewerListener>,
    ) -> Result<Self, ViewerError> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ViewerError::NotFound(path.display().to_string()),
            _ => ViewerError::from(e),
        })?;
        if metadata.is_dir() {
            return Err(ViewerError::IsDirectory);
        }
        let encoding = resolve_charset(&config.charset)?;
        let index = Arc::new(LineIndex::new(
            config.scan.lines_per_batch.max(1),
            config.scan.chars_per_checkpoint.max(1),
        ));
        debug!(
            "Opening {} ({} bytes) as {}",
            path.display(),
            metadata.len(),
            encoding.name()
        );

        let shared = Arc::new(Shared {
            path: path.to_path_buf(),
            encoding,
            config,
            index,
            viewport: Mutex::new(ViewportState::new(displayed_lines, displayed_columns)),
            signal: UpdateSignal::new(),
            cancelled: AtomicBool::new(false),
            search: Mutex::new(None),
            listener,
            recomputations: AtomicUsize::new(0),
        });

        let read_shared = Arc::clone(&shared);
        let read_thread = thread::Builder::new()
            .name("viewer-read".to_string())
            .spawn(move || run_read_worker(&read_shared))?;
        let scan_shared = Arc::clone(&shared);
        let scan_thread = match thread::Builder::new()
            .name("viewer-scan".to_string())
            .spawn(move || run_scan_worker(&scan_shared))
        {
            Ok(handle) => handle,
            Err(e) => {
                shared.cancelled.store(true, Ordering::SeqCst);
                shared.signal.wake();
                let _ = read_thread.join();
                return Err(e.into());
            }
        };

        Ok(Self {
            shared,
            scan_thread: Mutex::new(Some(scan_thread)),
            read_thread: Mutex::new(Some(read_thread)),
        })
    }

    /// Snapshot of the current viewport (0-based).
    pub fn viewport(&self) -> ViewportState {
        *self.shared.viewport.lock_ignore_poison()
    }

    /// Lines scanned so far.
    pub fn line_count(&self) -> usize {
        self.shared.index.line_count()
    }

    /// How many times the read worker has recomputed the visible content.
    pub fn recompute_count(&self) -> usize {
        self.shared.recomputations.load(Ordering::SeqCst)
    }

    pub fn go_one_line_up(&self) {
        self.navigate(|vp, count| vp.move_vertical(-1, count));
    }

    pub fn go_one_line_down(&self) {
        self.navigate(|vp, count| vp.move_vertical(1, count));
    }

    pub fn go_one_column_left(&self) {
        self.navigate(|vp, _| vp.move_horizontal(-1));
    }

    pub fn go_one_column_right(&self) {
        self.navigate(|vp, _| vp.move_horizontal(1));
    }

    pub fn go_one_page_up(&self) {
        self.navigate(|vp, count| vp.move_vertical(-vp.page_lines(), count));
    }

    pub fn go_one_page_down(&self) {
        self.navigate(|vp, count| vp.move_vertical(vp.page_lines(), count));
    }

    pub fn go_one_page_left(&self) {
        self.navigate(|vp, _| vp.move_horizontal(-vp.page_columns()));
    }

    pub fn go_one_page_right(&self) {
        self.navigate(|vp, _| vp.move_horizontal(vp.page_columns()));
    }

    pub fn go_to_line_begin(&self) {
        self.navigate(|vp, _| vp.line_begin());
    }

    /// Scrolls right until the end of the top line is in view.
    pub fn go_to_line_end(&self) {
        let index = &self.shared.index;
        self.navigate(|vp, _| match index.char_length_of(vp.first_line) {
            Ok(length) => vp.line_end(length),
            Err(_) => vp,
        });
    }

    pub fn go_to_first_line(&self) {
        self.navigate(|vp, _| vp.first_page());
    }

    pub fn go_to_last_line(&self) {
        self.navigate(|vp, count| vp.last_page(count));
    }

    pub fn large_jump_up(&self) {
        let jump = -(self.shared.config.large_line_jump as i64);
        self.navigate(|vp, count| vp.move_vertical(jump, count));
    }

    pub fn large_jump_down(&self) {
        let jump = self.shared.config.large_line_jump as i64;
        self.navigate(|vp, count| vp.move_vertical(jump, count));
    }

    pub fn large_jump_left(&self) {
        let jump = -(self.shared.config.large_column_jump as i64);
        self.navigate(|vp, _| vp.move_horizontal(jump));
    }

    pub fn large_jump_right(&self) {
        let jump = self.shared.config.large_column_jump as i64;
        self.navigate(|vp, _| vp.move_horizontal(jump));
    }

    /// Puts `(line, column)` at the top-left corner. The line is clamped to what is scanned.
    pub fn go_to(&self, line: usize, column: u64) {
        self.navigate(|vp, count| vp.at(line, column, count));
    }

    pub fn resize(&self, displayed_lines: usize, displayed_columns: usize) {
        self.navigate(|vp, _| vp.resized(displayed_lines, displayed_columns));
    }

    /// Searches forward from just after the viewport's top-left corner. A hit moves the
    /// viewport to the match, a miss only reports it.
    pub fn search(&self, term: &str) {
        let shared = &self.shared;
        if term.is_empty() {
            shared.listener.on_message(MessageInfo::new(
                "Unable to search file",
                "Search term is empty",
                Severity::Warning,
            ));
            return;
        }
        if shared.cancelled.load(Ordering::SeqCst) {
            return;
        }

        let mut slot = shared.search.lock_ignore_poison();
        if let Some(previous) = slot.take() {
            previous.cancel.store(true, Ordering::SeqCst);
        }

        let cancel = Arc::new(AtomicBool::new(false));
        let view = shared.index.full_view();
        let from = self.viewport();
        let term = term.to_string();
        let search_shared = Arc::clone(shared);
        let search_cancel = Arc::clone(&cancel);
        let spawned = thread::Builder::new()
            .name("viewer-search".to_string())
            .spawn(move || run_search_worker(&search_shared, &view, from, &term, &search_cancel));
        match spawned {
            Ok(thread) => *slot = Some(SearchHandle { cancel, thread }),
            Err(e) => {
                error!("Couldn't start search worker: {}", e);
                shared
                    .listener
                    .on_message(MessageInfo::new("Unable to search file", e.to_string(), Severity::Error));
            }
        }
    }

    /// Stops all workers and releases the file. Safe to call more than once.
    pub fn close(&self) {
        let shared = &self.shared;
        if shared.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        shared.signal.wake();
        let search = shared.search.lock_ignore_poison().take();
        if let Some(search) = search {
            search.cancel.store(true, Ordering::SeqCst);
            join_unless_current(search.thread);
        }
        let scan = self.scan_thread.lock_ignore_poison().take();
        let read = self.read_thread.lock_ignore_poison().take();
        for handle in [scan, read].into_iter().flatten() {
            join_unless_current(handle);
        }
        debug!("Closed viewer for {}", shared.path.display());
    }

    fn navigate(&self, step: impl FnOnce(ViewportState, usize) -> ViewportState) {
        let count = self.shared.index.line_count();
        let mut viewport = self.shared.viewport.lock_ignore_poison();
        let next = step(*viewport, count);
        if next == *viewport {
            return;
        }
        *viewport = next;
        drop(viewport);
        self.shared.signal.raise();
    }
}

impl Drop for ViewerController {
    fn drop(&mut self) {
        self.close();
    }
}

/// A worker may end up dropping the last controller handle from inside a callback.
fn join_unless_current(handle: JoinHandle<()>) {
    if handle.thread().id() != thread::current().id() {
        let _ = handle.join();
    }
}

impl Shared {
    /// Recomputes the visible content from the latest viewport and publishes it,
    /// unless the viewport moved while reading.
    fn update(&self, reader: &mut Reader) -> Result<(), ViewerError> {
        let snapshot = *self.viewport.lock_ignore_poison();
        self.recomputations.fetch_add(1, Ordering::SeqCst);
        let count = self.index.line_count();
        if count == 0 {
            return Ok(());
        }

        let viewport = snapshot.clamped(count);
        let view = self.index.view(0, count);
        let lines = reader.read_window(
            &view,
            viewport.first_line,
            viewport.one_after_last_line(count),
            viewport.first_column,
            viewport.displayed_columns,
        )?;

        if self.cancelled.load(Ordering::SeqCst) {
            return Err(ViewerError::Cancelled);
        }
        if *self.viewport.lock_ignore_poison() != snapshot {
            debug!("Dropping stale content for line {}", viewport.first_line);
            return Ok(());
        }
        self.listener.on_content(ViewerContent {
            lines,
            first_displayed_line: viewport.first_line + 1,
            first_displayed_column: viewport.first_column + 1,
        });
        Ok(())
    }

    /// Wakes the read worker if any line of `range` is visible. A provisional last line only
    /// counts when the viewport's first column is within its known prefix.
    fn request_update_if_visible(&self, range: Range<usize>, provisional: bool) {
        if range.is_empty() {
            return;
        }
        let viewport = *self.viewport.lock_ignore_poison();
        let visible = viewport.first_line..viewport.first_line.saturating_add(viewport.displayed_lines);
        let overlap = range.start.max(visible.start)..range.end.min(visible.end);
        if overlap.is_empty() {
            return;
        }
        if provisional && overlap.start == range.end - 1 {
            let known = self.index.char_length_of(range.end - 1).unwrap_or(0);
            if viewport.first_column > known {
                return;
            }
        }
        self.signal.raise();
    }

    fn report_error(&self, verb: &str, error: &ViewerError) {
        error!("Unable to {} {}: {}", verb, self.path.display(), error);
        self.listener.on_message(MessageInfo::new(
            format!("Unable to {} file", verb),
            error.to_string(),
            Severity::Error,
        ));
    }
}

/// Feeds scanner output into the shared index.
struct IndexSink<'a> {
    shared: &'a Shared,
    progress_interval: Duration,
    last_progress: Option<Instant>,
}

impl IndexSink<'_> {
    fn after_publish(&mut self, range: Range<usize>, provisional: bool) {
        self.shared.request_update_if_visible(range, provisional);
        let due = self.last_progress.is_none_or(|at| at.elapsed() >= self.progress_interval);
        if due {
            self.last_progress = Some(Instant::now());
            self.shared.listener.on_progress(ScanProgress {
                lines_scanned: self.shared.index.line_count(),
                bytes_scanned: self.shared.index.bytes_scanned_so_far(),
                finished: false,
                stopped_on_low_memory: false,
                memory: None,
            });
        }
    }
}

impl ScanSink for IndexSink<'_> {
    fn finished_batch(&mut self, batch: PositionBatch) {
        let range = self.shared.index.append_finished_batch(batch);
        self.after_publish(range, false);
    }

    fn preview_batch(&mut self, batch: &MutableBatch) {
        let range = self.shared.index.update_current_preview(batch);
        self.after_publish(range, batch.has_provisional());
    }
}

fn run_scan_worker(shared: &Shared) {
    let mut sink = IndexSink {
        shared,
        progress_interval: Duration::from_millis(shared.config.progress_interval_ms),
        last_progress: None,
    };
    let scanner = Scanner::new(shared.encoding, &shared.config.scan, &shared.cancelled);
    let outcome = match scanner.scan(&shared.path, &mut sink) {
        Ok(outcome) => outcome,
        Err(e) => {
            if !shared.cancelled.load(Ordering::SeqCst) {
                shared.report_error("scan", &e);
            }
            return;
        }
    };
    if shared.cancelled.load(Ordering::SeqCst) {
        return;
    }

    shared.listener.on_progress(ScanProgress {
        lines_scanned: outcome.lines_scanned,
        bytes_scanned: outcome.bytes_scanned,
        finished: outcome.finished,
        stopped_on_low_memory: outcome.stopped_on_low_memory,
        memory: Some(MemoryTelemetry::sample()),
    });
    if outcome.lines_scanned == 0 {
        shared.listener.on_content(ViewerContent {
            lines: Vec::new(),
            first_displayed_line: 1,
            first_displayed_column: 1,
        });
    }
}

fn run_read_worker(shared: &Shared) {
    let mut reader = Reader::new(&shared.path, shared.encoding);
    while shared.signal.wait(&shared.cancelled) {
        match shared.update(&mut reader) {
            Ok(()) => {}
            Err(ViewerError::Cancelled) => return,
            Err(e) => {
                shared.report_error("read", &e);
                return;
            }
        }
    }
}

fn run_search_worker(shared: &Shared, view: &IndexView, from: ViewportState, term: &str, cancel: &AtomicBool) {
    let searcher = Searcher::new(&shared.path, shared.encoding);
    let on_match = |line: usize, column: u64| {
        if move_to_match(&shared.viewport, cancel, line, column, view.to()) {
            info!("Found search term at {}:{}", line + 1, column + 1);
            shared.signal.raise();
        }
    };
    let result = searcher.search(view, from.first_line, from.first_column, term, on_match, true, cancel);
    if cancel.load(Ordering::SeqCst) || shared.cancelled.load(Ordering::SeqCst) {
        return;
    }
    match result {
        Ok(true) => {}
        Ok(false) => shared.listener.on_message(MessageInfo::new(
            "File search done",
            "Could not locate term between current position and end of file",
            Severity::Info,
        )),
        Err(e) => shared.report_error("search", &e),
    }
}

/// Moves `viewport` to a match unless the search was cancelled. The flag is read under the
/// viewport lock: a newer search sets it before reading its start position.
pub(super) fn move_to_match(
    viewport: &Mutex<ViewportState>,
    cancel: &AtomicBool,
    line: usize,
    column: u64,
    line_count: usize,
) -> bool {
    let mut viewport = viewport.lock_ignore_poison();
    if cancel.load(Ordering::SeqCst) {
        return false;
    }
    *viewport = viewport.at(line, column, line_count);
    true
}
