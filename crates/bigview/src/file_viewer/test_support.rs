//! Helpers shared by the viewer tests.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use encoding_rs::{Encoding, SHIFT_JIS, UTF_8, UTF_16LE};
use proptest::prelude::*;
use tempfile::TempDir;

use super::line_index::LineIndex;
use super::position_batch::{MutableBatch, PositionBatch};
use super::scanner::{ScanConfig, ScanOutcome, ScanSink, Scanner};
use super::{MessageInfo, ScanProgress, ViewerContent, ViewerListener};
use crate::ignore_poison::IgnorePoison;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A file in its own temp dir. The dir is removed on drop.
pub struct TestFile {
    _dir: TempDir,
    pub path: PathBuf,
}

pub fn write_test_file(content: impl AsRef<[u8]>) -> TestFile {
    let dir = tempfile::tempdir().expect("Failed to create test directory");
    let path = dir.path().join("test.txt");
    std::fs::write(&path, content).unwrap();
    TestFile { _dir: dir, path }
}

/// Tiny layout so short test lines cross checkpoints and batches.
pub fn small_config(chars_per_checkpoint: u64, lines_per_batch: usize) -> ScanConfig {
    ScanConfig {
        chars_per_checkpoint,
        lines_per_batch,
        window_bytes: 16,
        chunk_bytes: 64,
        ..ScanConfig::default()
    }
}

/// Publishes everything straight into a [`LineIndex`], like the controller does.
pub struct IndexingSink {
    pub index: Arc<LineIndex>,
}

impl ScanSink for IndexingSink {
    fn finished_batch(&mut self, batch: PositionBatch) {
        self.index.append_finished_batch(batch);
    }

    fn preview_batch(&mut self, batch: &MutableBatch) {
        self.index.update_current_preview(batch);
    }
}

/// Scans the whole file synchronously.
pub fn scan_into_index(file: &TestFile, encoding: &'static Encoding, config: &ScanConfig) -> Arc<LineIndex> {
    scan_with_outcome(file, encoding, config).0
}

pub fn scan_with_outcome(
    file: &TestFile,
    encoding: &'static Encoding,
    config: &ScanConfig,
) -> (Arc<LineIndex>, ScanOutcome) {
    let index = Arc::new(LineIndex::new(config.lines_per_batch, config.chars_per_checkpoint));
    let mut sink = IndexingSink {
        index: Arc::clone(&index),
    };
    let cancel = AtomicBool::new(false);
    let outcome = Scanner::new(encoding, config, &cancel)
        .scan(&file.path, &mut sink)
        .unwrap();
    (index, outcome)
}

/// Arbitrary bytes, salted with terminators in both their one-byte and UTF-16LE forms.
pub fn bytes_strategy() -> impl Strategy<Value = Vec<u8>> {
    let piece = prop_oneof![
        6 => proptest::collection::vec(any::<u8>(), 1..6),
        1 => Just(b"\n".to_vec()),
        1 => Just(b"\r\n".to_vec()),
        1 => Just(b"\n\0".to_vec()),
        1 => Just(b"\r\0\n\0".to_vec()),
    ];
    proptest::collection::vec(piece, 0..40).prop_map(|pieces| pieces.concat())
}

pub fn encoding_strategy() -> impl Strategy<Value = &'static Encoding> {
    prop_oneof![Just(UTF_8), Just(UTF_16LE), Just(SHIFT_JIS)]
}

/// Polls `condition` every few ms until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Records every callback. Content delivery can be held back with [`Self::close_gate`].
#[derive(Default)]
pub struct RecordingListener {
    pub contents: Mutex<Vec<ViewerContent>>,
    pub progress: Mutex<Vec<ScanProgress>>,
    pub messages: Mutex<Vec<MessageInfo>>,
    gate_closed: Mutex<bool>,
    gate: Condvar,
    blocked: Mutex<usize>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn last_content(&self) -> Option<ViewerContent> {
        self.contents.lock_ignore_poison().last().cloned()
    }

    pub fn messages(&self) -> Vec<MessageInfo> {
        self.messages.lock_ignore_poison().clone()
    }

    pub fn scan_finished(&self) -> bool {
        self.progress
            .lock_ignore_poison()
            .iter()
            .any(|p| p.finished || p.stopped_on_low_memory)
    }

    pub fn final_progress(&self) -> Option<ScanProgress> {
        self.progress.lock_ignore_poison().iter().find(|p| p.memory.is_some()).cloned()
    }

    /// Makes the next `on_content` calls block until [`Self::open_gate`].
    pub fn close_gate(&self) {
        *self.gate_closed.lock_ignore_poison() = true;
    }

    pub fn open_gate(&self) {
        *self.gate_closed.lock_ignore_poison() = false;
        self.gate.notify_all();
    }

    /// Number of `on_content` calls currently held at the gate.
    pub fn blocked(&self) -> usize {
        *self.blocked.lock_ignore_poison()
    }

    /// Waits until the latest content satisfies `predicate`.
    pub fn wait_for_content(&self, predicate: impl Fn(&ViewerContent) -> bool) -> Option<ViewerContent> {
        let mut found = None;
        wait_until(Duration::from_secs(5), || {
            found = self.last_content().filter(|c| predicate(c));
            found.is_some()
        });
        found
    }
}

impl ViewerListener for RecordingListener {
    fn on_content(&self, content: ViewerContent) {
        self.contents.lock_ignore_poison().push(content);
        let closed = self.gate_closed.lock_ignore_poison();
        if !*closed {
            return;
        }
        *self.blocked.lock_ignore_poison() += 1;
        let still_closed = self
            .gate
            .wait_while(closed, |closed| *closed)
            .unwrap_or_else(|e| e.into_inner());
        drop(still_closed);
        *self.blocked.lock_ignore_poison() -= 1;
    }

    fn on_progress(&self, progress: ScanProgress) {
        self.progress.lock_ignore_poison().push(progress);
    }

    fn on_message(&self, message: MessageInfo) {
        self.messages.lock_ignore_poison().push(message);
    }
}
