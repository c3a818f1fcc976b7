//! ViewportState: the visible rectangle, and the navigation arithmetic over it.
//!
//! Every move is a pure function of the current state and the line count known at the time
//! of the call. Lines are 0-based here; only `ViewerContent` is 1-based.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportState {
    pub first_line: usize,
    pub first_column: u64,
    pub displayed_lines: usize,
    pub displayed_columns: usize,
}

impl ViewportState {
    pub fn new(displayed_lines: usize, displayed_columns: usize) -> Self {
        Self {
            first_line: 0,
            first_column: 0,
            displayed_lines,
            displayed_columns,
        }
    }

    /// One past the last line that would be shown, given `line_count` lines.
    pub fn one_after_last_line(&self, line_count: usize) -> usize {
        self.first_line.saturating_add(self.displayed_lines).min(line_count)
    }

    /// Pulls `first_line` back inside `[0, line_count)`. Idempotent.
    pub fn clamped(self, line_count: usize) -> Self {
        Self {
            first_line: self.first_line.min(line_count.saturating_sub(1)),
            ..self
        }
    }

    /// Moves the top line by `delta`, staying within `[0, line_count - 1]`.
    pub fn move_vertical(self, delta: i64, line_count: usize) -> Self {
        let last = line_count.saturating_sub(1) as i64;
        let target = (self.first_line as i64).saturating_add(delta).clamp(0, last.max(0));
        Self {
            first_line: target as usize,
            ..self
        }
    }

    /// Moves the first column by `delta`, never below 0.
    pub fn move_horizontal(self, delta: i64) -> Self {
        let first_column = if delta < 0 {
            self.first_column.saturating_sub(delta.unsigned_abs())
        } else {
            self.first_column.saturating_add(delta as u64)
        };
        Self { first_column, ..self }
    }

    /// Lines moved by a page up/down.
    pub fn page_lines(&self) -> i64 {
        self.displayed_lines.saturating_sub(1).max(1) as i64
    }

    /// Columns moved by a page left/right.
    pub fn page_columns(&self) -> i64 {
        self.displayed_columns.saturating_sub(1).max(1) as i64
    }

    pub fn line_begin(self) -> Self {
        Self { first_column: 0, ..self }
    }

    /// Shows the last `displayed_columns` characters of a top line that is `line_length` long.
    pub fn line_end(self, line_length: u64) -> Self {
        Self {
            first_column: line_length.saturating_sub(self.displayed_columns as u64),
            ..self
        }
    }

    pub fn first_page(self) -> Self {
        Self { first_line: 0, ..self }
    }

    /// Shows the last full page of a file with `line_count` lines.
    pub fn last_page(self, line_count: usize) -> Self {
        Self {
            first_line: line_count.saturating_sub(self.displayed_lines),
            ..self
        }
    }

    pub fn at(self, line: usize, column: u64, line_count: usize) -> Self {
        Self {
            first_line: line,
            first_column: column,
            ..self
        }
        .clamped(line_count)
    }

    pub fn resized(self, displayed_lines: usize, displayed_columns: usize) -> Self {
        Self {
            displayed_lines,
            displayed_columns,
            ..self
        }
    }
}
