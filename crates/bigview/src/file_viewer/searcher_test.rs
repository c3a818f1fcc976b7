//! Tests for the Searcher.

use std::sync::atomic::AtomicBool;

use encoding_rs::{SHIFT_JIS, UTF_8, WINDOWS_1252};

use super::scanner::ScanConfig;
use super::searcher::Searcher;
use super::test_support::{TestFile, scan_into_index, small_config, write_test_file};

/// First match after `(line, column)`, if any.
fn find_first(file: &TestFile, config: &ScanConfig, line: usize, column: u64, term: &str) -> Option<(usize, u64)> {
    let index = scan_into_index(file, UTF_8, config);
    let cancel = AtomicBool::new(false);
    let mut hit = None;
    let found = Searcher::new(&file.path, UTF_8)
        .search(&index.full_view(), line, column, term, |l, c| hit = Some((l, c)), true, &cancel)
        .unwrap();
    assert_eq!(found, hit.is_some());
    hit
}

#[test]
fn finds_a_term_on_a_later_line() {
    let file = write_test_file("alpha\nbeta gamma\ndelta");
    assert_eq!(find_first(&file, &ScanConfig::default(), 0, 0, "gamma"), Some((1, 5)));
}

#[test]
fn absent_term_is_not_found() {
    let file = write_test_file("alpha\nbeta gamma\ndelta");
    assert_eq!(find_first(&file, &ScanConfig::default(), 0, 0, "omega"), None);
}

#[test]
fn search_starts_strictly_after_the_cursor() {
    let file = write_test_file("x marks the spot");
    assert_eq!(find_first(&file, &ScanConfig::default(), 0, 0, "x"), None);
}

#[test]
fn resuming_finds_the_next_occurrence() {
    let file = write_test_file("one x two x three x");
    let config = ScanConfig::default();
    assert_eq!(find_first(&file, &config, 0, 0, "x"), Some((0, 4)));
    assert_eq!(find_first(&file, &config, 0, 4, "x"), Some((0, 10)));
    assert_eq!(find_first(&file, &config, 0, 10, "x"), Some((0, 18)));
    assert_eq!(find_first(&file, &config, 0, 18, "x"), None);
}

#[test]
fn cursor_at_line_end_continues_on_the_next_line() {
    let file = write_test_file("ab\ncd");
    assert_eq!(find_first(&file, &ScanConfig::default(), 0, 1, "c"), Some((1, 0)));
}

#[test]
fn term_can_span_a_line_break() {
    let file = write_test_file("abc\ndef");
    assert_eq!(find_first(&file, &ScanConfig::default(), 0, 0, "c\nd"), Some((0, 2)));
}

#[test]
fn crlf_counts_as_one_line_break() {
    let file = write_test_file("ab\r\ncd\r\nef");
    assert_eq!(find_first(&file, &ScanConfig::default(), 0, 0, "e"), Some((2, 0)));
    assert_eq!(find_first(&file, &ScanConfig::default(), 0, 0, "d"), Some((1, 1)));
}

#[test]
fn starts_from_the_nearest_checkpoint_in_a_long_line() {
    let mut line = "-".repeat(100);
    line.replace_range(70..76, "needle");
    let file = write_test_file(format!("{}\nneedle", line));
    let config = small_config(8, 16);
    assert_eq!(find_first(&file, &config, 0, 50, "needle"), Some((0, 70)));
    assert_eq!(find_first(&file, &config, 0, 70, "needle"), Some((1, 0)));
}

#[test]
fn multibyte_columns_are_characters() {
    let file = write_test_file("日本語\nüber straße");
    assert_eq!(find_first(&file, &small_config(2, 16), 0, 0, "ß"), Some((1, 9)));
}

#[test]
fn mismatch_restarts_without_retesting() {
    // "ab" is in the text, but the first 'a' of "aab" resets the match and the second 'a' is skipped.
    let file = write_test_file("xaab");
    assert_eq!(find_first(&file, &ScanConfig::default(), 0, 0, "ab"), None);
}

#[test]
fn collects_every_match_when_not_stopping() {
    let file = write_test_file("x x\nx");
    let index = scan_into_index(&file, UTF_8, &ScanConfig::default());
    let cancel = AtomicBool::new(false);
    let mut hits = Vec::new();
    let found = Searcher::new(&file.path, UTF_8)
        .search(&index.full_view(), 0, 0, "x", |l, c| hits.push((l, c)), false, &cancel)
        .unwrap();
    assert!(found);
    assert_eq!(hits, vec![(0, 2), (1, 0)]);
}

#[test]
fn stays_inside_the_view() {
    let file = write_test_file("a\nfind me");
    let index = scan_into_index(&file, UTF_8, &ScanConfig::default());
    let cancel = AtomicBool::new(false);
    let found = Searcher::new(&file.path, UTF_8)
        .search(&index.view(0, 1), 0, 0, "find", |_, _| {}, true, &cancel)
        .unwrap();
    assert!(!found);
}

#[test]
fn cancelled_search_finds_nothing() {
    let file = write_test_file("a\nfind me");
    let index = scan_into_index(&file, UTF_8, &ScanConfig::default());
    let cancel = AtomicBool::new(true);
    let found = Searcher::new(&file.path, UTF_8)
        .search(&index.full_view(), 0, 0, "find", |_, _| panic!("no match expected"), true, &cancel)
        .unwrap();
    assert!(!found);
}

#[test]
fn searches_in_the_file_charset() {
    let file = write_test_file(b"menu\ncaf\xE9 au lait");
    let index = scan_into_index(&file, WINDOWS_1252, &ScanConfig::default());
    let cancel = AtomicBool::new(false);
    let mut hit = None;
    Searcher::new(&file.path, WINDOWS_1252)
        .search(&index.full_view(), 0, 0, "é au", |l, c| hit = Some((l, c)), true, &cancel)
        .unwrap();
    assert_eq!(hit, Some((1, 3)));
}

#[test]
fn empty_term_finds_nothing() {
    let file = write_test_file("abc");
    assert_eq!(find_first(&file, &ScanConfig::default(), 0, 0, ""), None);
}

#[test]
fn matches_across_read_chunks_in_a_double_byte_charset() {
    // Two bytes per character, so the line spans more than one 64 KiB read.
    let text = format!("{}針{}\n{}針", "か".repeat(40_000), "か".repeat(10_000), "か".repeat(3));
    let (bytes, _, unmappable) = SHIFT_JIS.encode(&text);
    assert!(!unmappable);
    let file = write_test_file(&bytes);
    let index = scan_into_index(&file, SHIFT_JIS, &small_config(1024, 16));
    let cancel = AtomicBool::new(false);

    let mut hits = Vec::new();
    let found = Searcher::new(&file.path, SHIFT_JIS)
        .search(&index.full_view(), 0, 0, "針", |l, c| hits.push((l, c)), false, &cancel)
        .unwrap();
    assert!(found);
    assert_eq!(hits, vec![(0, 40_000), (1, 3)]);
}
