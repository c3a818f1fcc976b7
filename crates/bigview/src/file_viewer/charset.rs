//! Charset resolution and the three decoding modes the viewer needs.
//!
//! Every decode starts from a fresh `encoding_rs` decoder at a known character boundary.
//! That is what makes random access from a checkpoint possible, and also why stateful
//! encodings (ISO-2022-JP, "replacement") are rejected up front. Big5 is rejected too: a few
//! of its byte pairs decode to two characters, and no checkpoint can sit between them.

use std::borrow::Cow;

use encoding_rs::{BIG5, DecoderResult, Encoding, ISO_2022_JP, REPLACEMENT};

use super::{MAX_BYTES_PER_CHAR, ViewerError};

/// Resolves a WHATWG charset label such as `"utf-8"`, `"latin1"` or `"shift_jis"`.
pub fn resolve_charset(label: &str) -> Result<&'static Encoding, ViewerError> {
    let encoding = Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| ViewerError::UnsupportedCharset(label.to_string()))?;
    if encoding == ISO_2022_JP || encoding == REPLACEMENT {
        return Err(ViewerError::UnsupportedCharset(format!(
            "{} (stateful encodings cannot be decoded from an arbitrary position)",
            encoding.name()
        )));
    }
    if encoding == BIG5 {
        return Err(ViewerError::UnsupportedCharset(format!(
            "{} (some byte sequences decode to more than one character)",
            encoding.name()
        )));
    }
    Ok(encoding)
}

/// Result of decoding one opportunistic window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct WindowDecode {
    /// Bytes at the start of the window that decoded to exactly the characters in the output.
    pub clean_bytes: usize,
    /// The window ended in (or contained) a sequence whose meaning is not settled by the
    /// window alone: a character cut in half, or malformed input. Decoding must resume
    /// character by character at `clean_bytes`.
    pub ambiguous: bool,
}

/// Decodes `window` in one go into `out` (cleared first).
///
/// Decoding stops at the first malformed or truncated sequence, so `out` only ever holds
/// characters whose bytes are fully inside `window[..clean_bytes]`.
pub(super) fn decode_window(encoding: &'static Encoding, window: &[u8], out: &mut String) -> WindowDecode {
    out.clear();
    let mut decoder = encoding.new_decoder_without_bom_handling();
    let needed = decoder
        .max_utf8_buffer_length_without_replacement(window.len())
        .unwrap_or(window.len() * 3 + MAX_BYTES_PER_CHAR);
    out.reserve(needed);
    let (result, read) = decoder.decode_to_string_without_replacement(window, out, true);
    match result {
        DecoderResult::InputEmpty => WindowDecode {
            clean_bytes: read,
            ambiguous: false,
        },
        DecoderResult::Malformed(bad, extra) => WindowDecode {
            clean_bytes: read.saturating_sub(bad as usize + extra as usize),
            ambiguous: true,
        },
        DecoderResult::OutputFull => {
            // Cannot tell where the output stops in the input, start over one char at a time.
            out.clear();
            WindowDecode {
                clean_bytes: 0,
                ambiguous: true,
            }
        }
    }
}

/// Strictly decodes the single character at the start of `bytes`.
///
/// Returns the character and the number of bytes it occupies. Malformed input becomes one
/// U+FFFD covering the malformed sequence. `bytes` must hold at least [`MAX_BYTES_PER_CHAR`]
/// bytes unless `at_eof` is set.
pub(super) fn decode_one(encoding: &'static Encoding, bytes: &[u8], at_eof: bool, out: &mut String) -> usize {
    let limit = bytes.len().min(MAX_BYTES_PER_CHAR);
    for len in 1..=limit {
        let last = at_eof && len == bytes.len();
        let mut decoder = encoding.new_decoder_without_bom_handling();
        out.clear();
        out.reserve(MAX_BYTES_PER_CHAR * 4);
        let (result, _read) = decoder.decode_to_string_without_replacement(&bytes[..len], out, last);
        match result {
            DecoderResult::Malformed(bad, _extra) => {
                out.clear();
                out.push(char::REPLACEMENT_CHARACTER);
                return (bad as usize).clamp(1, len);
            }
            DecoderResult::InputEmpty | DecoderResult::OutputFull if !out.is_empty() => return len,
            DecoderResult::InputEmpty | DecoderResult::OutputFull => {}
        }
    }
    out.clear();
    out.push(char::REPLACEMENT_CHARACTER);
    1
}

/// Replacement decoding of a span that starts on a character boundary.
pub(super) fn decode_lossy<'a>(encoding: &'static Encoding, bytes: &'a [u8]) -> Cow<'a, str> {
    encoding.decode_without_bom_handling(bytes).0
}
