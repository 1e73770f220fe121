//! Hex stream scanner
//!
//! The seed image arrives as hex pairs interleaved with whitespace and line
//! comments. Scanning stops at the sentinel byte 0x60 (a grave accent); every
//! byte after it belongs to the next layer and must stay on the stream.

use crate::error::{LoaderError, Result};
use std::io::Read;

/// The byte that ends hex mode. Everything after it is Forth source.
pub const SENTINEL: u8 = 0x60;

/// Why the scanner stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexEnd {
    /// The sentinel byte was consumed.
    Sentinel,
    /// The input ran out before a sentinel appeared.
    Eof,
}

/// Single-pass scanner that assembles hex pairs into bytes.
///
/// Accepts upper- and lowercase digits. Whitespace between digits is
/// ignored; `;` and `#` start a comment that runs to end of line. A single
/// dangling nibble at end of input is discarded.
pub struct HexScanner {
    capacity: usize,
    /// Pending high nibble, when the scanner is mid-pair.
    pending: Option<u8>,
    in_comment: bool,
}

impl HexScanner {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            pending: None,
            in_comment: false,
        }
    }

    /// Scan `input` one byte at a time until the sentinel or EOF, appending
    /// assembled bytes to `out`. The reader is left positioned on the byte
    /// after the sentinel.
    pub fn scan(&mut self, input: &mut impl Read, out: &mut Vec<u8>) -> Result<HexEnd> {
        let mut byte = [0u8; 1];
        loop {
            let n = input.read(&mut byte)?;
            if n == 0 {
                // Dangling nibble is dropped silently.
                self.pending = None;
                return Ok(HexEnd::Eof);
            }
            let b = byte[0];

            if self.in_comment {
                if b == b'\n' {
                    self.in_comment = false;
                }
                continue;
            }

            match b {
                SENTINEL => {
                    self.pending = None;
                    return Ok(HexEnd::Sentinel);
                }
                b' ' | b'\t' | b'\n' | b'\r' => {}
                b';' | b'#' => self.in_comment = true,
                _ => {
                    if let Some(nibble) = hex_value(b) {
                        match self.pending.take() {
                            Some(high) => {
                                if out.len() >= self.capacity {
                                    return Err(LoaderError::RegionOverflow {
                                        capacity: self.capacity,
                                    });
                                }
                                out.push((high << 4) | nibble);
                            }
                            None => self.pending = Some(nibble),
                        }
                    }
                    // Any other byte is ignored, same as whitespace.
                }
            }
        }
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::{Cursor, Read};

    fn scan_all(input: &str) -> (Vec<u8>, HexEnd) {
        let mut out = Vec::new();
        let mut scanner = HexScanner::new(1 << 16);
        let end = scanner.scan(&mut Cursor::new(input), &mut out).unwrap();
        (out, end)
    }

    #[test]
    fn test_simple_pairs() {
        let (bytes, end) = scan_all("40 05 80 d2");
        assert_eq!(bytes, vec![0x40, 0x05, 0x80, 0xd2]);
        assert_eq!(end, HexEnd::Eof);
    }

    #[test]
    fn test_case_insensitive() {
        let (lower, _) = scan_all("deadbeef");
        let (upper, _) = scan_all("DEADBEEF");
        assert_eq!(lower, upper);
        assert_eq!(lower, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_pairs_split_across_whitespace() {
        let (bytes, _) = scan_all("d\n e ad");
        assert_eq!(bytes, vec![0xde, 0xad]);
    }

    #[test]
    fn test_comments_skipped() {
        let (bytes, _) = scan_all("; leading comment\n12 # mid ff comment\n34");
        assert_eq!(bytes, vec![0x12, 0x34]);
    }

    #[test]
    fn test_sentinel_ends_scan() {
        let mut input = Cursor::new("12 34 `rest of stream");
        let mut out = Vec::new();
        let mut scanner = HexScanner::new(1 << 16);
        let end = scanner.scan(&mut input, &mut out).unwrap();
        assert_eq!(end, HexEnd::Sentinel);
        assert_eq!(out, vec![0x12, 0x34]);
        let mut rest = String::new();
        input.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "rest of stream");
    }

    #[test]
    fn test_dangling_nibble_discarded() {
        let (bytes, _) = scan_all("12 3");
        assert_eq!(bytes, vec![0x12]);
    }

    #[test]
    fn test_sentinel_inside_comment_is_comment_text() {
        let (bytes, end) = scan_all("12 ; ` not a sentinel\n34");
        assert_eq!(bytes, vec![0x12, 0x34]);
        assert_eq!(end, HexEnd::Eof);
    }

    #[test]
    fn test_overflow_reported() {
        let mut out = Vec::new();
        let mut scanner = HexScanner::new(2);
        let err = scanner
            .scan(&mut Cursor::new("010203"), &mut out)
            .unwrap_err();
        assert!(matches!(err, LoaderError::RegionOverflow { capacity: 2 }));
    }

    proptest! {
        /// Hex invariance: rendering arbitrary bytes with arbitrary case,
        /// whitespace, and comments scans back to the same bytes.
        #[test]
        fn prop_hex_round_trip(
            data in proptest::collection::vec(any::<u8>(), 0..256),
            seps in proptest::collection::vec(0usize..4, 0..256),
        ) {
            let mut text = String::new();
            for (i, b) in data.iter().enumerate() {
                match seps.get(i).copied().unwrap_or(0) {
                    0 => text.push_str(&format!("{:02x}", b)),
                    1 => text.push_str(&format!("{:02X} ", b)),
                    2 => text.push_str(&format!("\t{:02x}\n", b)),
                    _ => text.push_str(&format!("{:02x} ; noise\n", b)),
                }
            }
            let (bytes, end) = scan_all(&text);
            prop_assert_eq!(bytes, data);
            prop_assert_eq!(end, HexEnd::Eof);
        }
    }
}
