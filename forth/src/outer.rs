//! Outer interpreter
//!
//! Reads whitespace-delimited words from the input stream and either
//! executes them, compiles them into the open definition, or parses them as
//! numbers in the current base. Immediate words execute even while
//! compiling; that is the whole control-structure mechanism.

use crate::error::{Result, VmError};
use crate::vm::Vm;
use std::io::Write;
use tracing::trace;

impl Vm {
    /// Interpret the input stream until EOF or BYE.
    pub fn interpret(&mut self) -> Result<()> {
        loop {
            if self.exit_requested {
                break;
            }
            let Some(word) = self.read_word()? else {
                break;
            };
            trace!(word = %word, "interpreting");
            self.interpret_word(&word)?;
        }
        self.out.flush()?;
        Ok(())
    }

    fn interpret_word(&mut self, word: &str) -> Result<()> {
        if let Some(xt) = self.dict.find(word) {
            if self.compiling() && !self.dict.entry(xt).is_immediate() {
                self.emit_cell(xt as i64)
            } else {
                self.execute(xt)
            }
        } else if let Some(n) = self.parse_number(word) {
            if self.compiling() {
                let lit = self.xt_lit as i64;
                self.emit_cell(lit)?;
                self.emit_cell(n)
            } else {
                self.push(n)
            }
        } else if self.compiling() {
            // A name that is neither word nor number poisons the open
            // definition; there is no way to continue.
            Err(VmError::UnknownWord {
                name: word.to_string(),
            })
        } else {
            eprintln!("{} ?", word);
            Ok(())
        }
    }

    /// Next whitespace-delimited word. Whitespace is every byte <= 0x20.
    pub(crate) fn read_word(&mut self) -> Result<Option<String>> {
        let first;
        loop {
            match self.input.key()? {
                None => return Ok(None),
                Some(b) if b <= 0x20 => continue,
                Some(b) => {
                    first = b;
                    break;
                }
            }
        }
        let mut word = vec![first];
        loop {
            match self.input.key()? {
                None => break,
                Some(b) if b <= 0x20 => break,
                Some(b) => word.push(b),
            }
        }
        Ok(Some(String::from_utf8_lossy(&word).into_owned()))
    }

    /// Bytes up to the closing quote of a string-quote word.
    pub(crate) fn read_until_quote(&mut self) -> Result<Vec<u8>> {
        let mut text = Vec::new();
        loop {
            match self.input.key()? {
                Some(0x22) => return Ok(text),
                Some(b) => text.push(b),
                None => {
                    return Err(VmError::UnexpectedEof {
                        context: "string before closing quote",
                    })
                }
            }
        }
    }

    /// Number syntax: optional base prefix (`$` hex, `#` decimal, `%`
    /// binary), optional `-`, then digits of the chosen base. Digits past 9
    /// are letters of either case. Anything else fails the parse.
    pub(crate) fn parse_number(&self, word: &str) -> Option<i64> {
        let bytes = word.as_bytes();
        let mut base = self.base() as i64;
        let mut i = 0;

        match bytes.first() {
            Some(b'$') => {
                base = 16;
                i += 1;
            }
            Some(b'#') => {
                base = 10;
                i += 1;
            }
            Some(b'%') => {
                base = 2;
                i += 1;
            }
            _ => {}
        }

        let neg = bytes.get(i) == Some(&b'-');
        if neg {
            i += 1;
        }
        if i >= bytes.len() {
            return None;
        }

        let mut value: i64 = 0;
        for &b in &bytes[i..] {
            let digit = match b {
                b'0'..=b'9' => (b - b'0') as i64,
                b'a'..=b'z' => (b - b'a') as i64 + 10,
                b'A'..=b'Z' => (b - b'A') as i64 + 10,
                _ => return None,
            };
            if digit >= base {
                return None;
            }
            value = value.wrapping_mul(base).wrapping_add(digit);
        }
        Some(if neg { value.wrapping_neg() } else { value })
    }
}
