//! C-subset lexer
//!
//! Reads bytes from the tail of the shared input stream through a two-byte
//! unget buffer. Besides the live stream there is a replay source: the
//! parser records the tokens of a for-loop update clause into a bounded
//! buffer and re-reads them after the loop body.

use crate::error::{CcError, Result};
use smallvec::SmallVec;
use std::io::Read;

/// Capacity of the update-clause token buffer.
pub const TOKEN_BUF_MAX: usize = 48;

pub type TokenBuf = SmallVec<[Tok; TOKEN_BUF_MAX]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tok {
    Num(i64),
    Ident(String),
    KwInt,
    KwReturn,
    KwIf,
    KwElse,
    KwWhile,
    KwFor,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Assign,
    EqEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Eof,
}

impl Tok {
    pub fn describe(&self) -> String {
        format!("{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceMode {
    Stream,
    Replay,
}

pub struct Lexer<R: Read> {
    src: R,
    unget: SmallVec<[u8; 2]>,
    peeked: Option<Tok>,
    mode: SourceMode,
    replay: TokenBuf,
    replay_pos: usize,
    /// Stream lookahead parked while a replay is active.
    stashed: Option<Tok>,
}

impl<R: Read> Lexer<R> {
    pub fn new(src: R) -> Self {
        Self {
            src,
            unget: SmallVec::new(),
            peeked: None,
            mode: SourceMode::Stream,
            replay: TokenBuf::new(),
            replay_pos: 0,
            stashed: None,
        }
    }

    /// Look at the next token without consuming it.
    pub fn peek(&mut self) -> Result<&Tok> {
        if self.peeked.is_none() {
            self.peeked = Some(self.read_token()?);
        }
        Ok(self.peeked.as_ref().expect("just filled"))
    }

    /// Consume and return the next token.
    pub fn advance(&mut self) -> Result<Tok> {
        if let Some(tok) = self.peeked.take() {
            return Ok(tok);
        }
        self.read_token()
    }

    /// Switch the token source to `tokens`; an EOF sentinel terminates the
    /// replayed expression. Any live lookahead is parked until
    /// [`Lexer::end_replay`].
    pub fn start_replay(&mut self, tokens: TokenBuf) {
        self.stashed = self.peeked.take();
        self.replay = tokens;
        self.replay.push(Tok::Eof);
        self.replay_pos = 0;
        self.mode = SourceMode::Replay;
    }

    /// Back to the live stream, restoring the parked lookahead.
    pub fn end_replay(&mut self) {
        self.mode = SourceMode::Stream;
        self.peeked = self.stashed.take();
        self.replay.clear();
        self.replay_pos = 0;
    }

    fn read_token(&mut self) -> Result<Tok> {
        if self.mode == SourceMode::Replay {
            let tok = self
                .replay
                .get(self.replay_pos)
                .cloned()
                .unwrap_or(Tok::Eof);
            if self.replay_pos < self.replay.len() {
                self.replay_pos += 1;
            }
            return Ok(tok);
        }
        self.lex_stream()
    }

    // ----- character reader -----

    fn getc(&mut self) -> Result<Option<u8>> {
        if let Some(b) = self.unget.pop() {
            return Ok(Some(b));
        }
        let mut buf = [0u8; 1];
        loop {
            match self.src.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn ungetc(&mut self, b: u8) {
        debug_assert!(self.unget.len() < 2);
        self.unget.push(b);
    }

    // ----- stream lexing -----

    fn lex_stream(&mut self) -> Result<Tok> {
        loop {
            let Some(b) = self.getc()? else {
                return Ok(Tok::Eof);
            };
            match b {
                b' ' | b'\t' | b'\r' | b'\n' => continue,
                b'/' => match self.getc()? {
                    Some(b'/') => {
                        while let Some(c) = self.getc()? {
                            if c == b'\n' {
                                break;
                            }
                        }
                    }
                    Some(b'*') => self.skip_block_comment()?,
                    Some(c) => {
                        self.ungetc(c);
                        return Ok(Tok::Slash);
                    }
                    None => return Ok(Tok::Slash),
                },
                b'0'..=b'9' => return self.lex_number(b),
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => return self.lex_ident(b),
                b'(' => return Ok(Tok::LParen),
                b')' => return Ok(Tok::RParen),
                b'{' => return Ok(Tok::LBrace),
                b'}' => return Ok(Tok::RBrace),
                b'[' => return Ok(Tok::LBracket),
                b']' => return Ok(Tok::RBracket),
                b';' => return Ok(Tok::Semi),
                b',' => return Ok(Tok::Comma),
                b'+' => return Ok(Tok::Plus),
                b'-' => return Ok(Tok::Minus),
                b'*' => return Ok(Tok::Star),
                b'%' => return Ok(Tok::Percent),
                b'&' => return Ok(Tok::Amp),
                b'=' => {
                    return Ok(match self.getc()? {
                        Some(b'=') => Tok::EqEq,
                        Some(c) => {
                            self.ungetc(c);
                            Tok::Assign
                        }
                        None => Tok::Assign,
                    })
                }
                b'!' => {
                    return match self.getc()? {
                        Some(b'=') => Ok(Tok::Ne),
                        _ => Err(CcError::UnexpectedChar { found: '!' }),
                    }
                }
                b'<' => {
                    return Ok(match self.getc()? {
                        Some(b'=') => Tok::Le,
                        Some(c) => {
                            self.ungetc(c);
                            Tok::Lt
                        }
                        None => Tok::Lt,
                    })
                }
                b'>' => {
                    return Ok(match self.getc()? {
                        Some(b'=') => Tok::Ge,
                        Some(c) => {
                            self.ungetc(c);
                            Tok::Gt
                        }
                        None => Tok::Gt,
                    })
                }
                _ => {
                    return Err(CcError::UnexpectedChar {
                        found: b as char,
                    })
                }
            }
        }
    }

    fn skip_block_comment(&mut self) -> Result<()> {
        loop {
            match self.getc()? {
                Some(b'*') => {
                    if let Some(c) = self.getc()? {
                        if c == b'/' {
                            return Ok(());
                        }
                        self.ungetc(c);
                    } else {
                        return Err(CcError::UnexpectedEof);
                    }
                }
                Some(_) => {}
                None => return Err(CcError::UnexpectedEof),
            }
        }
    }

    fn lex_number(&mut self, first: u8) -> Result<Tok> {
        let mut text = String::new();
        text.push(first as char);
        while let Some(b) = self.getc()? {
            if b.is_ascii_digit() {
                text.push(b as char);
            } else {
                self.ungetc(b);
                break;
            }
        }
        text.parse::<i64>()
            .map(Tok::Num)
            .map_err(|_| CcError::BadNumber { text })
    }

    fn lex_ident(&mut self, first: u8) -> Result<Tok> {
        let mut name = String::new();
        name.push(first as char);
        while let Some(b) = self.getc()? {
            if b.is_ascii_alphanumeric() || b == b'_' {
                name.push(b as char);
            } else {
                self.ungetc(b);
                break;
            }
        }
        // Keyword matching folds to lowercase; identifiers keep their case.
        Ok(match name.to_ascii_lowercase().as_str() {
            "int" => Tok::KwInt,
            "return" => Tok::KwReturn,
            "if" => Tok::KwIf,
            "else" => Tok::KwElse,
            "while" => Tok::KwWhile,
            "for" => Tok::KwFor,
            _ => Tok::Ident(name),
        })
    }
}
