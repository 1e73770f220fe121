//! Error types for the C-subset compiler
//!
//! The wire diagnostic is always the bare `ERR` line; these variants exist
//! so the driver and the tests can tell failures apart.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CcError>;

#[derive(Error, Debug)]
pub enum CcError {
    #[error("unexpected character: {found:?}")]
    UnexpectedChar { found: char },

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("expected {expected}, found {found}")]
    Unexpected { expected: &'static str, found: String },

    #[error("bad integer literal: {text}")]
    BadNumber { text: String },

    #[error("unknown identifier: {name}")]
    UnknownIdentifier { name: String },

    #[error("too many parameters (limit 8)")]
    TooManyParams,

    #[error("too many locals (limit {max})")]
    SymbolTableFull { max: usize },

    #[error("locals overflow the {frame}-byte frame")]
    FrameOverflow { frame: i64 },

    #[error("for-loop update clause too long")]
    TokenBufferFull,

    #[error("assignment target is not an lvalue")]
    NotAnLvalue,

    #[error("operand is not a pointer")]
    ExpectedPointer,

    #[error("operand is not an integer")]
    ExpectedInt,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
