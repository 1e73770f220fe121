//! Error types for the Forth VM

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VmError>;

#[derive(Error, Debug)]
pub enum VmError {
    #[error("stack underflow")]
    StackUnderflow,

    #[error("stack overflow: capacity {max}")]
    StackOverflow { max: usize },

    #[error("return stack underflow")]
    ReturnStackUnderflow,

    #[error("return stack overflow: capacity {max}")]
    ReturnStackOverflow { max: usize },

    #[error("dictionary space exhausted")]
    DictionaryFull,

    #[error("word name too long (31 byte limit): {name}")]
    NameTooLong { name: String },

    #[error("unknown word in definition: {name}")]
    UnknownWord { name: String },

    #[error("bad address: {addr:#x}")]
    InvalidAddress { addr: i64 },

    #[error("division by zero")]
    DivisionByZero,

    #[error("bad execution token: {value}")]
    InvalidToken { value: i64 },

    #[error("{word} outside a definition")]
    CompileOnly { word: String },

    #[error("unexpected end of input while reading {context}")]
    UnexpectedEof { context: &'static str },

    #[error("compiler stage failed: {0}")]
    Handoff(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
