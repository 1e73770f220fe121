//! seedc-cc: C-subset → ARM64 assembly
//!
//! Final stage of the bootstrap pipeline. A fused recursive-descent parser
//! and code generator: one pass over the source, Mach-O flavored assembly
//! text out. No optimization, no recovery — the first error prints the
//! `ERR` diagnostic and stops.
//!
//! # Example
//!
//! ```rust
//! use std::io::Cursor;
//!
//! let mut asm = Vec::new();
//! seedc_cc::compile(Cursor::new(b"int main(){ return 42; }".to_vec()), &mut asm)?;
//! assert!(String::from_utf8(asm)?.contains("_main:"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod emit;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod symtab;

pub use emit::{Asm, Label};
pub use error::{CcError, Result};
pub use lexer::{Lexer, Tok, TOKEN_BUF_MAX};
pub use parser::{Category, Compiler, MAX_PARAMS};
pub use symtab::{Sym, SymTab, VarKind, FRAME_SIZE, SYMTAB_MAX};

use std::io::{Read, Write};

/// Compile a whole translation unit from `input` to `output`.
pub fn compile(input: impl Read, output: impl Write) -> Result<()> {
    Compiler::new(input, output).compile()
}
