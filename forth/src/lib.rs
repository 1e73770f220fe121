//! seedc-forth: threaded-code Forth virtual machine
//!
//! Second stage of the bootstrap pipeline. The VM owns a dictionary, a
//! cell-granular data space, a string space, and both stacks; colon
//! definitions are threads of execution tokens run by a single token loop.
//! The bootstrap extensions (`boot.fs`) add the control-structure words in
//! Forth itself, and a registered handoff word passes the remaining input
//! stream to the next stage.
//!
//! # Example
//!
//! ```rust
//! use seedc_forth::{InputStream, Vm};
//!
//! let mut vm = Vm::new(InputStream::from_str(": SQ DUP * ; 7 SQ"), Box::new(Vec::new()));
//! vm.boot()?;
//! vm.interpret()?;
//! assert_eq!(vm.stack(), &[49]);
//! # Ok::<(), seedc_forth::VmError>(())
//! ```

pub mod dict;
pub mod error;
pub mod input;
mod outer;
pub mod prims;
pub mod vm;

pub use dict::{Code, Dict, Entry, Xt, F_HIDDEN, F_IMMEDIATE, NAME_MAX};
pub use error::{Result, VmError};
pub use input::InputStream;
pub use prims::Prim;
pub use vm::{HandoffFn, Vm, CELL, FALSE, RSTACK_CAP, STACK_CAP, TRUE};
