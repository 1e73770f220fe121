//! seedc — trust-minimized bootstrap toolchain
//!
//! Four stages reach a working C compiler from a byte-auditable seed:
//! a hex loader fills an executable region, a threaded-code Forth VM
//! interprets the next portion of the stream, the bootstrap extensions
//! give it control structures, and the final stage compiles a C subset to
//! ARM64 Mach-O assembly. One stdin carries the whole pipeline; each stage
//! consumes its prefix and leaves the rest for the next.
//!
//! # Example
//!
//! ```rust
//! use seedc::Pipeline;
//! use std::io::Cursor;
//!
//! let source = b"` c-compile int main(){ return 42; }".to_vec();
//! let stats = Pipeline::new().run(Box::new(Cursor::new(source)), Box::new(std::io::sink()))?;
//! assert!(stats.sentinel_seen);
//! # Ok::<(), seedc::ToolchainError>(())
//! ```

pub mod error;
pub mod pipeline;

pub use error::{Result, ToolchainError};
pub use pipeline::{Pipeline, PipelineStats, HANDOFF_WORD};

// The stage crates, re-exported under short names.
pub use seedc_cc as cc;
pub use seedc_forth as forth;
pub use seedc_loader as loader;
