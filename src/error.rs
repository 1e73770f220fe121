//! Toolchain-level errors
//!
//! Each stage owns its failures; this wrapper only records which stage
//! failed so the driver can report it and pick the exit status. The
//! pipeline's status is that of the innermost failing stage.

use seedc_cc::CcError;
use seedc_forth::VmError;
use seedc_loader::LoaderError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolchainError>;

#[derive(Error, Debug)]
pub enum ToolchainError {
    #[error("loader: {0}")]
    Loader(#[from] LoaderError),

    #[error("forth: {0}")]
    Vm(#[from] VmError),

    #[error("compiler: {0}")]
    Compiler(#[from] CcError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolchainError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            ToolchainError::Loader(_) => 2,
            ToolchainError::Vm(_) => 3,
            ToolchainError::Compiler(_) => 4,
            ToolchainError::Io(_) => 1,
        }
    }
}
