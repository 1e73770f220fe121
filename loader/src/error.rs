//! Error types for the hex loader

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LoaderError>;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("region allocation of {size} bytes failed: {source}")]
    Mmap {
        size: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("write protection change failed: {0}")]
    Protect(#[source] std::io::Error),

    #[error("hex stream overflows region: {capacity} bytes")]
    RegionOverflow { capacity: usize },

    #[error("read error on input stream: {0}")]
    Io(#[from] std::io::Error),
}
