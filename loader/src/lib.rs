//! Seed loader: hex stream → executable region
//!
//! First stage of the bootstrap pipeline. Reads hex pairs (with comments and
//! whitespace) from a byte stream into a JIT-enabled region, seals the
//! region W→X with the required cache maintenance, and branches into it.
//! The sentinel byte 0x60 ends hex mode; the stream position after it
//! belongs to the next stage.

pub mod error;
pub mod hex;
pub mod jit;

pub use error::{LoaderError, Result};
pub use hex::{HexEnd, HexScanner, SENTINEL};
pub use jit::{JitRegion, SealedRegion, REGION_SIZE};

use std::io::Read;
use tracing::info;

/// The loader's driver. One public operation: [`Loader::run`].
pub struct Loader {
    region_size: usize,
}

impl Loader {
    pub fn new() -> Self {
        Self {
            region_size: REGION_SIZE,
        }
    }

    pub fn with_region_size(region_size: usize) -> Self {
        Self { region_size }
    }

    /// Scan the hex prefix of `input` and seal it into an executable region
    /// without branching. The reader is left on the first byte after the
    /// sentinel. Used by the pipeline driver, which substitutes the built-in
    /// VM for the image.
    pub fn capture(&self, input: &mut impl Read) -> Result<(SealedRegion, HexEnd)> {
        let region = JitRegion::map(self.region_size)?;
        let mut image = Vec::with_capacity(1024);
        let mut scanner = HexScanner::new(region.capacity());
        let end = scanner.scan(input, &mut image)?;
        info!(bytes = image.len(), ?end, "hex scan complete");
        let sealed = region.write_then_seal(&image)?;
        Ok((sealed, end))
    }

    /// The loader's contract: scan, seal, execute. Does not return unless
    /// scanning or sealing fails.
    pub fn run(&self, input: &mut impl Read) -> Result<()> {
        let (sealed, _) = self.capture(input)?;
        unsafe { sealed.enter() }
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}
