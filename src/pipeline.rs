//! Bootstrap pipeline
//!
//! One stream in, assembly out, three stages in sequence:
//! 1. Loader: scan the hex prefix into a sealed executable region.
//! 2. Forth VM: boot the extensions, evaluate the Forth portion of the
//!    stream.
//! 3. C compiler: entered when the stream executes the `c-compile` word,
//!    which hands the rest of stdin to the compiler stage.
//!
//! Each stage consumes its prefix of the stream completely before the next
//! begins. In this driver the sealed region is not branched into — the
//! built-in VM stands in for the loaded image; the standalone `load`
//! subcommand performs the real transfer of control.

use crate::error::{Result, ToolchainError};
use seedc_cc::CcError;
use seedc_forth::{InputStream, Vm};
use seedc_loader::{HexEnd, Loader, REGION_SIZE};
use std::cell::RefCell;
use std::io::{Read, Write};
use std::rc::Rc;
use std::time::Instant;
use tracing::{debug, info};

/// The word whose execution hands the stream to the compiler stage.
pub const HANDOFF_WORD: &str = "c-compile";

/// What the pipeline did, stage by stage.
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Bytes decoded into the sealed region.
    pub image_bytes: usize,
    /// Whether the sentinel ended hex mode (false: EOF did).
    pub sentinel_seen: bool,
    /// Loader stage time in milliseconds.
    pub load_time_ms: u64,
    /// VM + compiler stage time in milliseconds.
    pub eval_time_ms: u64,
}

pub struct Pipeline {
    region_size: usize,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            region_size: REGION_SIZE,
        }
    }

    pub fn with_region_size(region_size: usize) -> Self {
        Self { region_size }
    }

    /// Drive the full pipeline over `input`, writing assembly (and whatever
    /// the Forth portion prints) to `output`.
    pub fn run(
        &self,
        input: Box<dyn Read>,
        output: Box<dyn Write>,
    ) -> Result<PipelineStats> {
        let mut stats = PipelineStats::default();
        let mut stream = InputStream::new(input);

        // Stage 1: hex prefix into the JIT region.
        let load_start = Instant::now();
        let loader = Loader::with_region_size(self.region_size);
        let (region, end) = loader.capture(&mut stream)?;
        stats.image_bytes = region.used();
        stats.sentinel_seen = end == HexEnd::Sentinel;
        stats.load_time_ms = load_start.elapsed().as_millis() as u64;
        info!(
            bytes = stats.image_bytes,
            sentinel = stats.sentinel_seen,
            "seed image sealed"
        );

        if end == HexEnd::Eof {
            // The whole stream was hex; there is no Forth stage to run.
            return Ok(stats);
        }

        // Stages 2 and 3: the VM owns the rest of the stream; the compiler
        // is reached through the handoff word.
        let eval_start = Instant::now();
        let mut vm = Vm::new(stream, output);
        vm.boot().map_err(ToolchainError::Vm)?;

        let cc_failure: Rc<RefCell<Option<CcError>>> = Rc::new(RefCell::new(None));
        let stash = cc_failure.clone();
        vm.install_handoff(
            HANDOFF_WORD,
            Box::new(move |input, out| {
                debug!("compiler stage entered");
                seedc_cc::compile(input, out).map_err(|e| {
                    let msg = e.to_string();
                    *stash.borrow_mut() = Some(e);
                    msg
                })
            }),
        )
        .map_err(ToolchainError::Vm)?;

        match vm.interpret() {
            Ok(()) => {}
            Err(e) => {
                // Report the compiler's own error when the failure came
                // from the handed-off stage.
                if let Some(cc) = cc_failure.borrow_mut().take() {
                    return Err(ToolchainError::Compiler(cc));
                }
                return Err(ToolchainError::Vm(e));
            }
        }
        stats.eval_time_ms = eval_start.elapsed().as_millis() as u64;

        // The region stays mapped for the whole run, like the image it
        // stands in for.
        drop(region);

        info!(
            load_ms = stats.load_time_ms,
            eval_ms = stats.eval_time_ms,
            "pipeline complete"
        );
        Ok(stats)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
