//! Forth machine state and inner interpreter
//!
//! The VM owns two address spaces: a cell-granular data space holding
//! variable slots and the threads of colon definitions, and a byte-granular
//! string space for character buffers. Data-space addresses are in bytes and
//! always cell-aligned; `@`/`!` reject anything else.
//!
//! The inner interpreter is a single token loop. A colon call pushes the
//! saved instruction pointer on the return stack and jumps to the thread;
//! `EXIT` pops it. `BRANCH`/`0BRANCH` read an offset cell whose value is
//! relative to the address of that cell.

use crate::dict::{Code, Dict, Xt, F_HIDDEN};
use crate::error::{Result, VmError};
use crate::input::InputStream;
use crate::prims::register_prims;
use std::io::Write;
use tracing::debug;

pub const CELL: usize = 8;

/// Parameter stack capacity, in cells.
pub const STACK_CAP: usize = 1024;
/// Return stack capacity, in cells.
pub const RSTACK_CAP: usize = 1024;
/// Data space size in bytes (cell-granular).
pub const DATA_SIZE: usize = 512 * 1024;
/// String space size in bytes.
pub const STRING_SIZE: usize = 64 * 1024;

// Fixed data-space layout: system variables at the bottom, dictionary
// space after them.
pub const STATE_ADDR: usize = 0;
pub const BASE_ADDR: usize = CELL;
pub const LATEST_ADDR: usize = 2 * CELL;
pub const DATA_START: usize = 8 * CELL;

pub const TRUE: i64 = -1;
pub const FALSE: i64 = 0;

/// Host stage invoked by a handoff word: gets the remaining input stream
/// and the VM's output sink.
pub type HandoffFn =
    Box<dyn FnMut(&mut InputStream, &mut dyn Write) -> std::result::Result<(), String>>;

pub struct Vm {
    pub(crate) dict: Dict,
    pub(crate) cells: Vec<i64>,
    pub(crate) here: usize,
    pub(crate) strings: Vec<u8>,
    pub(crate) sheap: usize,
    pub(crate) stack: Vec<i64>,
    pub(crate) rstack: Vec<i64>,
    pub(crate) ip: usize,
    pub(crate) input: InputStream,
    pub(crate) out: Box<dyn Write>,
    pub(crate) exit_requested: bool,
    pub(crate) handoff: Option<HandoffFn>,
    // Tokens the outer interpreter compiles for literals and `;`.
    pub(crate) xt_lit: Xt,
    pub(crate) xt_exit: Xt,
    pub(crate) xt_type: Xt,
}

impl Vm {
    /// Fresh machine with primitives installed. `boot` must run before the
    /// control-structure words exist.
    pub fn new(input: InputStream, out: Box<dyn Write>) -> Self {
        let mut vm = Self {
            dict: Dict::new(),
            cells: vec![0; DATA_SIZE / CELL],
            here: DATA_START,
            strings: vec![0; STRING_SIZE],
            sheap: 0,
            stack: Vec::with_capacity(STACK_CAP),
            rstack: Vec::with_capacity(RSTACK_CAP),
            ip: 0,
            input,
            out,
            exit_requested: false,
            handoff: None,
            xt_lit: 0,
            xt_exit: 0,
            xt_type: 0,
        };
        register_prims(&mut vm);
        vm.xt_lit = vm.dict.find("LIT").expect("LIT is primitive");
        vm.xt_exit = vm.dict.find("EXIT").expect("EXIT is primitive");
        vm.xt_type = vm.dict.find("TYPE").expect("TYPE is primitive");
        vm.set_cell(STATE_ADDR, FALSE).expect("reserved slot");
        vm.set_cell(BASE_ADDR, 10).expect("reserved slot");
        vm.set_cell(LATEST_ADDR, vm.dict.latest().map_or(-1, |x| x as i64))
            .expect("reserved slot");
        vm
    }

    /// Load the bootstrap extensions (control structures and friends).
    pub fn boot(&mut self) -> Result<()> {
        self.eval_str(include_str!("boot.fs"))
    }

    /// Evaluate a source fragment, then restore the previous input stream.
    pub fn eval_str(&mut self, source: &str) -> Result<()> {
        let saved = std::mem::replace(&mut self.input, InputStream::from_str(source));
        let result = self.interpret();
        self.input = saved;
        result
    }

    /// Register the host word that takes over the input stream (the C
    /// compiler stage in the bootstrap pipeline).
    pub fn install_handoff(&mut self, name: &str, f: HandoffFn) -> Result<()> {
        self.handoff = Some(f);
        let xt = self.dict.define(name, Code::Handoff, 0)?;
        self.set_cell(LATEST_ADDR, xt as i64)?;
        Ok(())
    }

    pub fn stack(&self) -> &[i64] {
        &self.stack
    }

    /// Clear both stacks and return to interpret state. The REPL calls
    /// this after an error so the next line starts clean.
    pub fn abort(&mut self) {
        self.stack.clear();
        self.rstack.clear();
        self.set_compiling(false);
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    // ----- stacks -----

    pub(crate) fn push(&mut self, v: i64) -> Result<()> {
        if self.stack.len() >= STACK_CAP {
            return Err(VmError::StackOverflow { max: STACK_CAP });
        }
        self.stack.push(v);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<i64> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    pub(crate) fn peek(&self, depth: usize) -> Result<i64> {
        let len = self.stack.len();
        if depth >= len {
            return Err(VmError::StackUnderflow);
        }
        Ok(self.stack[len - 1 - depth])
    }

    pub(crate) fn rpush(&mut self, v: i64) -> Result<()> {
        if self.rstack.len() >= RSTACK_CAP {
            return Err(VmError::ReturnStackOverflow { max: RSTACK_CAP });
        }
        self.rstack.push(v);
        Ok(())
    }

    pub(crate) fn rpop(&mut self) -> Result<i64> {
        self.rstack.pop().ok_or(VmError::ReturnStackUnderflow)
    }

    // ----- data space -----

    fn cell_index(&self, addr: i64) -> Result<usize> {
        let a = usize::try_from(addr).map_err(|_| VmError::InvalidAddress { addr })?;
        if a % CELL != 0 || a / CELL >= self.cells.len() {
            return Err(VmError::InvalidAddress { addr });
        }
        Ok(a / CELL)
    }

    pub(crate) fn get_cell(&self, addr: usize) -> Result<i64> {
        Ok(self.cells[self.cell_index(addr as i64)?])
    }

    pub(crate) fn set_cell(&mut self, addr: usize, v: i64) -> Result<()> {
        let idx = self.cell_index(addr as i64)?;
        self.cells[idx] = v;
        Ok(())
    }

    pub(crate) fn fetch(&self, addr: i64) -> Result<i64> {
        Ok(self.cells[self.cell_index(addr)?])
    }

    pub(crate) fn store(&mut self, addr: i64, v: i64) -> Result<()> {
        let idx = self.cell_index(addr)?;
        self.cells[idx] = v;
        Ok(())
    }

    /// Append one cell at HERE.
    pub(crate) fn emit_cell(&mut self, v: i64) -> Result<()> {
        if self.here + CELL > DATA_SIZE {
            return Err(VmError::DictionaryFull);
        }
        self.cells[self.here / CELL] = v;
        self.here += CELL;
        Ok(())
    }

    /// Reserve `n` bytes of data space, rounded up to whole cells.
    pub(crate) fn allot(&mut self, n: i64) -> Result<()> {
        if n < 0 {
            return Err(VmError::InvalidAddress { addr: n });
        }
        let bytes = (n as usize).div_ceil(CELL) * CELL;
        if self.here + bytes > DATA_SIZE {
            return Err(VmError::DictionaryFull);
        }
        self.here += bytes;
        Ok(())
    }

    // ----- string space -----

    pub(crate) fn byte_index(&self, addr: i64) -> Result<usize> {
        usize::try_from(addr)
            .ok()
            .filter(|&a| a < self.strings.len())
            .ok_or(VmError::InvalidAddress { addr })
    }

    pub(crate) fn string_range(&self, addr: i64, len: i64) -> Result<std::ops::Range<usize>> {
        let start = self.byte_index(addr)?;
        let n = usize::try_from(len).map_err(|_| VmError::InvalidAddress { addr: len })?;
        if start + n > self.strings.len() {
            return Err(VmError::InvalidAddress { addr: addr + len });
        }
        Ok(start..start + n)
    }

    /// Copy bytes into string space at the heap cursor. Advances the cursor
    /// only when `permanent` (compiled strings); transient strings are
    /// overwritten by the next caller.
    pub(crate) fn stash_string(&mut self, data: &[u8], permanent: bool) -> Result<usize> {
        if self.sheap + data.len() > self.strings.len() {
            return Err(VmError::DictionaryFull);
        }
        let addr = self.sheap;
        self.strings[addr..addr + data.len()].copy_from_slice(data);
        if permanent {
            self.sheap += data.len();
        }
        Ok(addr)
    }

    // ----- execution -----

    /// Execute one word by token. Colon definitions run in a single token
    /// loop; nested calls stay inside the same loop.
    pub fn execute(&mut self, xt: Xt) -> Result<()> {
        let code = self.dict.entry(xt).code;
        match code {
            Code::Prim(p) => self.prim(p),
            Code::Variable { addr } => self.push(addr as i64),
            Code::Constant { value } => self.push(value),
            Code::Handoff => self.run_handoff(),
            Code::Colon { addr } => {
                self.rpush(self.ip as i64)?;
                let floor = self.rstack.len();
                self.ip = addr;
                while self.rstack.len() >= floor && !self.exit_requested {
                    let token = self.get_cell(self.ip)?;
                    self.ip += CELL;
                    let code = self.dict.entry_checked(token)?.code;
                    match code {
                        Code::Prim(p) => self.prim(p)?,
                        Code::Variable { addr } => self.push(addr as i64)?,
                        Code::Constant { value } => self.push(value)?,
                        Code::Handoff => self.run_handoff()?,
                        Code::Colon { addr } => {
                            self.rpush(self.ip as i64)?;
                            self.ip = addr;
                        }
                    }
                }
                Ok(())
            }
        }
    }

    pub(crate) fn run_handoff(&mut self) -> Result<()> {
        debug!("handing input stream to host stage");
        let mut f = self.handoff.take().ok_or_else(|| {
            VmError::Handoff("no host stage registered".to_string())
        })?;
        self.out.flush()?;
        let result = f(&mut self.input, &mut *self.out);
        self.handoff = Some(f);
        result.map_err(VmError::Handoff)
    }

    // ----- definition helpers used by `:`, `;`, VARIABLE, CONSTANT -----

    pub(crate) fn define_word(&mut self, name: &str, code: Code, extra: u8) -> Result<Xt> {
        let xt = self.dict.define(name, code, extra)?;
        self.set_cell(LATEST_ADDR, xt as i64)?;
        Ok(xt)
    }

    pub(crate) fn reveal_latest(&mut self) {
        if let Some(xt) = self.dict.latest() {
            self.dict.entry_mut(xt).flags &= !F_HIDDEN;
        }
    }

    pub(crate) fn compiling(&self) -> bool {
        self.cells[STATE_ADDR / CELL] != FALSE
    }

    pub(crate) fn set_compiling(&mut self, on: bool) {
        self.cells[STATE_ADDR / CELL] = if on { TRUE } else { FALSE };
    }

    pub(crate) fn base(&self) -> u32 {
        let b = self.cells[BASE_ADDR / CELL];
        b.clamp(2, 36) as u32
    }
}
