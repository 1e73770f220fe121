//! Primitive words
//!
//! Everything the bootstrap extensions and the compiler stage need from the
//! kernel, dispatched from a single match. Registration order puts the
//! oldest words at the bottom of the dictionary; nothing depends on it.

use crate::dict::{Code, F_HIDDEN, F_IMMEDIATE};
use crate::error::{Result, VmError};
use crate::vm::{Vm, BASE_ADDR, CELL, FALSE, LATEST_ADDR, STATE_ADDR, TRUE};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prim {
    // Stack
    Drop,
    Dup,
    QDup,
    Swap,
    Over,
    Rot,
    Nip,
    Tuck,
    TwoDup,
    TwoDrop,
    Pick,
    Depth,
    ToR,
    RFrom,
    RFetch,
    RDrop,
    // Arithmetic / bitwise
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    DivMod,
    Negate,
    TwoStar,
    TwoSlash,
    Cells,
    Min,
    Max,
    OnePlus,
    OneMinus,
    And,
    Or,
    Xor,
    Invert,
    Lshift,
    Rshift,
    // Comparison
    Lt,
    Gt,
    Eq,
    Ne,
    Le,
    Ge,
    ZeroEq,
    ZeroLt,
    ZeroGt,
    ZeroNe,
    // Memory
    Fetch,
    Store,
    CFetch,
    CStore,
    PlusStore,
    Fill,
    CMove,
    // I/O
    Emit,
    Key,
    Type,
    Dot,
    DotS,
    Space,
    Cr,
    // Dictionary / compilation
    Here,
    Latest,
    State,
    Base,
    Comma,
    CComma,
    Allot,
    Align,
    // Control & meta
    Colon,
    Semicolon,
    Immediate,
    Tick,
    BracketTick,
    Execute,
    LBracket,
    RBracket,
    Lit,
    Branch,
    ZeroBranch,
    Exit,
    Bye,
    // Comments and strings
    Backslash,
    Paren,
    SQuote,
    DotQuote,
    // Definers and tools
    Variable,
    Constant,
    Words,
}

/// Name, behavior, extra flag bits.
const PRIMS: &[(&str, Prim, u8)] = &[
    ("DROP", Prim::Drop, 0),
    ("DUP", Prim::Dup, 0),
    ("?DUP", Prim::QDup, 0),
    ("SWAP", Prim::Swap, 0),
    ("OVER", Prim::Over, 0),
    ("ROT", Prim::Rot, 0),
    ("NIP", Prim::Nip, 0),
    ("TUCK", Prim::Tuck, 0),
    ("2DUP", Prim::TwoDup, 0),
    ("2DROP", Prim::TwoDrop, 0),
    ("PICK", Prim::Pick, 0),
    ("DEPTH", Prim::Depth, 0),
    (">R", Prim::ToR, 0),
    ("R>", Prim::RFrom, 0),
    ("R@", Prim::RFetch, 0),
    ("RDROP", Prim::RDrop, 0),
    ("+", Prim::Add, 0),
    ("-", Prim::Sub, 0),
    ("*", Prim::Mul, 0),
    ("/", Prim::Div, 0),
    ("MOD", Prim::Mod, 0),
    ("/MOD", Prim::DivMod, 0),
    ("NEGATE", Prim::Negate, 0),
    ("2*", Prim::TwoStar, 0),
    ("2/", Prim::TwoSlash, 0),
    ("CELLS", Prim::Cells, 0),
    ("MIN", Prim::Min, 0),
    ("MAX", Prim::Max, 0),
    ("1+", Prim::OnePlus, 0),
    ("1-", Prim::OneMinus, 0),
    ("AND", Prim::And, 0),
    ("OR", Prim::Or, 0),
    ("XOR", Prim::Xor, 0),
    ("INVERT", Prim::Invert, 0),
    ("LSHIFT", Prim::Lshift, 0),
    ("RSHIFT", Prim::Rshift, 0),
    ("<", Prim::Lt, 0),
    (">", Prim::Gt, 0),
    ("=", Prim::Eq, 0),
    ("<>", Prim::Ne, 0),
    ("<=", Prim::Le, 0),
    (">=", Prim::Ge, 0),
    ("0=", Prim::ZeroEq, 0),
    ("0<", Prim::ZeroLt, 0),
    ("0>", Prim::ZeroGt, 0),
    ("0<>", Prim::ZeroNe, 0),
    ("@", Prim::Fetch, 0),
    ("!", Prim::Store, 0),
    ("C@", Prim::CFetch, 0),
    ("C!", Prim::CStore, 0),
    ("+!", Prim::PlusStore, 0),
    ("FILL", Prim::Fill, 0),
    ("CMOVE", Prim::CMove, 0),
    ("EMIT", Prim::Emit, 0),
    ("KEY", Prim::Key, 0),
    ("TYPE", Prim::Type, 0),
    (".", Prim::Dot, 0),
    (".S", Prim::DotS, 0),
    ("SPACE", Prim::Space, 0),
    ("CR", Prim::Cr, 0),
    ("HERE", Prim::Here, 0),
    ("LATEST", Prim::Latest, 0),
    ("STATE", Prim::State, 0),
    ("BASE", Prim::Base, 0),
    (",", Prim::Comma, 0),
    ("C,", Prim::CComma, 0),
    ("ALLOT", Prim::Allot, 0),
    ("ALIGN", Prim::Align, 0),
    (":", Prim::Colon, 0),
    (";", Prim::Semicolon, F_IMMEDIATE),
    ("IMMEDIATE", Prim::Immediate, F_IMMEDIATE),
    ("'", Prim::Tick, 0),
    ("[']", Prim::BracketTick, F_IMMEDIATE),
    ("EXECUTE", Prim::Execute, 0),
    ("[", Prim::LBracket, F_IMMEDIATE),
    ("]", Prim::RBracket, 0),
    ("LIT", Prim::Lit, 0),
    ("BRANCH", Prim::Branch, 0),
    ("0BRANCH", Prim::ZeroBranch, 0),
    ("EXIT", Prim::Exit, 0),
    ("BYE", Prim::Bye, 0),
    ("\\", Prim::Backslash, F_IMMEDIATE),
    ("(", Prim::Paren, F_IMMEDIATE),
    ("S\"", Prim::SQuote, F_IMMEDIATE),
    (".\"", Prim::DotQuote, F_IMMEDIATE),
    ("VARIABLE", Prim::Variable, 0),
    ("CONSTANT", Prim::Constant, 0),
    ("WORDS", Prim::Words, 0),
];

pub(crate) fn register_prims(vm: &mut Vm) {
    for &(name, prim, flags) in PRIMS {
        vm.dict
            .define(name, Code::Prim(prim), flags)
            .expect("primitive registration");
    }
}

fn flag(b: bool) -> i64 {
    if b {
        TRUE
    } else {
        FALSE
    }
}

/// Render `n` in `base` (2..=36), lowercase digits, leading `-` if negative.
pub(crate) fn format_int(n: i64, base: u32) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut mag = (n as i128).unsigned_abs() as u128;
    let mut buf = Vec::new();
    loop {
        buf.push(DIGITS[(mag % base as u128) as usize]);
        mag /= base as u128;
        if mag == 0 {
            break;
        }
    }
    if n < 0 {
        buf.push(b'-');
    }
    buf.reverse();
    String::from_utf8(buf).expect("ascii digits")
}

impl Vm {
    pub(crate) fn prim(&mut self, p: Prim) -> Result<()> {
        match p {
            // ----- stack -----
            Prim::Drop => {
                self.pop()?;
            }
            Prim::Dup => {
                let a = self.peek(0)?;
                self.push(a)?;
            }
            Prim::QDup => {
                let a = self.peek(0)?;
                if a != 0 {
                    self.push(a)?;
                }
            }
            Prim::Swap => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(b)?;
                self.push(a)?;
            }
            Prim::Over => {
                let a = self.peek(1)?;
                self.push(a)?;
            }
            Prim::Rot => {
                let c = self.pop()?;
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(b)?;
                self.push(c)?;
                self.push(a)?;
            }
            Prim::Nip => {
                let b = self.pop()?;
                self.pop()?;
                self.push(b)?;
            }
            Prim::Tuck => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(b)?;
                self.push(a)?;
                self.push(b)?;
            }
            Prim::TwoDup => {
                let b = self.peek(0)?;
                let a = self.peek(1)?;
                self.push(a)?;
                self.push(b)?;
            }
            Prim::TwoDrop => {
                self.pop()?;
                self.pop()?;
            }
            Prim::Pick => {
                let n = self.pop()?;
                let n = usize::try_from(n).map_err(|_| VmError::StackUnderflow)?;
                let v = self.peek(n)?;
                self.push(v)?;
            }
            Prim::Depth => {
                let d = self.stack.len() as i64;
                self.push(d)?;
            }
            Prim::ToR => {
                let v = self.pop()?;
                self.rpush(v)?;
            }
            Prim::RFrom => {
                let v = self.rpop()?;
                self.push(v)?;
            }
            Prim::RFetch => {
                let v = *self.rstack.last().ok_or(VmError::ReturnStackUnderflow)?;
                self.push(v)?;
            }
            Prim::RDrop => {
                self.rpop()?;
            }

            // ----- arithmetic / bitwise -----
            Prim::Add => self.binop(|a, b| a.wrapping_add(b))?,
            Prim::Sub => self.binop(|a, b| a.wrapping_sub(b))?,
            Prim::Mul => self.binop(|a, b| a.wrapping_mul(b))?,
            Prim::Div => {
                let b = self.pop()?;
                let a = self.pop()?;
                if b == 0 {
                    return Err(VmError::DivisionByZero);
                }
                self.push(a.wrapping_div(b))?;
            }
            Prim::Mod => {
                let b = self.pop()?;
                let a = self.pop()?;
                if b == 0 {
                    return Err(VmError::DivisionByZero);
                }
                self.push(a.wrapping_rem(b))?;
            }
            Prim::DivMod => {
                let b = self.pop()?;
                let a = self.pop()?;
                if b == 0 {
                    return Err(VmError::DivisionByZero);
                }
                self.push(a.wrapping_rem(b))?;
                self.push(a.wrapping_div(b))?;
            }
            Prim::Negate => {
                let a = self.pop()?;
                self.push(a.wrapping_neg())?;
            }
            Prim::TwoStar => {
                let a = self.pop()?;
                self.push(a.wrapping_shl(1))?;
            }
            Prim::TwoSlash => {
                let a = self.pop()?;
                self.push(a >> 1)?;
            }
            Prim::Cells => {
                let a = self.pop()?;
                self.push(a.wrapping_mul(CELL as i64))?;
            }
            Prim::Min => self.binop(|a, b| a.min(b))?,
            Prim::Max => self.binop(|a, b| a.max(b))?,
            Prim::OnePlus => {
                let a = self.pop()?;
                self.push(a.wrapping_add(1))?;
            }
            Prim::OneMinus => {
                let a = self.pop()?;
                self.push(a.wrapping_sub(1))?;
            }
            Prim::And => self.binop(|a, b| a & b)?,
            Prim::Or => self.binop(|a, b| a | b)?,
            Prim::Xor => self.binop(|a, b| a ^ b)?,
            Prim::Invert => {
                let a = self.pop()?;
                self.push(!a)?;
            }
            Prim::Lshift => {
                let n = self.pop()?;
                let a = self.pop()?;
                let shifted = if (0..64).contains(&n) {
                    ((a as u64) << n) as i64
                } else {
                    0
                };
                self.push(shifted)?;
            }
            Prim::Rshift => {
                let n = self.pop()?;
                let a = self.pop()?;
                let shifted = if (0..64).contains(&n) {
                    ((a as u64) >> n) as i64
                } else {
                    0
                };
                self.push(shifted)?;
            }

            // ----- comparison -----
            Prim::Lt => self.binop(|a, b| flag(a < b))?,
            Prim::Gt => self.binop(|a, b| flag(a > b))?,
            Prim::Eq => self.binop(|a, b| flag(a == b))?,
            Prim::Ne => self.binop(|a, b| flag(a != b))?,
            Prim::Le => self.binop(|a, b| flag(a <= b))?,
            Prim::Ge => self.binop(|a, b| flag(a >= b))?,
            Prim::ZeroEq => {
                let a = self.pop()?;
                self.push(flag(a == 0))?;
            }
            Prim::ZeroLt => {
                let a = self.pop()?;
                self.push(flag(a < 0))?;
            }
            Prim::ZeroGt => {
                let a = self.pop()?;
                self.push(flag(a > 0))?;
            }
            Prim::ZeroNe => {
                let a = self.pop()?;
                self.push(flag(a != 0))?;
            }

            // ----- memory -----
            Prim::Fetch => {
                let addr = self.pop()?;
                let v = self.fetch(addr)?;
                self.push(v)?;
            }
            Prim::Store => {
                let addr = self.pop()?;
                let v = self.pop()?;
                self.store(addr, v)?;
            }
            Prim::CFetch => {
                let addr = self.pop()?;
                let idx = self.byte_index(addr)?;
                self.push(self.strings[idx] as i64)?;
            }
            Prim::CStore => {
                let addr = self.pop()?;
                let v = self.pop()?;
                let idx = self.byte_index(addr)?;
                self.strings[idx] = v as u8;
            }
            Prim::PlusStore => {
                let addr = self.pop()?;
                let n = self.pop()?;
                let v = self.fetch(addr)?;
                self.store(addr, v.wrapping_add(n))?;
            }
            Prim::Fill => {
                let ch = self.pop()?;
                let len = self.pop()?;
                let addr = self.pop()?;
                let range = self.string_range(addr, len)?;
                self.strings[range].fill(ch as u8);
            }
            Prim::CMove => {
                let len = self.pop()?;
                let dst = self.pop()?;
                let src = self.pop()?;
                let src_range = self.string_range(src, len)?;
                let dst_range = self.string_range(dst, len)?;
                self.strings.copy_within(src_range, dst_range.start);
            }

            // ----- i/o -----
            Prim::Emit => {
                let v = self.pop()?;
                self.out.write_all(&[v as u8])?;
            }
            Prim::Key => {
                let v = match self.input.key()? {
                    Some(b) => b as i64,
                    None => -1,
                };
                self.push(v)?;
            }
            Prim::Type => {
                let len = self.pop()?;
                let addr = self.pop()?;
                let range = self.string_range(addr, len)?;
                let bytes = self.strings[range].to_vec();
                self.out.write_all(&bytes)?;
            }
            Prim::Dot => {
                let v = self.pop()?;
                let text = format_int(v, self.base());
                write!(self.out, "{} ", text)?;
            }
            Prim::DotS => {
                write!(self.out, "<{}>", self.stack.len())?;
                let items: Vec<String> = self
                    .stack
                    .iter()
                    .map(|&v| format_int(v, self.base()))
                    .collect();
                for item in items {
                    write!(self.out, " {}", item)?;
                }
                writeln!(self.out)?;
            }
            Prim::Space => {
                self.out.write_all(b" ")?;
            }
            Prim::Cr => {
                self.out.write_all(b"\n")?;
            }

            // ----- dictionary / compilation -----
            Prim::Here => {
                let h = self.here as i64;
                self.push(h)?;
            }
            Prim::Latest => self.push(LATEST_ADDR as i64)?,
            Prim::State => self.push(STATE_ADDR as i64)?,
            Prim::Base => self.push(BASE_ADDR as i64)?,
            Prim::Comma => {
                let v = self.pop()?;
                self.emit_cell(v)?;
            }
            Prim::CComma => {
                let v = self.pop()?;
                self.stash_string(&[v as u8], true)?;
            }
            Prim::Allot => {
                let n = self.pop()?;
                self.allot(n)?;
            }
            Prim::Align => {
                // Data space is cell-granular; nothing to pad.
            }

            // ----- control & meta -----
            Prim::Colon => {
                if self.compiling() {
                    return Err(VmError::CompileOnly {
                        word: ":".to_string(),
                    });
                }
                let name = self.read_word()?.ok_or(VmError::UnexpectedEof {
                    context: "definition name",
                })?;
                let addr = self.here;
                self.define_word(&name, Code::Colon { addr }, F_HIDDEN)?;
                self.set_compiling(true);
            }
            Prim::Semicolon => {
                if !self.compiling() {
                    return Err(VmError::CompileOnly {
                        word: ";".to_string(),
                    });
                }
                let exit = self.xt_exit as i64;
                self.emit_cell(exit)?;
                self.reveal_latest();
                self.set_compiling(false);
            }
            Prim::Immediate => {
                if let Some(xt) = self.dict.latest() {
                    self.dict.entry_mut(xt).flags |= F_IMMEDIATE;
                }
            }
            Prim::Tick => {
                let name = self.read_word()?.ok_or(VmError::UnexpectedEof {
                    context: "word name after '",
                })?;
                let xt = self
                    .dict
                    .find(&name)
                    .ok_or(VmError::UnknownWord { name })?;
                self.push(xt as i64)?;
            }
            Prim::BracketTick => {
                let name = self.read_word()?.ok_or(VmError::UnexpectedEof {
                    context: "word name after [']",
                })?;
                let xt = self
                    .dict
                    .find(&name)
                    .ok_or(VmError::UnknownWord { name })?;
                let lit = self.xt_lit as i64;
                self.emit_cell(lit)?;
                self.emit_cell(xt as i64)?;
            }
            Prim::Execute => {
                let v = self.pop()?;
                self.dict.entry_checked(v)?;
                self.execute(v as usize)?;
            }
            Prim::LBracket => self.set_compiling(false),
            Prim::RBracket => self.set_compiling(true),
            Prim::Lit => {
                let v = self.get_cell(self.ip)?;
                self.ip += CELL;
                self.push(v)?;
            }
            Prim::Branch => {
                let off = self.get_cell(self.ip)?;
                self.ip = (self.ip as i64 + off) as usize;
            }
            Prim::ZeroBranch => {
                let off = self.get_cell(self.ip)?;
                let cond = self.pop()?;
                if cond == 0 {
                    self.ip = (self.ip as i64 + off) as usize;
                } else {
                    self.ip += CELL;
                }
            }
            Prim::Exit => {
                let ret = self.rpop()?;
                self.ip = ret as usize;
            }
            Prim::Bye => {
                self.exit_requested = true;
            }

            // ----- comments and strings -----
            Prim::Backslash => {
                while let Some(b) = self.input.key()? {
                    if b == b'\n' {
                        break;
                    }
                }
            }
            Prim::Paren => {
                loop {
                    match self.input.key()? {
                        Some(b')') => break,
                        Some(_) => {}
                        None => {
                            return Err(VmError::UnexpectedEof {
                                context: "comment before )",
                            })
                        }
                    }
                }
            }
            Prim::SQuote => {
                let text = self.read_until_quote()?;
                let compiling = self.compiling();
                let addr = self.stash_string(&text, compiling)?;
                if compiling {
                    let lit = self.xt_lit as i64;
                    self.emit_cell(lit)?;
                    self.emit_cell(addr as i64)?;
                    self.emit_cell(lit)?;
                    self.emit_cell(text.len() as i64)?;
                } else {
                    self.push(addr as i64)?;
                    self.push(text.len() as i64)?;
                }
            }
            Prim::DotQuote => {
                let text = self.read_until_quote()?;
                if self.compiling() {
                    let addr = self.stash_string(&text, true)?;
                    let lit = self.xt_lit as i64;
                    let type_xt = self.xt_type as i64;
                    self.emit_cell(lit)?;
                    self.emit_cell(addr as i64)?;
                    self.emit_cell(lit)?;
                    self.emit_cell(text.len() as i64)?;
                    self.emit_cell(type_xt)?;
                } else {
                    self.out.write_all(&text)?;
                }
            }

            // ----- definers and tools -----
            Prim::Variable => {
                let name = self.read_word()?.ok_or(VmError::UnexpectedEof {
                    context: "variable name",
                })?;
                let addr = self.here;
                self.emit_cell(0)?;
                self.define_word(&name, Code::Variable { addr }, 0)?;
            }
            Prim::Constant => {
                let value = self.pop()?;
                let name = self.read_word()?.ok_or(VmError::UnexpectedEof {
                    context: "constant name",
                })?;
                self.define_word(&name, Code::Constant { value }, 0)?;
            }
            Prim::Words => {
                let names: Vec<String> = self
                    .dict
                    .iter()
                    .filter(|e| !e.is_hidden())
                    .map(|e| e.name.clone())
                    .collect();
                writeln!(self.out, "{}", names.join(" "))?;
            }
        }
        Ok(())
    }

    fn binop(&mut self, f: impl FnOnce(i64, i64) -> i64) -> Result<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(f(a, b))
    }
}
