//! Per-function symbol table
//!
//! Locals and parameters live at negative offsets from the frame pointer.
//! The cursor grows by 8 per scalar and by the 8-byte-rounded array size;
//! lookup is last-declared-first so an inner redeclaration shadows.
//!
//! Subscripting always scales by 4 regardless of whether the base is an
//! array or a pointer; the table records the kind only for decay and
//! load-width decisions.

use crate::error::{CcError, Result};
use smallvec::SmallVec;

/// Maximum symbols per function.
pub const SYMTAB_MAX: usize = 64;

/// Frame size reserved below the frame pointer in every prologue.
pub const FRAME_SIZE: i64 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Int,
    Ptr,
    Arr { len: i64 },
}

#[derive(Debug, Clone)]
pub struct Sym {
    pub name: String,
    /// Positive magnitude; the slot lives at `fp - offset`.
    pub offset: i64,
    pub kind: VarKind,
}

#[derive(Debug, Default)]
pub struct SymTab {
    syms: SmallVec<[Sym; 16]>,
    cursor: i64,
}

impl SymTab {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything; called at the start of each function definition.
    pub fn reset(&mut self) {
        self.syms.clear();
        self.cursor = 0;
    }

    /// Assign the next slot. Arrays get `ceil(4*len/8)*8` bytes and their
    /// base address is the lowest byte of the allocation.
    pub fn declare(&mut self, name: &str, kind: VarKind) -> Result<&Sym> {
        if self.syms.len() >= SYMTAB_MAX {
            return Err(CcError::SymbolTableFull { max: SYMTAB_MAX });
        }
        let size = match kind {
            VarKind::Int | VarKind::Ptr => 8,
            VarKind::Arr { len } => (4 * len + 7) / 8 * 8,
        };
        self.cursor += size;
        if self.cursor > FRAME_SIZE {
            return Err(CcError::FrameOverflow { frame: FRAME_SIZE });
        }
        self.syms.push(Sym {
            name: name.to_string(),
            offset: self.cursor,
            kind,
        });
        Ok(self.syms.last().expect("just pushed"))
    }

    /// Last-declared-first lookup.
    pub fn lookup(&self, name: &str) -> Option<&Sym> {
        self.syms.iter().rev().find(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.syms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.syms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_offsets_step_by_eight() {
        let mut t = SymTab::new();
        assert_eq!(t.declare("a", VarKind::Int).unwrap().offset, 8);
        assert_eq!(t.declare("p", VarKind::Ptr).unwrap().offset, 16);
    }

    #[test]
    fn test_array_rounds_to_eight() {
        let mut t = SymTab::new();
        // 3 ints = 12 bytes -> 16.
        assert_eq!(t.declare("a", VarKind::Arr { len: 3 }).unwrap().offset, 16);
        assert_eq!(t.declare("b", VarKind::Int).unwrap().offset, 24);
    }

    #[test]
    fn test_lookup_shadows() {
        let mut t = SymTab::new();
        t.declare("x", VarKind::Int).unwrap();
        t.declare("x", VarKind::Ptr).unwrap();
        assert_eq!(t.lookup("x").unwrap().kind, VarKind::Ptr);
    }

    #[test]
    fn test_reset_clears() {
        let mut t = SymTab::new();
        t.declare("x", VarKind::Int).unwrap();
        t.reset();
        assert!(t.lookup("x").is_none());
        assert_eq!(t.declare("y", VarKind::Int).unwrap().offset, 8);
    }

    #[test]
    fn test_capacity_limit() {
        let mut t = SymTab::new();
        for i in 0..SYMTAB_MAX {
            t.declare(&format!("v{i}"), VarKind::Int).unwrap();
        }
        assert!(matches!(
            t.declare("one_more", VarKind::Int),
            Err(CcError::SymbolTableFull { .. })
        ));
    }

    #[test]
    fn test_frame_overflow() {
        let mut t = SymTab::new();
        assert!(matches!(
            t.declare("big", VarKind::Arr { len: 200 }),
            Err(CcError::FrameOverflow { .. })
        ));
    }
}
