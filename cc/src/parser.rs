//! Recursive-descent parser and code generator
//!
//! Parsing and emission are fused: every expression routine emits the code
//! for its subtree and reports what the value *is* — an int or pointer,
//! loaded or still an address. Rvalues live in `x0` (`w0` for ints),
//! lvalue addresses in the scratch register `x9`. Anything that must
//! survive a nested evaluation is pushed on the machine stack with
//! pre-indexed stores, 16 bytes at a time to keep `sp` aligned.

use crate::emit::{Asm, Label};
use crate::error::{CcError, Result};
use crate::lexer::{Lexer, Tok, TokenBuf, TOKEN_BUF_MAX};
use crate::symtab::{SymTab, VarKind, FRAME_SIZE};
use std::io::{Read, Write};
use std::mem::discriminant;
use tracing::debug;

/// Arguments are register-passed; more is a compile error.
pub const MAX_PARAMS: usize = 8;

/// What an expression left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// 32-bit value in w0.
    IntRv,
    /// 64-bit address value in x0.
    PtrRv,
    /// Address of a 32-bit slot in x9.
    IntLv,
    /// Address of a 64-bit slot in x9.
    PtrLv,
}

impl Category {
    pub fn is_lvalue(self) -> bool {
        matches!(self, Category::IntLv | Category::PtrLv)
    }
}

pub struct Compiler<R: Read, W: Write> {
    lx: Lexer<R>,
    asm: Asm<W>,
    syms: SymTab,
    ret_label: Option<Label>,
}

impl<R: Read, W: Write> Compiler<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            lx: Lexer::new(input),
            asm: Asm::new(output),
            syms: SymTab::new(),
            ret_label: None,
        }
    }

    /// Translate every function on the stream. On any error the wire
    /// diagnostic `ERR` goes to the output before the error is returned.
    pub fn compile(mut self) -> Result<()> {
        match self.program() {
            Ok(()) => {
                self.asm.flush()?;
                Ok(())
            }
            Err(e) => {
                let _ = self.asm.raw("ERR");
                let _ = self.asm.flush();
                Err(e)
            }
        }
    }

    fn program(&mut self) -> Result<()> {
        while *self.lx.peek()? != Tok::Eof {
            self.function()?;
        }
        Ok(())
    }

    // ----- declarations -----

    fn function(&mut self) -> Result<()> {
        self.expect(Tok::KwInt, "int")?;
        let name = self.expect_ident()?;
        self.expect(Tok::LParen, "(")?;
        debug!(name = %name, "compiling function");

        self.syms.reset();
        let mut params: Vec<(i64, VarKind)> = Vec::new();
        if *self.lx.peek()? == Tok::RParen {
            self.lx.advance()?;
        } else {
            loop {
                self.expect(Tok::KwInt, "int")?;
                let mut kind = VarKind::Int;
                while *self.lx.peek()? == Tok::Star {
                    self.lx.advance()?;
                    kind = VarKind::Ptr;
                }
                let pname = self.expect_ident()?;
                if params.len() >= MAX_PARAMS {
                    return Err(CcError::TooManyParams);
                }
                let sym = self.syms.declare(&pname, kind)?;
                params.push((sym.offset, kind));
                match self.lx.advance()? {
                    Tok::Comma => continue,
                    Tok::RParen => break,
                    t => {
                        return Err(CcError::Unexpected {
                            expected: "`,` or `)`",
                            found: t.describe(),
                        })
                    }
                }
            }
        }

        // Every `return` in the body branches here.
        let ret = self.asm.label();
        self.ret_label = Some(ret);

        self.asm.function_header(&name)?;
        self.asm.op("stp x29, x30, [sp, #-16]!")?;
        self.asm.op("mov x29, sp")?;
        self.asm
            .op(&format!("sub sp, sp, {}", Asm::<W>::fmt_imm(FRAME_SIZE)))?;

        for (i, (offset, kind)) in params.iter().enumerate() {
            self.asm
                .op(&format!("sub x9, x29, {}", Asm::<W>::fmt_imm(*offset)))?;
            match kind {
                VarKind::Ptr => self.asm.op(&format!("str x{}, [x9]", i))?,
                _ => self.asm.op(&format!("str w{}, [x9]", i))?,
            }
        }

        self.expect(Tok::LBrace, "{")?;
        self.block()?;

        // Fall-through default.
        self.asm.op(&format!("mov w0, {}", Asm::<W>::fmt_imm(0)))?;
        self.asm.put_label(ret)?;
        self.asm.op("mov sp, x29")?;
        self.asm.op("ldp x29, x30, [sp], #16")?;
        self.asm.op("ret")?;
        Ok(())
    }

    /// Body of a `{ ... }`; the opening brace is already consumed.
    fn block(&mut self) -> Result<()> {
        loop {
            match self.lx.peek()? {
                Tok::RBrace => {
                    self.lx.advance()?;
                    return Ok(());
                }
                Tok::Eof => return Err(CcError::UnexpectedEof),
                Tok::KwInt => self.declaration()?,
                _ => self.statement()?,
            }
        }
    }

    fn declaration(&mut self) -> Result<()> {
        self.lx.advance()?; // int
        let mut pointer = false;
        while *self.lx.peek()? == Tok::Star {
            self.lx.advance()?;
            pointer = true;
        }
        let name = self.expect_ident()?;
        let kind = if *self.lx.peek()? == Tok::LBracket {
            self.lx.advance()?;
            let len = match self.lx.advance()? {
                Tok::Num(n) if n > 0 => n,
                t => {
                    return Err(CcError::Unexpected {
                        expected: "array length",
                        found: t.describe(),
                    })
                }
            };
            self.expect(Tok::RBracket, "]")?;
            VarKind::Arr { len }
        } else if pointer {
            VarKind::Ptr
        } else {
            VarKind::Int
        };
        self.syms.declare(&name, kind)?;
        self.expect(Tok::Semi, ";")?;
        Ok(())
    }

    // ----- statements -----

    fn statement(&mut self) -> Result<()> {
        match self.lx.peek()? {
            Tok::LBrace => {
                self.lx.advance()?;
                self.block()
            }
            Tok::Semi => {
                self.lx.advance()?;
                Ok(())
            }
            Tok::KwReturn => self.return_statement(),
            Tok::KwIf => self.if_statement(),
            Tok::KwWhile => self.while_statement(),
            Tok::KwFor => self.for_statement(),
            _ => {
                self.expr()?;
                self.expect(Tok::Semi, ";")
            }
        }
    }

    fn return_statement(&mut self) -> Result<()> {
        self.lx.advance()?; // return
        if *self.lx.peek()? == Tok::Semi {
            self.asm.op(&format!("mov w0, {}", Asm::<W>::fmt_imm(0)))?;
        } else {
            let c = self.expr()?;
            self.materialize(c)?;
        }
        self.expect(Tok::Semi, ";")?;
        let ret = self.ret_label.expect("inside a function");
        self.asm.branch("b", ret)
    }

    fn if_statement(&mut self) -> Result<()> {
        self.lx.advance()?; // if
        self.expect(Tok::LParen, "(")?;
        let c = self.expr()?;
        self.require_int_rvalue(c)?;
        self.expect(Tok::RParen, ")")?;

        let l_else = self.asm.label();
        self.asm.cbz("w0", l_else)?;
        self.statement()?;
        if *self.lx.peek()? == Tok::KwElse {
            self.lx.advance()?;
            let l_end = self.asm.label();
            self.asm.branch("b", l_end)?;
            self.asm.put_label(l_else)?;
            self.statement()?;
            self.asm.put_label(l_end)
        } else {
            // Without an else arm, end and else coincide.
            self.asm.put_label(l_else)
        }
    }

    fn while_statement(&mut self) -> Result<()> {
        self.lx.advance()?; // while
        let l_top = self.asm.label();
        let l_end = self.asm.label();
        self.asm.put_label(l_top)?;
        self.expect(Tok::LParen, "(")?;
        let c = self.expr()?;
        self.require_int_rvalue(c)?;
        self.expect(Tok::RParen, ")")?;
        self.asm.cbz("w0", l_end)?;
        self.statement()?;
        self.asm.branch("b", l_top)?;
        self.asm.put_label(l_end)
    }

    fn for_statement(&mut self) -> Result<()> {
        self.lx.advance()?; // for
        self.expect(Tok::LParen, "(")?;
        let l_top = self.asm.label();
        let l_end = self.asm.label();

        if *self.lx.peek()? != Tok::Semi {
            self.expr()?;
        }
        self.expect(Tok::Semi, ";")?;

        self.asm.put_label(l_top)?;
        if *self.lx.peek()? == Tok::Semi {
            // Absent condition counts as true.
            self.asm.op(&format!("mov w0, {}", Asm::<W>::fmt_imm(1)))?;
        } else {
            let c = self.expr()?;
            self.require_int_rvalue(c)?;
        }
        self.expect(Tok::Semi, ";")?;
        self.asm.cbz("w0", l_end)?;

        let update = self.collect_update_tokens()?;
        self.statement()?;
        if !update.is_empty() {
            self.lx.start_replay(update);
            self.expr()?;
            self.lx.end_replay();
        }
        self.asm.branch("b", l_top)?;
        self.asm.put_label(l_end)
    }

    /// Record the update clause up to the matching `)`, which is consumed
    /// but not recorded.
    fn collect_update_tokens(&mut self) -> Result<TokenBuf> {
        let mut buf = TokenBuf::new();
        let mut depth = 0usize;
        loop {
            let tok = self.lx.advance()?;
            match tok {
                Tok::RParen if depth == 0 => return Ok(buf),
                Tok::RParen => depth -= 1,
                Tok::LParen => depth += 1,
                Tok::Eof => return Err(CcError::UnexpectedEof),
                _ => {}
            }
            if buf.len() >= TOKEN_BUF_MAX {
                return Err(CcError::TokenBufferFull);
            }
            buf.push(tok);
        }
    }

    // ----- expressions, lowest precedence first -----

    fn expr(&mut self) -> Result<Category> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Category> {
        let lhs = self.equality()?;
        if *self.lx.peek()? != Tok::Assign {
            return Ok(lhs);
        }
        self.lx.advance()?;
        if !lhs.is_lvalue() {
            return Err(CcError::NotAnLvalue);
        }
        self.asm.op("str x9, [sp, #-16]!")?;
        let rhs = self.assignment()?;
        self.materialize(rhs)?;
        self.asm.op("ldr x9, [sp], #16")?;
        match lhs {
            Category::IntLv => {
                self.asm.op("str w0, [x9]")?;
                Ok(Category::IntRv)
            }
            Category::PtrLv => {
                self.asm.op("str x0, [x9]")?;
                Ok(Category::PtrRv)
            }
            _ => unreachable!("checked is_lvalue"),
        }
    }

    fn equality(&mut self) -> Result<Category> {
        let mut lhs = self.relational()?;
        loop {
            let cond = match self.lx.peek()? {
                Tok::EqEq => "eq",
                Tok::Ne => "ne",
                _ => break,
            };
            self.lx.advance()?;
            lhs = self.comparison(lhs, cond, Self::relational)?;
        }
        Ok(lhs)
    }

    fn relational(&mut self) -> Result<Category> {
        let mut lhs = self.additive()?;
        loop {
            let cond = match self.lx.peek()? {
                Tok::Lt => "lt",
                Tok::Le => "le",
                Tok::Gt => "gt",
                Tok::Ge => "ge",
                _ => break,
            };
            self.lx.advance()?;
            lhs = self.comparison(lhs, cond, Self::additive)?;
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Category> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.lx.peek()? {
                Tok::Plus => "add",
                Tok::Minus => "sub",
                _ => break,
            };
            self.lx.advance()?;
            lhs = self.arith(lhs, op, Self::multiplicative)?;
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Category> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.lx.peek()? {
                Tok::Star => "mul",
                Tok::Slash => "sdiv",
                Tok::Percent => "mod",
                _ => break,
            };
            self.lx.advance()?;
            lhs = self.arith(lhs, op, Self::unary)?;
        }
        Ok(lhs)
    }

    /// Shared binary-operand plumbing: materialize and push the left side,
    /// evaluate the right, pop the left into w1.
    fn binary_operands(
        &mut self,
        lhs: Category,
        next: fn(&mut Self) -> Result<Category>,
    ) -> Result<()> {
        self.require_int_rvalue(lhs)?;
        self.asm.op("str x0, [sp, #-16]!")?;
        let rhs = next(self)?;
        self.require_int_rvalue(rhs)?;
        self.asm.op("ldr x1, [sp], #16")?;
        Ok(())
    }

    fn comparison(
        &mut self,
        lhs: Category,
        cond: &str,
        next: fn(&mut Self) -> Result<Category>,
    ) -> Result<Category> {
        self.binary_operands(lhs, next)?;
        self.asm.op("cmp w1, w0")?;
        self.asm.op(&format!("cset w0, {}", cond))?;
        Ok(Category::IntRv)
    }

    fn arith(
        &mut self,
        lhs: Category,
        op: &str,
        next: fn(&mut Self) -> Result<Category>,
    ) -> Result<Category> {
        self.binary_operands(lhs, next)?;
        match op {
            "mod" => {
                self.asm.op("sdiv w2, w1, w0")?;
                self.asm.op("msub w0, w2, w0, w1")?;
            }
            _ => self.asm.op(&format!("{} w0, w1, w0", op))?,
        }
        Ok(Category::IntRv)
    }

    fn unary(&mut self) -> Result<Category> {
        match self.lx.peek()? {
            Tok::Minus => {
                self.lx.advance()?;
                let c = self.unary()?;
                self.require_int_rvalue(c)?;
                self.asm.op("neg w0, w0")?;
                Ok(Category::IntRv)
            }
            Tok::Amp => {
                self.lx.advance()?;
                let c = self.unary()?;
                if !c.is_lvalue() {
                    return Err(CcError::NotAnLvalue);
                }
                self.asm.op("mov x0, x9")?;
                Ok(Category::PtrRv)
            }
            Tok::Star => {
                self.lx.advance()?;
                let c = self.unary()?;
                if self.materialize(c)? != Category::PtrRv {
                    return Err(CcError::ExpectedPointer);
                }
                self.asm.op("mov x9, x0")?;
                Ok(Category::IntLv)
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Category> {
        let mut c = self.primary()?;
        while *self.lx.peek()? == Tok::LBracket {
            self.lx.advance()?;
            if self.materialize(c)? != Category::PtrRv {
                return Err(CcError::ExpectedPointer);
            }
            self.asm.op("str x0, [sp, #-16]!")?;
            let idx = self.expr()?;
            self.require_int_rvalue(idx)?;
            self.expect(Tok::RBracket, "]")?;
            self.asm.op("ldr x9, [sp], #16")?;
            // Element size is always 4; the subscript does not consult the
            // base kind.
            self.asm.op("add x9, x9, w0, sxtw #2")?;
            c = Category::IntLv;
        }
        Ok(c)
    }

    fn primary(&mut self) -> Result<Category> {
        match self.lx.advance()? {
            Tok::Num(n) => {
                self.load_literal(n)?;
                Ok(Category::IntRv)
            }
            Tok::LParen => {
                let c = self.expr()?;
                self.expect(Tok::RParen, ")")?;
                Ok(c)
            }
            Tok::Ident(name) => {
                if *self.lx.peek()? == Tok::LParen {
                    self.call(&name)
                } else {
                    self.variable(&name)
                }
            }
            Tok::Eof => Err(CcError::UnexpectedEof),
            t => Err(CcError::Unexpected {
                expected: "expression",
                found: t.describe(),
            }),
        }
    }

    fn load_literal(&mut self, n: i64) -> Result<()> {
        let v = n as u32;
        self.asm
            .op(&format!("mov w0, {}", Asm::<W>::fmt_imm((v & 0xffff) as i64)))?;
        if v >> 16 != 0 {
            self.asm.op(&format!(
                "movk w0, {}, lsl #16",
                Asm::<W>::fmt_imm((v >> 16) as i64)
            ))?;
        }
        Ok(())
    }

    /// Call with register arguments. The name is not looked up; it is
    /// emitted verbatim behind an underscore.
    fn call(&mut self, name: &str) -> Result<Category> {
        self.lx.advance()?; // (
        let mut argc = 0usize;
        if *self.lx.peek()? == Tok::RParen {
            self.lx.advance()?;
        } else {
            loop {
                let c = self.assignment()?;
                self.materialize(c)?;
                if argc >= MAX_PARAMS {
                    return Err(CcError::TooManyParams);
                }
                self.asm.op("str x0, [sp, #-16]!")?;
                argc += 1;
                match self.lx.advance()? {
                    Tok::Comma => continue,
                    Tok::RParen => break,
                    t => {
                        return Err(CcError::Unexpected {
                            expected: "`,` or `)`",
                            found: t.describe(),
                        })
                    }
                }
            }
        }
        for i in (0..argc).rev() {
            self.asm.op(&format!("ldr x{}, [sp], #16", i))?;
        }
        self.asm.op(&format!("bl _{}", name))?;
        Ok(Category::IntRv)
    }

    fn variable(&mut self, name: &str) -> Result<Category> {
        let sym = self
            .syms
            .lookup(name)
            .ok_or_else(|| CcError::UnknownIdentifier {
                name: name.to_string(),
            })?;
        let (offset, kind) = (sym.offset, sym.kind);
        match kind {
            VarKind::Int => {
                self.asm
                    .op(&format!("sub x9, x29, {}", Asm::<W>::fmt_imm(offset)))?;
                Ok(Category::IntLv)
            }
            VarKind::Ptr => {
                self.asm
                    .op(&format!("sub x9, x29, {}", Asm::<W>::fmt_imm(offset)))?;
                Ok(Category::PtrLv)
            }
            VarKind::Arr { .. } => {
                // Arrays decay to a pointer rvalue on use.
                self.asm
                    .op(&format!("sub x0, x29, {}", Asm::<W>::fmt_imm(offset)))?;
                Ok(Category::PtrRv)
            }
        }
    }

    // ----- value discipline -----

    /// Load an lvalue at its width; rvalues pass through.
    fn materialize(&mut self, c: Category) -> Result<Category> {
        Ok(match c {
            Category::IntLv => {
                self.asm.op("ldr w0, [x9]")?;
                Category::IntRv
            }
            Category::PtrLv => {
                self.asm.op("ldr x0, [x9]")?;
                Category::PtrRv
            }
            rv => rv,
        })
    }

    fn require_int_rvalue(&mut self, c: Category) -> Result<()> {
        match self.materialize(c)? {
            Category::IntRv => Ok(()),
            _ => Err(CcError::ExpectedInt),
        }
    }

    // ----- token plumbing -----

    fn expect(&mut self, want: Tok, expected: &'static str) -> Result<()> {
        let tok = self.lx.advance()?;
        if discriminant(&tok) == discriminant(&want) {
            Ok(())
        } else if tok == Tok::Eof {
            Err(CcError::UnexpectedEof)
        } else {
            Err(CcError::Unexpected {
                expected,
                found: tok.describe(),
            })
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.lx.advance()? {
            Tok::Ident(name) => Ok(name),
            Tok::Eof => Err(CcError::UnexpectedEof),
            t => Err(CcError::Unexpected {
                expected: "identifier",
                found: t.describe(),
            }),
        }
    }
}
