//! Code generation scenarios
//!
//! The toolchain's assembler is external, so these assert on the emitted
//! text: shape of prologue/epilogue, the lowering of each construct, and
//! determinism. Sources mirror the bootstrap's acceptance programs.

use proptest::prelude::*;
use seedc_cc::{compile, CcError};
use std::io::Cursor;

fn emit(src: &str) -> String {
    let mut out = Vec::new();
    compile(Cursor::new(src.as_bytes().to_vec()), &mut out).expect("compiles");
    String::from_utf8(out).unwrap()
}

fn emit_err(src: &str) -> (CcError, String) {
    let mut out = Vec::new();
    let err = compile(Cursor::new(src.as_bytes().to_vec()), &mut out).unwrap_err();
    (err, String::from_utf8(out).unwrap())
}

/// Count occurrences of a needle.
fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}

#[test]
fn test_return_42() {
    let asm = emit("int main(){ return 42; }");
    assert!(asm.contains(".global _main"));
    assert!(asm.contains(".align 4"));
    assert!(asm.contains("mov w0, #0x0000002a"));
}

#[test]
fn test_frame_discipline_every_function() {
    let asm = emit(
        "int one(){ return 1; } int two(int a){ return a; } int main(){ return one()+two(2); }",
    );
    // One prologue/epilogue set per function, in matched numbers.
    assert_eq!(count(&asm, "stp x29, x30, [sp, #-16]!"), 3);
    assert_eq!(count(&asm, "sub sp, sp, #0x00000200"), 3);
    assert_eq!(count(&asm, "mov sp, x29"), 3);
    assert_eq!(count(&asm, "ldp x29, x30, [sp], #16"), 3);
    assert_eq!(count(&asm, "\n  ret\n"), 3);
}

#[test]
fn test_recursive_factorial() {
    let asm = emit(
        "int fact(int n){ if (n<2) return 1; return n*fact(n-1); } \
         int main(){ return fact(5); }",
    );
    assert!(asm.contains(".global _fact"));
    assert!(asm.contains("bl _fact"));
    assert!(asm.contains("bl _fact") && asm.contains("mul w0, w1, w0"));
    assert!(asm.contains("cmp w1, w0"));
    assert!(asm.contains("cset w0, lt"));
}

#[test]
fn test_for_loop_with_empty_update() {
    let asm = emit(
        "int main(){ int s; s=0; int i; for(i=0;i<5;) { s=s+i; i=i+1; } return s; }",
    );
    // Loop skeleton: condition test branches out, body branches back.
    assert!(asm.contains("cbz w0, .L"));
    assert!(count(&asm, "b .L") >= 2);
}

#[test]
fn test_for_loop_update_replayed_after_body() {
    let asm = emit("int main(){ int i; int s; s=0; for(i=0;i<3;i=i+1) s=s+i; return s; }");
    // The update executes after the body: the last add before the back
    // branch stores into i's slot (offset 8, declared first).
    let back_branch = asm.rfind("b .L").unwrap();
    let before = &asm[..back_branch];
    assert!(before.contains("add w0, w1, w0"));
    assert!(asm.contains("cbz w0, .L"));
}

#[test]
fn test_pointer_and_array() {
    let asm = emit(
        "int main(){ int a[3]; a[0]=1; a[1]=2; a[2]=3; int *p; p=&a[1]; return *p + a[0]; }",
    );
    // Subscripts scale by 4 with sign extension.
    assert!(asm.contains("add x9, x9, w0, sxtw #2"));
    // Pointer store/load at doubleword width.
    assert!(asm.contains("str x0, [x9]"));
    assert!(asm.contains("ldr x0, [x9]"));
    // Int element store at word width.
    assert!(asm.contains("str w0, [x9]"));
}

#[test]
fn test_array_base_offset_rounded() {
    // a[3] needs 12 bytes, rounded to 16; b lands 8 past it.
    let asm = emit("int main(){ int a[3]; int b; b=7; return a[0]; }");
    assert!(asm.contains("sub x9, x29, #0x00000018")); // b at -24
    assert!(asm.contains("sub x0, x29, #0x00000010")); // a decays at -16
}

#[test]
fn test_parameters_stored_after_prologue() {
    let asm = emit("int add(int a, int b){ return a+b; } int main(){ return add(1,2); }");
    let prologue_end = asm.find("sub sp, sp, #0x00000200").unwrap();
    let after = &asm[prologue_end..];
    assert!(after.contains("str w0, [x9]"));
    assert!(after.contains("str w1, [x9]"));
}

#[test]
fn test_call_argument_registers() {
    let asm = emit("int main(){ return f(10, 20, 30); }");
    assert!(asm.contains("ldr x2, [sp], #16"));
    assert!(asm.contains("ldr x1, [sp], #16"));
    assert!(asm.contains("ldr x0, [sp], #16"));
    assert!(asm.contains("bl _f"));
}

#[test]
fn test_division_and_modulo() {
    let asm = emit("int main(){ return 7/2 + 7%2; }");
    assert!(asm.contains("sdiv w0, w1, w0"));
    assert!(asm.contains("sdiv w2, w1, w0"));
    assert!(asm.contains("msub w0, w2, w0, w1"));
}

#[test]
fn test_unary_minus() {
    let asm = emit("int main(){ int x; x=5; return -x; }");
    assert!(asm.contains("neg w0, w0"));
}

#[test]
fn test_while_loop() {
    let asm = emit("int main(){ int i; i=0; while (i<10) i=i+1; return i; }");
    assert!(asm.contains("cbz w0, .L"));
    assert!(asm.contains("b .L"));
}

#[test]
fn test_if_else_single_arm_runs() {
    let asm = emit("int sign(int n){ if (n<0) return -1; else return 1; }");
    // Both arms branch to the return label; the else label sits between.
    assert!(count(&asm, "b .L") >= 3);
}

#[test]
fn test_deterministic_output() {
    let src = "int main(){ int i; for(i=0;i<5;i=i+1) { if (i==3) return i; } return 0; }";
    assert_eq!(emit(src), emit(src));
}

#[test]
fn test_comments_ignored() {
    let asm = emit("int main(){ // line\n /* block */ return 1; }");
    assert!(asm.contains("mov w0, #0x00000001"));
}

#[test]
fn test_unknown_identifier_is_fatal_with_wire_diagnostic() {
    let (err, out) = emit_err("int main(){ return missing; }");
    assert!(matches!(err, CcError::UnknownIdentifier { .. }));
    assert!(out.ends_with("ERR\n"));
}

#[test]
fn test_eof_before_matching_brace() {
    let (err, out) = emit_err("int main(){ if (1) { return 1; ");
    assert!(matches!(err, CcError::UnexpectedEof));
    assert!(out.ends_with("ERR\n"));
}

#[test]
fn test_shadowing_uses_last_declaration() {
    let asm = emit("int main(){ int x; x=1; int x; x=2; return x; }");
    // Second x lives at -16; the final load uses it.
    let last_load = asm.rfind("sub x9, x29").unwrap();
    assert!(asm[last_load..].starts_with("sub x9, x29, #0x00000010"));
}

proptest! {
    /// Every 32-bit literal loads through mov (plus movk for high bits),
    /// with both immediates in the masked eight-digit form.
    #[test]
    fn prop_literal_loading(n in 0u32..) {
        let asm = emit(&format!("int main(){{ return {n}; }}"));
        let low = format!("mov w0, #0x{:08x}", n & 0xffff);
        prop_assert!(asm.contains(&low));
        if n >> 16 != 0 {
            let high = format!("movk w0, #0x{:08x}, lsl #16", n >> 16);
            prop_assert!(asm.contains(&high));
        } else {
            prop_assert!(!asm.contains("movk"));
        }
    }
}

#[test]
fn test_lvalue_laws() {
    // *&x round-trips through a pointer rvalue; a[i]=v then a[i] reloads.
    let asm = emit("int main(){ int x; x=9; return *&x; }");
    assert!(asm.contains("mov x0, x9"));
    assert!(asm.contains("mov x9, x0"));
    assert!(asm.contains("ldr w0, [x9]"));
}
