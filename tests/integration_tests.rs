//! End-to-end pipeline tests
//!
//! One concatenated stream through all stages, the way the bootstrap
//! driver feeds it: hex image, sentinel, Forth source, compiler handoff,
//! C source.

use proptest::prelude::*;
use seedc::{Pipeline, ToolchainError};
use std::cell::RefCell;
use std::io::Cursor;
use std::rc::Rc;

#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl std::io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn run_pipeline(stream: &str) -> (Result<seedc::PipelineStats, ToolchainError>, String) {
    let buf = SharedBuf::default();
    let result = Pipeline::with_region_size(4096).run(
        Box::new(Cursor::new(stream.as_bytes().to_vec())),
        Box::new(buf.clone()),
    );
    let out = String::from_utf8_lossy(&buf.0.borrow()).into_owned();
    (result, out)
}

#[test]
fn test_full_pipeline_to_assembly() {
    let stream = "\
; seed image (exit stub)\n\
40 05 80 d2 30 00 80 d2 01 10 00 d4\n\
`\n\
: SQ DUP * ; 7 SQ .\n\
c-compile\n\
int main(){ return 42; }\n";
    let (result, out) = run_pipeline(stream);
    let stats = result.unwrap();
    assert_eq!(stats.image_bytes, 12);
    assert!(stats.sentinel_seen);
    // Forth output first, then the compiled function.
    assert!(out.contains("49 "));
    assert!(out.contains(".global _main"));
    assert!(out.contains("mov w0, #0x0000002a"));
}

#[test]
fn test_pipeline_factorial_program() {
    let stream = "`\nc-compile\n\
int fact(int n){ if (n<2) return 1; return n*fact(n-1); }\n\
int main(){ return fact(5); }\n";
    let (result, out) = run_pipeline(stream);
    result.unwrap();
    assert!(out.contains(".global _fact"));
    assert!(out.contains(".global _main"));
    assert!(out.contains("bl _fact"));
}

#[test]
fn test_pipeline_compiler_error_propagates() {
    let stream = "`\nc-compile\nint main(){ return missing; }\n";
    let (result, out) = run_pipeline(stream);
    assert!(matches!(result, Err(ToolchainError::Compiler(_))));
    assert!(out.ends_with("ERR\n"));
    if let Err(e) = result {
        assert_eq!(e.exit_code(), 4);
    }
}

#[test]
fn test_pipeline_vm_error_propagates() {
    let stream = "` : BAD NOSUCHWORD ;";
    let (result, _) = run_pipeline(stream);
    assert!(matches!(result, Err(ToolchainError::Vm(_))));
    if let Err(e) = result {
        assert_eq!(e.exit_code(), 3);
    }
}

#[test]
fn test_pipeline_without_sentinel_is_loader_only() {
    let (result, out) = run_pipeline("de ad be ef");
    let stats = result.unwrap();
    assert_eq!(stats.image_bytes, 4);
    assert!(!stats.sentinel_seen);
    assert!(out.is_empty());
}

#[test]
fn test_forth_stage_alone_without_handoff_word() {
    // A stream that never invokes the compiler stage just interprets.
    let (result, out) = run_pipeline("` 2 3 + .");
    result.unwrap();
    assert_eq!(out, "5 ");
}

#[test]
fn test_compile_to_named_file() {
    // The external assembler reads from a named file.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.s");
    let out = std::fs::File::create(&path).unwrap();
    seedc_cc::compile(
        Cursor::new(b"int main(){ return 7; }".to_vec()),
        out,
    )
    .unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains(".global _main"));
}

proptest! {
    /// Forth arithmetic through the whole pipeline prints in decimal.
    #[test]
    fn prop_pipeline_prints_sums(a in -1000i64..1000, b in -1000i64..1000) {
        let stream = format!("` {a} {b} + .");
        let (result, out) = run_pipeline(&stream);
        prop_assert!(result.is_ok());
        prop_assert_eq!(out, format!("{} ", a + b));
    }
}

#[test]
fn test_hex_comments_and_case_are_nonsemantic() {
    let upper = "DE AD ; comment\nBE EF `";
    let lower = "de\nad # other comment\nbe ef `";
    let (a, _) = run_pipeline(upper);
    let (b, _) = run_pipeline(lower);
    assert_eq!(a.unwrap().image_bytes, b.unwrap().image_bytes);
}
