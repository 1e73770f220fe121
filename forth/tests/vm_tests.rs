//! End-to-end scenarios for the Forth VM
//!
//! These drive the public API the way the pipeline does: a VM booted with
//! the bootstrap extensions, fed a source stream, output captured.

use seedc_forth::{InputStream, Vm, VmError};
use std::cell::RefCell;
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

fn run(source: &str) -> (Vm, String) {
    let buf = SharedBuf::default();
    let mut vm = Vm::new(InputStream::from_str(source), Box::new(buf.clone()));
    vm.boot().expect("boot extensions load");
    vm.interpret().expect("clean interpretation");
    let text = String::from_utf8_lossy(&buf.0.borrow()).into_owned();
    (vm, text)
}

#[test]
fn test_square_scenario() {
    let (_, out) = run(": SQ DUP * ; 7 SQ .");
    assert!(out.contains("49 "));
}

#[test]
fn test_do_loop_absent_is_diagnosed_not_fatal() {
    // DO/LOOP are not part of the kernel; the words are diagnosed and
    // interpretation continues.
    let (vm, out) = run("10 0 DO I . LOOP 5 5 + .");
    assert!(out.contains("10 "));
    assert_eq!(vm.stack(), &[10]);
}

#[test]
fn test_fib_with_recurse() {
    let (_, out) = run(": FIB DUP 2 < IF EXIT THEN DUP 1- RECURSE SWAP 2 - RECURSE + ; 6 FIB .");
    assert!(out.contains("8 "));
}

#[test]
fn test_threaded_code_round_trip() {
    // A colon definition of non-immediate words has the same net stack
    // effect as interpreting its body directly.
    let body = "DUP * SWAP OVER + NIP";
    let direct = format!("7 3 {body}");
    let threaded = format!(": W {body} ; 7 3 W");
    let (vm_a, _) = run(&direct);
    let (vm_b, _) = run(&threaded);
    assert_eq!(vm_a.stack(), vm_b.stack());
}

#[test]
fn test_deep_nesting_of_control_structures() {
    let (vm, _) = run(
        ": CLAMP3 DUP 3 > IF DROP 3 ELSE DUP 0 < IF DROP 0 THEN THEN ; \
         -2 CLAMP3 1 CLAMP3 9 CLAMP3",
    );
    assert_eq!(vm.stack(), &[0, 1, 3]);
}

#[test]
fn test_nested_colon_calls_restore_caller() {
    let (vm, _) = run(": INC 1+ ; : TWICE INC INC ; 5 TWICE 1 TWICE");
    assert_eq!(vm.stack(), &[7, 3]);
}

#[test]
fn test_stack_underflow_is_fatal() {
    let mut vm = Vm::new(InputStream::from_str("DROP"), Box::new(Vec::new()));
    vm.boot().unwrap();
    assert!(matches!(vm.interpret(), Err(VmError::StackUnderflow)));
}

#[test]
fn test_then_without_if_aborts() {
    let mut vm = Vm::new(
        InputStream::from_str(": BROKEN THEN ;"),
        Box::new(Vec::new()),
    );
    vm.boot().unwrap();
    // THEN's compile-time stack work finds no pending branch location.
    assert!(vm.interpret().is_err());
}

#[test]
fn test_handoff_receives_remaining_stream() {
    let captured = Rc::new(RefCell::new(String::new()));
    let sink = captured.clone();
    let mut vm = Vm::new(
        InputStream::from_str("1 2 + c-compile int main(){}"),
        Box::new(Vec::new()),
    );
    vm.boot().unwrap();
    vm.install_handoff(
        "c-compile",
        Box::new(move |input, _out| {
            let mut rest = String::new();
            std::io::Read::read_to_string(input, &mut rest).map_err(|e| e.to_string())?;
            sink.borrow_mut().push_str(&rest);
            Ok(())
        }),
    )
    .unwrap();
    vm.interpret().unwrap();
    assert_eq!(captured.borrow().trim(), "int main(){}");
    assert_eq!(vm.stack(), &[3]);
}

#[test]
fn test_handoff_failure_is_fatal() {
    let mut vm = Vm::new(InputStream::from_str("go"), Box::new(Vec::new()));
    vm.boot().unwrap();
    vm.install_handoff("go", Box::new(|_input, _out| Err("ERR".to_string())))
        .unwrap();
    assert!(matches!(vm.interpret(), Err(VmError::Handoff(_))));
}
