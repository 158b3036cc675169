//! End-to-end scenarios: compile a C snippet to assembly, assemble and link
//! it with the system `cc`, run it, and check its exit status. These are
//! skipped (not failed) when no `cc` is on `$PATH`, since the crate itself
//! never shells out to an assembler or linker.

use std::fs;
use std::process::Command;

use mcc::compile;

fn cc_available() -> bool {
  Command::new("cc").arg("--version").output().is_ok()
}

fn run_and_get_exit_status(src: &str) -> Option<i32> {
  if !cc_available() {
    eprintln!("skipping: no `cc` on PATH");
    return None;
  }

  let mut buf = src.as_bytes().to_vec();
  buf.push(b'\n');
  buf.push(0);
  let asm = compile(&buf, "test.c").expect("test source should compile");

  let dir = tempfile::tempdir().expect("create scratch dir");
  let asm_path = dir.path().join("out.s");
  let bin_path = dir.path().join("out");
  fs::write(&asm_path, asm).expect("write assembly");

  let status = Command::new("cc")
    .arg("-o").arg(&bin_path)
    .arg(&asm_path)
    .status()
    .expect("invoke cc");
  assert!(status.success(), "assembling/linking generated code failed");

  Command::new(&bin_path).status().expect("run compiled binary").code()
}

#[test]
fn s1_trivial_return() {
  if let Some(code) = run_and_get_exit_status("int main() { return 0; }") {
    assert_eq!(code, 0);
  }
}

#[test]
fn s2_local_variable_arithmetic() {
  if let Some(code) = run_and_get_exit_status("int main() { int a=3; int b=5; return a+b; }") {
    assert_eq!(code, 8);
  }
}

#[test]
fn s3_array_indexing_and_for_loop() {
  let src = "int main() { int a[10]; int i; for (i=0;i<10;i=i+1) a[i]=i; return a[3]+a[7]; }";
  if let Some(code) = run_and_get_exit_status(src) {
    assert_eq!(code, 10);
  }
}

#[test]
fn s4_function_call_with_params() {
  let src = "int foo(int x, int y) { return x-y; } int main(){ return foo(30,7); }";
  if let Some(code) = run_and_get_exit_status(src) {
    assert_eq!(code, 23);
  }
}

#[test]
fn s5_char_array_element_assignment() {
  let src = "int main() { char s[4]; s[0]=97; s[1]=98; s[2]=99; s[3]=0; return s[2]; }";
  if let Some(code) = run_and_get_exit_status(src) {
    assert_eq!(code, 99);
  }
}

#[test]
fn s6_global_string_literal_indexing() {
  let src = "char *msg=\"ok\"; int main(){ return msg[0]+msg[1]; }";
  if let Some(code) = run_and_get_exit_status(src) {
    assert_eq!(code, 218);
  }
}

#[test]
fn pointer_arithmetic_and_address_of() {
  let src = "int main() { int a; int *p; p = &a; *p = 7; return a; }";
  if let Some(code) = run_and_get_exit_status(src) {
    assert_eq!(code, 7);
  }
}

#[test]
fn sizeof_reports_element_size_not_array_size() {
  let src = "int main() { int a[5]; return sizeof(a[0]); }";
  if let Some(code) = run_and_get_exit_status(src) {
    assert_eq!(code, 8);
  }
}

#[test]
fn nested_if_else_branches_take_the_right_path() {
  let src = "int main() { int x=5; if (x>3) { if (x>10) return 1; else return 2; } return 3; }";
  if let Some(code) = run_and_get_exit_status(src) {
    assert_eq!(code, 2);
  }
}

#[test]
fn while_loop_desugars_through_for() {
  let src = "int main() { int i=0; int sum=0; while (i<5) { sum=sum+i; i=i+1; } return sum; }";
  if let Some(code) = run_and_get_exit_status(src) {
    assert_eq!(code, 10);
  }
}
