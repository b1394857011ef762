//! ouros: a stack-based bytecode virtual machine for a dynamically typed,
//! Python-like scripting language (`spec.md` §1-§2).
//!
//! The crate root exposes the CORE host-embedding surface named in
//! `spec.md` §6: `interpret` plus the `InterpretResult` exit-code contract.
//! Everything else -- the value model, heap, compiler, and interpreter loop
//! -- is an implementation detail reached only through this function and
//! `ouros-cli`'s file/REPL driver.

mod builtins;
mod bytecode;
mod exceptions;
mod function;
mod heap;
mod intern;
mod io;
mod methods;
mod object;
mod resource;
mod table;
mod tracer;
mod types;
mod value;

pub use crate::bytecode::vm::InterpretResult;

/// Compiles and runs `source`, with the built-in function table and
/// exception hierarchy already installed (`spec.md` §6).
pub fn interpret(source: &str, path: &str) -> InterpretResult {
    let mut vm = bytecode::vm::VM::new();
    vm.interpret(source, path)
}

/// As [`interpret`], but bounds call-frame recursion at `max_frame_depth`
/// instead of the default (`spec.md` §5's per-`VM` resource limits).
pub fn interpret_with_max_recursion(source: &str, path: &str, max_frame_depth: usize) -> InterpretResult {
    let mut limits = resource::ResourceLimits::default();
    limits.max_frame_depth = max_frame_depth;
    let mut vm = bytecode::vm::VM::new_with_limits(limits);
    vm.interpret(source, path)
}

/// As [`interpret`], but routes `print` into an in-memory buffer instead of
/// the process's real stdout, returning the printed lines alongside the
/// usual result. Exists for embedders that need to capture output and for
/// this crate's own integration tests.
pub fn interpret_capturing(source: &str, path: &str) -> (InterpretResult, Vec<String>) {
    let (writer, lines) = io::CollectStringPrint::new();
    let mut vm = bytecode::vm::VM::with_config(resource::ResourceLimits::default(), Box::new(tracer::NoopTracer), Box::new(writer));
    let result = vm.interpret(source, path);
    drop(vm);
    let lines = std::rc::Rc::try_unwrap(lines).expect("vm dropped, no other handle remains").into_inner();
    (result, lines)
}
