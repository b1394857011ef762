//! VM execution tracing.
//!
//! A trait-based hook point at the interpreter's dispatch loop, scaled down
//! from the teacher's generic `VmTracer`/`NoopTracer`/`StderrTracer` design
//! (`tracer.rs`) to the two hooks the CORE loop actually needs: per-
//! instruction tracing and GC-cycle notification. [`NoopTracer`] is the
//! zero-cost production default; [`StderrTracer`] prints a human-readable
//! execution log, useful when debugging compiler output.

use crate::bytecode::Op;

pub(crate) trait VmTracer {
    fn trace_instruction(&mut self, line: u32, op: Op);
    fn trace_gc(&mut self, bytes_live: usize);
}

/// Zero-cost default: both hooks inline away entirely.
#[derive(Debug, Default)]
pub(crate) struct NoopTracer;

impl VmTracer for NoopTracer {
    fn trace_instruction(&mut self, _line: u32, _op: Op) {}
    fn trace_gc(&mut self, _bytes_live: usize) {}
}

/// Human-readable execution trace to stderr, one line per instruction.
#[derive(Debug, Default)]
pub(crate) struct StderrTracer;

impl VmTracer for StderrTracer {
    fn trace_instruction(&mut self, line: u32, op: Op) {
        eprintln!("line {line}: {op:?}");
    }

    fn trace_gc(&mut self, bytes_live: usize) {
        eprintln!("gc: {bytes_live} bytes live");
    }
}
