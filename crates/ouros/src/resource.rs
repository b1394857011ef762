//! Resource limits consulted by the interpreter loop and the heap.
//!
//! A scaled-down version of the teacher's `resource.rs` tracker: the CORE
//! interpreter only needs to bound call-stack recursion and GC thresholds,
//! not wall-clock/allocation-count sandboxing, so this carries just those
//! two knobs rather than the teacher's full `ResourceError` taxonomy.

use crate::heap::GcLimits;

/// Per-[`crate::bytecode::vm::VM`] limits. Exactly one instance per `VM`, no
/// global mutable state (`spec.md` §9: "bundle into a single VM context").
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResourceLimits {
    /// Maximum number of live call frames before `RuntimeError` ("maximum
    /// recursion depth exceeded").
    pub(crate) max_frame_depth: usize,
    pub(crate) gc_min_threshold: usize,
    pub(crate) gc_growth_factor: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        let gc = GcLimits::default();
        Self {
            max_frame_depth: 1024,
            gc_min_threshold: gc.min_threshold,
            gc_growth_factor: gc.growth_factor,
        }
    }
}

impl ResourceLimits {
    pub(crate) fn gc_limits(self) -> GcLimits {
        GcLimits {
            min_threshold: self.gc_min_threshold,
            growth_factor: self.gc_growth_factor,
        }
    }
}
