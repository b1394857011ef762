//! Functions, closures, and upvalues.
//!
//! A [`FunctionProto`] is the compiled, immutable prototype produced once by
//! the compiler (`spec.md` §6: the code-object contract). A [`Closure`] is
//! created at runtime by the `CLOSURE` opcode: a prototype plus the concrete
//! upvalues it captured at that particular definition site (`spec.md` §4.6).

use crate::{bytecode::Code, heap::HeapId, intern::Interns, value::Value};

/// Describes one variable a closure captures, set by the compiler.
///
/// `is_local: true` means "capture slot `index` of the immediately
/// enclosing frame"; `is_local: false` means "reuse upvalue `index` already
/// captured by the enclosing closure" (a capture of a capture).
#[derive(Debug, Clone, Copy)]
pub(crate) struct UpvalueDesc {
    pub(crate) is_local: bool,
    pub(crate) index: u8,
}

/// A compiled function prototype: bytecode plus the static metadata needed
/// to call it. Stored once on the heap and shared by every `Closure` created
/// over it.
#[derive(Debug)]
pub(crate) struct FunctionProto {
    pub(crate) name: String,
    pub(crate) param_names: Vec<HeapId>,
    pub(crate) param_defaults: Vec<Value>,
    pub(crate) upvalue_descriptors: Vec<UpvalueDesc>,
    pub(crate) code: Code,
}

impl FunctionProto {
    pub(crate) fn arity(&self) -> usize {
        self.param_names.len()
    }

    pub(crate) fn required_arity(&self) -> usize {
        self.param_names.len() - self.param_defaults.len()
    }

    pub(crate) fn repr(&self, interns: &Interns) -> String {
        let _ = interns;
        format!("<function {}>", self.name)
    }
}

/// A function value: a prototype plus the upvalues captured for this
/// particular closure instance.
#[derive(Debug)]
pub(crate) struct Closure {
    pub(crate) function: HeapId,
    pub(crate) upvalues: Vec<HeapId>,
}

/// An upvalue: open while its slot is still live on the value stack, closed
/// once the owning frame has returned (`spec.md` §3, §4.6).
#[derive(Debug)]
pub(crate) enum UpvalueState {
    Open(usize),
    Closed(Value),
}

#[derive(Debug)]
pub(crate) struct UpvalueObj {
    pub(crate) state: UpvalueState,
}

impl UpvalueObj {
    pub(crate) fn closed_value(&self) -> Option<Value> {
        match self.state {
            UpvalueState::Closed(v) => Some(v),
            UpvalueState::Open(_) => None,
        }
    }
}

pub(crate) type NativeFn = fn(&mut crate::bytecode::vm::VM, args: &[Value]) -> crate::exceptions::RunResult<Value>;

#[derive(Debug)]
pub(crate) struct NativeFunction {
    pub(crate) name: &'static str,
    pub(crate) func: NativeFn,
    pub(crate) arity_min: usize,
    pub(crate) arity_max: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BoundMethod {
    pub(crate) receiver: Value,
    pub(crate) method: Value,
}

pub(crate) type NativeMethodFn =
    fn(&mut crate::bytecode::vm::VM, Value, args: &[Value]) -> crate::exceptions::RunResult<Value>;

#[derive(Debug, Clone, Copy)]
pub(crate) struct NativeMethod {
    pub(crate) receiver: Value,
    pub(crate) func: NativeMethodFn,
    pub(crate) name: &'static str,
}
