//! The small built-in function surface (`spec.md` §6: "the builtins
//! surface"), plus the one-time setup `VM::interpret` needs before running
//! any user program.
//!
//! Each entry is an ordinary [`NativeFunction`] registered into `vm.globals`
//! through [`VM::register_builtin`] -- the same mechanism a host embedder
//! would use (`spec.md` §6's "builtin-registration hooks"). `print` is not
//! here: it is a statement compiled directly to `Op::Print`, not a callable.

use crate::{
    bytecode::vm::VM,
    exceptions::{RunError, RunResult},
    function::NativeFunction,
    methods::{self, BinOp},
    object::HeapData,
    types::range::RangeObj,
    value::Value,
};

/// Installs the exception hierarchy and the built-in function table. Called
/// once by every `VM` constructor before the first `interpret`.
pub(crate) fn install(vm: &mut VM) {
    crate::bytecode::vm::exceptions::install_exception_classes(vm);
    for &(name, func, arity_min, arity_max) in BUILTINS {
        vm.register_builtin(NativeFunction {
            name,
            func,
            arity_min,
            arity_max,
        });
    }
}

type Entry = (&'static str, crate::function::NativeFn, usize, Option<usize>);

static BUILTINS: &[Entry] = &[
    ("len", len, 1, Some(1)),
    ("str", str_, 1, Some(1)),
    ("repr", repr, 1, Some(1)),
    ("bool", bool_, 1, Some(1)),
    ("int", int_, 0, Some(1)),
    ("float", float_, 0, Some(1)),
    ("abs", abs, 1, Some(1)),
    ("min", min, 1, None),
    ("max", max, 1, None),
    ("isinstance", isinstance, 2, Some(2)),
    ("range", range, 1, Some(3)),
];

fn len(vm: &mut VM, args: &[Value]) -> RunResult<Value> {
    Ok(Value::Int(methods::value_len(vm, args[0])?))
}

fn str_(vm: &mut VM, args: &[Value]) -> RunResult<Value> {
    let rendered = methods::value_str(vm, args[0])?;
    Ok(Value::Object(vm.heap.allocate_string(rendered)))
}

fn repr(vm: &mut VM, args: &[Value]) -> RunResult<Value> {
    let rendered = methods::value_repr(vm, args[0])?;
    Ok(Value::Object(vm.heap.allocate_string(rendered)))
}

fn bool_(vm: &mut VM, args: &[Value]) -> RunResult<Value> {
    Ok(Value::Bool(methods::to_bool(vm, args[0])?))
}

fn int_(vm: &mut VM, args: &[Value]) -> RunResult<Value> {
    let Some(&value) = args.first() else {
        return Ok(Value::Int(0));
    };
    let tag = value.tag(&vm.heap);
    match methods::table_for(tag).and_then(|t| t.to_int) {
        Some(f) => Ok(Value::Int(f(&vm.heap, value)?)),
        None => {
            let name = methods::type_name(&vm.heap, value);
            Err(RunError::type_error(format!("int() argument must be a string or a number, not '{name}'")))
        }
    }
}

fn float_(vm: &mut VM, args: &[Value]) -> RunResult<Value> {
    let Some(&value) = args.first() else {
        return Ok(Value::Float(0.0));
    };
    let tag = value.tag(&vm.heap);
    match methods::table_for(tag).and_then(|t| t.to_float) {
        Some(f) => Ok(Value::Float(f(&vm.heap, value)?)),
        None => {
            let name = methods::type_name(&vm.heap, value);
            Err(RunError::type_error(format!("float() argument must be a string or a number, not '{name}'")))
        }
    }
}

fn abs(vm: &mut VM, args: &[Value]) -> RunResult<Value> {
    match args[0] {
        Value::Int(i) => Ok(Value::Int(i.abs())),
        Value::Bool(b) => Ok(Value::Int(i64::from(b))),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => {
            let name = methods::type_name(&vm.heap, other);
            Err(RunError::type_error(format!("bad operand type for abs(): '{name}'")))
        }
    }
}

/// Shared fold for `min`/`max`: single iterable argument not supported, only
/// the varargs form (`spec.md`'s CORE front end has no iterable-unpacking
/// call syntax to thread a lone iterable through anyway).
fn fold_extreme(vm: &mut VM, args: &[Value], want_op: BinOp) -> RunResult<Value> {
    let mut best = args[0];
    for &candidate in &args[1..] {
        let result = methods::binary_dispatch(vm, want_op, candidate, best)?;
        if methods::to_bool(vm, result)? {
            best = candidate;
        }
    }
    Ok(best)
}

fn min(vm: &mut VM, args: &[Value]) -> RunResult<Value> {
    fold_extreme(vm, args, BinOp::Lt)
}

fn max(vm: &mut VM, args: &[Value]) -> RunResult<Value> {
    fold_extreme(vm, args, BinOp::Gt)
}

/// `range(stop)` / `range(start, stop)` / `range(start, stop, step)`, the
/// only way user code can produce a `Range` value (`spec.md` §3 lists
/// `Range` among the heap-object tags but names no constructor for it).
fn range(vm: &mut VM, args: &[Value]) -> RunResult<Value> {
    let as_int = |v: Value| -> RunResult<i64> {
        match v {
            Value::Int(i) => Ok(i),
            Value::Bool(b) => Ok(i64::from(b)),
            other => {
                let name = methods::type_name(&vm.heap, other);
                Err(RunError::type_error(format!("'{name}' object cannot be interpreted as an integer")))
            }
        }
    };
    let (start, stop, step) = match args {
        [stop] => (0, as_int(*stop)?, 1),
        [start, stop] => (as_int(*start)?, as_int(*stop)?, 1),
        [start, stop, step] => (as_int(*start)?, as_int(*stop)?, as_int(*step)?),
        _ => unreachable!("arity checked by NativeFunction::check_arity"),
    };
    if step == 0 {
        return Err(RunError::value_error("range() arg 3 must not be zero"));
    }
    Ok(Value::Object(vm.heap.allocate(HeapData::Range(RangeObj { start, stop, step }))))
}

/// `isinstance(obj, cls)`: walks `obj`'s class parent chain for `cls`
/// (`spec.md` §7's hierarchy -- the common use is `isinstance(e, ValueError)`
/// inside an `except Exception as e` block, since CORE's `except` has no
/// type-filtered dispatch of its own).
fn isinstance(vm: &mut VM, args: &[Value]) -> RunResult<Value> {
    let Value::Object(cls_id) = args[1] else {
        return Err(RunError::type_error("isinstance() arg 2 must be a type"));
    };
    if !matches!(vm.heap.get(cls_id), HeapData::Class(_) | HeapData::NativeClass(_)) {
        return Err(RunError::type_error("isinstance() arg 2 must be a type"));
    }
    let Value::Object(obj_id) = args[0] else {
        return Ok(Value::Bool(false));
    };
    let HeapData::Instance(instance) = vm.heap.get(obj_id) else {
        return Ok(Value::Bool(false));
    };
    let mut current = Some(instance.class);
    while let Some(id) = current {
        if id == cls_id {
            return Ok(Value::Bool(true));
        }
        current = match vm.heap.get(id) {
            HeapData::Class(class) => class.parent,
            _ => None,
        };
    }
    Ok(Value::Bool(false))
}
